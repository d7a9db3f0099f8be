//! CLI command definitions, routing, and tracing setup.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use dossier_core::{Orchestrator, RunObserver};
use dossier_shared::{
    AppConfig, EntityInput, Role, RunId, RunReport, RunStatus, apply_env_overrides, init_config,
    load_config, load_config_from, validate_api_key,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Dossier: build company profiles from the open web.
#[derive(Parser)]
#[command(
    name = "dossier",
    version,
    about = "Research companies with a supervised crew of extraction agents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.dossier/dossier.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Research a single company.
    Research {
        /// Company name as known to the caller.
        name: String,

        /// Known website domain.
        #[arg(long)]
        domain: Option<String>,

        /// Industry hint.
        #[arg(long)]
        industry: Option<String>,

        /// City hint.
        #[arg(long)]
        city: Option<String>,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Research every record of a JSONL file, one report per line.
    Batch {
        /// Input file: one JSON object (or bare company name) per line.
        input: PathBuf,

        /// Output JSONL file (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Process at most this many records.
        #[arg(long)]
        limit: Option<usize>,

        /// Seconds to pause between records (overrides run.record_delay_secs).
        #[arg(long)]
        delay: Option<f64>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "dossier=info",
        1 => "dossier=debug",
        _ => "dossier=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Research {
            name,
            domain,
            industry,
            city,
            json,
        } => {
            let input = EntityInput {
                entity_name: name,
                domain,
                industry,
                city,
            };
            cmd_research(resolve_config(config_path.as_deref())?, input, json).await
        }
        Command::Batch {
            input,
            out,
            limit,
            delay,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_batch(config, &input, out, limit, delay).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

/// Load the config from `--config` if given, else from the default location.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let mut config = load_config_from(path)?;
            apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => Ok(load_config()?),
    }
}

// ---------------------------------------------------------------------------
// research
// ---------------------------------------------------------------------------

async fn cmd_research(config: AppConfig, input: EntityInput, json: bool) -> Result<()> {
    validate_api_key(&config)?;
    info!(entity = %input.entity_name, "researching company");

    let progress = CliProgress::new();
    let observer = progress.clone();

    // The engine and its HTTP clients block, so they live and die off the runtime.
    let report = tokio::task::spawn_blocking(move || -> Result<RunReport> {
        let engine = Orchestrator::from_config(&config)?;
        Ok(engine.run(&input, &observer))
    })
    .await??;
    progress.finish();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Entity:     {}", report.entity_name);
    println!("  Status:     {}", report.status.as_str());
    println!("  Iterations: {}", report.iterations);
    println!("  Time:       {:.1}s", report.elapsed_ms as f64 / 1000.0);
    if let Some(error) = &report.error {
        println!("  Error:      {error}");
    }

    if let Some(profile) = &report.profile {
        println!();
        println!("  Name:       {}", profile.name);
        println!("  Website:    {}", profile.website.as_deref().unwrap_or("-"));
        println!("  Industry:   {}", profile.industry.as_deref().unwrap_or("-"));
        if let Some(description) = &profile.description {
            println!("  About:      {description}");
        }
        if let Some(metrics) = &profile.metrics {
            let show = |v: Option<String>| v.unwrap_or_else(|| "-".into());
            println!(
                "  Metrics:    revenue {}, employees {}, growth {}",
                show(metrics.revenue.map(|r| r.to_string())),
                show(metrics.employees.map(|e| e.to_string())),
                show(metrics.growth_rate.map(|g| g.to_string())),
            );
        }
        println!("  Contacts:   {}", profile.contacts.len());
        for contact in &profile.contacts {
            println!(
                "    - {} ({}) {}",
                contact.name,
                contact.role.as_deref().unwrap_or("?"),
                contact.email.as_deref().unwrap_or(""),
            );
        }
    }

    if !report.notices.is_empty() {
        println!();
        println!("  Notices:");
        for notice in &report.notices {
            println!("    [{:?}] {}", notice.level, notice.message);
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

async fn cmd_batch(
    config: AppConfig,
    input: &Path,
    out: Option<PathBuf>,
    limit: Option<usize>,
    delay: Option<f64>,
) -> Result<()> {
    validate_api_key(&config)?;

    let content = std::fs::read_to_string(input)
        .map_err(|e| eyre!("cannot read '{}': {e}", input.display()))?;
    let records = parse_records(&content, limit);
    let pause = record_pause(delay.unwrap_or(config.run.record_delay_secs))?;
    info!(records = records.len(), input = %input.display(), "starting batch");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current record");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let progress = CliProgress::new();
    let observer = progress.clone();

    let summary = tokio::task::spawn_blocking(move || -> Result<BatchSummary> {
        let engine = Orchestrator::from_config(&config)?;
        let mut sink: Box<dyn Write> = match &out {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).map_err(|e| eyre!("cannot create '{}': {e}", path.display()))?,
            )),
            None => Box::new(std::io::stdout()),
        };

        let total = records.len();
        let mut summary = BatchSummary::default();
        for (index, record) in records.into_iter().enumerate() {
            if index > 0 && !pause.is_zero() {
                std::thread::sleep(pause);
            }
            if stop.load(Ordering::SeqCst) {
                summary.interrupted = true;
                break;
            }

            observer.position(index + 1, total);
            let report = match record {
                Ok(input) => engine.run(&input, &observer),
                Err(message) => {
                    warn!(%message, "skipping invalid record");
                    invalid_report(message)
                }
            };
            summary.record(&report);

            serde_json::to_writer(&mut sink, &report)?;
            writeln!(sink)?;
            sink.flush()?;
        }
        Ok(summary)
    })
    .await??;
    progress.finish();

    if summary.interrupted {
        warn!(processed = summary.total, "batch interrupted");
    }
    summary.print();
    Ok(())
}

/// Pause between batch records. Negative values mean no pause.
fn record_pause(secs: f64) -> Result<Duration> {
    let secs = if secs < 0.0 { 0.0 } else { secs };
    Duration::try_from_secs_f64(secs)
        .map_err(|e| eyre!("invalid record delay '{secs}': {e}"))
}

/// Parse JSONL input. Each non-blank line is either an [`EntityInput`]
/// object or a bare company name.
fn parse_records(content: &str, limit: Option<usize>) -> Vec<std::result::Result<EntityInput, String>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .take(limit.unwrap_or(usize::MAX))
        .map(|(index, line)| {
            let line = line.trim();
            if line.starts_with('{') {
                serde_json::from_str::<EntityInput>(line)
                    .map_err(|e| format!("line {}: invalid record: {e}", index + 1))
            } else {
                Ok(EntityInput::named(line))
            }
        })
        .collect()
}

fn invalid_report(message: String) -> RunReport {
    RunReport {
        run_id: RunId::new(),
        entity_name: String::new(),
        status: RunStatus::Error,
        profile: None,
        notices: Vec::new(),
        error: Some(message),
        iterations: 0,
        elapsed_ms: 0,
    }
}

/// Outcome counts for a batch.
#[derive(Debug, Default, PartialEq, Eq)]
struct BatchSummary {
    total: usize,
    success: usize,
    recursion_limit: usize,
    error: usize,
    with_contacts: usize,
    interrupted: bool,
}

impl BatchSummary {
    fn record(&mut self, report: &RunReport) {
        self.total += 1;
        match report.status {
            RunStatus::Success => self.success += 1,
            RunStatus::RecursionLimit => self.recursion_limit += 1,
            RunStatus::Error => self.error += 1,
        }
        if report.profile.as_ref().is_some_and(|p| !p.contacts.is_empty()) {
            self.with_contacts += 1;
        }
    }

    fn print(&self) {
        eprintln!();
        eprintln!("  Batch complete{}", if self.interrupted { " (interrupted)" } else { "" });
        eprintln!("  Total:           {}", self.total);
        eprintln!("  Success:         {}", self.success);
        eprintln!("  Recursion limit: {}", self.recursion_limit);
        eprintln!("  Error:           {}", self.error);
        eprintln!("  With contacts:   {}", self.with_contacts);
        eprintln!();
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Run observer drawing an indicatif spinner on stderr.
#[derive(Clone)]
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix}{msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn position(&self, current: usize, total: usize) {
        self.spinner.set_prefix(format!("[{current}/{total}] "));
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl RunObserver for CliProgress {
    fn routed(&self, entity: &str, iteration: u32, role: Role) {
        self.spinner
            .set_message(format!("{entity}: cycle {iteration}, running {role}"));
    }

    fn worker_done(&self, entity: &str, role: Role, ok: bool) {
        if !ok {
            self.spinner.set_message(format!("{entity}: {role} found nothing"));
        }
    }

    fn finished(&self, report: &RunReport) {
        self.spinner.println(format!(
            "  {:<16} {} ({} cycles)",
            report.status.as_str(),
            report.entity_name,
            report.iterations
        ));
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
