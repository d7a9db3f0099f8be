//! Application configuration for Dossier.
//!
//! User config lives at `~/.dossier/dossier.toml`.
//! Environment overrides win over the config file, which wins over defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DossierError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "dossier.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".dossier";

// ---------------------------------------------------------------------------
// Config structs (matching dossier.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generative backend settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Rate-limit retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Web search collaborator.
    #[serde(default)]
    pub search: SearchConfig,

    /// Page scraping collaborator.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Supervisor and driver limits.
    #[serde(default)]
    pub run: RunConfig,
}

/// Which generative backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// OpenRouter chat-completions API.
    Openrouter,
    /// The `gemini` command-line tool.
    GeminiCli,
}

impl std::str::FromStr for Provider {
    type Err = DossierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openrouter" => Ok(Self::Openrouter),
            "gemini" | "gemini-cli" => Ok(Self::GeminiCli),
            other => Err(DossierError::config(format!(
                "unknown LLM provider '{other}': expected 'openrouter' or 'gemini'"
            ))),
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    /// Per-request timeout (HTTP request or CLI subprocess).
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Executable used by the `gemini-cli` provider.
    #[serde(default = "default_gemini_command")]
    pub gemini_command: String,

    /// Log request/response payloads at debug level.
    #[serde(default)]
    pub log_payloads: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key_env: default_llm_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout(),
            gemini_command: default_gemini_command(),
            log_payloads: false,
        }
    }
}

fn default_provider() -> Provider {
    Provider::Openrouter
}
fn default_llm_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "qwen/qwen-2.5-72b-instruct".into()
}
fn default_llm_timeout() -> u64 {
    90
}
fn default_gemini_command() -> String {
    "gemini".into()
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay() -> u64 {
    5
}
fn default_max_delay() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    10
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            endpoint: default_search_endpoint(),
            max_results: default_max_results(),
            search_depth: default_search_depth(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".into()
}
fn default_max_results() -> usize {
    5
}
fn default_search_depth() -> String {
    "advanced".into()
}
fn default_search_timeout() -> u64 {
    30
}

/// `[scrape]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Cap on text pulled from a website's contact pages.
    #[serde(default = "default_max_contact_chars")]
    pub max_contact_chars: usize,
    /// Cap on text pulled from each registry lookup.
    #[serde(default = "default_max_registry_chars")]
    pub max_registry_chars: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            user_agent: default_user_agent(),
            max_contact_chars: default_max_contact_chars(),
            max_registry_chars: default_max_registry_chars(),
        }
    }
}

fn default_scrape_timeout() -> u64 {
    15
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .into()
}
fn default_max_contact_chars() -> usize {
    5_000
}
fn default_max_registry_chars() -> usize {
    2_000
}

/// How the supervisor picks the next worker once the name is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Ask the generative backend.
    Llm,
    /// Apply the routing rubric deterministically.
    Rules,
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Supervisor cycles before a run is forced to finish.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Driver-level cap on supervisor + worker steps per entity.
    #[serde(default = "default_step_limit")]
    pub step_limit: u32,
    #[serde(default = "default_routing")]
    pub routing: RoutingMode,
    /// Pause between records in batch mode.
    #[serde(default = "default_record_delay")]
    pub record_delay_secs: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            step_limit: default_step_limit(),
            routing: default_routing(),
            record_delay_secs: default_record_delay(),
        }
    }
}

fn default_max_iterations() -> u32 {
    10
}
fn default_step_limit() -> u32 {
    25
}
fn default_routing() -> RoutingMode {
    RoutingMode::Llm
}
fn default_record_delay() -> f64 {
    2.0
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig, immutable once built)
// ---------------------------------------------------------------------------

/// Rate-limit retry policy handed to the invocation client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// First wait when the backend gives no explicit delay.
    pub base_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    /// Total call attempts before giving up.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

/// Limits applied by the supervisor and the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_iterations: u32,
    pub step_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.run.max_iterations,
            step_limit: config.run.step_limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.dossier/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DossierError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.dossier/dossier.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
/// Environment overrides are applied in both cases.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DossierError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DossierError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `LLM_PROVIDER`, `OPENROUTER_MODEL` and `DEV_MODE` overrides.
pub fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(provider) = lookup("LLM_PROVIDER").filter(|v| !v.trim().is_empty()) {
        config.llm.provider = provider.parse()?;
    }
    if let Some(model) = lookup("OPENROUTER_MODEL").filter(|v| !v.trim().is_empty()) {
        config.llm.model = model;
    }
    if let Some(dev_mode) = lookup("DEV_MODE") {
        config.llm.log_payloads = dev_mode.trim().eq_ignore_ascii_case("true");
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DossierError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DossierError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DossierError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the backend API key env var is set and non-empty.
///
/// The `gemini-cli` provider authenticates on its own and needs no key.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    if config.llm.provider == Provider::GeminiCli {
        return Ok(());
    }

    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(DossierError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}
