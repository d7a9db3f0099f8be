//! Dossier CLI: supervised business-profile enrichment.
//!
//! Researches one company, or a JSONL batch of them, and emits one
//! structured report per entity.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
