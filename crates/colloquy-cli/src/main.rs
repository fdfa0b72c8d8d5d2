//! CLI entry point for Colloquy.
//!
//! This binary provides the `colloquy` command: `run` starts a console
//! session against the bundled scenarios, `check` assembles them and lists
//! the registered handlers.

mod check;
mod cli;
mod config;
mod console;
mod helpers;
mod repl;
mod scenarios;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::helpers::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    init_tracing(&config.console.log_level, cli.json);
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match cli.command {
        Commands::Run { user, channel } => repl::cmd_run(config, user, channel).await,
        Commands::Check => check::cmd_check(&config, cli.json),
    }
}
