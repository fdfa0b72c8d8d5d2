//! CLI argument definitions for Colloquy.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Colloquy -- scripted multi-turn conversations.
#[derive(Parser)]
#[command(
    name = "colloquy",
    version,
    about = "Colloquy -- scripted-dialogue runtime",
    long_about = "Runs behavior-tree conversation scenarios concurrently against a stream \
                  of messages. `run` starts a console session where every line is a message."
)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, short, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Emit logs (and `check` output) as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a console session.  Lines of the form `name: text` speak as
    /// `name` from then on.
    Run {
        /// Initial user name (overrides `[console] user`).
        #[arg(long, short)]
        user: Option<String>,

        /// Channel every console message is posted in (overrides
        /// `[console] channel`).
        #[arg(long)]
        channel: Option<String>,
    },

    /// Assemble every bundled scenario and list the registered handlers.
    Check,
}
