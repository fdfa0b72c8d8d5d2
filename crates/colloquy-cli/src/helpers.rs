//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization and memory store selection.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colloquy_store::{InMemoryStore, JsonFileStore, MemoryStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// `RUST_LOG` wins over `default_level`.  Logs go to stderr so they do not
/// interleave with console output on stdout.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Open the JSON memory file at `path`, or an in-memory store when `None`.
pub async fn open_memory(path: Option<&Path>) -> Result<Arc<dyn MemoryStore>> {
    match path {
        Some(path) => {
            let store = JsonFileStore::open(path)
                .await
                .with_context(|| format!("failed to open memory file {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            info!("no memory file configured, memory will not persist");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}
