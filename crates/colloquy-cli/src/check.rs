//! Subcommand: `colloquy check` -- assemble scenarios and list handlers.

use std::sync::Arc;

use anyhow::Result;
use colloquy_store::{InMemoryStore, Memory};
use serde::Serialize;

use crate::config::AppConfig;
use crate::scenarios;

#[derive(Debug, Serialize)]
struct Report {
    handlers: Vec<String>,
    context_free: Vec<String>,
    nlu_intents: Vec<String>,
}

/// Build every scenario against a scratch memory and print what was
/// registered.  Fails when any scenario is ill-typed.
pub fn cmd_check(config: &AppConfig, json: bool) -> Result<()> {
    let memory = Memory::new(Arc::new(InMemoryStore::new()));
    let bundle = scenarios::build(&memory, &config.runtime)?;

    let report = Report {
        handlers: bundle.handlers.intents(),
        context_free: bundle.handlers.context_free_intents(&config.runtime),
        nlu_intents: bundle.nlu.intents(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} handlers:", report.handlers.len());
    for intent in &report.handlers {
        let marker = if report.context_free.contains(intent) {
            "*"
        } else {
            " "
        };
        println!("  {marker} {intent}");
    }
    println!("(* starts conversations)");

    let unhandled: Vec<&String> = report
        .nlu_intents
        .iter()
        .filter(|i| !report.handlers.contains(i))
        .collect();
    if !unhandled.is_empty() {
        println!(
            "NLU-only intents (used by waits): {}",
            unhandled
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}
