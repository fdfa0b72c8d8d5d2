//! Subcommand: `colloquy run` -- interactive console session.
//!
//! A reader thread turns stdin lines into messages and feeds the scheduler's
//! inbox.  When stdin closes (or `/quit` is typed) the dispatcher stops taking
//! messages and waits for the live conversations to finish on their own
//! timers.  Ctrl-C exits immediately.

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use colloquy_kernel::{ConversationOutcome, ConversationScheduler, Message, Platform};
use colloquy_store::Memory;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::console::{ConsolePlatform, ConsoleSession, Input};
use crate::helpers::open_memory;
use crate::scenarios;

/// Run the console session.
pub async fn cmd_run(config: AppConfig, user: Option<String>, channel: Option<String>) -> Result<()> {
    let store = open_memory(config.memory_path.as_deref()).await?;
    let memory = Memory::new(store);
    let bundle = scenarios::build(&memory, &config.runtime).context("failed to load scenarios")?;

    let platform: Arc<dyn Platform> = Arc::new(ConsolePlatform::stdout());
    let mut scheduler = ConversationScheduler::new(
        bundle.handlers,
        Arc::new(bundle.nlu),
        platform,
        config.runtime.clone(),
    );

    let user = user.unwrap_or(config.console.user);
    let channel = channel.unwrap_or(config.console.channel);
    let session = ConsoleSession::new(&user, channel);

    println!();
    println!("  Colloquy v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Speaking as {} in #{}. Type `name: text` to speak as someone else, /quit to exit.",
        session.author().name,
        session.channel()
    );
    println!();

    let (tx, rx) = mpsc::channel(config.runtime.inbox_capacity);
    // stdin is read on a plain thread so a pending read never blocks runtime
    // shutdown.
    std::thread::Builder::new()
        .name("console-stdin".into())
        .spawn(move || read_stdin(session, tx))
        .context("failed to spawn stdin reader")?;

    let dispatcher = async {
        scheduler.serve(rx).await;
        let live = scheduler.active_conversations();
        if live > 0 {
            info!(live, "waiting for live conversations to finish");
        }
        scheduler.join_all().await
    };

    tokio::select! {
        reports = dispatcher => {
            let errored = reports
                .iter()
                .filter(|r| matches!(r.outcome, ConversationOutcome::Errored(_)))
                .count();
            info!(conversations = reports.len(), errored, "session finished");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, aborting live conversations");
        }
    }
    Ok(())
}

fn read_stdin(mut session: ConsoleSession, inbox: mpsc::Sender<Message>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to read stdin");
                break;
            }
        };
        match session.read(&line) {
            Input::Message(message) => {
                if inbox.blocking_send(message).is_err() {
                    break;
                }
            }
            Input::Nothing => {}
            Input::Quit => {
                info!("user requested exit");
                break;
            }
        }
    }
}
