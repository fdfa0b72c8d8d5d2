//! Conversation scheduler.
//!
//! The scheduler owns every live conversation.  Each one is a tokio task
//! running a behavior tree over its own [`Context`].  For every inbound
//! message it either resumes exactly one paused conversation or starts a new
//! one:
//!
//! ```text
//! message ──▶ prune finished tasks
//!         ──▶ collect pending expectations
//!         ──▶ sort: priority desc, creation order asc
//!         ──▶ first claim + satisfy wins ───────────────▶ Resumed
//!         ──▶ otherwise NLU over context-free intents
//!               confidence > threshold ? intent : mismatch
//!         ──▶ handler (or no-handler) ? spawn task ─────▶ Started
//!                                     : ───────────────▶ Ignored
//! ```
//!
//! Routing takes `&mut self` and never awaits, so one message is fully
//! resolved before the next is looked at.
//!
//! A runtime error inside a conversation is logged at the task boundary and
//! ends only that conversation.  Pruned conversations keep their report until
//! the next [`ConversationScheduler::join_all`].

use std::collections::VecDeque;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::Instrument;

use crate::action::BoxAction;
use crate::config::RuntimeConfig;
use crate::context::{ConversationId, Context, Message};
use crate::error::Result;
use crate::expectation::{ExpectationBoard, ExpectationId, MessageExpectation};
use crate::nlu::Nlu;
use crate::platform::Platform;
use crate::registry::HandlerRegistry;

/// Reports of pruned conversations kept for `join_all`; older ones are dropped.
const FINISHED_REPORTS_KEPT: usize = 1024;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What the scheduler did with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dispatch", rename_all = "snake_case")]
pub enum Dispatch {
    /// A paused conversation took the message.
    Resumed {
        conversation: ConversationId,
        expectation: ExpectationId,
    },
    /// A new conversation was started for `intent`.
    Started {
        conversation: ConversationId,
        intent: String,
    },
    /// No conversation took the message and no handler was found.
    Ignored { intent: String },
}

/// A pending expectation together with the conversation that owns it.
#[derive(Debug, Clone)]
pub struct PendingExpectation {
    pub conversation: ConversationId,
    pub expectation: Arc<MessageExpectation>,
}

/// How a conversation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum ConversationOutcome {
    /// The tree returned `true`.
    Succeeded,
    /// The tree returned `false`.
    Failed,
    /// A leaf raised a runtime error (or the task panicked).
    Errored(String),
    /// The task was aborted by [`ConversationScheduler::shutdown`].
    Cancelled,
}

/// Final report of a joined conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationReport {
    pub conversation: ConversationId,
    pub intent: String,
    pub outcome: ConversationOutcome,
}

struct ConversationTask {
    id: ConversationId,
    intent: String,
    expectations: Arc<ExpectationBoard>,
    handle: JoinHandle<Result<bool>>,
}

fn report(
    conversation: ConversationId,
    intent: String,
    joined: std::result::Result<Result<bool>, JoinError>,
) -> ConversationReport {
    let outcome = match joined {
        Ok(Ok(true)) => ConversationOutcome::Succeeded,
        Ok(Ok(false)) => ConversationOutcome::Failed,
        Ok(Err(e)) => ConversationOutcome::Errored(e.to_string()),
        Err(e) if e.is_cancelled() => ConversationOutcome::Cancelled,
        Err(e) => ConversationOutcome::Errored(e.to_string()),
    };
    ConversationReport {
        conversation,
        intent,
        outcome,
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Routes inbound messages to live conversations or starts new ones.
pub struct ConversationScheduler {
    handlers: HandlerRegistry,
    nlu: Arc<dyn Nlu>,
    platform: Arc<dyn Platform>,
    config: RuntimeConfig,
    tasks: Vec<ConversationTask>,
    finished: VecDeque<ConversationReport>,
}

impl ConversationScheduler {
    pub fn new(
        handlers: HandlerRegistry,
        nlu: Arc<dyn Nlu>,
        platform: Arc<dyn Platform>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            handlers,
            nlu,
            platform,
            config,
            tasks: Vec::new(),
            finished: VecDeque::new(),
        }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Route one inbound message.
    ///
    /// At most one expectation is satisfied per message; a new conversation
    /// is only considered when no expectation claimed it.
    pub fn handle_incoming_message(&mut self, message: Message) -> Dispatch {
        self.prune();

        let mut candidates = self.pending_expectations();
        candidates.sort_by(|a, b| {
            b.expectation
                .priority()
                .total_cmp(&a.expectation.priority())
                .then_with(|| a.expectation.id().cmp(&b.expectation.id()))
        });

        for candidate in &candidates {
            let Some(delivery) = candidate.expectation.claim(&message, self.nlu.as_ref()) else {
                continue;
            };
            if candidate.expectation.satisfy(delivery) {
                tracing::info!(
                    conversation = %candidate.conversation,
                    expectation = %candidate.expectation.id(),
                    message = %message.id,
                    "conversation resumed"
                );
                return Dispatch::Resumed {
                    conversation: candidate.conversation,
                    expectation: candidate.expectation.id(),
                };
            }
        }

        self.start_conversation(message)
    }

    /// Pending expectations of every live conversation, in no particular
    /// order.
    pub fn pending_expectations(&self) -> Vec<PendingExpectation> {
        let now = Instant::now();
        self.tasks
            .iter()
            .filter(|task| !task.handle.is_finished())
            .flat_map(|task| {
                task.expectations
                    .active(now)
                    .into_iter()
                    .map(|expectation| PendingExpectation {
                        conversation: task.id,
                        expectation,
                    })
            })
            .collect()
    }

    /// Drop conversations whose task has completed, keeping their reports
    /// for [`join_all`](Self::join_all).  Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let (done, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| task.handle.is_finished());
        self.tasks = live;

        let mut pruned = 0;
        for mut task in done {
            // A finished handle can still report pending when the coop budget
            // is spent; such a task stays tracked until the next pass.
            match (&mut task.handle).now_or_never() {
                Some(joined) => {
                    if self.finished.len() == FINISHED_REPORTS_KEPT {
                        self.finished.pop_front();
                    }
                    self.finished.push_back(report(task.id, task.intent, joined));
                    pruned += 1;
                }
                None => self.tasks.push(task),
            }
        }
        if pruned > 0 {
            tracing::debug!(pruned, live = self.tasks.len(), "finished conversations pruned");
        }
        pruned
    }

    /// Number of conversations whose task is still running.
    pub fn active_conversations(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| !task.handle.is_finished())
            .count()
    }

    /// Wait for every tracked conversation to finish and report how each
    /// ended.  Conversations pruned earlier come first, in the order they
    /// were pruned.
    pub async fn join_all(&mut self) -> Vec<ConversationReport> {
        let mut reports: Vec<ConversationReport> = self.finished.drain(..).collect();
        let (meta, handles): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .map(|task| ((task.id, task.intent), task.handle))
            .unzip();
        reports.extend(
            join_all(handles)
                .await
                .into_iter()
                .zip(meta)
                .map(|(joined, (conversation, intent))| report(conversation, intent, joined)),
        );
        reports
    }

    /// Abort every live conversation.
    pub fn shutdown(&mut self) {
        let live = self.active_conversations();
        for task in &self.tasks {
            task.handle.abort();
        }
        tracing::info!(aborted = live, "scheduler shut down");
    }

    /// Dispatch messages from `inbox` until every sender is dropped.
    pub async fn serve(&mut self, mut inbox: mpsc::Receiver<Message>) {
        tracing::info!(handlers = self.handlers.len(), "dispatcher started");
        while let Some(message) = inbox.recv().await {
            let dispatch = self.handle_incoming_message(message);
            tracing::debug!(?dispatch, "message dispatched");
        }
        tracing::info!(live = self.active_conversations(), "dispatcher stopped");
    }

    // -- Private helpers ----------------------------------------------------

    fn start_conversation(&mut self, message: Message) -> Dispatch {
        let intents = self.handlers.context_free_intents(&self.config);
        let matched = if intents.is_empty() {
            None
        } else {
            self.nlu.match_intent_one_of(&message.content, &intents)
        };

        let (intent, matched) = match matched {
            Some(m) if m.confidence > self.config.confidence_threshold => (m.intent.clone(), Some(m)),
            other => {
                tracing::debug!(
                    message = %message.id,
                    best = ?other.as_ref().map(|m| (&m.intent, m.confidence)),
                    "no confident intent match"
                );
                (self.config.mismatch_intent.clone(), None)
            }
        };

        let handler = match self.handlers.get(&intent) {
            Some(handler) => handler,
            None => match self.handlers.get(&self.config.no_handler_intent) {
                Some(fallback) => {
                    tracing::debug!(intent = %intent, "falling back to no-handler");
                    fallback
                }
                None => {
                    tracing::debug!(intent = %intent, message = %message.id, "message ignored");
                    return Dispatch::Ignored { intent };
                }
            },
        };

        let mut ctx = Context::new(message, Arc::clone(&self.platform));
        if let Some(m) = matched {
            ctx = ctx.with_intent(m);
        }
        let id = ctx.id();
        let expectations = Arc::clone(ctx.expectations());

        let span = tracing::info_span!(
            "conversation",
            id = %id,
            intent = %intent,
            user = %ctx.author().id,
        );
        tracing::info!(conversation = %id, intent = %intent, "conversation started");
        let handle = tokio::spawn(run_conversation(handler, ctx).instrument(span));

        self.tasks.push(ConversationTask {
            id,
            intent: intent.clone(),
            expectations,
            handle,
        });
        Dispatch::Started {
            conversation: id,
            intent,
        }
    }
}

impl Drop for ConversationScheduler {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.handle.abort();
        }
    }
}

impl std::fmt::Debug for ConversationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationScheduler")
            .field("handlers", &self.handlers)
            .field("config", &self.config)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

async fn run_conversation(handler: BoxAction, mut ctx: Context) -> Result<bool> {
    let result = handler.run(&mut ctx).await;
    match &result {
        Ok(success) => tracing::info!(success = *success, "conversation finished"),
        Err(e) => tracing::error!(error = %e, "conversation aborted"),
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
