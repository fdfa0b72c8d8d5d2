//! Message expectations.
//!
//! A paused conversation declares what would resume it by registering a
//! [`MessageExpectation`] on its [`ExpectationBoard`].  The scheduler checks
//! pending expectations against every inbound message with the side-effect
//! free [`MessageExpectation::claim`] and satisfies at most one.
//!
//! ```text
//!            claim + satisfy
//! Pending ─────────────────────▶ Satisfied
//!    │
//!    │ deadline passes
//!    ▼
//! Expired
//! ```
//!
//! Satisfaction hands the message to the waiting task over a oneshot channel.
//! The task applies it to its own context, so no other task ever mutates a
//! conversation's state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::context::Message;
use crate::nlu::{IntentMatch, Nlu};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Process-wide creation sequence of an expectation.
///
/// Lower ids were created earlier; the scheduler uses this for FIFO
/// tie-breaking between equal priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExpectationId(u64);

static NEXT_EXPECTATION_ID: AtomicU64 = AtomicU64::new(1);

impl ExpectationId {
    fn next() -> Self {
        Self(NEXT_EXPECTATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ExpectationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exp-{}", self.0)
    }
}

/// What kind of message resumes the waiting conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectationKind {
    /// Any message from this user.
    FromUser { user_id: String },
    /// A message from this user that the NLU matches to one of `intents`.
    FromUserWithIntents { user_id: String, intents: Vec<String> },
    /// Any message in this channel.
    FromChannel { channel_id: String },
}

impl ExpectationKind {
    /// Default priority of each kind.
    pub fn default_priority(&self) -> f64 {
        match self {
            Self::FromUser { .. } | Self::FromUserWithIntents { .. } => 1.0,
            Self::FromChannel { .. } => 0.5,
        }
    }
}

/// A message handed to a resumed conversation.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    /// Set when the expectation classified the message.
    pub intent: Option<IntentMatch>,
}

/// Lifecycle state of an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationState {
    Pending,
    Satisfied,
    Expired,
}

// ---------------------------------------------------------------------------
// MessageExpectation
// ---------------------------------------------------------------------------

/// A declared willingness to be resumed by a qualifying message.
pub struct MessageExpectation {
    id: ExpectationId,
    kind: ExpectationKind,
    priority: f64,
    created_at: Instant,
    expires_at: Instant,
    satisfied: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<Delivery>>>,
}

impl MessageExpectation {
    /// Create a pending expectation that expires after `timeout`.
    ///
    /// The returned receiver yields the delivery once the expectation is
    /// satisfied.
    pub fn new(
        kind: ExpectationKind,
        priority: f64,
        timeout: Duration,
    ) -> (Self, oneshot::Receiver<Delivery>) {
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        let expectation = Self {
            id: ExpectationId::next(),
            kind,
            priority,
            created_at: now,
            expires_at: now + timeout,
            satisfied: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        };
        (expectation, rx)
    }

    pub fn id(&self) -> ExpectationId {
        self.id
    }

    pub fn kind(&self) -> &ExpectationKind {
        &self.kind
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Lifecycle state as of `now`.
    pub fn state(&self, now: Instant) -> ExpectationState {
        if self.satisfied.load(Ordering::Acquire) {
            ExpectationState::Satisfied
        } else if now >= self.expires_at {
            ExpectationState::Expired
        } else {
            ExpectationState::Pending
        }
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.state(now) == ExpectationState::Pending
    }

    /// The delivery this expectation would make for `message`, if it
    /// qualifies.  Has no side effects.
    pub fn claim(&self, message: &Message, nlu: &dyn Nlu) -> Option<Delivery> {
        let intent = match &self.kind {
            ExpectationKind::FromUser { user_id } => {
                if message.author.id != *user_id {
                    return None;
                }
                None
            }
            ExpectationKind::FromUserWithIntents { user_id, intents } => {
                if message.author.id != *user_id {
                    return None;
                }
                Some(nlu.match_intent_one_of(&message.content, intents)?)
            }
            ExpectationKind::FromChannel { channel_id } => {
                if message.channel_id != *channel_id {
                    return None;
                }
                None
            }
        };
        tracing::debug!(
            expectation = %self.id,
            kind = ?self.kind,
            message = %message.id,
            "expectation can be satisfied"
        );
        Some(Delivery {
            message: message.clone(),
            intent,
        })
    }

    pub fn can_be_satisfied(&self, message: &Message, nlu: &dyn Nlu) -> bool {
        self.claim(message, nlu).is_some()
    }

    /// Hand `delivery` to the waiting task.
    ///
    /// Succeeds at most once.  Returns `false` when the expectation was
    /// already satisfied or the waiter is gone.
    pub fn satisfy(&self, delivery: Delivery) -> bool {
        if self
            .satisfied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let delivered = sender.is_some_and(|tx| tx.send(delivery).is_ok());
        tracing::debug!(expectation = %self.id, delivered, "expectation satisfied");
        delivered
    }
}

impl fmt::Debug for MessageExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageExpectation")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("satisfied", &self.satisfied.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ExpectationBoard
// ---------------------------------------------------------------------------

/// The expectations one conversation has registered.
///
/// Shared between the conversation's task (which registers) and the scheduler
/// (which reads).
#[derive(Debug, Default)]
pub struct ExpectationBoard {
    entries: Mutex<Vec<Arc<MessageExpectation>>>,
}

impl ExpectationBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `expectation`.  It is removed again when the guard drops.
    pub fn register(self: &Arc<Self>, expectation: Arc<MessageExpectation>) -> ExpectationGuard {
        let id = expectation.id();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(expectation);
        ExpectationGuard {
            board: Arc::clone(self),
            id,
        }
    }

    /// Pending expectations as of `now`, in registration order.
    pub fn active(&self, now: Instant) -> Vec<Arc<MessageExpectation>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.is_active(now))
            .cloned()
            .collect()
    }

    pub fn remove(&self, id: ExpectationId) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|e| e.id() != id);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its expectation from the board when dropped, including when the
/// waiting future is cancelled.
#[derive(Debug)]
pub struct ExpectationGuard {
    board: Arc<ExpectationBoard>,
    id: ExpectationId,
}

impl Drop for ExpectationGuard {
    fn drop(&mut self) {
        self.board.remove(self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
