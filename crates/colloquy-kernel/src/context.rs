//! Per-conversation execution state.
//!
//! A [`Context`] is created when a conversation starts and is owned by that
//! conversation's task for its whole life.  The only way state enters it from
//! outside is a [`Delivery`] handed over by a satisfied expectation, which the
//! owning task applies itself after its wait resolves.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RuntimeError};
use crate::expectation::{Delivery, ExpectationBoard, MessageExpectation};
use crate::expr::{Env, Expression, Slot, Variable};
use crate::nlu::IntentMatch;
use crate::platform::Platform;
use crate::value::Value;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Unique identifier of a live conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The random tail is enough to tell conversations apart in logs.
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[s.len() - 8..])
    }
}

/// The sender of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
}

impl Author {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// An inbound message as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: Author,
    pub channel_id: String,
    pub content: String,
    /// Sent in a one-to-one channel.
    #[serde(default)]
    pub direct: bool,
    pub received_at: DateTime<Utc>,
}

impl Message {
    #[must_use]
    pub fn new(author: Author, channel_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            author,
            channel_id: channel_id.into(),
            content: content.into(),
            direct: false,
            received_at: Utc::now(),
        }
    }

    /// Mark the message as sent in a direct channel.
    #[must_use]
    pub fn direct(mut self) -> Self {
        self.direct = true;
        self
    }
}

/// A message the bot itself sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
    pub channel_id: String,
    pub content: String,
}

impl SentMessage {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Mutable state of one conversation.
pub struct Context {
    id: ConversationId,
    /// The user who started the conversation.
    author: Author,
    /// The message currently being processed.
    message: Message,
    intent: Option<IntentMatch>,
    locals: Vec<Option<Value>>,
    expectations: Arc<ExpectationBoard>,
    platform: Arc<dyn Platform>,
    last_answer: Option<SentMessage>,
}

impl Context {
    pub fn new(message: Message, platform: Arc<dyn Platform>) -> Self {
        Self {
            id: ConversationId::new(),
            author: message.author.clone(),
            message,
            intent: None,
            locals: Vec::new(),
            expectations: Arc::new(ExpectationBoard::new()),
            platform,
            last_answer: None,
        }
    }

    /// Bind the intent match that started (or last resumed) the conversation.
    #[must_use]
    pub fn with_intent(mut self, intent: IntentMatch) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn intent(&self) -> Option<&IntentMatch> {
        self.intent.as_ref()
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn expectations(&self) -> &Arc<ExpectationBoard> {
        &self.expectations
    }

    /// Expectations of this conversation that can still be satisfied.
    pub fn active_expectations(&self) -> Vec<Arc<MessageExpectation>> {
        self.expectations.active(tokio::time::Instant::now())
    }

    pub fn last_answer(&self) -> Option<&SentMessage> {
        self.last_answer.as_ref()
    }

    pub fn set_last_answer(&mut self, answer: SentMessage) {
        self.last_answer = Some(answer);
    }

    // -- Variables ------------------------------------------------------------

    /// Raw value of a local slot, if set.
    pub fn local(&self, index: usize) -> Option<&Value> {
        self.locals.get(index).and_then(Option::as_ref)
    }

    /// Current value of a variable.
    pub fn get(&self, variable: &Variable) -> Result<Value> {
        variable.evaluate(&Env::new(self))
    }

    /// Store `value` into a conversation local.
    ///
    /// The value must conform to the variable's type; assigning to a loop
    /// binder is an error.
    pub fn set(&mut self, variable: &Variable, value: Value) -> Result<()> {
        let Slot::Local(index) = variable.slot() else {
            return Err(RuntimeError::Internal(format!(
                "loop binder `{}` cannot be assigned",
                variable.name()
            )));
        };
        let ty = variable.ty();
        if !value.conforms_to(&ty) {
            return Err(RuntimeError::TypeMismatch {
                context: "variable assignment",
                expected: ty.to_string(),
                found: value.kind().to_string(),
            });
        }
        if self.locals.len() <= index {
            self.locals.resize(index + 1, None);
        }
        tracing::trace!(conversation = %self.id, variable = %variable.name(), "variable set");
        self.locals[index] = Some(value);
        Ok(())
    }

    /// Evaluate an expression against this context.
    pub fn evaluate(&self, expr: &dyn Expression) -> Result<Value> {
        expr.evaluate(&Env::new(self))
    }

    // -- Resumption -----------------------------------------------------------

    /// Apply a message handed over by a satisfied expectation.
    pub fn accept_delivery(&mut self, delivery: Delivery) {
        tracing::debug!(
            conversation = %self.id,
            message = %delivery.message.id,
            "delivery accepted"
        );
        self.message = delivery.message;
        if let Some(intent) = delivery.intent {
            self.intent = Some(intent);
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("author", &self.author)
            .field("message", &self.message.id)
            .field("intent", &self.intent.as_ref().map(|m| &m.intent))
            .field("locals", &self.locals.len())
            .finish_non_exhaustive()
    }
}
