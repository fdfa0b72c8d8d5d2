//! Message platform interface.
//!
//! The kernel never talks to a chat service directly.  Messaging leaves call
//! through [`Platform`]; the binary supplies a console implementation and tests
//! use [`RecordingPlatform`].

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{Message, SentMessage};
use crate::error::Result;

/// Outbound operations of a message platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Post `content` to a channel.
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<SentMessage>;

    /// Reply to `message` in its channel.
    async fn reply(&self, message: &Message, content: &str) -> Result<SentMessage>;

    /// Replace the content of a message this bot sent earlier.
    async fn edit_message(&self, message: &SentMessage, content: &str) -> Result<SentMessage>;

    /// React to a message with an emoji or short marker.
    async fn add_reaction(&self, channel_id: &str, message_id: &str, reaction: &str)
    -> Result<()>;
}

// ---------------------------------------------------------------------------
// RecordingPlatform
// ---------------------------------------------------------------------------

/// One operation captured by [`RecordingPlatform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Outbound {
    Sent {
        channel_id: String,
        content: String,
    },
    Reply {
        channel_id: String,
        to_message: String,
        content: String,
    },
    Edit {
        channel_id: String,
        message_id: String,
        content: String,
    },
    Reaction {
        channel_id: String,
        message_id: String,
        reaction: String,
    },
}

/// In-memory platform that records every outbound operation.
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    log: Mutex<Vec<Outbound>>,
}

impl RecordingPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, op: Outbound) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }

    /// Snapshot of all recorded operations, in order.
    pub fn outbound(&self) -> Vec<Outbound> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Text of every sent, replied or edited message, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|op| match op {
                Outbound::Sent { content, .. }
                | Outbound::Reply { content, .. }
                | Outbound::Edit { content, .. } => Some(content),
                Outbound::Reaction { .. } => None,
            })
            .collect()
    }

    /// Every reaction added, in order.
    pub fn reactions(&self) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|op| match op {
                Outbound::Reaction { reaction, .. } => Some(reaction),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<SentMessage> {
        self.push(Outbound::Sent {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(SentMessage::new(
            Uuid::now_v7().to_string(),
            channel_id,
            content,
        ))
    }

    async fn reply(&self, message: &Message, content: &str) -> Result<SentMessage> {
        self.push(Outbound::Reply {
            channel_id: message.channel_id.clone(),
            to_message: message.id.clone(),
            content: content.to_string(),
        });
        Ok(SentMessage::new(
            Uuid::now_v7().to_string(),
            &message.channel_id,
            content,
        ))
    }

    async fn edit_message(&self, message: &SentMessage, content: &str) -> Result<SentMessage> {
        self.push(Outbound::Edit {
            channel_id: message.channel_id.clone(),
            message_id: message.id.clone(),
            content: content.to_string(),
        });
        Ok(SentMessage::new(
            message.id.clone(),
            &message.channel_id,
            content,
        ))
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        reaction: &str,
    ) -> Result<()> {
        self.push(Outbound::Reaction {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            reaction: reaction.to_string(),
        });
        Ok(())
    }
}
