//! Behavior-tree actions.
//!
//! Every node, leaf or combinator, is an [`Action`]: an async step over a
//! [`Context`] that reports success (`true`) or controlled failure (`false`).
//! An `Err` is an uncontrolled failure; combinators propagate it unchanged and
//! the conversation task boundary logs it and ends that one conversation.
//!
//! Suspension happens only inside the waiting leaves ([`wait_for_timer`] and
//! the `wait_for_message_*` family).

mod combinators;
mod data;
mod messaging;

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;

pub use combinators::{
    always_fail, always_success, inverter, no_longer_than, random_one_of,
    repeat_until_timer_expires, retry_until_success, selector, sequence,
};
pub use data::{check_condition, do_action, ensure_var, set_var_from, wait_for_timer};
pub use messaging::{
    WaitForMessage, add_reaction_to_reply_message, add_reaction_to_request_message,
    edit_last_answer, message_intent_is, reply_to_message, send_message_to_channel,
    wait_for_message_from_channel, wait_for_message_from_user,
    wait_for_message_from_user_with_intents,
};

/// One node of a behavior tree.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, ctx: &mut Context) -> Result<bool>;
}

/// Shared handle to an action node.  Trees are built once and shared by every
/// conversation that runs them.
pub type BoxAction = Arc<dyn Action>;

/// Conversion of concrete nodes into [`BoxAction`] handles.
pub trait ActionExt: Action + Sized + 'static {
    fn boxed(self) -> BoxAction {
        Arc::new(self)
    }
}

impl<A: Action + 'static> ActionExt for A {}
