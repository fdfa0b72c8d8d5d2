//! Colloquy scripted-dialogue kernel.
//!
//! Multi-turn conversations are written as behavior trees over a small typed
//! expression language and run concurrently against a stream of inbound
//! messages:
//!
//! - **[`types`]** / **[`value`]** -- the structural type system and the
//!   runtime values that conform to it.
//! - **[`expr`]** -- typed expressions, conversation locals and loop binders.
//!   Ill-typed trees are rejected when they are built.
//! - **[`action`]** -- behavior-tree combinators and leaves (messaging,
//!   variables, timers, waits).
//! - **[`expectation`]** -- what a paused conversation is waiting for.
//! - **[`scheduler`]** -- routes every inbound message to at most one waiting
//!   conversation, or starts a new one via the [`nlu`] collaborator.
//! - **[`platform`]** -- the outbound message platform interface.
//! - **[`config`]** / **[`error`]** -- runtime configuration and error types.
//!
//! All collaborator traits are `Send + Sync` and meant for a multi-threaded
//! tokio runtime.

pub mod action;
pub mod config;
pub mod context;
pub mod error;
pub mod expectation;
pub mod expr;
pub mod nlu;
pub mod platform;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod value;

// Re-export the most commonly used types at the crate root for convenience.
pub use action::{Action, ActionExt, BoxAction};
pub use config::RuntimeConfig;
pub use context::{Author, ConversationId, Context, Message, SentMessage};
pub use error::{ConfigError, Result, RuntimeError, TypeError, TypeResult};
pub use expectation::{ExpectationId, ExpectationKind, MessageExpectation};
pub use expr::{Expr, Expression, ExpressionExt, Scope, Variable};
pub use nlu::{IntentMatch, Nlu, PatternNlu};
pub use platform::{Platform, RecordingPlatform};
pub use registry::HandlerRegistry;
pub use scheduler::{ConversationOutcome, ConversationReport, ConversationScheduler, Dispatch};
pub use types::Type;
pub use value::Value;
