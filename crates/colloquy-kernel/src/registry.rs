//! Intent handler registry.
//!
//! Maps intent names to the behavior tree that runs when a conversation is
//! started for that intent.  Two names are reserved (see
//! [`RuntimeConfig`](crate::config::RuntimeConfig)): the *mismatch* handler
//! runs when nothing matched well enough, and the *no-handler* handler runs
//! when the chosen intent has no tree of its own.
//!
//! Backed by [`DashMap`] so scenarios can be registered from any task while
//! the scheduler reads.
//!
//! # Example
//!
//! ```rust
//! # use colloquy_kernel::action::{always_success, check_condition};
//! # use colloquy_kernel::config::RuntimeConfig;
//! # use colloquy_kernel::expr::{Const, ExpressionExt};
//! # use colloquy_kernel::registry::HandlerRegistry;
//! let handlers = HandlerRegistry::new();
//! handlers.register("intent-hello", check_condition(Const::boolean(true).shared()));
//! handlers.register("mismatch", always_success(check_condition(Const::boolean(false).shared())));
//!
//! let config = RuntimeConfig::default();
//! assert_eq!(handlers.context_free_intents(&config), vec!["intent-hello".to_string()]);
//! ```

use std::sync::Arc;

use dashmap::DashMap;

use crate::action::BoxAction;
use crate::config::RuntimeConfig;

/// Concurrent intent → behavior tree map.
///
/// Cheaply cloneable (`Arc`-backed).
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<DashMap<String, BoxAction>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tree for `intent`, replacing any previous one.
    pub fn register(&self, intent: impl Into<String>, action: BoxAction) {
        let intent = intent.into();
        if self.inner.insert(intent.clone(), action).is_some() {
            tracing::warn!(intent = %intent, "handler replaced");
        } else {
            tracing::debug!(intent = %intent, "handler registered");
        }
    }

    pub fn unregister(&self, intent: &str) -> Option<BoxAction> {
        self.inner.remove(intent).map(|(_, action)| action)
    }

    pub fn get(&self, intent: &str) -> Option<BoxAction> {
        self.inner.get(intent).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, intent: &str) -> bool {
        self.inner.contains_key(intent)
    }

    /// Every registered intent name, sorted.
    pub fn intents(&self) -> Vec<String> {
        let mut intents: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        intents.sort();
        intents
    }

    /// Intents that may start a new conversation, sorted.
    ///
    /// These are the handlers whose name starts with the configured prefix,
    /// or every non-reserved handler when the prefix is empty.
    pub fn context_free_intents(&self, config: &RuntimeConfig) -> Vec<String> {
        self.intents()
            .into_iter()
            .filter(|intent| {
                intent != &config.mismatch_intent
                    && intent != &config.no_handler_intent
                    && intent.starts_with(&config.context_free_prefix)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("intents", &self.intents())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
