//! Runtime configuration.
//!
//! Read from the `[runtime]` table of a TOML file.  Every field has a
//! default, so a missing table or file yields [`RuntimeConfig::default`].
//! Environment overrides use the `COLLOQUY_` prefix and are applied after the
//! file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "COLLOQUY_";

/// Tunables of the conversation scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// A new conversation starts on an NLU match only when its confidence is
    /// strictly above this value.
    pub confidence_threshold: f64,
    /// Handler used when no context-free intent matches well enough.
    pub mismatch_intent: String,
    /// Handler used when the chosen intent has no handler of its own.
    pub no_handler_intent: String,
    /// Handlers whose name starts with this prefix can start conversations.
    /// Empty means every non-reserved handler.
    pub context_free_prefix: String,
    /// Default timeout of wait-for-message nodes built from configuration.
    pub default_wait_seconds: f64,
    /// Capacity of the inbound message queue.
    pub inbox_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.49,
            mismatch_intent: "mismatch".to_string(),
            no_handler_intent: "no-handler".to_string(),
            context_free_prefix: "intent".to_string(),
            default_wait_seconds: 7.0,
            inbox_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    /// Parse the `[runtime]` table of a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = content.parse()?;
        let config = match table.get("runtime") {
            Some(runtime) => runtime.clone().try_into()?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "runtime config loaded");
        Ok(config)
    }

    /// Apply `COLLOQUY_*` overrides from `vars`, typically `std::env::vars()`.
    ///
    /// Unknown variables are ignored; unparsable values are errors.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "CONFIDENCE_THRESHOLD" => {
                    self.confidence_threshold = parse("confidence_threshold", value)?;
                }
                "DEFAULT_WAIT_SECONDS" => {
                    self.default_wait_seconds = parse("default_wait_seconds", value)?;
                }
                "INBOX_CAPACITY" => {
                    self.inbox_capacity = parse("inbox_capacity", value)?;
                }
                "CONTEXT_FREE_PREFIX" => self.context_free_prefix = value.to_string(),
                _ => continue,
            }
            tracing::debug!(variable = %key.as_ref(), "config override applied");
        }
        self.validate()
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid {
                field: "confidence_threshold",
                reason: format!("{} is outside [0, 1]", self.confidence_threshold),
            });
        }
        if !(self.default_wait_seconds.is_finite() && self.default_wait_seconds > 0.0) {
            return Err(ConfigError::Invalid {
                field: "default_wait_seconds",
                reason: format!("{} is not a positive duration", self.default_wait_seconds),
            });
        }
        if self.inbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "inbox_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.mismatch_intent.is_empty() || self.no_handler_intent.is_empty() {
            return Err(ConfigError::Invalid {
                field: "mismatch_intent",
                reason: "reserved intent names must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        field,
        reason: format!("`{value}`: {e}"),
    })
}
