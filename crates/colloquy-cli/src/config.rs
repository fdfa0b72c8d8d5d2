//! Application configuration.
//!
//! Reads `config/default.toml` (or the file given with `--config`):
//!
//! - `[runtime]` -- scheduler tunables, see [`RuntimeConfig`].
//! - `[memory]`  -- `path` of the JSON memory file; in-memory when absent.
//! - `[console]` -- `user`, `channel` and `log_level` of the console session.
//!
//! A missing file means defaults.  `COLLOQUY_*` environment variables are
//! applied on top.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colloquy_kernel::RuntimeConfig;

/// Environment variable overriding `[console] log_level`.
pub const LOG_ENV: &str = "COLLOQUY_LOG";

/// Settings of the `[console]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    pub user: String,
    pub channel: String,
    pub log_level: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user: "you".to_string(),
            channel: "general".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Everything the binary reads from its configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    /// JSON memory file; `None` keeps memory in RAM.
    pub memory_path: Option<PathBuf>,
    pub console: ConsoleConfig,
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when it does not exist, then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        config.apply_env(std::env::vars())?;
        Ok(config)
    }

    /// Parse a whole configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let runtime = RuntimeConfig::from_toml_str(content)?;
        let table: toml::Table = content.parse()?;
        let defaults = ConsoleConfig::default();

        let memory_path = match table.get("memory") {
            Some(toml::Value::Table(memory)) => memory
                .get("path")
                .and_then(|v| v.as_str())
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            _ => None,
        };

        let console = match table.get("console") {
            Some(toml::Value::Table(console)) => {
                let text = |key: &str, fallback: &str| {
                    console
                        .get(key)
                        .and_then(|v| v.as_str())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map_or_else(|| fallback.to_string(), str::to_string)
                };
                ConsoleConfig {
                    user: text("user", &defaults.user),
                    channel: text("channel", &defaults.channel),
                    log_level: text("log_level", &defaults.log_level),
                }
            }
            _ => defaults,
        };

        Ok(Self {
            runtime,
            memory_path,
            console,
        })
    }

    /// Apply `COLLOQUY_*` overrides.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        if let Some((_, level)) = vars.iter().find(|(k, _)| k == LOG_ENV) {
            self.console.log_level = level.clone();
        }
        self.runtime
            .apply_overrides(vars)
            .context("invalid environment override")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_document() {
        let config = AppConfig::from_toml_str(
            r#"
            [runtime]
            confidence_threshold = 0.6

            [memory]
            path = "data/memory.json"

            [console]
            user = "alice"
            log_level = "debug"
            "#,
        )
        .unwrap();
        assert!((config.runtime.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.memory_path, Some(PathBuf::from("data/memory.json")));
        assert_eq!(config.console.user, "alice");
        assert_eq!(config.console.channel, "general");
        assert_eq!(config.console.log_level, "debug");
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.memory_path, None);
        assert_eq!(config.console, ConsoleConfig::default());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env([
                ("COLLOQUY_LOG".to_string(), "trace".to_string()),
                ("COLLOQUY_INBOX_CAPACITY".to_string(), "8".to_string()),
            ])
            .unwrap();
        assert_eq!(config.console.log_level, "trace");
        assert_eq!(config.runtime.inbox_capacity, 8);
    }

    #[test]
    fn bad_runtime_values_are_errors() {
        assert!(AppConfig::from_toml_str("[runtime]\ninbox_capacity = 0\n").is_err());
    }
}
