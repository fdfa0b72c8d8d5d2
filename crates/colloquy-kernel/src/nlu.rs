//! Intent matching.
//!
//! The [`Nlu`] trait is the seam through which the scheduler and intent-aware
//! expectations classify free text.  [`PatternNlu`] is a deterministic
//! implementation with two tiers:
//!
//! | Tier | Technique |
//! |------|-----------|
//! | 1 | Exact phrases via [`aho_corasick`], longest overlapping match wins |
//! | 2 | [`regex`] patterns whose named captures become slots |
//!
//! Confidence is `0.5 + 0.5 * coverage`, where coverage is the share of the
//! (trimmed, lowercased) text covered by the match.  A phrase equal to the
//! whole message therefore scores `1.0`.
//!
//! # Example
//!
//! ```rust
//! # use colloquy_kernel::nlu::{Nlu, PatternNlu};
//! let nlu = PatternNlu::builder()
//!     .phrase("intent-hello", "hello")
//!     .pattern("intent-remember", r"remember (?P<value>.+)")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let candidates = ["intent-hello".to_string(), "intent-remember".to_string()];
//! let m = nlu.match_intent_one_of("Hello", &candidates).unwrap();
//! assert_eq!(m.intent, "intent-hello");
//! assert_eq!(m.confidence, 1.0);
//! ```

use std::collections::HashMap;

use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A classified message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMatch {
    pub intent: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub slots: HashMap<String, String>,
}

impl IntentMatch {
    #[must_use]
    pub fn new(intent: impl Into<String>, confidence: f64) -> Self {
        Self {
            intent: intent.into(),
            confidence,
            slots: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_slot(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.slots.insert(name.into(), value.into());
        self
    }

    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }
}

/// Natural-language intent matcher.
///
/// Implementations must be cheap to call: the scheduler invokes them inside
/// its routing pass, once per candidate expectation.
pub trait Nlu: Send + Sync {
    /// Best match of `text` among `intents`, if any.
    fn match_intent_one_of(&self, text: &str, intents: &[String]) -> Option<IntentMatch>;
}

// ---------------------------------------------------------------------------
// PatternNlu
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PatternRule {
    intent: String,
    regex: Regex,
}

/// Phrase and regex based [`Nlu`].
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug)]
pub struct PatternNlu {
    phrases: Vec<(String, String)>,
    automaton: Option<AhoCorasick>,
    patterns: Vec<PatternRule>,
}

/// Incremental builder for [`PatternNlu`].
#[derive(Debug, Default)]
pub struct PatternNluBuilder {
    phrases: Vec<(String, String)>,
    patterns: Vec<PatternRule>,
}

impl PatternNluBuilder {
    /// Register an exact phrase for `intent`.  Matching is case-insensitive.
    #[must_use]
    pub fn phrase(mut self, intent: impl Into<String>, phrase: impl AsRef<str>) -> Self {
        let phrase = phrase.as_ref().trim().to_lowercase();
        if !phrase.is_empty() {
            self.phrases.push((phrase, intent.into()));
        }
        self
    }

    /// Register a regex for `intent`.  Named captures become slots.
    ///
    /// The pattern is compiled case-insensitively.
    pub fn pattern(
        mut self,
        intent: impl Into<String>,
        pattern: impl AsRef<str>,
    ) -> Result<Self, ConfigError> {
        let pattern = pattern.as_ref();
        let regex = Regex::new(&format!("(?i){pattern}")).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.patterns.push(PatternRule {
            intent: intent.into(),
            regex,
        });
        Ok(self)
    }

    /// Compile the phrase automaton.
    pub fn build(self) -> Result<PatternNlu, ConfigError> {
        let automaton = if self.phrases.is_empty() {
            None
        } else {
            let phrases: Vec<&str> = self.phrases.iter().map(|(p, _)| p.as_str()).collect();
            let ac = AhoCorasick::new(&phrases).map_err(|e| ConfigError::AutomatonBuild {
                reason: e.to_string(),
            })?;
            tracing::trace!(count = phrases.len(), "phrase automaton built");
            Some(ac)
        };
        Ok(PatternNlu {
            phrases: self.phrases,
            automaton,
            patterns: self.patterns,
        })
    }
}

impl PatternNlu {
    #[must_use]
    pub fn builder() -> PatternNluBuilder {
        PatternNluBuilder::default()
    }

    /// Every intent this matcher can produce, deduplicated, in registration
    /// order.
    pub fn intents(&self) -> Vec<String> {
        let mut seen = Vec::new();
        let all = self
            .phrases
            .iter()
            .map(|(_, intent)| intent)
            .chain(self.patterns.iter().map(|p| &p.intent));
        for intent in all {
            if !seen.contains(intent) {
                seen.push(intent.clone());
            }
        }
        seen
    }

    fn confidence(matched: usize, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let coverage = (matched as f64 / total as f64).min(1.0);
        0.5 + 0.5 * coverage
    }

    fn best_phrase(&self, lowered: &str, intents: &[String]) -> Option<IntentMatch> {
        let ac = self.automaton.as_ref()?;

        // Longest overlapping match among the candidate intents.
        let mut best: Option<(usize, usize)> = None;
        for mat in ac.find_overlapping_iter(lowered) {
            let idx = mat.pattern().as_usize();
            if !intents.contains(&self.phrases[idx].1) {
                continue;
            }
            let len = mat.end() - mat.start();
            if best.is_none_or(|(_, best_len)| len > best_len) {
                best = Some((idx, len));
            }
        }

        let (idx, len) = best?;
        Some(IntentMatch::new(
            self.phrases[idx].1.clone(),
            Self::confidence(len, lowered.len()),
        ))
    }

    fn best_pattern(&self, text: &str, intents: &[String]) -> Option<IntentMatch> {
        let mut best: Option<IntentMatch> = None;
        for rule in self.patterns.iter().filter(|r| intents.contains(&r.intent)) {
            let Some(caps) = rule.regex.captures(text) else {
                continue;
            };
            let len = caps.get(0).map_or(0, |m| m.len());
            let mut candidate = IntentMatch::new(rule.intent.clone(), Self::confidence(len, text.len()));
            for name in rule.regex.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    candidate
                        .slots
                        .insert(name.to_string(), m.as_str().trim().to_string());
                }
            }
            if best
                .as_ref()
                .is_none_or(|b| candidate.confidence > b.confidence)
            {
                best = Some(candidate);
            }
        }
        best
    }
}

impl Nlu for PatternNlu {
    fn match_intent_one_of(&self, text: &str, intents: &[String]) -> Option<IntentMatch> {
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();

        let phrase = self.best_phrase(&lowered, intents);
        let pattern = self.best_pattern(trimmed, intents);

        // Phrases win ties.
        let result = match (phrase, pattern) {
            (Some(p), Some(r)) if r.confidence > p.confidence => Some(r),
            (Some(p), _) => Some(p),
            (None, r) => r,
        };
        match &result {
            Some(m) => tracing::debug!(
                text = %trimmed,
                intent = %m.intent,
                confidence = m.confidence,
                "intent matched"
            ),
            None => tracing::debug!(text = %trimmed, "no intent matched"),
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
