//! Kernel error types.
//!
//! The kernel distinguishes two failure classes:
//!
//! - [`TypeError`] is raised while an expression or action tree is being
//!   *assembled*.  It is fatal for the scenario and must surface at load time,
//!   before any conversation runs.
//! - [`RuntimeError`] is raised while a live conversation evaluates an
//!   expression or runs a leaf action.  It aborts that single conversation and
//!   is logged at the task boundary; it never reaches the scheduler.
//!
//! [`ConfigError`] covers configuration and NLU construction problems.

use std::path::PathBuf;

use crate::types::Type;

// ---------------------------------------------------------------------------
// Construction-time errors
// ---------------------------------------------------------------------------

/// An ill-typed expression or action tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    /// An operand's type is not accepted by the slot it is plugged into.
    #[error("{context}: expected {expected}, found {found}")]
    Mismatch {
        context: &'static str,
        expected: Type,
        found: Type,
    },

    /// Attribute projection on something that is not a struct.
    #[error("struct type expected for attribute `{attr}`, found {found}")]
    NotAStruct { attr: String, found: Type },

    /// Attribute projection naming an attribute the struct does not declare.
    #[error("struct `{struct_name}` has no attribute `{attr}`")]
    UnknownAttribute { struct_name: String, attr: String },

    /// A collection operation applied to a non-collection operand.
    #[error("{context}: collection expected, found {found}")]
    NotACollection { context: &'static str, found: Type },

    /// A format string that cannot be rendered with the supplied arguments.
    #[error("invalid template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A constant whose value does not conform to its declared type.
    #[error("constant does not conform to {declared}: {value}")]
    InvalidConstant { declared: Type, value: String },

    /// The same local name was declared twice with different types.
    #[error("variable `{name}` redeclared as {second} (was {first})")]
    Redeclared {
        name: String,
        first: Type,
        second: Type,
    },

    /// Attempt to assign to a loop binder.
    #[error("variable `{name}` is a loop binder and cannot be assigned")]
    NotAssignable { name: String },

    /// A collection operation was given a conversation local instead of a
    /// loop binder.
    #[error("variable `{name}` is not a loop binder")]
    NotABinder { name: String },
}

/// Convenience alias for construction-time results.
pub type TypeResult<T> = std::result::Result<T, TypeError>;

// ---------------------------------------------------------------------------
// Runtime errors
// ---------------------------------------------------------------------------

/// A failure raised inside a live conversation.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    // -- Evaluation -----------------------------------------------------------
    /// A variable was read before any value was bound to it.
    #[error("variable `{name}` is not bound")]
    Unbound { name: String },

    /// A value did not have the shape its static type promised.
    #[error("{context}: expected {expected}, got {found}")]
    TypeMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    /// A struct value is missing an attribute its type declares.
    #[error("value of `{struct_name}` has no attribute `{attr}`")]
    MissingAttribute { struct_name: String, attr: String },

    /// Division with a zero denominator.
    #[error("division by zero")]
    DivisionByZero,

    /// Arithmetic produced an infinite or NaN result.
    #[error("{context}: result is not a finite number")]
    NonFinite { context: &'static str },

    // -- Collaborators --------------------------------------------------------
    /// The message platform rejected an outbound operation.
    #[error("platform {operation} failed: {reason}")]
    Platform {
        operation: &'static str,
        reason: String,
    },

    /// An external collaborator (memory, remote API) failed.
    #[error("{collaborator} failed: {reason}")]
    Collaborator {
        collaborator: &'static str,
        reason: String,
    },

    // -- Generic --------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal runtime error: {0}")]
    Internal(String),
}

/// Convenience alias used by expressions and actions.
pub type Result<T> = std::result::Result<T, RuntimeError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Configuration and NLU construction failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A regex pattern supplied to the NLU is invalid.
    #[error("invalid regex pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Building the phrase automaton failed.
    #[error("phrase automaton build error: {reason}")]
    AutomatonBuild { reason: String },

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configuration value is out of range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
