//! Cross-cutting error types for lhm.
//!
//! Domain-specific errors (`DatabaseError`, `ConfigError`) live in their own
//! crates and wrap this one.

use thiserror::Error;

/// Errors that can be raised by any lhm crate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A table name, or a prefix/suffix used to build one, is not a legal
    /// unquoted identifier.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

impl CoreError {
    pub(crate) fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
