//! Database error types for lhm-db.
//!
//! Connection adapters must sort every failure into one of the three
//! retry classes (`TransientConnection`, `Contention`, `Query`); the session
//! decides from the class alone whether to reconnect, retry in place, or
//! propagate. The remaining variants are raised by the session itself.

use std::time::Duration;

use lhm_core::{CoreError, ServerIdentity};
use thiserror::Error;

use crate::retry::{ErrorClass, classify_message};

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The connection itself failed (server gone away, broken pipe, network
    /// read timeout). Recovered by reconnecting to the same host.
    #[error("Lost connection to MySQL: {0}")]
    TransientConnection(String),

    /// The statement failed on a healthy connection because of lock
    /// contention (lock wait timeout, deadlock). Retried in place.
    #[error("Lock contention: {0}")]
    Contention(String),

    /// A SQL query failed for a non-transient reason (syntax, constraint,
    /// privileges). Never retried.
    #[error("Query failed: {0}")]
    Query(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Reconnected, but to a different physical server than the session
    /// started on. Fatal.
    #[error(
        "Reconnected to wrong host. Started migration on: {baseline}, but reconnected to: {current}. Aborting"
    )]
    IdentityMismatch {
        baseline: ServerIdentity,
        current: ServerIdentity,
    },

    /// Could not reconnect within the retry policy. Fatal.
    #[error(
        "Tried the reconnection procedure {attempts} times over {elapsed:?} but failed. Aborting (last error: {last_error})"
    )]
    RetryExhausted {
        attempts: u32,
        elapsed: Duration,
        last_error: String,
    },

    /// The connection was lost more often than the session tolerates. Fatal.
    #[error("Lost the connection {count} times in one session (limit {limit}). Aborting")]
    TooManyReconnections { count: u32, limit: u32 },

    /// The session hit a fatal error earlier and refuses further work.
    #[error("Session was aborted by an earlier fatal error; no further statements are attempted")]
    SessionAborted,

    /// Invalid table or artifact name.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unusable retry configuration.
    #[error(transparent)]
    Config(#[from] lhm_config::ConfigError),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DatabaseError {
    /// Build an error from a server or driver message, classified by the
    /// known transient-failure patterns.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_message(&message) {
            ErrorClass::TransientConnection => Self::TransientConnection(message),
            ErrorClass::Contention => Self::Contention(message),
            ErrorClass::NonTransient => Self::Query(message),
        }
    }

    #[must_use]
    pub const fn is_transient_connection(&self) -> bool {
        matches!(self, Self::TransientConnection(_))
    }

    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::Contention(_))
    }

    /// Whether the session can no longer be used after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IdentityMismatch { .. }
                | Self::RetryExhausted { .. }
                | Self::TooManyReconnections { .. }
                | Self::SessionAborted
        )
    }
}
