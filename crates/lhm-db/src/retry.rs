//! Retry policy and transient error classification.
//!
//! Two kinds of failure are worth retrying during a migration:
//!
//! - **Connection loss** (server gone away, broken pipe, proxy restart): the
//!   session reconnects, checks it landed on the same physical server, and
//!   replays the statement.
//! - **Lock contention** (lock wait timeout, deadlock): the connection is
//!   healthy, the statement was rolled back, and it is retried in place.
//!
//! Everything else is a real SQL error and is propagated. The pattern lists
//! are intentionally narrow so syntax or constraint errors are never retried.

use std::time::Duration;

use lhm_config::{ConfigError, RetryConfig};

/// Failure messages meaning the connection is unusable.
const CONNECTION_PATTERNS: &[&str] = &[
    "lost connection to mysql server",
    "mysql server has gone away",
    "server has gone away",
    "broken pipe",
    "connection reset",
    "connection refused",
    "can't connect to mysql server",
    "max connect timeout reached",
    "unknown mysql server host",
    "timeout waiting for a response from the last query",
    "server shutdown in progress",
    "connection was killed",
    "connection to the server is closed",
];

/// Failure messages meaning the statement lost a race on a healthy connection.
const CONTENTION_PATTERNS: &[&str] = &[
    "lock wait timeout exceeded",
    "deadlock found when trying to get lock",
    "query execution was interrupted",
    "connection is locked to hostgroup",
    "running with the --read-only option",
];

/// Retry class of a database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    TransientConnection,
    Contention,
    NonTransient,
}

/// Classify a server or driver error message.
#[must_use]
pub fn classify_message(message: &str) -> ErrorClass {
    let message = message.to_ascii_lowercase();
    if CONNECTION_PATTERNS.iter().any(|p| message.contains(p)) {
        ErrorClass::TransientConnection
    } else if CONTENTION_PATTERNS.iter().any(|p| message.contains(p)) {
        ErrorClass::Contention
    } else {
        ErrorClass::NonTransient
    }
}

/// Bound on one reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Stop after this many reconnect attempts.
    Attempts(u32),
    /// Stop once the next attempt would start after this much time.
    Elapsed(Duration),
    /// Stop at whichever bound is reached first.
    AttemptsOrElapsed(u32, Duration),
}

impl RetryLimit {
    /// Whether another attempt, after sleeping `next_delay`, stays in bounds.
    ///
    /// The time bound never blocks the first attempt: a loop always tries to
    /// reconnect at least once before giving up.
    #[must_use]
    pub fn allows(self, attempts_made: u32, elapsed: Duration, next_delay: Duration) -> bool {
        let within_attempts = |max: u32| attempts_made < max;
        let within_time =
            |max: Duration| attempts_made == 0 || elapsed.saturating_add(next_delay) <= max;
        match self {
            Self::Attempts(max) => within_attempts(max),
            Self::Elapsed(max) => within_time(max),
            Self::AttemptsOrElapsed(attempts, time) => within_attempts(attempts) && within_time(time),
        }
    }
}

/// Retry behavior of a `RetrySession`. Immutable for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Bound on each reconnect loop.
    pub limit: RetryLimit,
    /// Delay before the first reconnect attempt.
    pub backoff_interval: Duration,
    /// Factor applied to the delay after each failed attempt (1 = constant).
    pub multiplier: u32,
    /// Cap on a single delay.
    pub max_backoff: Duration,
    /// Connection losses tolerated over the whole session.
    pub max_reconnections: u32,
    /// Attempts for a statement failing on lock contention, including the first.
    pub contention_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_valid_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Constant backoff, bounded by attempt count.
    #[must_use]
    pub fn attempts(max_attempts: u32, backoff_interval: Duration) -> Self {
        Self {
            limit: RetryLimit::Attempts(max_attempts),
            backoff_interval,
            max_backoff: backoff_interval,
            ..Self::default()
        }
    }

    /// Constant backoff, bounded by elapsed time.
    #[must_use]
    pub fn elapsed(max_duration: Duration, backoff_interval: Duration) -> Self {
        Self {
            limit: RetryLimit::Elapsed(max_duration),
            backoff_interval,
            max_backoff: backoff_interval,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: RetryLimit) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn with_max_reconnections(mut self, max_reconnections: u32) -> Self {
        self.max_reconnections = max_reconnections;
        self
    }

    #[must_use]
    pub const fn with_contention_attempts(mut self, contention_attempts: u32) -> Self {
        self.contention_attempts = contention_attempts;
        self
    }

    /// Delay before the given attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.backoff_interval
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn from_valid_config(config: &RetryConfig) -> Self {
        let limit = match (config.attempt_limit(), config.duration_limit()) {
            (Some(attempts), Some(time)) => RetryLimit::AttemptsOrElapsed(attempts, time),
            (None, Some(time)) => RetryLimit::Elapsed(time),
            (Some(attempts), None) => RetryLimit::Attempts(attempts),
            // Rejected by `RetryConfig::validate`.
            (None, None) => RetryLimit::Attempts(1),
        };
        Self {
            limit,
            backoff_interval: config.backoff_interval(),
            multiplier: config.multiplier,
            max_backoff: config.max_backoff(),
            max_reconnections: config.max_reconnections,
            contention_attempts: config.contention_attempts,
        }
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }
}
