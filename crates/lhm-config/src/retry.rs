//! Reconnect and retry bounds for a migration session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default reconnect attempts per connection loss (one per second for two minutes).
const fn default_max_attempts() -> u32 {
    120
}

const fn default_backoff_interval_ms() -> u64 {
    1_000
}

const fn default_multiplier() -> u32 {
    1
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

/// A session that had to reconnect this often is running on a network too
/// unstable to finish safely.
const fn default_max_reconnections() -> u32 {
    25
}

const fn default_contention_attempts() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Reconnect attempts per connection loss. `0` disables the count bound.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock bound per connection loss, in seconds. `0` disables it.
    #[serde(default)]
    pub max_duration_secs: u64,

    /// Delay before the first reconnect attempt, in milliseconds.
    #[serde(default = "default_backoff_interval_ms")]
    pub backoff_interval_ms: u64,

    /// Factor applied to the delay after each failed attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    /// Upper bound on a single backoff delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Connection losses tolerated over the whole session.
    #[serde(default = "default_max_reconnections")]
    pub max_reconnections: u32,

    /// Attempts for statements failing on lock contention (lock wait
    /// timeout, deadlock), including the first one.
    #[serde(default = "default_contention_attempts")]
    pub contention_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_duration_secs: 0,
            backoff_interval_ms: default_backoff_interval_ms(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            max_reconnections: default_max_reconnections(),
            contention_attempts: default_contention_attempts(),
        }
    }
}

impl RetryConfig {
    /// Count bound on reconnect attempts, if any.
    #[must_use]
    pub const fn attempt_limit(&self) -> Option<u32> {
        if self.max_attempts == 0 {
            None
        } else {
            Some(self.max_attempts)
        }
    }

    /// Time bound on a reconnect loop, if any.
    #[must_use]
    pub const fn duration_limit(&self) -> Option<Duration> {
        if self.max_duration_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.max_duration_secs))
        }
    }

    #[must_use]
    pub const fn backoff_interval(&self) -> Duration {
        Duration::from_millis(self.backoff_interval_ms)
    }

    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Reject settings that would let a reconnect loop run forever or spin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 && self.max_duration_secs == 0 {
            return Err(ConfigError::invalid(
                "retry.max_attempts",
                "either max_attempts or max_duration_secs must bound the reconnect loop",
            ));
        }
        if self.max_duration_secs > 0
            && self.backoff_interval() > Duration::from_secs(self.max_duration_secs)
        {
            return Err(ConfigError::invalid(
                "retry.max_duration_secs",
                "must leave room for at least one reconnect after backoff_interval_ms",
            ));
        }
        if self.multiplier == 0 {
            return Err(ConfigError::invalid("retry.multiplier", "must be at least 1"));
        }
        if self.max_backoff_ms < self.backoff_interval_ms {
            return Err(ConfigError::invalid(
                "retry.max_backoff_ms",
                "must not be smaller than backoff_interval_ms",
            ));
        }
        if self.contention_attempts == 0 {
            return Err(ConfigError::invalid(
                "retry.contention_attempts",
                "must be at least 1 (the initial attempt)",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RetryConfig::default();
        config.validate().unwrap();
        assert_eq!(config.attempt_limit(), Some(120));
        assert_eq!(config.duration_limit(), None);
        assert_eq!(config.backoff_interval(), Duration::from_secs(1));
        assert_eq!(config.max_reconnections, 25);
    }

    #[test]
    fn unbounded_loop_is_rejected() {
        let config = RetryConfig {
            max_attempts: 0,
            max_duration_secs: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.max_attempts"));
    }

    #[test]
    fn duration_bound_alone_is_enough() {
        let config = RetryConfig {
            max_attempts: 0,
            max_duration_secs: 10,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.attempt_limit(), None);
        assert_eq!(config.duration_limit(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn duration_shorter_than_first_backoff_is_rejected() {
        let config = RetryConfig {
            max_attempts: 0,
            max_duration_secs: 1,
            backoff_interval_ms: 5_000,
            max_backoff_ms: 5_000,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.max_duration_secs"));
    }

    #[test]
    fn backoff_cap_below_interval_is_rejected() {
        let config = RetryConfig {
            backoff_interval_ms: 5_000,
            max_backoff_ms: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
