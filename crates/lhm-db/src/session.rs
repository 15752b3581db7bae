//! Retry-protected execution pinned to one physical server.
//!
//! Trigger-based migrations keep their state on the server: the triggers and
//! the shadow table live there. A proxy or failover that silently moves the
//! session to another instance looks exactly like a successful reconnect, so
//! every reconnect is followed by an identity check against the server the
//! session started on, and a mismatch aborts the session for good.
//!
//! ```text
//!            transient error            same identity
//!   Active ─────────────────▶ Retrying ───────────────▶ Active (replay once)
//!                               │
//!                               │ other identity / bounds exhausted
//!                               ▼
//!                            Aborted  (terminal)
//! ```

use std::fmt;

use lhm_core::ServerIdentity;
use tokio::time::{Instant, sleep};

use crate::connection::Connection;
use crate::error::DatabaseError;
use crate::identity::{IdentityProbe, MysqlIdentityProbe};
use crate::retry::RetryPolicy;

const DEFAULT_LABEL: &str = "sql_retry";

/// Lifecycle of a `RetrySession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Attached to the baseline server.
    Active,
    /// Connection lost; the bounded reconnect loop is running (or was
    /// interrupted, in which case the identity is re-checked before use).
    Retrying,
    /// A fatal error occurred. Terminal.
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Retrying => "retrying",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Owns the one logical connection of a migration.
pub struct RetrySession<C, P = MysqlIdentityProbe> {
    conn: C,
    probe: P,
    policy: RetryPolicy,
    baseline: ServerIdentity,
    state: SessionState,
    reconnections: u32,
    label: String,
}

impl<C: Connection, P: IdentityProbe> RetrySession<C, P> {
    /// Wrap an open connection and record the identity of its server.
    ///
    /// The baseline is captured here, once, and never overwritten.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the initial fingerprint fails.
    pub async fn connect(mut conn: C, probe: P, policy: RetryPolicy) -> Result<Self, DatabaseError> {
        let baseline = probe.fingerprint(&mut conn).await?;
        tracing::info!(host = %baseline, "migration session pinned to initial host");
        Ok(Self {
            conn,
            probe,
            policy,
            baseline,
            state: SessionState::Active,
            reconnections: 0,
            label: DEFAULT_LABEL.to_string(),
        })
    }

    /// Name attached to this session's log lines.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Identity of the server the session started on.
    #[must_use]
    pub const fn baseline(&self) -> &ServerIdentity {
        &self.baseline
    }

    /// Retry bounds this session was opened with.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Connection losses recovered (or attempted) so far.
    #[must_use]
    pub const fn reconnections(&self) -> u32 {
        self.reconnections
    }

    /// Run one statement with retry protection.
    ///
    /// # Errors
    ///
    /// Non-transient errors are returned as-is. Fatal errors
    /// (`IdentityMismatch`, `RetryExhausted`, `TooManyReconnections`) abort
    /// the session; afterwards every call returns `SessionAborted`.
    pub async fn execute(&mut self, sql: &str) -> Result<u64, DatabaseError> {
        self.with_retries(async |conn: &mut C| conn.execute(sql).await)
            .await
    }

    /// Run a read query with retry protection, returning the first column.
    ///
    /// # Errors
    ///
    /// Same as [`Self::execute`].
    pub async fn select_values(&mut self, sql: &str) -> Result<Vec<String>, DatabaseError> {
        self.with_retries(async |conn: &mut C| conn.select_values(sql).await)
            .await
    }

    /// Run `op` as one retriable unit.
    ///
    /// `op` receives the live connection and may issue several statements.
    /// On connection loss the session reconnects, verifies the server
    /// identity, and runs `op` again from the start, once per verified
    /// reconnect. Statements inside `op` should therefore be idempotent
    /// (`if exists` / `if not exists` guards).
    ///
    /// # Errors
    ///
    /// Same as [`Self::execute`].
    pub async fn with_retries<T, F>(&mut self, mut op: F) -> Result<T, DatabaseError>
    where
        F: AsyncFnMut(&mut C) -> Result<T, DatabaseError>,
    {
        self.ensure_ready().await?;
        let mut contention_failures = 0;
        loop {
            let outcome = op(&mut self.conn).await;
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient_connection() => self.recover(e).await?,
                Err(e) if e.is_contention() => {
                    contention_failures += 1;
                    if contention_failures >= self.policy.contention_attempts {
                        return Err(e);
                    }
                    let delay = self.policy.delay_for(contention_failures);
                    tracing::warn!(
                        session = %self.label,
                        attempt = contention_failures,
                        limit = self.policy.contention_attempts,
                        error = %e,
                        "statement failed on lock contention, retrying in {delay:?}"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fingerprint the current server and compare it with the baseline.
    ///
    /// # Errors
    ///
    /// Returns `IdentityMismatch` (and aborts the session) if the server
    /// changed, or the probe's own error if the fingerprint fails.
    pub async fn verify_identity(&mut self) -> Result<(), DatabaseError> {
        if self.state == SessionState::Aborted {
            return Err(DatabaseError::SessionAborted);
        }
        let current = self.probe.fingerprint(&mut self.conn).await?;
        self.accept_identity(current)
    }

    /// Close the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error if closing fails.
    pub async fn close(mut self) -> Result<(), DatabaseError> {
        self.conn.close().await
    }

    /// Give up retry protection and take the connection back.
    pub fn into_inner(self) -> C {
        self.conn
    }

    async fn ensure_ready(&mut self) -> Result<(), DatabaseError> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Aborted => Err(DatabaseError::SessionAborted),
            // An earlier recovery was interrupted; the link may point anywhere.
            SessionState::Retrying => match self.probe.fingerprint(&mut self.conn).await {
                Ok(current) => self.accept_identity(current),
                Err(e) if e.is_transient_connection() => self.recover(e).await,
                Err(e) => Err(e),
            },
        }
    }

    fn accept_identity(&mut self, current: ServerIdentity) -> Result<(), DatabaseError> {
        if current == self.baseline {
            self.state = SessionState::Active;
            return Ok(());
        }
        self.state = SessionState::Aborted;
        let err = DatabaseError::IdentityMismatch {
            baseline: self.baseline.clone(),
            current,
        };
        tracing::error!(session = %self.label, "{err}");
        Err(err)
    }

    /// Bounded reconnect loop. Leaves the session `Active` on a verified
    /// same-host reconnect and `Aborted` otherwise.
    async fn recover(&mut self, cause: DatabaseError) -> Result<(), DatabaseError> {
        self.state = SessionState::Retrying;
        self.reconnections += 1;
        if self.reconnections > self.policy.max_reconnections {
            self.state = SessionState::Aborted;
            let err = DatabaseError::TooManyReconnections {
                count: self.reconnections,
                limit: self.policy.max_reconnections,
            };
            tracing::error!(session = %self.label, "{err}");
            return Err(err);
        }

        tracing::warn!(
            session = %self.label,
            error = %cause,
            "Lost connection to MySQL, will retry to connect to same host"
        );

        let started = Instant::now();
        let mut attempts = 0;
        let mut last_error = cause.to_string();
        loop {
            let delay = self.policy.delay_for(attempts + 1);
            if !self.policy.limit.allows(attempts, started.elapsed(), delay) {
                break;
            }
            sleep(delay).await;
            attempts += 1;

            match self.reconnect_and_fingerprint().await {
                Ok(current) => {
                    self.accept_identity(current)?;
                    tracing::info!(
                        session = %self.label,
                        attempt = attempts,
                        "successfully reconnected to initial host: {}",
                        self.baseline
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        session = %self.label,
                        error = %e,
                        "Reconnection attempt #{attempts} failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        self.state = SessionState::Aborted;
        let err = DatabaseError::RetryExhausted {
            attempts,
            elapsed: started.elapsed(),
            last_error,
        };
        tracing::error!(session = %self.label, "{err}");
        Err(err)
    }

    async fn reconnect_and_fingerprint(&mut self) -> Result<ServerIdentity, DatabaseError> {
        self.conn.reconnect().await?;
        self.probe.fingerprint(&mut self.conn).await
    }
}

impl<C, P> fmt::Debug for RetrySession<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySession")
            .field("baseline", &self.baseline)
            .field("state", &self.state)
            .field("reconnections", &self.reconnections)
            .field("policy", &self.policy)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
