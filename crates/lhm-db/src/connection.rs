//! The connection primitive consumed by sessions and the cleanup planner.

use crate::error::DatabaseError;

/// One logical database connection.
///
/// Opening is the adapter's constructor. Implementations must map every
/// failure through [`DatabaseError::from_message`] (or an equivalent
/// code-based mapping) so the session can tell connection loss, lock
/// contention and real SQL errors apart.
///
/// A connection is owned by exactly one `RetrySession` and is never shared
/// between tasks, so the futures returned here need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait Connection {
    /// Run a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64, DatabaseError>;

    /// Run a query, returning the first column of every row as text.
    async fn select_values(&mut self, sql: &str) -> Result<Vec<String>, DatabaseError>;

    /// Drop the current link and open a fresh one with the same settings.
    ///
    /// Behind a proxy or a failover-aware DNS name the fresh link may land on
    /// a different server; callers verify identity afterwards.
    async fn reconnect(&mut self) -> Result<(), DatabaseError>;

    /// Close the connection. Further calls fail with a connection error.
    async fn close(&mut self) -> Result<(), DatabaseError>;
}
