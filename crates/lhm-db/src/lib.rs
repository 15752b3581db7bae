//! # lhm-db
//!
//! Host-pinned, retry-protected statement execution for online schema
//! migrations, plus cleanup of artifacts left by interrupted runs.
//!
//! A [`RetrySession`] wraps one [`Connection`] and records the identity of the
//! server behind it. Transient connection loss is recovered by reconnecting,
//! but only onto that same server: landing anywhere else (a failover, a proxy
//! rerouting) aborts the session before the pending statement is replayed.
//!
//! [`CleanupPlanner`] uses a session to drop leftover migration triggers and
//! rename leftover shadow tables out of the way.
//!
//! ```ignore
//! let conn = MysqlConnection::connect(&config.mysql.url).await?;
//! let policy = RetryPolicy::try_from(&config.retry)?;
//! let mut session = RetrySession::connect(conn, MysqlIdentityProbe, policy).await?;
//!
//! let namer = config.naming.namer()?;
//! let report = CleanupPlanner::new(&mut session, &namer, "orders")?
//!     .execute(config.cleanup.run)
//!     .await?;
//! tracing::info!("{}", report.summary());
//! ```

pub mod cleanup;
pub mod connection;
pub mod error;
pub mod identity;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod retry;
pub mod session;

#[cfg(test)]
mod test_support;

pub use cleanup::{CleanupFailure, CleanupPlan, CleanupPlanner, CleanupReport, CleanupStatement};
pub use connection::Connection;
pub use error::DatabaseError;
pub use identity::{IdentityProbe, MysqlIdentityProbe, PROXYSQL_ANNOTATION};
#[cfg(feature = "mysql")]
pub use mysql::MysqlConnection;
pub use retry::{ErrorClass, RetryLimit, RetryPolicy, classify_message};
pub use session::{RetrySession, SessionState};
