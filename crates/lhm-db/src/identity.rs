//! Physical server fingerprinting.
//!
//! The probe runs on the initial connect and after every reconnect, so it is
//! two cheap, read-only variable lookups. Both are tagged with the ProxySQL
//! maintenance annotation so a proxy routes them to the same writer
//! hostgroup as the migration's DDL.

use lhm_core::ServerIdentity;

use crate::connection::Connection;
use crate::error::DatabaseError;

/// Comment recognised by ProxySQL query rules to pin a query to the writer.
pub const PROXYSQL_ANNOTATION: &str = "/*maintenance:lhm*/";

const HOSTNAME_QUERY: &str = "SELECT @@global.hostname LIMIT 1";
const SERVER_ID_QUERY: &str = "SELECT @@global.server_id LIMIT 1";

/// Prefix `sql` with the ProxySQL routing annotation.
#[must_use]
pub fn tagged(sql: &str) -> String {
    format!("{PROXYSQL_ANNOTATION}{sql}")
}

/// Fingerprints the server behind a connection.
#[allow(async_fn_in_trait)]
pub trait IdentityProbe {
    /// Identify the server `conn` is attached to. Must be side-effect free.
    async fn fingerprint<C: Connection>(&self, conn: &mut C) -> Result<ServerIdentity, DatabaseError>;
}

/// Reads `@@global.hostname` and `@@global.server_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlIdentityProbe;

impl IdentityProbe for MysqlIdentityProbe {
    async fn fingerprint<C: Connection>(&self, conn: &mut C) -> Result<ServerIdentity, DatabaseError> {
        let hostname = single_value(conn, HOSTNAME_QUERY).await?;
        let raw_server_id = single_value(conn, SERVER_ID_QUERY).await?;
        let server_id = raw_server_id.trim().parse::<u64>().map_err(|e| {
            DatabaseError::Query(format!(
                "unexpected @@global.server_id value '{raw_server_id}': {e}"
            ))
        })?;
        Ok(ServerIdentity { hostname, server_id })
    }
}

async fn single_value<C: Connection>(conn: &mut C, sql: &str) -> Result<String, DatabaseError> {
    conn.select_values(&tagged(sql))
        .await?
        .into_iter()
        .next()
        .ok_or(DatabaseError::NoResult)
}
