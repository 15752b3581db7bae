use std::fmt;

use serde::{Deserialize, Serialize};

/// Fingerprint of one physical database server instance.
///
/// Produced by the identity probe in `lhm-db` on connect and on every
/// reconnect. Two identities are equal iff both the hostname and the server
/// id match; a proxy that silently relocates a session to another instance
/// changes at least one of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// Value of `@@global.hostname` on the server.
    pub hostname: String,
    /// Value of `@@global.server_id` on the server.
    pub server_id: u64,
}

impl ServerIdentity {
    #[must_use]
    pub fn new(hostname: impl Into<String>, server_id: u64) -> Self {
        Self {
            hostname: hostname.into(),
            server_id,
        }
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (server_id: {})", self.hostname, self.server_id)
    }
}
