//! Shared test utilities for lhm-db.

/// In-memory stand-in for a MySQL topology behind a proxy.
///
/// A `FakeCluster` holds one or more servers and a pointer to the current
/// writer. Connections stay attached to the server they connected to until
/// they reconnect, at which point they follow the writer, the way a proxy
/// silently relocates sessions during a failover.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::{BTreeMap, BTreeSet, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use lhm_core::ServerIdentity;

    use crate::connection::Connection;
    use crate::error::DatabaseError;
    use crate::identity::{IdentityProbe, PROXYSQL_ANNOTATION};

    const GONE_AWAY: &str = "Lost connection to MySQL server during query";
    const REFUSED: &str = "Can't connect to MySQL server on 'proxysql' (111)";
    const LOCK_WAIT: &str = "Lock wait timeout exceeded; try restarting transaction";

    #[derive(Debug, Default)]
    pub struct FakeServer {
        pub hostname: String,
        pub server_id: u64,
        pub tables: BTreeSet<String>,
        /// Trigger name -> target table.
        pub triggers: BTreeMap<String, String>,
        /// Every statement applied on this server, in order, without the
        /// routing annotation.
        pub applied: Vec<String>,
    }

    impl FakeServer {
        pub fn new(hostname: &str, server_id: u64) -> Self {
            Self {
                hostname: hostname.to_string(),
                server_id,
                ..Self::default()
            }
        }

        pub fn with_table(mut self, name: &str) -> Self {
            self.tables.insert(name.to_string());
            self
        }

        pub fn with_trigger(mut self, name: &str, table: &str) -> Self {
            self.triggers.insert(name.to_string(), table.to_string());
            self
        }
    }

    #[derive(Debug, Default)]
    struct ClusterState {
        servers: Vec<FakeServer>,
        writer: usize,
        down: bool,
        dropped_statements: u32,
        refused_reconnects: u32,
        contended_statements: u32,
        denied: Vec<(String, String)>,
        reconnects: u32,
        queries: Vec<String>,
    }

    #[derive(Debug, Clone)]
    pub struct FakeCluster(Arc<Mutex<ClusterState>>);

    impl FakeCluster {
        pub fn new(servers: Vec<FakeServer>) -> Self {
            Self(Arc::new(Mutex::new(ClusterState {
                servers,
                ..ClusterState::default()
            })))
        }

        fn state(&self) -> MutexGuard<'_, ClusterState> {
            self.0.lock().unwrap()
        }

        /// Open a connection to the current writer.
        pub fn connect(&self) -> FakeConnection {
            let server = self.state().writer;
            FakeConnection {
                cluster: self.clone(),
                server,
                alive: true,
            }
        }

        /// The next `n` statements lose the connection before being applied.
        pub fn drop_next_statements(&self, n: u32) {
            self.state().dropped_statements = n;
        }

        /// The next `n` reconnect attempts are refused.
        pub fn refuse_reconnects(&self, n: u32) {
            self.state().refused_reconnects = n;
        }

        /// The next `n` statements fail with a lock wait timeout.
        pub fn contend_next_statements(&self, n: u32) {
            self.state().contended_statements = n;
        }

        /// Statements containing `needle` fail with a non-transient `message`.
        pub fn deny(&self, needle: &str, message: &str) {
            self.state()
                .denied
                .push((needle.to_string(), message.to_string()));
        }

        /// Take every server offline (or back online).
        pub fn set_down(&self, down: bool) {
            self.state().down = down;
        }

        /// Point the proxy at another server; reconnects land there.
        pub fn fail_over_to(&self, server: usize) {
            self.state().writer = server;
        }

        pub fn reconnects(&self) -> u32 {
            self.state().reconnects
        }

        /// Every `select_values` query issued, in order.
        pub fn queries(&self) -> Vec<String> {
            self.state().queries.clone()
        }

        pub fn applied(&self, server: usize) -> Vec<String> {
            self.state().servers[server].applied.clone()
        }

        pub fn tables(&self, server: usize) -> Vec<String> {
            self.state().servers[server].tables.iter().cloned().collect()
        }

        pub fn triggers(&self, server: usize) -> Vec<String> {
            self.state().servers[server].triggers.keys().cloned().collect()
        }
    }

    #[derive(Debug)]
    pub struct FakeConnection {
        cluster: FakeCluster,
        server: usize,
        alive: bool,
    }

    impl FakeConnection {
        fn check_alive(&self, state: &ClusterState) -> Result<(), DatabaseError> {
            if state.down || !self.alive {
                return Err(DatabaseError::from_message(GONE_AWAY));
            }
            Ok(())
        }
    }

    impl Connection for FakeConnection {
        async fn execute(&mut self, sql: &str) -> Result<u64, DatabaseError> {
            let mut state = self.cluster.state();
            self.check_alive(&state)?;
            if state.dropped_statements > 0 {
                state.dropped_statements -= 1;
                self.alive = false;
                return Err(DatabaseError::from_message(GONE_AWAY));
            }
            if state.contended_statements > 0 {
                state.contended_statements -= 1;
                return Err(DatabaseError::from_message(LOCK_WAIT));
            }
            if let Some((_, message)) = state.denied.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
                return Err(DatabaseError::from_message(message.clone()));
            }
            apply(&mut state.servers[self.server], sql)
        }

        async fn select_values(&mut self, sql: &str) -> Result<Vec<String>, DatabaseError> {
            let mut state = self.cluster.state();
            self.check_alive(&state)?;
            state.queries.push(sql.to_string());
            let server = &state.servers[self.server];
            if sql.contains("@@global.hostname") {
                return Ok(vec![server.hostname.clone()]);
            }
            if sql.contains("@@global.server_id") {
                return Ok(vec![server.server_id.to_string()]);
            }
            let literal = first_literal(sql).unwrap_or_default();
            if sql.contains("information_schema.triggers") {
                return Ok(server
                    .triggers
                    .iter()
                    .filter(|(_, table)| **table == literal)
                    .map(|(name, _)| name.clone())
                    .collect());
            }
            if sql.contains("information_schema.tables") {
                return Ok(server.tables.iter().filter(|t| **t == literal).cloned().collect());
            }
            Err(DatabaseError::Query(format!("fake server cannot answer: {sql}")))
        }

        async fn reconnect(&mut self) -> Result<(), DatabaseError> {
            let mut state = self.cluster.state();
            state.reconnects += 1;
            self.alive = false;
            if state.down {
                return Err(DatabaseError::from_message(REFUSED));
            }
            if state.refused_reconnects > 0 {
                state.refused_reconnects -= 1;
                return Err(DatabaseError::from_message(REFUSED));
            }
            self.server = state.writer;
            self.alive = true;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), DatabaseError> {
            self.alive = false;
            Ok(())
        }
    }

    fn apply(server: &mut FakeServer, sql: &str) -> Result<u64, DatabaseError> {
        let sql = sql.strip_prefix(PROXYSQL_ANNOTATION).unwrap_or(sql);
        let words: Vec<&str> = sql.split_whitespace().collect();
        let lower: Vec<String> = words.iter().map(|w| w.to_ascii_lowercase()).collect();
        let lower: Vec<&str> = lower.iter().map(String::as_str).collect();
        let affected = match lower.as_slice() {
            ["drop", "trigger", "if", "exists", _] => {
                server.triggers.remove(words[4]);
                0
            }
            ["rename", "table", _, "to", _] => {
                let (from, to) = (words[2], words[4]);
                if !server.tables.contains(from) {
                    return Err(DatabaseError::Query(format!("Table '{from}' doesn't exist")));
                }
                if server.tables.contains(to) {
                    return Err(DatabaseError::Query(format!("Table '{to}' already exists")));
                }
                server.tables.remove(from);
                server.tables.insert(to.to_string());
                0
            }
            ["create", "table", "if", "not", "exists", ..] => {
                server.tables.insert(words[5].to_string());
                0
            }
            ["insert", ..] | ["update", ..] | ["delete", ..] => 1,
            _ => 0,
        };
        server.applied.push(sql.to_string());
        Ok(affected)
    }

    fn first_literal(sql: &str) -> Option<String> {
        let start = sql.find('\'')? + 1;
        let len = sql[start..].find('\'')?;
        Some(sql[start..start + len].to_string())
    }

    /// Identity probe double returning a scripted sequence of identities.
    ///
    /// The last identity repeats once the script runs out.
    #[derive(Debug)]
    pub struct ScriptedProbe {
        script: Mutex<VecDeque<ServerIdentity>>,
    }

    impl ScriptedProbe {
        pub fn new(identities: Vec<ServerIdentity>) -> Self {
            Self {
                script: Mutex::new(identities.into()),
            }
        }
    }

    impl IdentityProbe for ScriptedProbe {
        async fn fingerprint<C: Connection>(
            &self,
            _conn: &mut C,
        ) -> Result<ServerIdentity, DatabaseError> {
            let mut script = self.script.lock().unwrap();
            match script.len() {
                0 => Err(DatabaseError::NoResult),
                1 => Ok(script[0].clone()),
                _ => Ok(script.pop_front().unwrap()),
            }
        }
    }
}

/// Captures `tracing` output for assertions on log lines.
#[cfg(test)]
pub(crate) mod logs {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Debug, Clone, Default)]
    pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl LogCapture {
        /// Install a capturing subscriber for the current thread.
        ///
        /// Tests using this must run on a current-thread runtime.
        pub fn install() -> (Self, DefaultGuard) {
            let capture = Self::default();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(capture.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::INFO)
                .finish();
            let guard = tracing::subscriber::set_default(subscriber);
            (capture, guard)
        }

        pub fn lines(&self) -> Vec<String> {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf)
                .lines()
                .map(ToString::to_string)
                .collect()
        }

        pub fn contains(&self, needle: &str) -> bool {
            self.lines().iter().any(|line| line.contains(needle))
        }
    }

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }
}
