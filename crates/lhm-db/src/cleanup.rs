//! Removal of artifacts left behind by an interrupted migration.
//!
//! A migration that dies between creating its triggers and the final swap
//! leaves two kinds of debris around the origin table: triggers mirroring
//! writes into the shadow table, and the shadow table itself. Cleanup drops
//! the triggers and renames the shadow table to the `failed` name so the data
//! copied so far is kept for inspection.
//!
//! Only artifacts matching the reserved naming conventions are touched. A
//! third-party trigger on the origin table is never dropped.

use std::fmt;

use lhm_core::table_name::validate_identifier;
use lhm_core::{TableName, TableNamer};
use serde::Serialize;

use crate::connection::Connection;
use crate::error::DatabaseError;
use crate::identity::{IdentityProbe, MysqlIdentityProbe, tagged};
use crate::session::RetrySession;

/// One cleanup DDL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CleanupStatement {
    DropTrigger { name: String },
    RenameTable { from: String, to: String },
}

impl fmt::Display for CleanupStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropTrigger { name } => write!(f, "drop trigger if exists {name}"),
            Self::RenameTable { from, to } => write!(f, "rename table {from} to {to}"),
        }
    }
}

/// Ordered cleanup statements for one origin table. Triggers come first so
/// nothing writes into the shadow table while it is being renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupPlan {
    pub origin: String,
    pub statements: Vec<CleanupStatement>,
}

impl CleanupPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The statements as DDL text, in execution order.
    #[must_use]
    pub fn ddls(&self) -> Vec<String> {
        self.statements.iter().map(ToString::to_string).collect()
    }
}

/// A cleanup statement that failed without compromising the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub statement: String,
    pub error: String,
}

/// Outcome of [`CleanupPlanner::execute`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub origin: String,
    /// `false` for a dry run: nothing was executed.
    pub run: bool,
    pub planned: Vec<String>,
    pub applied: Vec<String>,
    pub dropped_triggers: Vec<String>,
    pub renamed_tables: Vec<String>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Whether every planned statement was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.run && self.failures.is_empty() && self.applied.len() == self.planned.len()
    }

    /// One-line human readable outcome.
    #[must_use]
    pub fn summary(&self) -> String {
        if !self.run {
            return format!(
                "cleanup of {} (dry run): {} statement(s) would be executed",
                self.origin,
                self.planned.len()
            );
        }
        format!(
            "cleanup of {}: {} planned, {} applied, {} failed",
            self.origin,
            self.planned.len(),
            self.applied.len(),
            self.failures.len()
        )
    }

    fn record_applied(&mut self, statement: &CleanupStatement) {
        self.applied.push(statement.to_string());
        match statement {
            CleanupStatement::DropTrigger { name } => self.dropped_triggers.push(name.clone()),
            CleanupStatement::RenameTable { from, .. } => self.renamed_tables.push(from.clone()),
        }
    }
}

/// Finds and removes the migration artifacts of one origin table.
///
/// Borrows the session mutably for its whole lifetime, so cleanup cannot
/// interleave with other statements on the same connection.
pub struct CleanupPlanner<'s, C, P = MysqlIdentityProbe> {
    session: &'s mut RetrySession<C, P>,
    namer: TableNamer,
    table: TableName,
}

impl<'s, C: Connection, P: IdentityProbe> CleanupPlanner<'s, C, P> {
    /// # Errors
    ///
    /// Returns `DatabaseError::Core` if `origin` is not a legal table name.
    pub fn new(
        session: &'s mut RetrySession<C, P>,
        namer: &TableNamer,
        origin: &str,
    ) -> Result<Self, DatabaseError> {
        let table = namer.derive(origin)?;
        Ok(Self {
            session,
            namer: namer.clone(),
            table,
        })
    }

    #[must_use]
    pub const fn table(&self) -> &TableName {
        &self.table
    }

    /// Migration triggers attached to the origin table in the current schema.
    ///
    /// # Errors
    ///
    /// Propagates session errors from the lookup query.
    pub async fn discover_triggers(&mut self) -> Result<Vec<String>, DatabaseError> {
        let sql = format!(
            "SELECT trigger_name FROM information_schema.triggers \
             WHERE event_object_table = '{}' AND event_object_schema = DATABASE() \
             ORDER BY trigger_name",
            self.table.original
        );
        let found = self.session.select_values(&tagged(&sql)).await?;
        let mut triggers = Vec::with_capacity(found.len());
        for name in found {
            if !self.namer.is_migration_trigger(&name) {
                tracing::debug!(trigger = %name, origin = %self.table.original, "leaving foreign trigger in place");
                continue;
            }
            if let Err(e) = validate_identifier(&name) {
                tracing::warn!(trigger = %name, error = %e, "skipping trigger with unusable name");
                continue;
            }
            triggers.push(name);
        }
        Ok(triggers)
    }

    /// Shadow tables named exactly like the derived shadow name.
    ///
    /// # Errors
    ///
    /// Propagates session errors from the lookup query.
    pub async fn discover_shadow_tables(&mut self) -> Result<Vec<String>, DatabaseError> {
        let sql = format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_name = '{}' AND table_schema = DATABASE()",
            self.table.new
        );
        let found = self.session.select_values(&tagged(&sql)).await?;
        Ok(found
            .into_iter()
            .filter(|name| *name == self.table.new)
            .collect())
    }

    /// Build a fresh plan from the current server state.
    ///
    /// # Errors
    ///
    /// Propagates session errors from discovery.
    pub async fn plan(&mut self) -> Result<CleanupPlan, DatabaseError> {
        let mut statements: Vec<CleanupStatement> = self
            .discover_triggers()
            .await?
            .into_iter()
            .map(|name| CleanupStatement::DropTrigger { name })
            .collect();
        statements.extend(
            self.discover_shadow_tables()
                .await?
                .into_iter()
                .map(|from| CleanupStatement::RenameTable {
                    from,
                    to: self.table.failed.clone(),
                }),
        );
        Ok(CleanupPlan {
            origin: self.table.original.clone(),
            statements,
        })
    }

    /// Plan and, if `run` is set, apply the cleanup.
    ///
    /// Statements run one by one through the session. A statement failing
    /// with a non-fatal error is recorded in the report and the rest still
    /// run.
    ///
    /// # Errors
    ///
    /// Discovery errors, and fatal session errors (identity mismatch, retry
    /// exhaustion), stop cleanup immediately.
    pub async fn execute(&mut self, run: bool) -> Result<CleanupReport, DatabaseError> {
        let plan = self.plan().await?;
        let mut report = CleanupReport {
            origin: plan.origin.clone(),
            run,
            planned: plan.ddls(),
            ..CleanupReport::default()
        };

        if !run {
            tracing::info!(origin = %plan.origin, "The following DDLs would be executed: {:?}", report.planned);
            return Ok(report);
        }

        for statement in &plan.statements {
            let ddl = statement.to_string();
            match self.session.execute(&tagged(&ddl)).await {
                Ok(_) => report.record_applied(statement),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(origin = %plan.origin, statement = %ddl, error = %e, "cleanup statement failed");
                    report.failures.push(CleanupFailure {
                        statement: ddl,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.dropped_triggers.is_empty() {
            tracing::info!("Dropped triggers {}", report.dropped_triggers.join(", "));
        }
        if !report.renamed_tables.is_empty() {
            tracing::info!(
                "Renamed tables {} to {}",
                report.renamed_tables.join(", "),
                self.table.failed
            );
        }
        tracing::info!("{}", report.summary());
        Ok(report)
    }
}

impl<C, P> fmt::Debug for CleanupPlanner<'_, C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupPlanner")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
