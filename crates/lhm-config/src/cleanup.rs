//! Cleanup behaviour.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CleanupConfig {
    /// Apply the cleanup DDL. When `false` the plan is only reported.
    #[serde(default)]
    pub run: bool,
}
