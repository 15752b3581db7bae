//! Naming conventions for migration artifacts.

use lhm_core::table_name::{
    DEFAULT_FAILED_SUFFIX, DEFAULT_SHADOW_PREFIX, DEFAULT_TRIGGER_PREFIX, MAX_IDENTIFIER_LEN,
};
use lhm_core::{CoreError, TableNamer};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_shadow_prefix() -> String {
    DEFAULT_SHADOW_PREFIX.to_string()
}

fn default_failed_suffix() -> String {
    DEFAULT_FAILED_SUFFIX.to_string()
}

fn default_trigger_prefix() -> String {
    DEFAULT_TRIGGER_PREFIX.to_string()
}

const fn default_max_identifier_len() -> usize {
    MAX_IDENTIFIER_LEN
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamingConfig {
    /// Prefix of the shadow table (`lhmn_orders`).
    #[serde(default = "default_shadow_prefix")]
    pub shadow_prefix: String,

    /// Suffix given to an abandoned shadow table on cleanup (`orders_failed`).
    #[serde(default = "default_failed_suffix")]
    pub failed_suffix: String,

    /// Reserved prefix of migration triggers (`lhmt_ins_orders`).
    #[serde(default = "default_trigger_prefix")]
    pub trigger_prefix: String,

    /// Identifier length limit of the target database.
    #[serde(default = "default_max_identifier_len")]
    pub max_identifier_len: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            shadow_prefix: default_shadow_prefix(),
            failed_suffix: default_failed_suffix(),
            trigger_prefix: default_trigger_prefix(),
            max_identifier_len: default_max_identifier_len(),
        }
    }
}

impl NamingConfig {
    /// Build the namer described by this section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if an affix or the length limit is unusable.
    pub fn namer(&self) -> Result<TableNamer, ConfigError> {
        TableNamer::new(
            self.shadow_prefix.clone(),
            self.failed_suffix.clone(),
            self.trigger_prefix.clone(),
            self.max_identifier_len,
        )
        .map_err(|e| match e {
            CoreError::InvalidName { name, reason } => {
                ConfigError::invalid("naming", format!("'{name}': {reason}"))
            }
        })
    }
}
