//! # lhm-config
//!
//! Layered configuration loading for lhm using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`LHM_*` prefix, `__` as separator)
//! 2. Project-level `.lhm/config.toml`
//! 3. User-level `~/.config/lhm/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `LHM_RETRY__MAX_ATTEMPTS` -> `retry.max_attempts`,
//! `LHM_CLEANUP__RUN` -> `cleanup.run`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use lhm_config::LhmConfig;
//!
//! let config = LhmConfig::load_with_dotenv().expect("config");
//! config.validate().expect("valid config");
//!
//! let namer = config.naming.namer().expect("namer");
//! let names = namer.derive("orders").expect("legal table name");
//! assert_eq!(names.new, "lhmn_orders");
//! ```

mod cleanup;
mod error;
mod mysql;
mod naming;
mod retry;

pub use cleanup::CleanupConfig;
pub use error::ConfigError;
pub use mysql::MysqlConfig;
pub use naming::NamingConfig;
pub use retry::RetryConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LhmConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub mysql: MysqlConfig,
}

impl LhmConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] if you need `.env` file loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if a source cannot be parsed or extracted.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if a source cannot be parsed or extracted.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// This is public so tests can inspect the figment directly or add
    /// additional providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        // Layer 2: Project-local config
        let local_path = PathBuf::from(".lhm/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Environment variables (highest priority)
        figment = figment.merge(Env::prefixed("LHM_").split("__"));

        figment
    }

    /// Check cross-field constraints figment cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first unusable setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.naming.namer()?;
        Ok(())
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lhm").join("config.toml"))
    }

    /// Load `.env` from the workspace root, falling back to the current directory.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = LhmConfig::default();
        assert!(!config.cleanup.run);
        assert!(!config.mysql.is_configured());
        assert_eq!(config.naming.shadow_prefix, "lhmn_");
        assert_eq!(config.retry.max_attempts, 120);
        config.validate().unwrap();
    }

    #[test]
    fn figment_builds_without_files() {
        figment::Jail::expect_with(|_jail| {
            let config: LhmConfig = LhmConfig::figment().extract()?;
            assert!(!config.cleanup.run);
            assert_eq!(config.naming.failed_suffix, "_failed");
            assert_eq!(config.retry.contention_attempts, 20);
            Ok(())
        });
    }
}
