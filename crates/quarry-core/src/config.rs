//! Engine configuration

use crate::errors::{QuarryError, Result};
use crate::logging_facility::Profile;
use crate::value::DATE_FORMAT;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Engine-wide settings
///
/// Loaded from TOML, then optionally overridden from the environment:
///
/// ```toml
/// auto_migrate = false
/// migrations_table = "schema_versions"
/// logging = "production"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Issue CREATE TABLE as soon as a model is defined
    pub auto_migrate: bool,
    /// Reserved collection recording applied migration versions
    pub migrations_table: String,
    /// Field stamped on insert when a model declares it
    pub created_field: String,
    /// Field stamped on every save when a model declares it
    pub updated_field: String,
    /// Layout used when SQL drivers store dates as text
    pub date_format: String,
    /// Profile for `logging_facility::init`
    pub logging: Profile,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_migrate: true,
            migrations_table: "schema_migrations".to_string(),
            created_field: "created".to_string(),
            updated_field: "updated".to_string(),
            date_format: DATE_FORMAT.to_string(),
            logging: Profile::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| QuarryError::Config {
            message: e.to_string(),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref()).map_err(|e| QuarryError::Config {
            message: format!("{}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply `QUARRY_*` environment overrides
    pub fn apply_env_vars(&mut self) {
        if let Ok(value) = env::var("QUARRY_AUTO_MIGRATE") {
            if let Ok(flag) = value.trim().parse::<bool>() {
                self.auto_migrate = flag;
            }
        }
        if let Ok(table) = env::var("QUARRY_MIGRATIONS_TABLE") {
            if !table.trim().is_empty() {
                self.migrations_table = table.trim().to_string();
            }
        }
    }

    /// Install the global subscriber for the configured profile
    ///
    /// ```
    /// use quarry_core::EngineConfig;
    ///
    /// let config = EngineConfig::from_toml_str("logging = \"test\"").unwrap();
    /// config.init_logging();
    /// ```
    pub fn init_logging(&self) {
        crate::logging_facility::init(self.logging);
    }

    pub fn validate(&self) -> Result<()> {
        if self.migrations_table.trim().is_empty() {
            return Err(QuarryError::Config {
                message: "migrations_table must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.auto_migrate);
        assert_eq!(config.migrations_table, "schema_migrations");
        assert_eq!(config.created_field, "created");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("auto_migrate = false\nlogging = \"production\"").unwrap();
        assert!(!config.auto_migrate);
        assert_eq!(config.logging, Profile::Production);
        assert_eq!(config.updated_field, "updated");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("auto_migrate = [").unwrap_err();
        assert!(matches!(err, QuarryError::Config { .. }));
    }

    #[test]
    fn test_validate_rejects_blank_table() {
        let config = EngineConfig {
            migrations_table: " ".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
