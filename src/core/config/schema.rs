//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! [engine]
//! infinite_loop_timeout_ms = 15000
//! report_top_n = 10
//!
//! [store]
//! path = "/var/lib/infragraph/state.json"
//!
//! [types.Machine]
//! primary_key = ["name"]
//!
//! [types.Website]
//! primary_key = ["domain", "port"]
//! ```
//!
//! # Validation
//!
//! Values are validated after parsing: the timeout must be positive, type
//! names must be valid [`ResourceType`]s, and every type needs at least one
//! primary-key property.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::ResourceType;

/// The whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Reconciliation engine settings
    pub engine: Option<EngineSection>,

    /// Store settings
    pub store: Option<StoreSection>,

    /// Resource type descriptors, keyed by type name
    pub types: BTreeMap<String, TypeSection>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(engine) = &self.engine {
            engine.validate()?;
        }
        for (name, section) in &self.types {
            ResourceType::new(name.as_str()).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid type name '{}': {}", name, e))
            })?;
            section.validate(name)?;
        }
        Ok(())
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Wall-clock budget of the reconciliation loop
    pub infinite_loop_timeout_ms: Option<u64>,

    /// How many entries the infinite-loop diagnostics list
    pub report_top_n: Option<usize>,
}

impl EngineSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.infinite_loop_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue(
                "infinite_loop_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.report_top_n == Some(0) {
            return Err(ConfigError::InvalidValue(
                "report_top_n must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    /// Path of the JSON state file
    pub path: Option<PathBuf>,
}

/// `[types.<Name>]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TypeSection {
    /// Property names forming the primary key
    pub primary_key: Vec<String>,
}

impl TypeSection {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.primary_key.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "type '{}' needs at least one primary_key property",
                name
            )));
        }
        if self.primary_key.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::InvalidValue(format!(
                "type '{}' has an empty primary_key property",
                name
            )));
        }
        Ok(())
    }
}
