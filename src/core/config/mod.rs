//! core::config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order, first hit wins:
//! 1. An explicit path (the `--config` CLI flag)
//! 2. `$INFRAGRAPH_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/infragraph/config.toml`
//! 4. `~/.infragraph/config.toml` (canonical write location)
//!
//! Missing files are not an error; defaults are used. An explicit path
//! that does not exist is an error.
//!
//! # Example
//!
//! ```no_run
//! use infragraph::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! let settings = config.engine_settings();
//! println!("loop timeout: {:?}", settings.infinite_loop_timeout);
//! ```

pub mod schema;

pub use schema::{ConfigFile, EngineSection, StoreSection, TypeSection};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::resource::{ResourceDescriptor, ResourceTypeRegistry};
use crate::core::types::ResourceType;

/// Default wall-clock budget of the reconciliation loop.
pub const DEFAULT_INFINITE_LOOP_TIMEOUT_MS: u64 = 15_000;

/// Default number of entries in infinite-loop diagnostics.
pub const DEFAULT_REPORT_TOP_N: usize = 10;

/// Default state file used by the CLI when none is configured.
pub const DEFAULT_STORE_FILE: &str = "infragraph-state.json";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Runtime settings of the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Budget after which a non-converged loop fails.
    pub infinite_loop_timeout: Duration,
    /// Entries listed in each infinite-loop diagnostic table.
    pub report_top_n: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            infinite_loop_timeout: Duration::from_millis(DEFAULT_INFINITE_LOOP_TIMEOUT_MS),
            report_top_n: DEFAULT_REPORT_TOP_N,
        }
    }
}

impl EngineSettings {
    /// Builder-style timeout override.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.infinite_loop_timeout = timeout;
        self
    }
}

/// Loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents
    pub file: ConfigFile,
    /// Path the file was loaded from (if any)
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from an explicit path or the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// fails validation, or if `explicit` points to a missing file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Self::load_from(path);
        }

        match Self::find_default()? {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load and validate a specific config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        Ok(Self {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    /// Locate the first existing config file in the default locations.
    fn find_default() -> Result<Option<PathBuf>, ConfigError> {
        if let Ok(path) = std::env::var("INFRAGRAPH_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("infragraph/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".infragraph/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    /// Get the canonical path for the user config.
    ///
    /// Returns `~/.infragraph/config.toml`.
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".infragraph/config.toml"))
    }

    /// Path the configuration was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write a config file atomically.
    ///
    /// Creates parent directories if needed. Writes to a temp file in the
    /// same directory, then renames over the target.
    pub fn write_atomic(path: &Path, file: &ConfigFile) -> Result<(), ConfigError> {
        file.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(file).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut out = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        out.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        out.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // =========================================================================
    // Accessors with defaults applied
    // =========================================================================

    /// Engine settings with defaults applied.
    pub fn engine_settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        let Some(engine) = &self.file.engine else {
            return defaults;
        };
        EngineSettings {
            infinite_loop_timeout: engine
                .infinite_loop_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.infinite_loop_timeout),
            report_top_n: engine.report_top_n.unwrap_or(defaults.report_top_n),
        }
    }

    /// State file of the JSON store.
    ///
    /// Defaults to `infragraph-state.json` in the working directory.
    pub fn store_path(&self) -> PathBuf {
        self.file
            .store
            .as_ref()
            .and_then(|s| s.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE))
    }

    /// Build the resource type registry from `[types.*]` sections.
    pub fn type_registry(&self) -> Result<ResourceTypeRegistry, ConfigError> {
        let mut registry = ResourceTypeRegistry::new();
        for (name, section) in &self.file.types {
            let resource_type = ResourceType::new(name.as_str())
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
            registry.register(ResourceDescriptor::new(
                resource_type,
                section.primary_key.iter().cloned(),
            ));
        }
        Ok(registry)
    }
}
