//! cli
//!
//! Command-line interface layer for infragraph.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and resolve the state file
//! - Delegate to command handlers
//! - Does NOT mutate the store directly
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to the
//! [`crate::engine`] for execution. All state changes flow through
//! [`crate::engine::ChangeExecutor`].

pub mod args;
pub mod commands;

pub use args::Cli;

use args::{Command, ConfigAction};

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use crate::core::config::Config;

/// Execution context for commands.
///
/// Global settings derived from CLI flags and the loaded configuration.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded configuration (defaults if no file was found).
    pub config: Config,
    /// State file of the JSON store.
    pub state_path: PathBuf,
    /// Debug logging enabled.
    pub debug: bool,
    /// Quiet mode (minimal output).
    pub quiet: bool,
}

impl Context {
    /// Build the context from parsed flags.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
        let state_path = cli
            .state
            .clone()
            .unwrap_or_else(|| config.store_path());
        Ok(Self {
            config,
            state_path,
            debug: cli.debug,
            quiet: cli.quiet,
        })
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    // `config init` must work before any config file exists
    if let Command::Config {
        action: ConfigAction::Init { path, force },
    } = &cli.command
    {
        let target = path.clone().or_else(|| cli.config.clone());
        return commands::config_init(target, *force, cli.quiet);
    }

    let ctx = Context::from_cli(&cli)?;
    tracing::debug!(
        config = ?ctx.config.path(),
        state = %ctx.state_path.display(),
        "resolved context"
    );
    commands::dispatch(cli.command, &ctx)
}
