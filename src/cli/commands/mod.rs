//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Opens the state file through [`open_store`]
//! 3. Calls the engine (or reads the store) and formats output
//!
//! Handlers do NOT mutate the store directly; `apply` goes through
//! [`crate::engine::ChangeExecutor`].

mod apply;
mod config_cmd;
mod query;
mod show;

pub use apply::apply;
pub use config_cmd::{init as config_init, path as config_path, show as config_show};
pub use query::query;
pub use show::show;

use anyhow::{Context as _, Result};

use super::args::{Command, ConfigAction};
use super::Context;
use crate::store::JsonFileStore;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Apply {
            file,
            dry_run,
            json,
            user,
            audit_log,
        } => apply::apply(
            ctx,
            &file,
            dry_run,
            json,
            user.as_deref(),
            audit_log.as_deref(),
        ),
        Command::Query {
            resource_type,
            tags,
            properties,
            json,
        } => query::query(ctx, resource_type.as_deref(), &tags, &properties, json),
        Command::Show { id, json } => show::show(ctx, &id, json),
        Command::Config { action } => match action {
            ConfigAction::Show => config_cmd::show(ctx),
            ConfigAction::Path => config_cmd::path(ctx),
            ConfigAction::Init { path, force } => config_cmd::init(path, force, ctx.quiet),
        },
    }
}

/// Open and lock the configured state file.
pub(crate) fn open_store(ctx: &Context) -> Result<JsonFileStore> {
    let types = ctx
        .config
        .type_registry()
        .context("Invalid resource types in configuration")?;
    JsonFileStore::open(&ctx.state_path, types)
        .with_context(|| format!("Failed to open state file {}", ctx.state_path.display()))
}
