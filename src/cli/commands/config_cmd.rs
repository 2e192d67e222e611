//! config command - Show, locate, or create the configuration file

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};

use crate::cli::Context;
use crate::core::config::{
    Config, ConfigFile, EngineSection, DEFAULT_INFINITE_LOOP_TIMEOUT_MS, DEFAULT_REPORT_TOP_N,
};

/// Print the effective configuration.
pub fn show(ctx: &Context) -> Result<()> {
    let settings = ctx.config.engine_settings();

    println!("# Effective Configuration");
    match ctx.config.path() {
        Some(path) => println!("source = {}", path.display()),
        None => println!("source = (defaults)"),
    }
    println!("state = {}", ctx.state_path.display());
    println!(
        "engine.infinite_loop_timeout_ms = {}",
        settings.infinite_loop_timeout.as_millis()
    );
    println!("engine.report_top_n = {}", settings.report_top_n);

    if ctx.config.file.types.is_empty() {
        println!("types = (none)");
    }
    for (name, section) in &ctx.config.file.types {
        println!("types.{}.primary_key = {:?}", name, section.primary_key);
    }
    Ok(())
}

/// Print where the configuration was loaded from.
pub fn path(ctx: &Context) -> Result<()> {
    match ctx.config.path() {
        Some(path) => println!("{}", path.display()),
        None => {
            if !ctx.quiet {
                println!("(no configuration file; using defaults)");
            }
        }
    }
    Ok(())
}

/// Write a starter configuration file.
pub fn init(path: Option<PathBuf>, force: bool, quiet: bool) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => Config::default_config_path()?,
    };
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }

    let file = ConfigFile {
        engine: Some(EngineSection {
            infinite_loop_timeout_ms: Some(DEFAULT_INFINITE_LOOP_TIMEOUT_MS),
            report_top_n: Some(DEFAULT_REPORT_TOP_N),
        }),
        ..ConfigFile::default()
    };
    Config::write_atomic(&path, &file)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if !quiet {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
