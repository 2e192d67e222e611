//! apply command - Execute a changes batch as one transaction

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::open_store;
use crate::cli::Context;
use crate::engine::{AuditLog, ChangeExecutor, ChangesBatch, HandlerRegistry, UserIdentity};

/// Apply a changes batch.
pub fn apply(
    ctx: &Context,
    file: &Path,
    dry_run: bool,
    json: bool,
    user: Option<&str>,
    audit_log: Option<&Path>,
) -> Result<()> {
    let changes = read_batch(file)?;
    let store = open_store(ctx)?;

    let user_name = user
        .map(str::to_string)
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string());
    let audit = Arc::new(AuditLog::new().with_identity(UserIdentity::new("user", user_name)));

    let executor = ChangeExecutor::new(store, HandlerRegistry::new())
        .with_settings(ctx.config.engine_settings())
        .with_hook(audit.clone());

    let summary = match executor.execute(changes) {
        Ok(summary) => summary,
        Err(err) => {
            // The audit trail records rollbacks too
            if let Some(path) = audit_log {
                if let Err(audit_err) = append_audit(path, &audit) {
                    tracing::warn!(error = %audit_err, "audit log not written");
                }
            }
            return Err(anyhow::Error::new(err).context("Transaction rolled back"));
        }
    };

    // Committed entries are only written once the state is on disk
    if dry_run {
        tracing::debug!(tx = %summary.tx_id, "dry run, state and audit log not saved");
    } else {
        if summary.changed() {
            let store = executor.into_store()?;
            store.persist().context("Failed to save state")?;
        }
        if let Some(path) = audit_log {
            append_audit(path, &audit)?;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    if ctx.quiet {
        return Ok(());
    }

    let c = &summary.counters;
    println!(
        "{} transaction {} ({} passes, {} handler calls)",
        if dry_run { "Checked" } else { "Committed" },
        summary.tx_id,
        c.passes,
        c.handler_calls
    );
    println!(
        "  resources: +{} ~{} -{}",
        c.resources_added, c.resources_updated, c.resources_deleted
    );
    println!("  links:     +{} -{}", c.links_added, c.links_deleted);
    println!("  tags:      +{} -{}", c.tags_added, c.tags_deleted);
    if dry_run {
        println!("Dry run: state not saved.");
    }
    Ok(())
}

fn read_batch(file: &Path) -> Result<ChangesBatch> {
    let contents = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read batch from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read batch file {}", file.display()))?
    };
    serde_json::from_str(&contents).context("Invalid changes batch")
}

fn append_audit(path: &Path, audit: &AuditLog) -> Result<()> {
    let lines = audit.to_json_lines()?;
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open audit log {}", path.display()))?;
    out.write_all(lines.as_bytes())
        .with_context(|| format!("Failed to write audit log {}", path.display()))?;
    Ok(())
}
