//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this config file instead of the default search
//! - `--state <path>`: Use this state file instead of the configured one
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// infragraph - transactional reconciliation of infrastructure resource graphs
#[derive(Parser, Debug)]
#[command(name = "infragraph")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: $INFRAGRAPH_CONFIG, then
    /// $XDG_CONFIG_HOME/infragraph/config.toml, then ~/.infragraph/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// State file of the resource store
    #[arg(long, global = true, value_name = "PATH")]
    pub state: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a changes batch as one transaction
    #[command(
        name = "apply",
        long_about = "Apply a changes batch as one transaction.\n\n\
            The batch is a JSON document listing resources, links and tags to add, \
            update, delete or refresh. It is applied atomically: if any step fails, \
            or the reconcile loop does not settle before the configured timeout, \
            the state file is left untouched.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Apply a batch from a file
    infragraph apply changes.json

    # Read the batch from stdin
    cat changes.json | infragraph apply -

    # See what a batch would do without saving
    infragraph apply changes.json --dry-run --json

BATCH FORMAT:
    {
      \"resources_to_add\": [{\"type\": \"Machine\", \"properties\": {\"name\": \"h1\"}}],
      \"links_to_add\": [{
        \"from\": {\"type\": \"Machine\", \"properties\": {\"name\": \"h1\"}},
        \"link_type\": \"INSTALLED_ON\",
        \"to\": {\"id\": 4, \"type\": \"Domain\"}
      }],
      \"tags_to_add\": [{\"resource\": {\"id\": 4, \"type\": \"Domain\"}, \"tag\": \"prod\"}]
    }"
    )]
    Apply {
        /// Batch file, or `-` for stdin
        file: PathBuf,

        /// Run the transaction but do not save the result
        #[arg(long)]
        dry_run: bool,

        /// Print the execution summary as JSON
        #[arg(long)]
        json: bool,

        /// Acting user recorded in the audit log
        #[arg(long, value_name = "NAME")]
        user: Option<String>,

        /// Append audit entries (JSON lines) to this file once the state is
        /// saved or the transaction rolled back. Dry runs write nothing.
        #[arg(long, value_name = "PATH")]
        audit_log: Option<PathBuf>,
    },

    /// List resources matching a filter
    #[command(
        name = "query",
        after_help = "\
WORKFLOW EXAMPLES:
    # Every resource
    infragraph query

    # Machines tagged prod
    infragraph query --type Machine --tag prod

    # Property equality (values parse as JSON, else as strings)
    infragraph query --type Website --prop port=443"
    )]
    Query {
        /// Resource type
        #[arg(long = "type", value_name = "TYPE")]
        resource_type: Option<String>,

        /// Required tag (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,

        /// Required property value as NAME=VALUE (repeatable)
        #[arg(long = "prop", value_name = "NAME=VALUE")]
        properties: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one resource with its tags and links
    Show {
        /// Resource id (`7` or `#7`)
        id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the path of the loaded configuration file
    Path,
    /// Write a starter configuration file
    Init {
        /// Target path (default: ~/.infragraph/config.toml)
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
