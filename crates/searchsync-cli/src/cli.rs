//! CLI argument parsing for searchsync.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// searchsync
///
/// Keeps search indexes in sync with a record store. Dry-run commands read
/// records from a JSON fixture and index into an in-memory backend.
#[derive(Parser, Debug)]
#[command(name = "searchsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/searchsync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Index definitions file (overrides `indexes_file`)
    #[arg(short, long, global = true)]
    pub indexes: Option<String>,

    /// JSON fixture with the data model and records
    #[arg(short, long, global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate settings, index definitions and field names
    CheckConfig,

    /// List indexes and the classes they include
    Indexes {
        /// Show the indexes a class routes to, including inherited ones
        #[arg(long)]
        class: Option<String>,
    },

    /// Print the backend schema of every index as JSON
    Schema,

    /// Reindex the fixture into an in-memory backend
    Reindex {
        /// Override the batch size
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Environment prefix for index names
        #[arg(long)]
        variant: Option<String>,

        /// Print the indexed documents as JSON
        #[arg(long)]
        dump: bool,
    },

    /// Reindex the fixture, then clear one index batch by batch
    Clear {
        /// Index to clear
        index: String,

        /// Override the batch size
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Attempt budget (default: batches needed plus one)
        #[arg(long)]
        max_attempts: Option<usize>,
    },
}
