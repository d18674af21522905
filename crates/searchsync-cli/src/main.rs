//! searchsync
//!
//! # Usage
//!
//! ```bash
//! searchsync --indexes indexes.toml check-config
//! searchsync --indexes indexes.toml --data fixture.json indexes --class Page
//! searchsync --indexes indexes.toml schema
//! searchsync --indexes indexes.toml --data fixture.json reindex --dump
//! searchsync --indexes indexes.toml --data fixture.json clear main
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/searchsync/config.toml)
//! 3. Environment variables (SEARCHSYNC_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use searchsync_cli::{init_logging, load_settings, run, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(cli, settings, &mut out)
}
