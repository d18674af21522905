//! Command implementations.
//!
//! Every command writes its report to the given writer so that it can be
//! exercised from tests; logging goes through tracing.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use searchsync_indexing::{
    DataModel, InMemoryBackend, IndexService, MemoryStore, StoreFixture, SyncContext,
};
use searchsync_jobs::{ClearIndexJob, LoggingProgressCallback, ReindexJob, SyncRunner};
use searchsync_types::{Settings, WireDocument};
use tracing::info;

use crate::cli::{Cli, Commands};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Load settings and apply the global CLI overrides.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        settings.log_level = level.clone();
    }
    if let Some(indexes) = &cli.indexes {
        settings.indexes_file = Some(indexes.clone());
    }
    Ok(settings)
}

/// Read a JSON store fixture.
pub fn load_fixture(path: &Path) -> Result<StoreFixture> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse fixture {}", path.display()))
}

/// A context over fixture data and an in-memory backend.
pub struct DryRun {
    pub ctx: Arc<SyncContext>,
    pub backend: Arc<InMemoryBackend>,
}

impl DryRun {
    pub fn new(settings: Settings, data: Option<&Path>) -> Result<Self> {
        let fixture = match data {
            Some(path) => load_fixture(path)?,
            None => StoreFixture::default(),
        };
        let model: DataModel = fixture.model.clone();
        let store = MemoryStore::from_fixture(fixture);
        let backend = Arc::new(InMemoryBackend::new(settings.id_field.clone()));
        let ctx = SyncContext::builder(settings, model)
            .with_store(Arc::new(store))
            .with_backend(backend.clone())
            .build()
            .context("Invalid index configuration")?;
        Ok(Self { ctx, backend })
    }

    /// Stored documents per backend index.
    pub fn documents(&self) -> BTreeMap<String, Vec<WireDocument>> {
        self.backend
            .index_names()
            .into_iter()
            .map(|index| {
                let docs = self
                    .backend
                    .ids(&index)
                    .iter()
                    .filter_map(|id| self.backend.document(&index, id))
                    .collect();
                (index, docs)
            })
            .collect()
    }
}

pub fn check_config(settings: Settings, data: Option<&Path>, out: &mut dyn Write) -> Result<()> {
    let run = DryRun::new(settings, data)?;
    let configuration = run.ctx.configuration();
    for class in configuration.searchable_classes() {
        configuration
            .fields_for_class(&class)
            .with_context(|| format!("Invalid fields for class {}", class))?;
    }
    let schemas = IndexService::new(run.ctx.clone()).schema()?;
    if schemas.is_empty() {
        bail!("No indexes configured; set indexes_file or pass --indexes");
    }

    writeln!(
        out,
        "Configuration OK: {} indexes, {} searchable classes",
        schemas.len(),
        configuration.searchable_classes().len()
    )?;
    Ok(())
}

pub fn show_indexes(
    settings: Settings,
    data: Option<&Path>,
    class: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    let run = DryRun::new(settings, data)?;
    let configuration = run.ctx.configuration();

    if let Some(class) = class {
        let selection = configuration.indexes_for_class(class);
        if selection.is_empty() {
            writeln!(out, "{} is not indexed", class)?;
        }
        for index in selection.keys() {
            writeln!(out, "{}", index)?;
        }
        return Ok(());
    }

    for (index, definition) in configuration.definitions() {
        let classes: Vec<String> = definition
            .include_classes
            .iter()
            .map(|(class, spec)| {
                if spec.is_excluded() {
                    format!("!{}", class)
                } else {
                    class.clone()
                }
            })
            .collect();
        writeln!(out, "{}: {}", index, classes.join(", "))?;
    }
    Ok(())
}

pub fn show_schema(settings: Settings, data: Option<&Path>, out: &mut dyn Write) -> Result<()> {
    let run = DryRun::new(settings, data)?;
    let schemas = IndexService::new(run.ctx.clone()).schema()?;
    writeln!(out, "{}", serde_json::to_string_pretty(&schemas)?)?;
    Ok(())
}

fn run_reindex(run: &DryRun, out: Option<&mut dyn Write>) -> Result<()> {
    let mut job = ReindexJob::new(run.ctx.clone()).with_progress(Box::new(LoggingProgressCallback));
    let summary = SyncRunner::new().run(&mut job)?;
    if let Some(out) = out {
        for step in &summary.steps {
            writeln!(out, "{}", step)?;
        }
        writeln!(out, "{}", summary)?;
    }
    Ok(())
}

pub fn reindex(
    settings: Settings,
    data: Option<&Path>,
    dump: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let run = DryRun::new(settings, data)?;
    run_reindex(&run, Some(&mut *out))?;
    if dump {
        writeln!(out, "{}", serde_json::to_string_pretty(&run.documents())?)?;
    }
    Ok(())
}

pub fn clear(
    settings: Settings,
    data: Option<&Path>,
    index: &str,
    max_attempts: Option<usize>,
    out: &mut dyn Write,
) -> Result<()> {
    let run = DryRun::new(settings, data)?;
    if !run.ctx.configuration().index_names().iter().any(|i| i == index) {
        bail!("Unknown index: {}", index);
    }
    run_reindex(&run, None)?;

    let mut job = ClearIndexJob::new(run.ctx.clone(), index);
    if let Some(attempts) = max_attempts {
        job = job.with_max_attempts(attempts);
    }
    let summary = SyncRunner::new().run(&mut job)?;
    for step in &summary.steps {
        writeln!(out, "{}", step)?;
    }
    info!(index, steps = summary.step_count(), "Index cleared");
    Ok(())
}

/// Run a parsed command line with settings from [`load_settings`].
pub fn run(cli: Cli, mut settings: Settings, out: &mut dyn Write) -> Result<()> {
    let data = cli.data.as_deref();

    match cli.command {
        Commands::CheckConfig => check_config(settings, data, out),
        Commands::Indexes { class } => show_indexes(settings, data, class.as_deref(), out),
        Commands::Schema => show_schema(settings, data, out),
        Commands::Reindex {
            batch_size,
            variant,
            dump,
        } => {
            if let Some(batch_size) = batch_size {
                settings.batch_size = batch_size;
            }
            if variant.is_some() {
                settings.index_variant = variant;
            }
            reindex(settings, data, dump, out)
        }
        Commands::Clear {
            index,
            batch_size,
            max_attempts,
        } => {
            if let Some(batch_size) = batch_size {
                settings.batch_size = batch_size;
            }
            clear(settings, data, &index, max_attempts, out)
        }
    }
}
