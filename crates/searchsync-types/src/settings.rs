//! Settings loading for searchsync.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/searchsync/config.toml.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::index::{load_index_definitions, IndexDefinitions};

/// Runtime settings for the indexing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Global indexing switch; when false no document is considered indexable
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Documents per chunk
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Run jobs inline instead of handing them to the queue
    #[serde(default)]
    pub use_sync_jobs: bool,

    /// Prepend crawled page content as a `page_content` field
    #[serde(default)]
    pub crawl_page_content: bool,

    /// Keep markup in crawled page content
    #[serde(default)]
    pub include_page_html: bool,

    /// Environment prefix applied to backend index names
    #[serde(default)]
    pub index_variant: Option<String>,

    /// Wire field holding the document identifier
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Wire field holding the source class discriminator
    #[serde(default = "default_source_class_field")]
    pub source_class_field: String,

    /// Maximum serialized document size in bytes (0 = unlimited)
    #[serde(default)]
    pub max_document_size: usize,

    /// Compute dependent documents for changed records
    #[serde(default = "default_true")]
    pub auto_dependency_tracking: bool,

    /// Fail a run whose dependency recursion goes deeper than this
    #[serde(default)]
    pub max_dependency_depth: Option<usize>,

    /// Skip documents already processed earlier in the same run
    #[serde(default)]
    pub dependency_cycle_guard: bool,

    /// Reject user fields that collide with id/meta/discriminator fields
    #[serde(default = "default_true")]
    pub reject_reserved_field_collisions: bool,

    /// Attempts per queued job step before the job is marked failed
    #[serde(default = "default_job_max_attempts")]
    pub job_max_attempts: u32,

    /// Queue worker poll interval
    #[serde(default = "default_poll_interval")]
    pub worker_poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// TOML file with index definitions
    #[serde(default)]
    pub indexes_file: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    100
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_source_class_field() -> String {
    "source_class".to_string()
}

fn default_job_max_attempts() -> u32 {
    3
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: default_batch_size(),
            use_sync_jobs: false,
            crawl_page_content: false,
            include_page_html: false,
            index_variant: None,
            id_field: default_id_field(),
            source_class_field: default_source_class_field(),
            max_document_size: 0,
            auto_dependency_tracking: true,
            max_dependency_depth: None,
            dependency_cycle_guard: false,
            reject_reserved_field_collisions: true,
            job_max_attempts: default_job_max_attempts(),
            worker_poll_interval_ms: default_poll_interval(),
            log_level: default_log_level(),
            indexes_file: None,
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/searchsync/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (SEARCHSYNC_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "searchsync")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("batch_size", default_batch_size() as i64)
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("id_field", default_id_field())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("source_class_field", default_source_class_field())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SEARCHSYNC_BATCH_SIZE, SEARCHSYNC_USE_SYNC_JOBS, ...
        builder = builder.add_source(
            Environment::with_prefix("SEARCHSYNC")
                .prefix_separator("_")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Load("batch_size must be > 0".to_string()));
        }
        if self.job_max_attempts == 0 {
            return Err(ConfigError::Load("job_max_attempts must be > 0".to_string()));
        }
        if self.id_field == self.source_class_field {
            return Err(ConfigError::Load(
                "id_field and source_class_field must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Load the index definitions referenced by `indexes_file`.
    ///
    /// Returns an empty set when no file is configured.
    pub fn index_definitions(&self) -> Result<IndexDefinitions, ConfigError> {
        match &self.indexes_file {
            Some(path) => load_index_definitions(path),
            None => Ok(IndexDefinitions::new()),
        }
    }

    /// Backend name for a logical index, with the environment prefix applied.
    pub fn environment_index_name(&self, index: &str) -> String {
        match self.index_variant.as_deref() {
            Some(variant) if !variant.is_empty() => format!("{}-{}", variant, index),
            _ => index.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.enabled);
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.id_field, "id");
        assert_eq!(settings.source_class_field, "source_class");
        assert!(settings.auto_dependency_tracking);
        assert!(settings.max_dependency_depth.is_none());
        assert!(!settings.dependency_cycle_guard);
        assert!(settings.reject_reserved_field_collisions);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "batch_size = 25").unwrap();
        writeln!(file, "use_sync_jobs = true").unwrap();
        writeln!(file, "index_variant = \"staging\"").unwrap();

        let settings = Settings::load(Some(&file.path().to_string_lossy())).unwrap();
        assert_eq!(settings.batch_size, 25);
        assert!(settings.use_sync_jobs);
        assert_eq!(settings.index_variant.as_deref(), Some("staging"));
        assert_eq!(settings.id_field, "id");
    }

    #[test]
    fn test_load_rejects_zero_batch_size() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "batch_size = 0").unwrap();

        let err = Settings::load(Some(&file.path().to_string_lossy())).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_environment_index_name() {
        let mut settings = Settings::default();
        assert_eq!(settings.environment_index_name("main"), "main");

        settings.index_variant = Some("prod".to_string());
        assert_eq!(settings.environment_index_name("main"), "prod-main");

        settings.index_variant = Some(String::new());
        assert_eq!(settings.environment_index_name("main"), "main");
    }

    #[test]
    fn test_index_definitions_without_file() {
        let settings = Settings::default();
        assert!(settings.index_definitions().unwrap().is_empty());
    }
}
