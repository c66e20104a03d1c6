//! Configuration types for svip-migrate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main migration configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source store configuration.
    #[serde(default)]
    pub source: SourceConfig,
    /// Migration options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Source MongoDB configuration.
///
/// Destination collections live in the same database as the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Connection string (mongodb://host:port).
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Database holding both the source and the per-year collections.
    #[serde(default = "default_database")]
    pub database: String,
    /// Collection containing closure records with embedded checkins.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Index used to speed up the initial count.
    #[serde(default = "default_count_hint")]
    pub count_hint: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            collection: default_collection(),
            count_hint: default_count_hint(),
        }
    }
}

/// Migration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Maximum number of closure records migrated concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-insert timeout in seconds (0 = no timeout).
    #[serde(default = "default_insert_timeout_secs")]
    pub insert_timeout_secs: u64,
    /// Dry run mode (read and transform, don't write).
    #[serde(default)]
    pub dry_run: bool,
    /// Abort the run when the initial count fails.
    #[serde(default)]
    pub strict_count: bool,
    /// Retries for connect, health check and count.
    #[serde(default = "default_setup_retries")]
    pub setup_retries: u32,
    /// Where to write the JSON run report.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            insert_timeout_secs: default_insert_timeout_secs(),
            dry_run: false,
            strict_count: false,
            setup_retries: default_setup_retries(),
            report_path: None,
        }
    }
}

impl MigrationOptions {
    /// Per-insert timeout, `None` when disabled.
    #[must_use]
    pub fn insert_timeout(&self) -> Option<Duration> {
        (self.insert_timeout_secs > 0).then(|| Duration::from_secs(self.insert_timeout_secs))
    }
}

fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "server_svip".to_string()
}

fn default_collection() -> String {
    "cierre".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_count_hint() -> Option<String> {
    Some("_id_".to_string())
}

fn default_concurrency() -> usize {
    20
}

fn default_insert_timeout_secs() -> u64 {
    30
}

fn default_setup_retries() -> u32 {
    3
}

impl MigrationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.options.concurrency == 0 {
            return Err(crate::error::Error::Config(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if !self.source.uri.starts_with("mongodb://")
            && !self.source.uri.starts_with("mongodb+srv://")
        {
            return Err(crate::error::Error::Config(format!(
                "Invalid URI scheme in '{}'. Allowed: mongodb, mongodb+srv",
                self.source.uri
            )));
        }
        if self.source.database.is_empty() {
            return Err(crate::error::Error::Config(
                "database name cannot be empty".to_string(),
            ));
        }
        if self.source.collection.is_empty() {
            return Err(crate::error::Error::Config(
                "collection name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
