//! Runtime configuration loaded from `veracity.toml`.
//!
//! Every field has a default, so a missing file is a valid configuration.
//! `VERACITY_*` environment variables take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::VeracityError;
use crate::queue::{Backpressure, BackpressureMode};
use crate::telemetry::LogFormat;

pub const DEFAULT_CONFIG_FILE: &str = "veracity.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VeracityConfig {
    /// Address the HTTP server listens on.
    pub bind_addr: String,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Maximum number of queued, not yet started jobs.
    pub queue_capacity: usize,
    /// What submission does when the queue is full.
    pub backpressure: BackpressureMode,
    /// How long a blocking submission waits for a free slot.
    pub submit_timeout_ms: u64,
    /// How long finished jobs stay queryable.
    pub retention_secs: u64,
    /// Period of the retention sweeper.
    pub sweep_interval_secs: u64,
    /// SQLite file holding the audit log.
    pub audit_db_path: PathBuf,
    /// Remote inference endpoint. The offline heuristic is used when unset.
    pub classifier_url: Option<String>,
    pub classifier_timeout_secs: u64,
    /// Upper bound on simultaneous classifier calls; 0 means unbounded.
    pub classifier_concurrency: usize,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl Default for VeracityConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            workers: 2,
            queue_capacity: 64,
            backpressure: BackpressureMode::Reject,
            submit_timeout_ms: 500,
            retention_secs: 3600,
            sweep_interval_secs: 60,
            audit_db_path: PathBuf::from("db/queries.db"),
            classifier_url: None,
            classifier_timeout_secs: 30,
            classifier_concurrency: 0,
            log_format: LogFormat::Json,
            log_level: "info".to_string(),
        }
    }
}

impl VeracityConfig {
    /// Loads `veracity.toml` from the current directory.
    pub fn load() -> Result<Self, VeracityError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Loads the given file, falling back to defaults if it does not exist,
    /// then applies environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, VeracityError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<VeracityConfig>(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("VERACITY_CLASSIFIER_URL")
            && !url.is_empty()
        {
            self.classifier_url = Some(url);
        }
        if let Ok(addr) = std::env::var("VERACITY_BIND_ADDR")
            && !addr.is_empty()
        {
            self.bind_addr = addr;
        }
        if let Ok(db) = std::env::var("VERACITY_AUDIT_DB")
            && !db.is_empty()
        {
            self.audit_db_path = PathBuf::from(db);
        }
    }

    pub fn validate(&self) -> Result<(), VeracityError> {
        if self.workers == 0 {
            return Err(VeracityError::Config("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(VeracityError::Config("queue_capacity must be at least 1".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(VeracityError::Config("sweep_interval_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn backpressure(&self) -> Backpressure {
        match self.backpressure {
            BackpressureMode::Reject => Backpressure::Reject,
            BackpressureMode::Block => Backpressure::Block {
                timeout: Duration::from_millis(self.submit_timeout_ms),
            },
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_secs)
    }
}
