//! Batch scheduling configuration.

use crate::config::load_document;
use crate::ids::ContainerId;
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The persisted batch config: which gear to replay and how to cut the
/// population into batches.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchConfig {
    /// Label of the source containers that define the population.
    pub source: String,
    /// Label of the target containers. Defaults to `source`.
    #[serde(default)]
    pub target: Option<String>,
    /// Replace `{{source}}`/`{{target}}` in string gear configs.
    #[serde(default)]
    pub substitute: bool,
    pub batch_mode: BatchMode,
    pub batch_size: u64,
    pub gear_name: String,
    #[serde(default)]
    pub gear_configs: serde_json::Map<String, serde_json::Value>,
    /// Config key under which each batch job receives its member identifiers.
    #[serde(default = "default_unit_config_key")]
    pub unit_config_key: String,
}

fn default_unit_config_key() -> String {
    "work_units".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Batch size counts work units.
    Projects,
    /// Batch size bounds the cumulative acquisition file count.
    Files,
}

impl BatchConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = load_document(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(Error::Configuration("batch config: source is empty".into()));
        }
        if self.gear_name.trim().is_empty() {
            return Err(Error::Configuration("batch config: gear_name is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Configuration(
                "batch config: batch_size must be positive".into(),
            ));
        }
        if self.unit_config_key.trim().is_empty() {
            return Err(Error::Configuration(
                "batch config: unit_config_key is empty".into(),
            ));
        }
        Ok(())
    }

    pub fn target_label(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.source)
    }
}

/// Per-invocation options for a batch run. Filter lists are plain values
/// handed to the scheduler; nothing here is read from ambient state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchRunOptions {
    /// Container the batch jobs run against.
    pub destination: ContainerId,
    /// Skip units with a run of the gear within this many days. `-1` disables.
    #[serde(default = "default_time_interval")]
    pub time_interval_days: i64,
    #[serde(default)]
    pub retry_on_failure: bool,
    /// Total attempts per batch when `retry_on_failure` is set.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub exclude_centers: Vec<String>,
    #[serde(default)]
    pub exclude_studies: Vec<String>,
    #[serde(default)]
    pub include_centers: Vec<String>,
    #[serde(default)]
    pub include_studies: Vec<String>,
    /// Deadline for one batch job to reach a terminal state.
    #[serde(default = "default_poll_deadline")]
    pub poll_deadline_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub notify: Option<NotifyTarget>,
}

fn default_time_interval() -> i64 {
    7
}

fn default_max_attempts() -> u32 {
    2
}

fn default_poll_deadline() -> u64 {
    6 * 60 * 60
}

impl BatchRunOptions {
    pub fn new(destination: ContainerId) -> Self {
        Self {
            destination,
            time_interval_days: default_time_interval(),
            retry_on_failure: false,
            max_attempts: default_max_attempts(),
            exclude_centers: vec![],
            exclude_studies: vec![],
            include_centers: vec![],
            include_studies: vec![],
            poll_deadline_secs: default_poll_deadline(),
            dry_run: false,
            notify: None,
        }
    }

    /// Attempts allowed per batch.
    pub fn attempts(&self) -> u32 {
        if self.retry_on_failure {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.time_interval_days < -1 {
            return Err(Error::Configuration(format!(
                "time interval must be -1 or non-negative, got {}",
                self.time_interval_days
            )));
        }
        Ok(())
    }
}

/// Sender and recipients of failure notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NotifyTarget {
    pub sender: String,
    pub recipients: Vec<String>,
}
