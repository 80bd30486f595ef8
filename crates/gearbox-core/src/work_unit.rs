//! Schedulable population members.

use crate::ids::ContainerId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One member of a scheduling population: a center, or a center+study pair,
/// resolved to the container that holds its source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkUnit {
    /// Center identifier (e.g. `"alpha"`).
    pub center_id: String,
    /// Study suffix when the unit is a center+study pair.
    #[serde(default)]
    pub study_id: Option<String>,
    /// Source container for this unit.
    pub container: ContainerId,
    /// Label of the source container (e.g. `"ingest-form-adrc"`).
    pub label: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Last successful run of each gear against this unit.
    #[serde(default)]
    pub last_runs: HashMap<String, DateTime<Utc>>,
    /// Acquisition files currently eligible for processing.
    #[serde(default)]
    pub file_count: u64,
}

impl WorkUnit {
    /// Human-readable identifier, `center` or `center/study`.
    pub fn key(&self) -> String {
        match &self.study_id {
            Some(study) => format!("{}/{}", self.center_id, study),
            None => self.center_id.clone(),
        }
    }

    pub fn last_run(&self, gear_name: &str) -> Option<DateTime<Utc>> {
        self.last_runs.get(gear_name).copied()
    }
}
