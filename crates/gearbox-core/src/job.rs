//! External job (gear) types.

use crate::file::FileRef;
use crate::ids::{ContainerId, JobId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::Failed | JobState::Cancelled
        )
    }

    /// Pending or running: the job still occupies its destination.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A request to run a gear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub gear_name: String,
    pub inputs: BTreeMap<String, FileRef>,
    pub configs: serde_json::Map<String, serde_json::Value>,
    pub destination: ContainerId,
}

/// Reference to a dispatched job and the last state observed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub gear_name: String,
    pub destination: ContainerId,
    pub submitted_at: DateTime<Utc>,
    pub last_state: JobState,
}

/// A job as listed at a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub gear_name: String,
    pub destination: ContainerId,
    pub state: JobState,
}

/// Gear manifest information needed to validate a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearInfo {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<GearInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearInput {
    pub label: String,
    #[serde(default)]
    pub optional: bool,
}

impl GearInfo {
    pub fn required_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .filter(|i| !i.optional)
            .map(|i| i.label.as_str())
    }
}
