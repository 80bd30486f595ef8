//! Write-once provenance records for aggregation runs.

use crate::ids::{ProvenanceId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub id: ProvenanceId,
    pub run_id: RunId,
    pub generated_by: GeneratorIdentity,
    pub created_at: DateTime<Utc>,
    pub sources: Vec<SourceVersion>,
}

/// The job that generated a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorIdentity {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceVersion {
    pub source: String,
    pub version: String,
}
