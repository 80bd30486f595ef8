//! Participant visits and their QC state.

use crate::file::FileRef;
use crate::ids::FileId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    Pending,
    Evaluating,
    Pass,
    Fail,
    InReview,
}

impl QcStatus {
    /// Fail and in-review hold back every later visit in a longitudinal chain.
    pub fn is_blocking(&self) -> bool {
        matches!(self, QcStatus::Fail | QcStatus::InReview)
    }

    /// Statuses a walk may start from. An `evaluating` visit was interrupted
    /// mid-walk and is picked up again.
    pub fn awaits_evaluation(&self) -> bool {
        matches!(self, QcStatus::Pending | QcStatus::Evaluating)
    }
}

impl fmt::Display for QcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QcStatus::Pending => "pending",
            QcStatus::Evaluating => "evaluating",
            QcStatus::Pass => "pass",
            QcStatus::Fail => "fail",
            QcStatus::InReview => "in_review",
        };
        f.write_str(s)
    }
}

/// One module submission for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub file: FileRef,
    pub module: String,
    pub visit_date: NaiveDate,
    /// Module-defined tie-break for visits on the same date.
    #[serde(default)]
    pub visit_number: Option<String>,
    pub status: QcStatus,
    /// Reference to the QC error log for this visit.
    #[serde(default)]
    pub error_log: Option<String>,
}

impl Visit {
    pub fn file_id(&self) -> &FileId {
        &self.file.id
    }

    /// Chain order: date, then visit number, then file id.
    pub fn chain_order(&self, other: &Self) -> Ordering {
        self.visit_date
            .cmp(&other.visit_date)
            .then_with(|| self.visit_number.cmp(&other.visit_number))
            .then_with(|| self.file.id.cmp(&other.file.id))
    }
}

/// Resumable progress of a chain walk, stored on the participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainProgress {
    pub module: String,
    pub stage: String,
    pub last_visit: Option<FileId>,
    pub last_status: Option<QcStatus>,
    /// Visit whose blocking status stopped the walk.
    pub halted_at: Option<FileId>,
    pub updated_at: DateTime<Utc>,
}
