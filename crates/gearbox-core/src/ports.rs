//! Port traits (hexagonal architecture).
//!
//! These traits define the boundary between the orchestration core and the
//! container platform, the job system, and the notification channel.

use crate::file::{FileError, FileRef};
use crate::ids::{ContainerId, FileId, JobId};
use crate::job::{GearInfo, JobRequest, JobState, JobSummary};
use crate::notification::Notification;
use crate::provenance::ProvenanceRecord;
use crate::visit::{ChainProgress, QcStatus, Visit};
use crate::work_unit::WorkUnit;
use crate::Result;
use async_trait::async_trait;

/// The platform's job system.
#[async_trait]
pub trait JobPlatform: Send + Sync {
    /// Look up a gear by name. `None` if the platform has no such gear.
    async fn gear(&self, name: &str) -> Result<Option<GearInfo>>;

    /// Submit a job. Returns the platform's job id.
    async fn submit(&self, request: &JobRequest) -> Result<JobId>;

    /// Current state of a job.
    async fn job_state(&self, id: &JobId) -> Result<JobState>;

    /// Jobs at a destination whose state is one of `states`.
    async fn list_jobs(
        &self,
        destination: &ContainerId,
        states: &[JobState],
    ) -> Result<Vec<JobSummary>>;

    /// Whether jobs may write outputs to the destination.
    async fn can_write(&self, destination: &ContainerId) -> Result<bool>;
}

/// The periodically refreshed center metadata record.
#[async_trait]
pub trait CenterDirectory: Send + Sync {
    /// All work units whose source container carries the given label.
    async fn work_units(&self, source: &str) -> Result<Vec<WorkUnit>>;
}

/// File objects and their metadata.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn file(&self, id: &FileId) -> Result<FileRef>;

    /// Find a file by name in a container.
    async fn find_file(&self, container: &ContainerId, name: &str) -> Result<Option<FileRef>>;

    /// Record an error against a file so its uploader can see it.
    async fn add_file_error(&self, file: &FileId, error: &FileError) -> Result<()>;
}

/// Visit records and QC metadata for participants.
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// All visits of a participant for one module, in no particular order.
    async fn visits(&self, participant: &ContainerId, module: &str) -> Result<Vec<Visit>>;

    async fn set_qc_status(&self, file: &FileId, status: QcStatus) -> Result<()>;

    /// QC outcome reported by the last QC-check job for a file.
    async fn qc_result(&self, file: &FileId) -> Result<Option<QcStatus>>;

    async fn write_progress(&self, participant: &ContainerId, progress: &ChainProgress)
    -> Result<()>;
}

/// Append-only provenance log.
#[async_trait]
pub trait ProvenanceLog: Send + Sync {
    /// Append a record. Fails with `AlreadyExists` if its id was written before.
    async fn append(&self, record: &ProvenanceRecord) -> Result<()>;
}

/// Notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}
