//! Error types for the orchestration core.

use crate::ids::ContainerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors abort before any dispatch.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dispatch rejected: {0}")]
    Dispatch(#[from] DispatchError),

    // System errors (retryable)
    #[error("Job {job} did not reach a terminal state within {waited_secs}s")]
    PollTimeout { job: String, waited_secs: u64 },

    #[error("Job {job} ended in state {state}")]
    JobFailed { job: String, state: String },

    // Platform errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons the job trigger gateway refuses to start a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("missing required input '{label}' for job {job}")]
    MissingInput { job: String, label: String },

    #[error("destination {0} is not writable")]
    NotWritable(ContainerId),

    #[error("platform rejected job {job}: {reason}")]
    Rejected { job: String, reason: String },
}

impl Error {
    /// True for failures of the infrastructure rather than of the data:
    /// crashed jobs, timeouts, and transport faults. These are retried.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            Error::PollTimeout { .. }
                | Error::JobFailed { .. }
                | Error::Platform(_)
                | Error::Network(_)
                | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_classification() {
        let timeout = Error::PollTimeout {
            job: "j1".into(),
            waited_secs: 30,
        };
        assert!(timeout.is_system());
        assert!(!Error::Configuration("bad".into()).is_system());
        assert!(!Error::from(DispatchError::UnknownJob("qc".into())).is_system());
    }
}
