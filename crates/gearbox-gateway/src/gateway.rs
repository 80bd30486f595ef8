//! Starting gears and observing their jobs through the platform.

use crate::poll::PollPolicy;
use chrono::Utc;
use gearbox_core::file::FileRef;
use gearbox_core::ids::ContainerId;
use gearbox_core::job::{JobHandle, JobRequest, JobState};
use gearbox_core::ports::JobPlatform;
use gearbox_core::{DispatchError, Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const ACTIVE_STATES: [JobState; 2] = [JobState::Pending, JobState::Running];

pub struct JobGateway {
    platform: Arc<dyn JobPlatform>,
    poll: PollPolicy,
}

impl JobGateway {
    pub fn new(platform: Arc<dyn JobPlatform>, poll: PollPolicy) -> Self {
        Self { platform, poll }
    }

    /// Start a gear. Fails with a [`DispatchError`] if the gear is unknown,
    /// a required input is missing, or the destination is not writable.
    pub async fn start(
        &self,
        job_name: &str,
        inputs: BTreeMap<String, FileRef>,
        configs: serde_json::Map<String, serde_json::Value>,
        destination: &ContainerId,
    ) -> Result<JobHandle> {
        let gear = self
            .platform
            .gear(job_name)
            .await?
            .ok_or_else(|| DispatchError::UnknownJob(job_name.to_string()))?;

        if let Some(label) = gear.required_inputs().find(|l| !inputs.contains_key(*l)) {
            return Err(DispatchError::MissingInput {
                job: job_name.to_string(),
                label: label.to_string(),
            }
            .into());
        }

        if !self.platform.can_write(destination).await? {
            return Err(DispatchError::NotWritable(destination.clone()).into());
        }

        let request = JobRequest {
            gear_name: job_name.to_string(),
            inputs,
            configs,
            destination: destination.clone(),
        };

        let id = self.platform.submit(&request).await.map_err(|e| {
            warn!(gear = %job_name, %destination, error = %e, "Job submission rejected");
            DispatchError::Rejected {
                job: job_name.to_string(),
                reason: e.to_string(),
            }
        })?;

        info!(gear = %job_name, %destination, job = %id, "Job started");

        Ok(JobHandle {
            id,
            gear_name: job_name.to_string(),
            destination: destination.clone(),
            submitted_at: Utc::now(),
            last_state: JobState::Pending,
        })
    }

    /// Observe the job's current state once.
    pub async fn poll(&self, handle: &mut JobHandle) -> Result<JobState> {
        let state = self.platform.job_state(&handle.id).await?;
        handle.last_state = state;
        Ok(state)
    }

    /// Poll with backoff until the job is terminal. Exceeding `deadline` is a
    /// [`Error::PollTimeout`]; the job itself is left running.
    pub async fn wait(&self, handle: &mut JobHandle, deadline: Duration) -> Result<JobState> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            let state = self.poll(handle).await?;
            if state.is_terminal() {
                debug!(job = %handle.id, %state, polls = attempt + 1, "Job reached terminal state");
                return Ok(state);
            }

            let elapsed = started.elapsed();
            if elapsed >= deadline {
                warn!(job = %handle.id, gear = %handle.gear_name, "Poll deadline exceeded");
                return Err(Error::PollTimeout {
                    job: handle.id.to_string(),
                    waited_secs: elapsed.as_secs(),
                });
            }

            let delay = self.poll.delay(attempt).min(deadline - elapsed);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// True if a pending or running job of this gear exists at the destination.
    pub async fn is_active(&self, job_name: &str, destination: &ContainerId) -> Result<bool> {
        let jobs = self.platform.list_jobs(destination, &ACTIVE_STATES).await?;
        Ok(jobs.iter().any(|j| j.gear_name == job_name))
    }
}
