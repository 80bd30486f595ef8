//! In-process platform with scripted job outcomes.

use async_trait::async_trait;
use gearbox_core::file::{FileError, FileRef};
use gearbox_core::ids::{ContainerId, FileId, JobId};
use gearbox_core::job::{GearInfo, GearInput, JobRequest, JobState, JobSummary};
use gearbox_core::notification::Notification;
use gearbox_core::ports::{
    CenterDirectory, FileStore, JobPlatform, Notifier, ProvenanceLog, VisitStore,
};
use gearbox_core::provenance::ProvenanceRecord;
use gearbox_core::visit::{ChainProgress, QcStatus, Visit};
use gearbox_core::work_unit::WorkUnit;
use gearbox_core::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a submitted job behaves when polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedJob {
    /// Terminal state the job reaches.
    pub state: JobState,
    /// Polls answered with `running` before the terminal state.
    pub polls_before_terminal: u32,
    /// Never reaches a terminal state.
    pub hang: bool,
    /// QC outcome recorded for every input file once the job completes.
    pub qc: Option<QcStatus>,
}

impl ScriptedJob {
    fn ending(state: JobState) -> Self {
        Self {
            state,
            polls_before_terminal: 1,
            hang: false,
            qc: None,
        }
    }

    pub fn complete() -> Self {
        Self::ending(JobState::Complete)
    }

    pub fn failed() -> Self {
        Self::ending(JobState::Failed)
    }

    pub fn cancelled() -> Self {
        Self::ending(JobState::Cancelled)
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::ending(JobState::Running)
        }
    }

    /// A QC-check job that runs to completion and reports `status`.
    pub fn qc(status: QcStatus) -> Self {
        Self {
            qc: Some(status),
            ..Self::complete()
        }
    }

    pub fn after_polls(mut self, polls: u32) -> Self {
        self.polls_before_terminal = polls;
        self
    }
}

type Responder = Arc<dyn Fn(&JobRequest) -> ScriptedJob + Send + Sync>;

struct MemoryJob {
    id: JobId,
    request: JobRequest,
    script: ScriptedJob,
    polls: u32,
    settled: bool,
}

impl MemoryJob {
    fn state(&self) -> JobState {
        if self.script.hang {
            JobState::Running
        } else if self.polls >= self.script.polls_before_terminal {
            self.script.state
        } else if self.polls == 0 {
            JobState::Pending
        } else {
            JobState::Running
        }
    }
}

#[derive(Default)]
struct State {
    gears: HashMap<String, GearInfo>,
    rejected_gears: HashMap<String, String>,
    scripts: HashMap<String, VecDeque<ScriptedJob>>,
    responders: HashMap<String, Responder>,
    jobs: Vec<MemoryJob>,
    read_only: HashSet<ContainerId>,
    unreachable: HashSet<ContainerId>,
    work_units: HashMap<String, Vec<WorkUnit>>,
    files: HashMap<FileId, FileRef>,
    file_errors: HashMap<FileId, Vec<FileError>>,
    visits: Vec<(ContainerId, Visit)>,
    qc_results: HashMap<FileId, QcStatus>,
    status_history: Vec<(FileId, QcStatus)>,
    progress: Vec<(ContainerId, ChainProgress)>,
    provenance: Vec<ProvenanceRecord>,
    notifications: Vec<Notification>,
    failing_notifier: bool,
    next_job: u64,
}

/// A platform held entirely in memory.
///
/// Jobs are scripted per gear: queued scripts are consumed first, then the
/// gear's responder, then the job simply completes.
#[derive(Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a gear with its required input labels.
    pub fn register_gear(&self, name: &str, required_inputs: &[&str]) {
        let info = GearInfo {
            name: name.to_string(),
            inputs: required_inputs
                .iter()
                .map(|label| GearInput {
                    label: label.to_string(),
                    optional: false,
                })
                .collect(),
        };
        self.state().gears.insert(name.to_string(), info);
    }

    /// Make every submission of a gear fail with a platform rejection.
    pub fn reject_gear(&self, name: &str, reason: &str) {
        self.state()
            .rejected_gears
            .insert(name.to_string(), reason.to_string());
    }

    /// Queue outcomes for the next submissions of a gear, in order.
    pub fn script(&self, gear: &str, outcomes: impl IntoIterator<Item = ScriptedJob>) {
        self.state()
            .scripts
            .entry(gear.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Decide outcomes for a gear from each request.
    pub fn respond_with<F>(&self, gear: &str, responder: F)
    where
        F: Fn(&JobRequest) -> ScriptedJob + Send + Sync + 'static,
    {
        self.state()
            .responders
            .insert(gear.to_string(), Arc::new(responder));
    }

    /// Add a job that was started outside this process.
    pub fn seed_job(&self, gear: &str, destination: &ContainerId, script: ScriptedJob) -> JobId {
        let mut state = self.state();
        state.next_job += 1;
        let id = JobId::new(format!("job-{}", state.next_job));
        state.jobs.push(MemoryJob {
            id: id.clone(),
            request: JobRequest {
                gear_name: gear.to_string(),
                inputs: Default::default(),
                configs: Default::default(),
                destination: destination.clone(),
            },
            script,
            polls: 0,
            settled: false,
        });
        id
    }

    pub fn set_read_only(&self, container: &ContainerId) {
        self.state().read_only.insert(container.clone());
    }

    /// Make access checks on a container fail with a network error.
    pub fn set_unreachable(&self, container: &ContainerId) {
        self.state().unreachable.insert(container.clone());
    }

    pub fn add_work_units(&self, source: &str, units: impl IntoIterator<Item = WorkUnit>) {
        self.state()
            .work_units
            .entry(source.to_string())
            .or_default()
            .extend(units);
    }

    pub fn add_file(&self, file: FileRef) {
        self.state().files.insert(file.id.clone(), file);
    }

    /// Add a visit for a participant. Its file becomes visible too.
    pub fn add_visit(&self, participant: &ContainerId, visit: Visit) {
        let mut state = self.state();
        state.files.insert(visit.file.id.clone(), visit.file.clone());
        state.visits.push((participant.clone(), visit));
    }

    /// Replace a visit's contents, as a resubmission would. Status resets to
    /// pending and any previous QC result is discarded.
    pub fn resubmit_visit(&self, file: &FileId) {
        let mut state = self.state();
        state.qc_results.remove(file);
        for (_, visit) in state.visits.iter_mut() {
            if &visit.file.id == file {
                visit.status = QcStatus::Pending;
            }
        }
    }

    pub fn fail_notifications(&self, failing: bool) {
        self.state().failing_notifier = failing;
    }

    pub fn submitted(&self) -> Vec<JobRequest> {
        self.state().jobs.iter().map(|j| j.request.clone()).collect()
    }

    pub fn submitted_for(&self, gear: &str) -> Vec<JobRequest> {
        self.state()
            .jobs
            .iter()
            .filter(|j| j.request.gear_name == gear)
            .map(|j| j.request.clone())
            .collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state().notifications.clone()
    }

    pub fn file_errors(&self, file: &FileId) -> Vec<FileError> {
        self.state()
            .file_errors
            .get(file)
            .cloned()
            .unwrap_or_default()
    }

    pub fn visit_status(&self, file: &FileId) -> Option<QcStatus> {
        self.state()
            .visits
            .iter()
            .find(|(_, v)| &v.file.id == file)
            .map(|(_, v)| v.status)
    }

    /// Every status written for a file, oldest first.
    pub fn status_history(&self, file: &FileId) -> Vec<QcStatus> {
        self.state()
            .status_history
            .iter()
            .filter(|(f, _)| f == file)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn progress(&self, participant: &ContainerId) -> Vec<ChainProgress> {
        self.state()
            .progress
            .iter()
            .filter(|(p, _)| p == participant)
            .map(|(_, progress)| progress.clone())
            .collect()
    }

    pub fn provenance(&self) -> Vec<ProvenanceRecord> {
        self.state().provenance.clone()
    }

    fn next_script(state: &mut State, request: &JobRequest) -> ScriptedJob {
        if let Some(script) = state
            .scripts
            .get_mut(&request.gear_name)
            .and_then(VecDeque::pop_front)
        {
            return script;
        }
        if let Some(responder) = state.responders.get(&request.gear_name) {
            return responder(request);
        }
        ScriptedJob::complete()
    }
}

#[async_trait]
impl JobPlatform for MemoryPlatform {
    async fn gear(&self, name: &str) -> Result<Option<GearInfo>> {
        Ok(self.state().gears.get(name).cloned())
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobId> {
        let mut state = self.state();
        if let Some(reason) = state.rejected_gears.get(&request.gear_name) {
            return Err(Error::Platform(reason.clone()));
        }
        let script = Self::next_script(&mut state, request);
        state.next_job += 1;
        let id = JobId::new(format!("job-{}", state.next_job));
        state.jobs.push(MemoryJob {
            id: id.clone(),
            request: request.clone(),
            script,
            polls: 0,
            settled: false,
        });
        Ok(id)
    }

    async fn job_state(&self, id: &JobId) -> Result<JobState> {
        let mut state = self.state();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| Error::NotFound(format!("job {id}")))?;

        job.polls += 1;
        let current = job.state();
        let mut qc_updates = Vec::new();
        if current == JobState::Complete && !job.settled {
            job.settled = true;
            if let Some(qc) = job.script.qc {
                qc_updates.extend(job.request.inputs.values().map(|f| (f.id.clone(), qc)));
            }
        }
        state.qc_results.extend(qc_updates);
        Ok(current)
    }

    async fn list_jobs(
        &self,
        destination: &ContainerId,
        states: &[JobState],
    ) -> Result<Vec<JobSummary>> {
        Ok(self
            .state()
            .jobs
            .iter()
            .filter(|j| &j.request.destination == destination && states.contains(&j.state()))
            .map(|j| JobSummary {
                id: j.id.clone(),
                gear_name: j.request.gear_name.clone(),
                destination: j.request.destination.clone(),
                state: j.state(),
            })
            .collect())
    }

    async fn can_write(&self, destination: &ContainerId) -> Result<bool> {
        let state = self.state();
        if state.unreachable.contains(destination) {
            return Err(Error::Network(format!("{destination} unreachable")));
        }
        Ok(!state.read_only.contains(destination))
    }
}

#[async_trait]
impl CenterDirectory for MemoryPlatform {
    async fn work_units(&self, source: &str) -> Result<Vec<WorkUnit>> {
        Ok(self
            .state()
            .work_units
            .get(source)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl FileStore for MemoryPlatform {
    async fn file(&self, id: &FileId) -> Result<FileRef> {
        self.state()
            .files
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("file {id}")))
    }

    async fn find_file(&self, container: &ContainerId, name: &str) -> Result<Option<FileRef>> {
        Ok(self
            .state()
            .files
            .values()
            .find(|f| &f.parent == container && f.name == name)
            .cloned())
    }

    async fn add_file_error(&self, file: &FileId, error: &FileError) -> Result<()> {
        self.state()
            .file_errors
            .entry(file.clone())
            .or_default()
            .push(error.clone());
        Ok(())
    }
}

#[async_trait]
impl VisitStore for MemoryPlatform {
    async fn visits(&self, participant: &ContainerId, module: &str) -> Result<Vec<Visit>> {
        Ok(self
            .state()
            .visits
            .iter()
            .filter(|(p, v)| p == participant && v.module == module)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn set_qc_status(&self, file: &FileId, status: QcStatus) -> Result<()> {
        let mut state = self.state();
        let visit = state
            .visits
            .iter_mut()
            .find(|(_, v)| &v.file.id == file)
            .ok_or_else(|| Error::NotFound(format!("visit file {file}")))?;
        visit.1.status = status;
        state.status_history.push((file.clone(), status));
        Ok(())
    }

    async fn qc_result(&self, file: &FileId) -> Result<Option<QcStatus>> {
        Ok(self.state().qc_results.get(file).copied())
    }

    async fn write_progress(
        &self,
        participant: &ContainerId,
        progress: &ChainProgress,
    ) -> Result<()> {
        self.state()
            .progress
            .push((participant.clone(), progress.clone()));
        Ok(())
    }
}

#[async_trait]
impl ProvenanceLog for MemoryPlatform {
    async fn append(&self, record: &ProvenanceRecord) -> Result<()> {
        let mut state = self.state();
        if state.provenance.iter().any(|r| r.id == record.id) {
            return Err(Error::AlreadyExists(format!("provenance {}", record.id)));
        }
        state.provenance.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl Notifier for MemoryPlatform {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let mut state = self.state();
        if state.failing_notifier {
            return Err(Error::Notification("mail relay unavailable".into()));
        }
        state.notifications.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(gear: &str, destination: &str) -> JobRequest {
        JobRequest {
            gear_name: gear.into(),
            inputs: Default::default(),
            configs: Default::default(),
            destination: ContainerId::new(destination),
        }
    }

    #[tokio::test]
    async fn test_job_is_active_until_polled_to_terminal() {
        let platform = MemoryPlatform::new();
        let id = platform.submit(&request("g", "d")).await.unwrap();
        let dest = ContainerId::new("d");

        let active = platform
            .list_jobs(&dest, &[JobState::Pending, JobState::Running])
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        assert_eq!(platform.job_state(&id).await.unwrap(), JobState::Complete);
        let active = platform
            .list_jobs(&dest, &[JobState::Pending, JobState::Running])
            .await
            .unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_scripts_consumed_before_responder() {
        let platform = MemoryPlatform::new();
        platform.script("g", [ScriptedJob::failed()]);
        platform.respond_with("g", |_| ScriptedJob::cancelled());

        let first = platform.submit(&request("g", "d")).await.unwrap();
        let second = platform.submit(&request("g", "d")).await.unwrap();
        assert_eq!(platform.job_state(&first).await.unwrap(), JobState::Failed);
        assert_eq!(
            platform.job_state(&second).await.unwrap(),
            JobState::Cancelled
        );
    }

    #[tokio::test]
    async fn test_provenance_is_write_once() {
        use chrono::Utc;
        use gearbox_core::ids::{ProvenanceId, RunId};
        use gearbox_core::provenance::GeneratorIdentity;

        let platform = MemoryPlatform::new();
        let record = ProvenanceRecord {
            id: ProvenanceId::new(),
            run_id: RunId::new(),
            generated_by: GeneratorIdentity {
                name: "batch".into(),
                version: "0.1.0".into(),
            },
            created_at: Utc::now(),
            sources: vec![],
        };
        platform.append(&record).await.unwrap();
        assert!(matches!(
            platform.append(&record).await,
            Err(Error::AlreadyExists(_))
        ));
    }
}
