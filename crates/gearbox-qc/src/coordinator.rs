//! Chain walk and multi-participant sweep.

use crate::chain::VisitChain;
use crate::module_config::ModuleConfigs;
use chrono::{NaiveDate, Utc};
use gearbox_core::batch::NotifyTarget;
use gearbox_core::file::{FileError, FileRef};
use gearbox_core::ids::{ContainerId, FileId};
use gearbox_core::job::JobState;
use gearbox_core::notification::Notification;
use gearbox_core::ports::{FileStore, Notifier, VisitStore};
use gearbox_core::visit::{ChainProgress, QcStatus, Visit};
use gearbox_core::{Error, Result};
use gearbox_gateway::JobGateway;
use serde::Serialize;
use serde_json::{Map, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What caused a coordination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QcTrigger {
    /// New visits arrived; evaluation resumes at the earliest pending one.
    NewSubmission,
    /// An existing visit was replaced; it and everything after it is
    /// evaluated again.
    Modified(FileId),
}

#[derive(Debug, Clone)]
pub struct QcOptions {
    /// Pipeline stage recorded in progress metadata.
    pub stage: String,
    pub qc_gear: String,
    /// Gear input label the visit file is bound to.
    pub input_label: String,
    /// Total QC job attempts per visit on system errors.
    pub max_attempts: u32,
    pub poll_deadline: Duration,
    /// Re-audit every visit from the first, without halting.
    pub check_all: bool,
}

impl Default for QcOptions {
    fn default() -> Self {
        Self {
            stage: "form-qc".into(),
            qc_gear: "form-qc-checker".into(),
            input_label: "form_data_file".into(),
            max_attempts: 3,
            poll_deadline: Duration::from_secs(60 * 60),
            check_all: false,
        }
    }
}

impl QcOptions {
    fn validate(&self) -> Result<()> {
        if self.qc_gear.is_empty() {
            return Err(Error::Configuration("qc gear name is empty".into()));
        }
        if self.input_label.is_empty() {
            return Err(Error::Configuration("qc input label is empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Configuration("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitEvaluation {
    pub file: FileId,
    pub visit_date: NaiveDate,
    pub status: QcStatus,
    pub attempts: u32,
    /// Last system error when the visit failed without a QC verdict.
    pub system_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub participant: ContainerId,
    pub module: String,
    pub longitudinal: bool,
    pub visits: usize,
    /// Visits put back to pending by a modification.
    pub reset: Vec<FileId>,
    pub evaluations: Vec<VisitEvaluation>,
    pub halted_at: Option<FileId>,
}

impl ChainReport {
    /// Visits that ended `fail` because QC could not run, not because of a
    /// verdict.
    pub fn persistent_failures(&self) -> impl Iterator<Item = &VisitEvaluation> {
        self.evaluations.iter().filter(|e| e.system_error.is_some())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantFailure {
    pub participant: ContainerId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub module: String,
    pub chains: Vec<ChainReport>,
    pub failures: Vec<ParticipantFailure>,
}

enum Verdict {
    Status(QcStatus),
    /// Infrastructure fault or crashed job; worth another attempt.
    SystemError(String),
    /// The gateway refused to start the job; another attempt would be refused too.
    Rejected(String),
}

pub struct QcCoordinator {
    gateway: Arc<JobGateway>,
    visits: Arc<dyn VisitStore>,
    files: Arc<dyn FileStore>,
    notifier: Arc<dyn Notifier>,
    modules: ModuleConfigs,
    options: QcOptions,
}

impl QcCoordinator {
    pub fn new(
        gateway: Arc<JobGateway>,
        visits: Arc<dyn VisitStore>,
        files: Arc<dyn FileStore>,
        notifier: Arc<dyn Notifier>,
        modules: ModuleConfigs,
        options: QcOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            gateway,
            visits,
            files,
            notifier,
            modules,
            options,
        })
    }

    /// Run QC for one participant's module chain.
    pub async fn coordinate(
        &self,
        participant: &ContainerId,
        module: &str,
        trigger: &QcTrigger,
    ) -> Result<ChainReport> {
        let longitudinal = self.modules.get(module)?.longitudinal;
        let chain = VisitChain::load(self.visits.as_ref(), participant, module).await?;

        info!(
            %participant,
            module,
            visits = chain.len(),
            longitudinal,
            check_all = self.options.check_all,
            ?trigger,
            "Coordinating visit chain"
        );

        let mut report = ChainReport {
            participant: participant.clone(),
            module: module.to_string(),
            longitudinal,
            visits: chain.len(),
            reset: Vec::new(),
            evaluations: Vec::new(),
            halted_at: None,
        };

        if longitudinal {
            self.walk_chain(participant, &chain, trigger, &mut report)
                .await?;
        } else {
            self.evaluate_independent(participant, &chain, trigger, &mut report)
                .await?;
        }

        Ok(report)
    }

    async fn walk_chain(
        &self,
        participant: &ContainerId,
        chain: &VisitChain,
        trigger: &QcTrigger,
        report: &mut ChainReport,
    ) -> Result<()> {
        let start = if self.options.check_all {
            (!chain.is_empty()).then_some(0)
        } else {
            match trigger {
                QcTrigger::NewSubmission => chain.first_awaiting(),
                QcTrigger::Modified(file) => {
                    let index = chain
                        .position(file)
                        .ok_or_else(|| Error::NotFound(format!("visit {file} for {participant}")))?;
                    self.reset_from(participant, chain, index, report).await?;
                    Some(index)
                }
            }
        };

        let Some(start) = start else {
            debug!(%participant, module = chain.module(), "No visits awaiting evaluation");
            return Ok(());
        };

        if !self.options.check_all {
            if let Some(blocker) = chain.blocking_before(start) {
                info!(
                    %participant,
                    module = chain.module(),
                    blocked_by = %blocker.file_id(),
                    status = %blocker.status,
                    "Chain held back by an unresolved earlier visit"
                );
                report.halted_at = Some(blocker.file_id().clone());
                self.write_progress(participant, chain.module(), blocker, blocker.status, true)
                    .await?;
                return Ok(());
            }
        }

        for visit in &chain.visits()[start..] {
            let evaluation = self.evaluate(participant, chain.module(), visit).await?;
            let status = evaluation.status;
            report.evaluations.push(evaluation);

            if status.is_blocking() && !self.options.check_all {
                info!(%participant, module = chain.module(), visit = %visit.file_id(), %status, "Chain walk halted");
                report.halted_at = Some(visit.file_id().clone());
                self.write_progress(participant, chain.module(), visit, status, true)
                    .await?;
                break;
            }
        }
        Ok(())
    }

    async fn evaluate_independent(
        &self,
        participant: &ContainerId,
        chain: &VisitChain,
        trigger: &QcTrigger,
        report: &mut ChainReport,
    ) -> Result<()> {
        let targets: Vec<&Visit> = match trigger {
            _ if self.options.check_all => chain.visits().iter().collect(),
            QcTrigger::NewSubmission => chain
                .visits()
                .iter()
                .filter(|v| v.status.awaits_evaluation())
                .collect(),
            QcTrigger::Modified(file) => {
                let index = chain
                    .position(file)
                    .ok_or_else(|| Error::NotFound(format!("visit {file} for {participant}")))?;
                self.reset_from(participant, chain, index, report).await?;
                vec![&chain.visits()[index]]
            }
        };

        for visit in targets {
            let evaluation = self.evaluate(participant, chain.module(), visit).await?;
            report.evaluations.push(evaluation);
        }
        Ok(())
    }

    /// Put visits from `index` back to pending: the visit itself, and for a
    /// longitudinal chain everything after it.
    async fn reset_from(
        &self,
        participant: &ContainerId,
        chain: &VisitChain,
        index: usize,
        report: &mut ChainReport,
    ) -> Result<()> {
        let end = if report.longitudinal {
            chain.len()
        } else {
            index + 1
        };
        for visit in &chain.visits()[index..end] {
            if visit.status != QcStatus::Pending {
                self.visits
                    .set_qc_status(visit.file_id(), QcStatus::Pending)
                    .await?;
                report.reset.push(visit.file_id().clone());
            }
        }
        if !report.reset.is_empty() {
            info!(%participant, module = chain.module(), reset = report.reset.len(), "Reset visits after modification");
        }
        Ok(())
    }

    /// Evaluate one visit, retrying system errors. A visit that never gets a
    /// verdict ends `fail` with the error recorded on its file.
    async fn evaluate(
        &self,
        participant: &ContainerId,
        module: &str,
        visit: &Visit,
    ) -> Result<VisitEvaluation> {
        self.visits
            .set_qc_status(visit.file_id(), QcStatus::Evaluating)
            .await?;
        self.write_progress(participant, module, visit, QcStatus::Evaluating, false)
            .await?;

        let mut evaluation = VisitEvaluation {
            file: visit.file_id().clone(),
            visit_date: visit.visit_date,
            status: QcStatus::Fail,
            attempts: 0,
            system_error: None,
        };

        while evaluation.attempts < self.options.max_attempts {
            evaluation.attempts += 1;
            match self.run_qc_job(participant, module, visit).await {
                Verdict::Status(status) => {
                    evaluation.status = status;
                    evaluation.system_error = None;
                    break;
                }
                Verdict::SystemError(reason) => {
                    warn!(
                        %participant,
                        module,
                        visit = %visit.file_id(),
                        attempt = evaluation.attempts,
                        %reason,
                        "QC attempt hit a system error"
                    );
                    evaluation.system_error = Some(reason);
                }
                Verdict::Rejected(reason) => {
                    warn!(%participant, module, visit = %visit.file_id(), %reason, "QC job rejected");
                    evaluation.system_error = Some(reason);
                    break;
                }
            }
        }

        if let Some(reason) = &evaluation.system_error {
            error!(%participant, module, visit = %visit.file_id(), attempts = evaluation.attempts, "QC failed persistently");
            let file_error = FileError::new("qc-system-error", reason.clone());
            if let Err(e) = self.files.add_file_error(visit.file_id(), &file_error).await {
                warn!(visit = %visit.file_id(), error = %e, "Failed to record QC error on file");
            }
        }

        self.visits
            .set_qc_status(visit.file_id(), evaluation.status)
            .await?;
        self.write_progress(participant, module, visit, evaluation.status, false)
            .await?;
        info!(%participant, module, visit = %visit.file_id(), status = %evaluation.status, "Visit evaluated");
        Ok(evaluation)
    }

    async fn run_qc_job(&self, participant: &ContainerId, module: &str, visit: &Visit) -> Verdict {
        let inputs: BTreeMap<String, FileRef> =
            BTreeMap::from([(self.options.input_label.clone(), visit.file.clone())]);
        let mut configs = Map::new();
        configs.insert("module".into(), json!(module));
        configs.insert("participant".into(), json!(participant.as_str()));
        configs.insert("stage".into(), json!(self.options.stage));
        configs.insert("visit_date".into(), json!(visit.visit_date.to_string()));

        let mut handle = match self
            .gateway
            .start(&self.options.qc_gear, inputs, configs, &visit.file.parent)
            .await
        {
            Ok(handle) => handle,
            Err(e @ Error::Dispatch(_)) => return Verdict::Rejected(e.to_string()),
            Err(e) => return Verdict::SystemError(e.to_string()),
        };

        match self
            .gateway
            .wait(&mut handle, self.options.poll_deadline)
            .await
        {
            Ok(JobState::Complete) => {}
            Ok(state) => {
                return Verdict::SystemError(format!("QC job {} ended {}", handle.id, state));
            }
            Err(e) => return Verdict::SystemError(e.to_string()),
        }

        match self.visits.qc_result(visit.file_id()).await {
            Ok(Some(status)) if !status.awaits_evaluation() => Verdict::Status(status),
            Ok(other) => Verdict::SystemError(format!(
                "QC job {} completed without a verdict ({})",
                handle.id,
                other.map_or("none".to_string(), |s| s.to_string())
            )),
            Err(e) => Verdict::SystemError(e.to_string()),
        }
    }

    async fn write_progress(
        &self,
        participant: &ContainerId,
        module: &str,
        visit: &Visit,
        status: QcStatus,
        halted: bool,
    ) -> Result<()> {
        let progress = ChainProgress {
            module: module.to_string(),
            stage: self.options.stage.clone(),
            last_visit: Some(visit.file_id().clone()),
            last_status: Some(status),
            halted_at: halted.then(|| visit.file_id().clone()),
            updated_at: Utc::now(),
        };
        self.visits.write_progress(participant, &progress).await
    }

    /// Coordinate many participants. One participant's failure never stops
    /// the others; failures are reported in a single notification.
    pub async fn coordinate_all(
        &self,
        participants: &[ContainerId],
        module: &str,
        notify: Option<&NotifyTarget>,
    ) -> Result<SweepReport> {
        self.modules.get(module)?;

        let mut sweep = SweepReport {
            module: module.to_string(),
            chains: Vec::with_capacity(participants.len()),
            failures: Vec::new(),
        };

        for participant in participants {
            match self
                .coordinate(participant, module, &QcTrigger::NewSubmission)
                .await
            {
                Ok(report) => {
                    let persistent: Vec<String> = report
                        .persistent_failures()
                        .map(|e| e.file.to_string())
                        .collect();
                    if !persistent.is_empty() {
                        sweep.failures.push(ParticipantFailure {
                            participant: participant.clone(),
                            reason: format!("QC could not run for {}", persistent.join(", ")),
                        });
                    }
                    sweep.chains.push(report);
                }
                Err(e) => {
                    error!(%participant, module, error = %e, "Coordination failed");
                    sweep.failures.push(ParticipantFailure {
                        participant: participant.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !sweep.failures.is_empty() {
            self.notify_failures(&sweep, notify).await;
        }
        Ok(sweep)
    }

    async fn notify_failures(&self, sweep: &SweepReport, notify: Option<&NotifyTarget>) {
        let Some(target) = notify else {
            warn!(failures = sweep.failures.len(), "QC sweep had failures but no notification recipients are configured");
            return;
        };

        let mut body = format!(
            "QC sweep of module {} ({}) finished with {} participant failure(s):\n\n",
            sweep.module,
            self.options.stage,
            sweep.failures.len()
        );
        for failure in &sweep.failures {
            body.push_str(&format!("- {}: {}\n", failure.participant, failure.reason));
        }

        let notification = Notification::new(
            &target.sender,
            target.recipients.clone(),
            format!("[gearbox] {} QC failures", sweep.module),
            body,
        );
        if let Err(e) = self.notifier.send(&notification).await {
            warn!(error = %e, "Failed to send QC failure notification");
        }
    }
}
