//! Batch run orchestration.

use crate::filter::{SkippedUnit, UnitFilter};
use crate::pool::{Batch, BatchPool};
use chrono::Utc;
use gearbox_core::batch::{BatchConfig, BatchRunOptions};
use gearbox_core::ids::{JobId, ProvenanceId, RunId};
use gearbox_core::interpolation::PlaceholderContext;
use gearbox_core::job::JobState;
use gearbox_core::notification::Notification;
use gearbox_core::ports::{CenterDirectory, Notifier, ProvenanceLog};
use gearbox_core::provenance::{GeneratorIdentity, ProvenanceRecord, SourceVersion};
use gearbox_core::{Error, Result};
use gearbox_gateway::JobGateway;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Where a scheduling run is. `Failed` is only reached on configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "batch", rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Collecting,
    Filtering,
    Batching,
    Dispatching(usize),
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    /// Computed but not dispatched (dry run).
    Planned,
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub units: Vec<String>,
    pub file_count: u64,
    pub attempts: u32,
    pub job: Option<JobId>,
    #[serde(flatten)]
    pub status: BatchStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRunReport {
    pub run_id: RunId,
    pub gear_name: String,
    pub state: SchedulerState,
    pub dry_run: bool,
    pub skipped: Vec<SkippedUnit>,
    pub batches: Vec<BatchOutcome>,
}

impl BatchRunReport {
    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches
            .iter()
            .filter(|b| matches!(b.status, BatchStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed_batches().next().is_some()
    }
}

/// Replays one gear across a population, one batch at a time.
pub struct BatchScheduler {
    directory: Arc<dyn CenterDirectory>,
    gateway: Arc<JobGateway>,
    notifier: Arc<dyn Notifier>,
    provenance: Arc<dyn ProvenanceLog>,
    state: SchedulerState,
}

impl BatchScheduler {
    pub fn new(
        directory: Arc<dyn CenterDirectory>,
        gateway: Arc<JobGateway>,
        notifier: Arc<dyn Notifier>,
        provenance: Arc<dyn ProvenanceLog>,
    ) -> Self {
        Self {
            directory,
            gateway,
            notifier,
            provenance,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    fn transition(&mut self, next: SchedulerState) {
        info!(from = ?self.state, to = ?next, "Batch scheduler transition");
        self.state = next;
    }

    /// Execute one scheduling run.
    ///
    /// Batches are dispatched in order. A batch that exhausts its attempts is
    /// recorded and the run moves on; failures are reported once at the end.
    pub async fn run(
        &mut self,
        config: &BatchConfig,
        options: &BatchRunOptions,
    ) -> Result<BatchRunReport> {
        let run_id = RunId::new();
        self.transition(SchedulerState::Collecting);

        if let Err(e) = config.validate().and_then(|_| options.validate()) {
            error!(error = %e, "Invalid batch configuration");
            self.transition(SchedulerState::Failed);
            return Err(e);
        }

        let units = self.directory.work_units(&config.source).await?;
        info!(source = %config.source, units = units.len(), "Collected work units");

        self.transition(SchedulerState::Filtering);
        let filtered = UnitFilter::new(options, &config.gear_name, Utc::now()).apply(units);
        for skipped in &filtered.skipped {
            info!(unit = %skipped.unit, reason = %skipped.reason, "Skipping work unit");
        }

        self.transition(SchedulerState::Batching);
        let batches =
            BatchPool::new(filtered.kept).into_batches(config.batch_mode, config.batch_size);
        info!(batches = batches.len(), mode = ?config.batch_mode, size = config.batch_size, "Computed batches");

        let mut report = BatchRunReport {
            run_id,
            gear_name: config.gear_name.clone(),
            state: self.state,
            dry_run: options.dry_run,
            skipped: filtered.skipped,
            batches: Vec::with_capacity(batches.len()),
        };

        if options.dry_run {
            report.batches = batches.iter().map(planned).collect();
            self.transition(SchedulerState::Done);
            report.state = self.state;
            return Ok(report);
        }

        for batch in &batches {
            self.transition(SchedulerState::Dispatching(batch.index));
            let outcome = self.dispatch_batch(config, options, batch).await;
            report.batches.push(outcome);
        }

        self.transition(SchedulerState::Done);
        report.state = self.state;

        if report.has_failures() {
            self.notify_failures(config, options, &report).await;
        }
        if !batches.is_empty() {
            self.record_provenance(config, run_id, &batches).await;
        }

        Ok(report)
    }

    async fn dispatch_batch(
        &self,
        config: &BatchConfig,
        options: &BatchRunOptions,
        batch: &Batch,
    ) -> BatchOutcome {
        let configs = batch_configs(config, batch);
        let deadline = Duration::from_secs(options.poll_deadline_secs);
        let max_attempts = options.attempts();

        let mut outcome = BatchOutcome {
            index: batch.index,
            units: batch.keys(),
            file_count: batch.file_count(),
            attempts: 0,
            job: None,
            status: BatchStatus::Planned,
        };

        while outcome.attempts < max_attempts {
            outcome.attempts += 1;
            info!(
                batch = batch.index,
                attempt = outcome.attempts,
                units = ?outcome.units,
                "Dispatching batch"
            );

            let reason = match self
                .gateway
                .start(
                    &config.gear_name,
                    Default::default(),
                    configs.clone(),
                    &options.destination,
                )
                .await
            {
                Ok(mut handle) => {
                    outcome.job = Some(handle.id.clone());
                    match self.gateway.wait(&mut handle, deadline).await {
                        Ok(JobState::Complete) => {
                            outcome.status = BatchStatus::Succeeded;
                            return outcome;
                        }
                        Ok(state) => format!("job {} ended {}", handle.id, state),
                        Err(e) => e.to_string(),
                    }
                }
                Err(e @ Error::Dispatch(_)) => {
                    // A rejected start will be rejected again.
                    outcome.status = BatchStatus::Failed {
                        reason: e.to_string(),
                    };
                    warn!(batch = batch.index, error = %e, "Batch dispatch rejected");
                    return outcome;
                }
                Err(e) => e.to_string(),
            };

            warn!(batch = batch.index, attempt = outcome.attempts, %reason, "Batch attempt failed");
            outcome.status = BatchStatus::Failed { reason };
        }

        error!(batch = batch.index, attempts = outcome.attempts, "Batch failed permanently");
        outcome
    }

    async fn notify_failures(
        &self,
        config: &BatchConfig,
        options: &BatchRunOptions,
        report: &BatchRunReport,
    ) {
        let Some(target) = &options.notify else {
            warn!("Batch run had failures but no notification recipients are configured");
            return;
        };

        let failed: Vec<&BatchOutcome> = report.failed_batches().collect();
        let mut body = format!(
            "Batch run {} of gear {} finished with {} failed batch(es):\n\n",
            report.run_id,
            config.gear_name,
            failed.len()
        );
        for batch in &failed {
            let reason = match &batch.status {
                BatchStatus::Failed { reason } => reason.as_str(),
                _ => "",
            };
            body.push_str(&format!(
                "- batch {} [{}] after {} attempt(s): {}\n",
                batch.index,
                batch.units.join(", "),
                batch.attempts,
                reason
            ));
        }

        let notification = Notification::new(
            &target.sender,
            target.recipients.clone(),
            format!("[gearbox] {} batch run failures", config.gear_name),
            body,
        );
        if let Err(e) = self.notifier.send(&notification).await {
            warn!(error = %e, "Failed to send batch failure notification");
        }
    }

    async fn record_provenance(&self, config: &BatchConfig, run_id: RunId, batches: &[Batch]) {
        let record = ProvenanceRecord {
            id: ProvenanceId::new(),
            run_id,
            generated_by: GeneratorIdentity {
                name: format!("{}:{}", env!("CARGO_PKG_NAME"), config.gear_name),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            created_at: Utc::now(),
            sources: batches
                .iter()
                .flat_map(|b| &b.units)
                .map(|u| SourceVersion {
                    source: u.key(),
                    version: u.container.to_string(),
                })
                .collect(),
        };
        if let Err(e) = self.provenance.append(&record).await {
            warn!(error = %e, "Failed to record batch provenance");
        }
    }
}

fn planned(batch: &Batch) -> BatchOutcome {
    BatchOutcome {
        index: batch.index,
        units: batch.keys(),
        file_count: batch.file_count(),
        attempts: 0,
        job: None,
        status: BatchStatus::Planned,
    }
}

/// Gear configs for one batch: the configured values, substituted if asked,
/// plus the batch members under the unit key.
fn batch_configs(config: &BatchConfig, batch: &Batch) -> Map<String, Value> {
    let mut configs: Map<String, Value> = if config.substitute {
        let ctx = PlaceholderContext::new()
            .with("source", config.source.as_str())
            .with("target", config.target_label());
        config
            .gear_configs
            .iter()
            .map(|(k, v)| (k.clone(), ctx.interpolate_value(v)))
            .collect()
    } else {
        config.gear_configs.clone()
    };

    configs.insert(
        config.unit_config_key.clone(),
        Value::Array(batch.keys().into_iter().map(Value::String).collect()),
    );
    configs
}
