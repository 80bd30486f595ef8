//! File-to-pipeline dispatch.

use crate::locator::InputResolver;
use crate::router::PipelineRouter;
use gearbox_core::file::{FileError, FileRef};
use gearbox_core::ids::{ContainerId, FileId};
use gearbox_core::interpolation::PlaceholderContext;
use gearbox_core::job::{JobHandle, JobState};
use gearbox_core::notification::Notification;
use gearbox_core::pipeline::PipelineConfig;
use gearbox_core::ports::{FileStore, Notifier};
use gearbox_core::Result;
use gearbox_gateway::JobGateway;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Container jobs are started in and checked for duplicates. Defaults to
    /// the triggering file's parent.
    pub scope: Option<ContainerId>,
    /// Where `fixed` and `module` inputs are looked up.
    pub resource_container: Option<ContainerId>,
    /// Sender address for completion notifications.
    pub sender: String,
    pub completion_deadline: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            scope: None,
            resource_container: None,
            sender: "noreply@gearbox.local".into(),
            completion_deadline: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// A pipeline started for a file.
#[derive(Debug, Clone, Serialize)]
pub struct StartedPipeline {
    pub pipeline: String,
    pub file: FileRef,
    pub module: Option<String>,
    pub handle: JobHandle,
    pub notify_user: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Started(StartedPipeline),
    /// The starting gear is already pending or running at the destination.
    DuplicateSuppressed {
        pipeline: String,
        destination: ContainerId,
    },
    NoMatchingPipeline,
    Rejected {
        pipeline: Option<String>,
        reason: String,
    },
}

impl DispatchOutcome {
    pub fn started(&self) -> Option<&StartedPipeline> {
        match self {
            DispatchOutcome::Started(started) => Some(started),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    router: PipelineRouter,
    gateway: Arc<JobGateway>,
    files: Arc<dyn FileStore>,
    notifier: Arc<dyn Notifier>,
    options: DispatcherOptions,
}

impl Dispatcher {
    pub fn new(
        config: &PipelineConfig,
        gateway: Arc<JobGateway>,
        files: Arc<dyn FileStore>,
        notifier: Arc<dyn Notifier>,
        options: DispatcherOptions,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            router: PipelineRouter::new(config),
            gateway,
            files,
            notifier,
            options,
        })
    }

    /// Route one file and start its pipeline.
    ///
    /// Input and start failures are recorded on the file and returned as a
    /// rejection. Platform failures while routing or resolving are errors.
    pub async fn dispatch(&self, file: &FileRef) -> Result<DispatchOutcome> {
        let Some(route) = self.router.route(file) else {
            info!(file = %file.name, tags = ?file.tags, "No pipeline matches file");
            return Ok(DispatchOutcome::NoMatchingPipeline);
        };
        let pipeline = route.pipeline;
        let gear = &pipeline.starting_gear;
        let destination = self.options.scope.as_ref().unwrap_or(&file.parent);

        // Advisory only: two dispatchers can both observe "inactive".
        if self.gateway.is_active(&gear.gear_name, destination).await? {
            info!(
                pipeline = %pipeline.name,
                gear = %gear.gear_name,
                %destination,
                "Starting gear already active, suppressing duplicate"
            );
            return Ok(DispatchOutcome::DuplicateSuppressed {
                pipeline: pipeline.name.clone(),
                destination: destination.clone(),
            });
        }

        let resolver = InputResolver::new(
            self.files.as_ref(),
            self.options.resource_container.as_ref(),
        );
        let inputs = match resolver.resolve(&gear.inputs, file, route.module).await? {
            Ok(inputs) => inputs,
            Err(unresolved) => {
                warn!(pipeline = %pipeline.name, file = %file.name, reason = %unresolved, "Input resolution failed");
                self.record_error(&file.id, unresolved.to_file_error()).await;
                return Ok(DispatchOutcome::Rejected {
                    pipeline: Some(pipeline.name.clone()),
                    reason: unresolved.to_string(),
                });
            }
        };

        let mut ctx = PlaceholderContext::new().with("pipeline", pipeline.name.as_str());
        if let Some(module) = route.module {
            ctx = ctx.with("module", module);
        }
        let configs = gear
            .configs
            .iter()
            .map(|(k, v)| (k.clone(), ctx.interpolate_value(v)))
            .collect();

        match self
            .gateway
            .start(&gear.gear_name, inputs, configs, destination)
            .await
        {
            Ok(handle) => {
                info!(
                    pipeline = %pipeline.name,
                    file = %file.name,
                    module = ?route.module,
                    job = %handle.id,
                    "Pipeline started"
                );
                Ok(DispatchOutcome::Started(StartedPipeline {
                    pipeline: pipeline.name.clone(),
                    file: file.clone(),
                    module: route.module.map(str::to_string),
                    handle,
                    notify_user: pipeline.notify_user,
                }))
            }
            Err(e) => {
                warn!(
                    pipeline = %pipeline.name,
                    file = %file.name,
                    error = %e,
                    system = e.is_system(),
                    "Pipeline start rejected"
                );
                self.record_error(&file.id, FileError::new("dispatch-rejected", e.to_string()))
                    .await;
                Ok(DispatchOutcome::Rejected {
                    pipeline: Some(pipeline.name.clone()),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Dispatch files one after another. A failing file never stops the rest.
    pub async fn dispatch_all(&self, files: &[FileRef]) -> Vec<(FileId, DispatchOutcome)> {
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let outcome = match self.dispatch(file).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(file = %file.name, error = %e, "Dispatch failed");
                    DispatchOutcome::Rejected {
                        pipeline: None,
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push((file.id.clone(), outcome));
        }
        outcomes
    }

    /// Wait for a started pipeline and tell the uploader how it ended.
    ///
    /// Returns `None` without waiting when the pipeline does not notify or the
    /// uploader is unknown.
    pub async fn notify_on_completion(
        &self,
        started: &mut StartedPipeline,
    ) -> Result<Option<JobState>> {
        let Some(recipient) = started.file.origin.clone().filter(|_| started.notify_user) else {
            return Ok(None);
        };

        let state = self
            .gateway
            .wait(&mut started.handle, self.options.completion_deadline)
            .await?;

        let notification = Notification::new(
            &self.options.sender,
            vec![recipient],
            format!("[gearbox] {} {}: {}", started.pipeline, started.file.name, state),
            format!(
                "Pipeline {} for file {} finished with state {} (job {}).",
                started.pipeline, started.file.name, state, started.handle.id
            ),
        );
        if let Err(e) = self.notifier.send(&notification).await {
            warn!(error = %e, file = %started.file.name, "Failed to send completion notification");
        }
        Ok(Some(state))
    }

    async fn record_error(&self, file: &FileId, error: FileError) {
        if let Err(e) = self.files.add_file_error(file, &error).await {
            warn!(%file, error = %e, "Failed to record file error");
        }
    }
}
