//! Command handlers.

use crate::commands::{BatchArgs, ConfigKind, DispatchArgs, QcArgs};
use crate::config::{CliConfig, OutputFormat};
use anyhow::{Context, bail};
use console::style;
use gearbox_batch::{BatchRunReport, BatchScheduler, BatchStatus};
use gearbox_core::batch::{BatchConfig, BatchRunOptions, NotifyTarget};
use gearbox_core::ids::{ContainerId, FileId};
use gearbox_core::pipeline::PipelineConfig;
use gearbox_core::ports::{FileStore, Notifier};
use gearbox_dispatch::{DispatchOutcome, Dispatcher, DispatcherOptions};
use gearbox_gateway::JobGateway;
use gearbox_notify::ChannelNotifier;
use gearbox_platform::HttpPlatform;
use gearbox_qc::{ChainReport, ModuleConfigs, QcCoordinator, QcOptions, QcTrigger, SweepReport};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

struct Services {
    platform: Arc<HttpPlatform>,
    gateway: Arc<JobGateway>,
    notifier: Arc<dyn Notifier>,
}

fn services(config: &CliConfig) -> anyhow::Result<Services> {
    let platform = Arc::new(HttpPlatform::new(&config.platform())?);
    let gateway = Arc::new(JobGateway::new(platform.clone(), config.poll));
    let notifier: Arc<dyn Notifier> = Arc::new(ChannelNotifier::from_config(&config.notification));
    Ok(Services {
        platform,
        gateway,
        notifier,
    })
}

fn notify_target(config: &CliConfig, recipients: Vec<String>) -> Option<NotifyTarget> {
    (!recipients.is_empty()).then(|| NotifyTarget {
        sender: config.sender.clone(),
        recipients,
    })
}

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    table: impl FnOnce(&T),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Table => table(value),
    }
    Ok(())
}

/// Run the batch scheduler.
pub async fn batch(config: &CliConfig, args: BatchArgs) -> anyhow::Result<()> {
    let batch_config = BatchConfig::from_file(&args.config)?;

    let mut options = BatchRunOptions::new(ContainerId::new(args.destination));
    options.time_interval_days = args.time_interval;
    options.retry_on_failure = args.retry;
    options.max_attempts = args.max_attempts;
    options.exclude_centers = args.exclude_centers;
    options.exclude_studies = args.exclude_studies;
    options.include_centers = args.include_centers;
    options.include_studies = args.include_studies;
    options.poll_deadline_secs = args.deadline_secs;
    options.dry_run = args.dry_run;
    options.notify = notify_target(config, args.notify);

    let svc = services(config)?;
    let mut scheduler = BatchScheduler::new(
        svc.platform.clone(),
        svc.gateway,
        svc.notifier,
        svc.platform,
    );
    let report = scheduler.run(&batch_config, &options).await?;

    emit(config.output_format, &report, print_batch_report)?;

    let failed = report.failed_batches().count();
    if failed > 0 {
        bail!("{failed} batch(es) failed");
    }
    Ok(())
}

fn print_batch_report(report: &BatchRunReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!(
        "{} Batch run {} of {}{}",
        style("▶").cyan(),
        style(&report.run_id).dim(),
        style(&report.gear_name).bold(),
        mode
    );
    for skipped in &report.skipped {
        println!("  {} {} ({})", style("-").dim(), skipped.unit, skipped.reason);
    }
    for batch in &report.batches {
        let (mark, detail) = match &batch.status {
            BatchStatus::Planned => (style("·").dim(), "planned".to_string()),
            BatchStatus::Succeeded => (style("✓").green(), "succeeded".to_string()),
            BatchStatus::Failed { reason } => (style("✗").red(), reason.clone()),
        };
        println!(
            "  {} batch {} [{}] {} file(s), {} attempt(s): {}",
            mark,
            batch.index + 1,
            batch.units.join(", "),
            batch.file_count,
            batch.attempts,
            detail
        );
    }
}

/// Dispatch uploaded files to their pipelines.
pub async fn dispatch(config: &CliConfig, args: DispatchArgs) -> anyhow::Result<()> {
    let pipelines = PipelineConfig::from_file(&args.pipelines)?;
    let svc = services(config)?;

    let options = DispatcherOptions {
        scope: args.scope.map(ContainerId::new),
        resource_container: args.resource_container.map(ContainerId::new),
        sender: config.sender.clone(),
        completion_deadline: Duration::from_secs(args.deadline_secs),
    };
    let dispatcher = Dispatcher::new(
        &pipelines,
        svc.gateway,
        svc.platform.clone(),
        svc.notifier,
        options,
    )?;

    let mut files = Vec::with_capacity(args.files.len());
    for id in &args.files {
        let file = svc
            .platform
            .file(&FileId::new(id.as_str()))
            .await
            .with_context(|| format!("looking up file {id}"))?;
        files.push(file);
    }

    let mut outcomes = dispatcher.dispatch_all(&files).await;

    if args.wait {
        for (_, outcome) in outcomes.iter_mut() {
            if let DispatchOutcome::Started(started) = outcome {
                if let Err(e) = dispatcher.notify_on_completion(started).await {
                    tracing::warn!(file = %started.file.name, error = %e, "Completion follow-up failed");
                }
            }
        }
    }

    emit(config.output_format, &outcomes, |outcomes| {
        for (file, outcome) in outcomes {
            print_dispatch_outcome(file, outcome);
        }
    })?;

    let rejected = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, DispatchOutcome::Rejected { .. }))
        .count();
    if rejected > 0 {
        bail!("{rejected} file(s) rejected");
    }
    Ok(())
}

fn print_dispatch_outcome(file: &FileId, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Started(started) => println!(
            "{} {} → {} (job {}, {})",
            style("✓").green(),
            file,
            style(&started.pipeline).bold(),
            started.handle.id,
            started.handle.last_state
        ),
        DispatchOutcome::DuplicateSuppressed {
            pipeline,
            destination,
        } => println!(
            "{} {} → {} already active at {}",
            style("=").yellow(),
            file,
            pipeline,
            destination
        ),
        DispatchOutcome::NoMatchingPipeline => {
            println!("{} {} matches no pipeline", style("-").dim(), file)
        }
        DispatchOutcome::Rejected { pipeline, reason } => println!(
            "{} {} → {}: {}",
            style("✗").red(),
            file,
            pipeline.as_deref().unwrap_or("-"),
            reason
        ),
    }
}

/// Run visit QC.
pub async fn qc(config: &CliConfig, args: QcArgs) -> anyhow::Result<()> {
    let modules = ModuleConfigs::from_file(&args.modules)?;
    let svc = services(config)?;

    let options = QcOptions {
        stage: args.stage,
        qc_gear: args.gear,
        input_label: args.input_label,
        max_attempts: args.max_attempts,
        poll_deadline: Duration::from_secs(args.deadline_secs),
        check_all: args.check_all,
    };
    let coordinator = QcCoordinator::new(
        svc.gateway,
        svc.platform.clone(),
        svc.platform,
        svc.notifier,
        modules,
        options,
    )?;

    let participants: Vec<ContainerId> = args
        .participants
        .iter()
        .map(|p| ContainerId::new(p.as_str()))
        .collect();

    if let Some(modified) = args.modified {
        let [participant] = participants.as_slice() else {
            bail!("--modified takes exactly one participant");
        };
        let report = coordinator
            .coordinate(
                participant,
                &args.module,
                &QcTrigger::Modified(FileId::new(modified)),
            )
            .await?;
        emit(config.output_format, &report, print_chain_report)?;
        return Ok(());
    }

    let notify = notify_target(config, args.notify);
    let sweep = coordinator
        .coordinate_all(&participants, &args.module, notify.as_ref())
        .await?;
    emit(config.output_format, &sweep, print_sweep_report)?;

    if !sweep.failures.is_empty() {
        bail!("{} participant(s) failed", sweep.failures.len());
    }
    Ok(())
}

fn print_chain_report(report: &ChainReport) {
    println!(
        "{} {} {} ({} visit(s))",
        style("▶").cyan(),
        style(&report.participant).bold(),
        report.module,
        report.visits
    );
    for evaluation in &report.evaluations {
        let mark = if evaluation.status.is_blocking() {
            style("✗").red()
        } else {
            style("✓").green()
        };
        println!(
            "  {} {} {} {}",
            mark, evaluation.visit_date, evaluation.file, evaluation.status
        );
    }
    if let Some(halted) = &report.halted_at {
        println!("  {} halted at {}", style("■").yellow(), halted);
    }
}

fn print_sweep_report(sweep: &SweepReport) {
    for chain in &sweep.chains {
        print_chain_report(chain);
    }
    for failure in &sweep.failures {
        println!(
            "{} {}: {}",
            style("✗").red(),
            failure.participant,
            failure.reason
        );
    }
}

/// Validate a configuration file.
pub fn validate(kind: ConfigKind, path: &Path) -> anyhow::Result<()> {
    let summary = validate_file(kind, path)?;
    println!("{} {}", style("✓").green(), summary);
    Ok(())
}

fn validate_file(kind: ConfigKind, path: &Path) -> anyhow::Result<String> {
    Ok(match kind {
        ConfigKind::Batch => {
            let config = BatchConfig::from_file(path)?;
            format!(
                "Batch config for gear \"{}\" over {} is valid",
                config.gear_name, config.source
            )
        }
        ConfigKind::Pipeline => {
            let config = PipelineConfig::from_file(path)?;
            let names: Vec<&str> = config.pipelines.iter().map(|p| p.name.as_str()).collect();
            format!(
                "Pipeline config is valid ({} pipeline(s): {})",
                names.len(),
                names.join(", ")
            )
        }
        ConfigKind::Modules => {
            let config = ModuleConfigs::from_file(path)?;
            format!("Module config is valid ({} module(s))", config.modules.len())
        }
    })
}

/// Print the JSON Schema for a config kind.
pub fn schema(kind: ConfigKind) -> anyhow::Result<()> {
    println!("{}", schema_json(kind)?);
    Ok(())
}

fn schema_json(kind: ConfigKind) -> anyhow::Result<String> {
    let schema = match kind {
        ConfigKind::Batch => schemars::schema_for!(BatchConfig),
        ConfigKind::Pipeline => schemars::schema_for!(PipelineConfig),
        ConfigKind::Modules => schemars::schema_for!(ModuleConfigs),
    };
    Ok(serde_json::to_string_pretty(&schema)?)
}

/// Show current configuration.
pub fn show_config(config: &CliConfig) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("********".into());
    }
    println!("Config file: {}", CliConfig::config_path()?.display());
    print!("{}", serde_yaml::to_string(&shown)?);
    Ok(())
}

/// Set a configuration value.
pub fn set_config(key: &str, value: &str) -> anyhow::Result<()> {
    let path = CliConfig::config_path()?;
    let mut config = CliConfig::load_from(&path)?;
    config.set(key, value)?;
    config.save_to(&path)?;
    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}
