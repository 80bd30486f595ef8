//! Batch scheduler runs against an in-memory platform.

use chrono::{Duration, Utc};
use gearbox_batch::{BatchScheduler, BatchStatus, SchedulerState};
use gearbox_core::batch::{BatchConfig, BatchMode, BatchRunOptions, NotifyTarget};
use gearbox_core::ids::ContainerId;
use gearbox_core::work_unit::WorkUnit;
use gearbox_core::Error;
use gearbox_gateway::{JobGateway, PollPolicy};
use gearbox_platform::{MemoryPlatform, ScriptedJob};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const GEAR: &str = "form-transformer";
const SOURCE: &str = "ingest-form";

fn unit(center: &str) -> WorkUnit {
    WorkUnit {
        center_id: center.into(),
        study_id: None,
        container: ContainerId::new(format!("{center}-ingest")),
        label: SOURCE.into(),
        tags: vec![],
        last_runs: HashMap::new(),
        file_count: 10,
    }
}

fn platform(units: Vec<WorkUnit>) -> Arc<MemoryPlatform> {
    let platform = Arc::new(MemoryPlatform::new());
    platform.register_gear(GEAR, &[]);
    platform.add_work_units(SOURCE, units);
    platform
}

fn scheduler(platform: &Arc<MemoryPlatform>) -> BatchScheduler {
    let gateway = Arc::new(JobGateway::new(platform.clone(), PollPolicy::immediate()));
    BatchScheduler::new(platform.clone(), gateway, platform.clone(), platform.clone())
}

fn config() -> BatchConfig {
    BatchConfig {
        source: SOURCE.into(),
        target: None,
        substitute: false,
        batch_mode: BatchMode::Projects,
        batch_size: 2,
        gear_name: GEAR.into(),
        gear_configs: Default::default(),
        unit_config_key: "work_units".into(),
    }
}

fn options() -> BatchRunOptions {
    let mut options = BatchRunOptions::new(ContainerId::new("admin"));
    options.retry_on_failure = true;
    options.max_attempts = 2;
    options.poll_deadline_secs = 5;
    options.notify = Some(NotifyTarget {
        sender: "noreply@example.org".into(),
        recipients: vec!["ops@example.org".into()],
    });
    options
}

fn dispatched_units(platform: &MemoryPlatform) -> Vec<serde_json::Value> {
    platform
        .submitted_for(GEAR)
        .into_iter()
        .map(|r| r.configs["work_units"].clone())
        .collect()
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_the_run() {
    let platform = platform(["A", "B", "C", "D", "E"].map(unit).to_vec());
    platform.script(
        GEAR,
        [
            ScriptedJob::complete(),
            ScriptedJob::failed(),
            ScriptedJob::failed(),
            ScriptedJob::complete(),
        ],
    );

    let mut scheduler = scheduler(&platform);
    let report = scheduler.run(&config(), &options()).await.unwrap();

    assert_eq!(
        dispatched_units(&platform),
        vec![
            json!(["A", "B"]),
            json!(["C", "D"]),
            json!(["C", "D"]),
            json!(["E"])
        ]
    );
    assert_eq!(report.state, SchedulerState::Done);
    assert_eq!(scheduler.state(), SchedulerState::Done);

    let failed: Vec<_> = report.failed_batches().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].units, ["C", "D"]);
    assert_eq!(failed[0].attempts, 2);
    assert_eq!(report.batches[2].status, BatchStatus::Succeeded);

    let notifications = platform.notifications();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].body.contains("- batch 1 [C, D] after 2 attempt(s)"));
    assert!(!notifications[0].body.contains("[E]"));
    assert_eq!(notifications[0].recipients, ["ops@example.org"]);
}

#[tokio::test]
async fn test_retry_recovers_flaky_batch() {
    let platform = platform(["A", "B"].map(unit).to_vec());
    platform.script(GEAR, [ScriptedJob::cancelled(), ScriptedJob::complete()]);

    let report = scheduler(&platform)
        .run(&config(), &options())
        .await
        .unwrap();

    assert!(!report.has_failures());
    assert_eq!(report.batches[0].attempts, 2);
    assert!(platform.notifications().is_empty());
}

#[tokio::test]
async fn test_without_retry_one_attempt_per_batch() {
    let platform = platform(["A", "B", "C"].map(unit).to_vec());
    platform.script(GEAR, [ScriptedJob::failed(), ScriptedJob::complete()]);
    let mut opts = options();
    opts.retry_on_failure = false;

    let report = scheduler(&platform).run(&config(), &opts).await.unwrap();

    assert_eq!(platform.submitted_for(GEAR).len(), 2);
    assert_eq!(report.failed_batches().count(), 1);
}

#[tokio::test]
async fn test_empty_pool_is_immediate_success() {
    let platform = platform(vec![unit("A")]);
    let mut opts = options();
    opts.exclude_centers = vec!["A".into()];

    let report = scheduler(&platform).run(&config(), &opts).await.unwrap();

    assert_eq!(report.state, SchedulerState::Done);
    assert!(report.batches.is_empty());
    assert!(platform.submitted().is_empty());
    assert!(platform.notifications().is_empty());
    assert!(platform.provenance().is_empty());
}

#[tokio::test]
async fn test_dry_run_dispatches_nothing() {
    let platform = platform(["A", "B", "C"].map(unit).to_vec());
    let mut opts = options();
    opts.dry_run = true;

    let report = scheduler(&platform).run(&config(), &opts).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.batches.len(), 2);
    assert!(report.batches.iter().all(|b| b.status == BatchStatus::Planned));
    assert!(platform.submitted().is_empty());
}

#[tokio::test]
async fn test_recent_runs_are_skipped() {
    let mut recent = unit("A");
    recent.last_runs.insert(GEAR.into(), Utc::now() - Duration::days(2));
    let mut stale = unit("B");
    stale.last_runs.insert(GEAR.into(), Utc::now() - Duration::days(30));
    let platform = platform(vec![recent, stale]);

    let report = scheduler(&platform)
        .run(&config(), &options())
        .await
        .unwrap();

    assert_eq!(dispatched_units(&platform), vec![json!(["B"])]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].unit, "A");
}

#[tokio::test]
async fn test_invalid_config_fails_before_dispatch() {
    let platform = platform(vec![unit("A")]);
    let mut bad = config();
    bad.batch_size = 0;

    let mut scheduler = scheduler(&platform);
    let err = scheduler.run(&bad, &options()).await.unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(scheduler.state(), SchedulerState::Failed);
    assert!(platform.submitted().is_empty());
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_run() {
    let platform = platform(vec![unit("A")]);
    platform.script(GEAR, [ScriptedJob::failed(), ScriptedJob::failed()]);
    platform.fail_notifications(true);

    let report = scheduler(&platform)
        .run(&config(), &options())
        .await
        .unwrap();
    assert!(report.has_failures());
}

#[tokio::test]
async fn test_unknown_gear_is_not_retried() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_work_units(SOURCE, [unit("A")]);
    let report = scheduler(&platform)
        .run(&config(), &options())
        .await
        .unwrap();

    assert_eq!(report.batches[0].attempts, 1);
    assert!(report.has_failures());
}

#[tokio::test]
async fn test_provenance_recorded_once_per_run() {
    let platform = platform(["A", "B", "C"].map(unit).to_vec());
    scheduler(&platform)
        .run(&config(), &options())
        .await
        .unwrap();

    let records = platform.provenance();
    assert_eq!(records.len(), 1);
    let sources: Vec<_> = records[0].sources.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(sources, ["A", "B", "C"]);
}
