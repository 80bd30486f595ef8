use gearbox_core::file::FileRef;
use gearbox_core::ids::{ContainerId, FileId};
use gearbox_core::job::JobState;
use gearbox_core::pipeline::PipelineConfig;
use gearbox_dispatch::{DispatchOutcome, Dispatcher, DispatcherOptions};
use gearbox_gateway::{JobGateway, PollPolicy};
use gearbox_platform::{MemoryPlatform, ScriptedJob};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const PIPELINES: &str = r#"
gears: [form-screening, csv-center-splitter]
pipelines:
  - name: submission
    modules: [UDS, FTLD]
    tags: [submission]
    extensions: [csv]
    notify_user: true
    starting_gear:
      gear_name: form-screening
      inputs:
        - label: input_file
          file_locator: matched
        - label: template
          file_locator: module
          file_name: "${module}-template.json"
        - label: rules
          file_locator: fixed
          file_name: screening-rules.yaml
      configs:
        module: "{{module}}"
        queue_tags: [queued]
  - name: split
    tags: [split]
    extensions: [csv]
    starting_gear:
      gear_name: csv-center-splitter
      inputs:
        - label: input_file
          file_locator: matched
"#;

fn file(id: &str, name: &str, parent: &str, tags: &[&str]) -> FileRef {
    FileRef {
        id: FileId::new(id),
        name: name.into(),
        parent: ContainerId::new(parent),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        origin: Some("uploader@center.org".into()),
    }
}

fn setup(options: DispatcherOptions) -> (Arc<MemoryPlatform>, Dispatcher) {
    let platform = Arc::new(MemoryPlatform::new());
    platform.register_gear("form-screening", &["input_file", "template", "rules"]);
    platform.register_gear("csv-center-splitter", &["input_file"]);

    let resources = options
        .resource_container
        .clone()
        .unwrap_or_else(|| ContainerId::new("proj-1"));
    for name in ["UDS-template.json", "FTLD-template.json", "screening-rules.yaml"] {
        platform.add_file(file(&format!("res-{name}"), name, resources.as_str(), &[]));
    }

    let config: PipelineConfig = serde_yaml::from_str(PIPELINES).unwrap();
    let gateway = Arc::new(JobGateway::new(platform.clone(), PollPolicy::immediate()));
    let dispatcher = Dispatcher::new(
        &config,
        gateway,
        platform.clone(),
        platform.clone(),
        options,
    )
    .unwrap();
    (platform, dispatcher)
}

#[tokio::test]
async fn test_dispatch_resolves_all_locators() {
    let (platform, dispatcher) = setup(DispatcherOptions::default());
    let upload = file("f1", "NACC123_ftld.csv", "proj-1", &["submission"]);

    let outcome = dispatcher.dispatch(&upload).await.unwrap();
    let started = outcome.started().expect("pipeline should start");
    assert_eq!(started.pipeline, "submission");
    assert_eq!(started.module.as_deref(), Some("FTLD"));

    let submitted = platform.submitted_for("form-screening");
    assert_eq!(submitted.len(), 1);
    let request = &submitted[0];
    assert_eq!(request.destination, ContainerId::new("proj-1"));
    assert_eq!(request.inputs["input_file"].id, FileId::new("f1"));
    assert_eq!(request.inputs["template"].name, "FTLD-template.json");
    assert_eq!(request.inputs["rules"].name, "screening-rules.yaml");
    assert_eq!(request.configs["module"], json!("FTLD"));
    assert_eq!(request.configs["queue_tags"], json!(["queued"]));
}

#[tokio::test]
async fn test_second_file_for_active_destination_is_suppressed() {
    let (platform, dispatcher) = setup(DispatcherOptions::default());
    let first = file("f1", "a_uds.csv", "proj-1", &["submission"]);
    let second = file("f2", "b_uds.csv", "proj-1", &["submission"]);

    let outcomes = dispatcher.dispatch_all(&[first, second]).await;

    assert!(matches!(outcomes[0].1, DispatchOutcome::Started(_)));
    assert!(matches!(
        &outcomes[1].1,
        DispatchOutcome::DuplicateSuppressed { pipeline, destination }
            if pipeline == "submission" && destination.as_str() == "proj-1"
    ));
    assert_eq!(platform.submitted_for("form-screening").len(), 1);
}

#[tokio::test]
async fn test_other_destination_is_not_suppressed() {
    let (platform, dispatcher) = setup(DispatcherOptions {
        resource_container: Some(ContainerId::new("resources")),
        ..Default::default()
    });
    platform.seed_job("form-screening", &ContainerId::new("proj-1"), ScriptedJob::hang());

    let outcome = dispatcher
        .dispatch(&file("f2", "b_uds.csv", "proj-2", &["submission"]))
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Started(_)));
}

#[tokio::test]
async fn test_scope_overrides_destination() {
    let scope = ContainerId::new("center-project");
    let (platform, dispatcher) = setup(DispatcherOptions {
        scope: Some(scope.clone()),
        resource_container: Some(ContainerId::new("resources")),
        ..Default::default()
    });
    platform.seed_job("form-screening", &scope, ScriptedJob::hang());

    let outcome = dispatcher
        .dispatch(&file("f1", "a_uds.csv", "acq-7", &["submission"]))
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::DuplicateSuppressed { .. }));
}

#[tokio::test]
async fn test_unmatched_file_starts_nothing() {
    let (platform, dispatcher) = setup(DispatcherOptions::default());

    let outcome = dispatcher
        .dispatch(&file("f1", "notes.txt", "proj-1", &["submission"]))
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::NoMatchingPipeline));
    assert!(platform.submitted().is_empty());
}

#[tokio::test]
async fn test_missing_module_input_rejects_and_records_error() {
    let (platform, dispatcher) = setup(DispatcherOptions::default());
    let upload = file("f1", "NACC123_lbd.csv", "proj-1", &["submission"]);

    let outcome = dispatcher.dispatch(&upload).await.unwrap();

    assert!(matches!(
        outcome,
        DispatchOutcome::Rejected { pipeline: Some(ref p), .. } if p == "submission"
    ));
    assert!(platform.submitted().is_empty());
    let errors = platform.file_errors(&upload.id);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "unresolved-input");
}

#[tokio::test]
async fn test_start_rejection_is_recorded_on_file() {
    let (platform, dispatcher) = setup(DispatcherOptions::default());
    platform.set_read_only(&ContainerId::new("proj-1"));
    let upload = file("f1", "centers.csv", "proj-1", &["split"]);

    let outcome = dispatcher.dispatch(&upload).await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
    assert_eq!(platform.file_errors(&upload.id)[0].code, "dispatch-rejected");
}

#[tokio::test]
async fn test_platform_failure_on_start_is_rejected_outcome() {
    let (platform, dispatcher) = setup(DispatcherOptions::default());
    platform.set_unreachable(&ContainerId::new("proj-1"));
    let upload = file("f1", "centers.csv", "proj-1", &["split"]);

    let outcome = dispatcher.dispatch(&upload).await.unwrap();

    match outcome {
        DispatchOutcome::Rejected { pipeline, reason } => {
            assert_eq!(pipeline.as_deref(), Some("split"));
            assert!(reason.contains("unreachable"), "{reason}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    let errors = platform.file_errors(&upload.id);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "dispatch-rejected");
    assert!(platform.submitted().is_empty());
}

#[tokio::test]
async fn test_dispatch_all_isolates_failures() {
    let (platform, dispatcher) = setup(DispatcherOptions::default());
    let files = [
        file("f1", "x_lbd.csv", "proj-1", &["submission"]),
        file("f2", "centers.csv", "proj-9", &["split"]),
        file("f3", "readme.md", "proj-1", &[]),
    ];

    let outcomes = dispatcher.dispatch_all(&files).await;

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0].1, DispatchOutcome::Rejected { .. }));
    assert!(matches!(outcomes[1].1, DispatchOutcome::Started(_)));
    assert!(matches!(outcomes[2].1, DispatchOutcome::NoMatchingPipeline));
    assert_eq!(platform.submitted_for("csv-center-splitter").len(), 1);
}

#[tokio::test]
async fn test_completion_notifies_uploader() {
    let (platform, dispatcher) = setup(DispatcherOptions {
        completion_deadline: Duration::from_secs(5),
        ..Default::default()
    });
    platform.script("form-screening", [ScriptedJob::failed().after_polls(2)]);

    let outcome = dispatcher
        .dispatch(&file("f1", "a_uds.csv", "proj-1", &["submission"]))
        .await
        .unwrap();
    let DispatchOutcome::Started(mut started) = outcome else {
        panic!("expected a started pipeline");
    };

    let state = dispatcher.notify_on_completion(&mut started).await.unwrap();

    assert_eq!(state, Some(JobState::Failed));
    let notifications = platform.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].recipients, vec!["uploader@center.org"]);
    assert!(notifications[0].subject.contains("failed"));
}

#[tokio::test]
async fn test_completion_skipped_without_notify_user() {
    let (platform, dispatcher) = setup(DispatcherOptions::default());

    let outcome = dispatcher
        .dispatch(&file("f1", "centers.csv", "proj-1", &["split"]))
        .await
        .unwrap();
    let DispatchOutcome::Started(mut started) = outcome else {
        panic!("expected a started pipeline");
    };

    assert_eq!(dispatcher.notify_on_completion(&mut started).await.unwrap(), None);
    assert!(platform.notifications().is_empty());
}
