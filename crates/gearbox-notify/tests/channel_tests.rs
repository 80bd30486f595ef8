//! Channel senders against mock endpoints.

use gearbox_core::Error;
use gearbox_core::notification::Notification;
use gearbox_core::ports::Notifier;
use gearbox_notify::{
    AuthType, ChannelConfig, ChannelNotifier, EmailRelayConfig, HttpMethod, SlackConfig,
    WebhookAuth, WebhookConfig,
};
use serde_json::json;
use std::collections::HashMap;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn notification() -> Notification {
    Notification::new(
        "gearbox@center.org",
        vec!["ops@center.org".into(), "lead@center.org".into()],
        "form-transformer batch run failures",
        "- batch 2 [C, D] after 2 attempt(s): job job-3 ended failed\n",
    )
}

#[tokio::test]
async fn test_email_relay_posts_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer relay-key"))
        .and(body_json(json!({
            "from": "gearbox@center.org",
            "to": ["ops@center.org", "lead@center.org"],
            "cc": ["audit@center.org"],
            "subject": "[gearbox] form-transformer batch run failures",
            "body": "- batch 2 [C, D] after 2 attempt(s): job job-3 ended failed\n"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = ChannelNotifier::from_config(&ChannelConfig::EmailRelay(EmailRelayConfig {
        url: format!("{}/send", server.uri()),
        api_key: Some("relay-key".into()),
        cc: vec!["audit@center.org".into()],
        subject_prefix: "[gearbox]".into(),
    }));

    notifier.send(&notification()).await.unwrap();
}

#[tokio::test]
async fn test_slack_failure_is_notification_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/T000"))
        .respond_with(ResponseTemplate::new(500).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let notifier = ChannelNotifier::from_config(&ChannelConfig::Slack(SlackConfig {
        webhook_url: format!("{}/hooks/T000", server.uri()),
        ..Default::default()
    }));

    let err = notifier.send(&notification()).await.unwrap_err();
    match err {
        Error::Notification(message) => assert!(message.contains("rate limited")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_slack_sets_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"channel": "#qc-alerts", "username": "gearbox"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = ChannelNotifier::from_config(&ChannelConfig::Slack(SlackConfig {
        webhook_url: server.uri(),
        channel: Some("#qc-alerts".into()),
        ..Default::default()
    }));

    notifier.send(&notification()).await.unwrap();
}

#[tokio::test]
async fn test_webhook_sends_headers_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/events"))
        .and(header("x-source", "gearbox"))
        .and(header("authorization", "Bearer hook-token"))
        .and(body_partial_json(json!({"subject": "form-transformer batch run failures"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = ChannelNotifier::from_config(&ChannelConfig::Webhook(WebhookConfig {
        url: format!("{}/events", server.uri()),
        method: HttpMethod::PUT,
        headers: HashMap::from([("x-source".to_string(), "gearbox".to_string())]),
        auth: Some(WebhookAuth {
            auth_type: AuthType::Bearer,
            token: "hook-token".into(),
        }),
        timeout_seconds: 5,
    }));

    notifier.send(&notification()).await.unwrap();
}

#[tokio::test]
async fn test_log_channel_always_succeeds() {
    let notifier = ChannelNotifier::from_config(&ChannelConfig::Log);
    notifier.send(&notification()).await.unwrap();
}
