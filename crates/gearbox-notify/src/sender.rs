//! Notification senders.

use crate::channels::*;
use async_trait::async_trait;
use gearbox_core::notification::Notification;
use gearbox_core::ports::Notifier;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Channel not configured: {0}")]
    NotConfigured(String),
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

impl From<NotifyError> for gearbox_core::Error {
    fn from(e: NotifyError) -> Self {
        gearbox_core::Error::Notification(e.to_string())
    }
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

async fn check_response(channel: &str, response: reqwest::Response) -> Result<(), NotifyError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(NotifyError::DeliveryFailed(format!(
            "{} returned {}: {}",
            channel, status, body
        )));
    }
    Ok(())
}

/// Body accepted by the mail relay.
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a [String],
    cc: &'a [String],
    subject: String,
    body: &'a str,
}

/// Email delivery through an HTTP mail relay.
pub struct EmailRelaySender {
    config: EmailRelayConfig,
    client: reqwest::Client,
}

impl EmailRelaySender {
    pub fn new(config: EmailRelayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn subject(&self, notification: &Notification) -> String {
        if self.config.subject_prefix.is_empty() {
            notification.subject.clone()
        } else {
            format!("{} {}", self.config.subject_prefix, notification.subject)
        }
    }
}

#[async_trait]
impl NotificationSender for EmailRelaySender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::EmailRelay
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.config.url.is_empty() {
            return Err(NotifyError::NotConfigured("email relay url".into()));
        }
        if notification.recipients.is_empty() {
            return Err(NotifyError::DeliveryFailed("no recipients".into()));
        }
        debug!(relay = %self.config.url, to = ?notification.recipients, "Sending email notification");

        let message = RelayMessage {
            from: &notification.sender,
            to: &notification.recipients,
            cc: &self.config.cc,
            subject: self.subject(notification),
            body: &notification.body,
        };
        let mut request = self.client.post(&self.config.url).json(&message);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        check_response("Mail relay", request.send().await?).await?;
        info!(recipients = notification.recipients.len(), "Email notification sent");
        Ok(())
    }
}

/// Slack notification sender.
pub struct SlackSender {
    config: SlackConfig,
    client: reqwest::Client,
}

impl SlackSender {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_message(&self, notification: &Notification) -> serde_json::Value {
        let subject = notification.subject.to_lowercase();
        let color = if subject.contains("fail") {
            "#dc3545"
        } else {
            "#0366d6"
        };

        let mut message = serde_json::json!({
            "username": self.config.username,
            "icon_emoji": self.config.icon_emoji,
            "attachments": [{
                "color": color,
                "title": notification.subject,
                "text": notification.body,
                "footer": notification.sender,
                "ts": chrono::Utc::now().timestamp()
            }]
        });
        if let Some(channel) = &self.config.channel {
            message["channel"] = serde_json::json!(channel);
        }
        message
    }
}

#[async_trait]
impl NotificationSender for SlackSender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Slack
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        debug!(webhook = %self.config.webhook_url, "Sending Slack notification");

        let message = self.build_message(notification);
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&message)
            .send()
            .await?;

        check_response("Slack", response).await?;
        info!("Slack notification sent");
        Ok(())
    }
}

/// Generic webhook sender.
pub struct WebhookSender {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(config: WebhookConfig) -> Self {
        let timeout = config.timeout_seconds;
        Self {
            config,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout as u64))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        debug!(url = %self.config.url, "Sending webhook notification");

        let mut request = match self.config.method {
            HttpMethod::POST => self.client.post(&self.config.url),
            HttpMethod::PUT => self.client.put(&self.config.url),
        };

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        if let Some(auth) = &self.config.auth {
            request = match auth.auth_type {
                AuthType::Bearer => request.bearer_auth(&auth.token),
                AuthType::Basic => request.basic_auth(&auth.token, None::<&str>),
            };
        }

        let response = request.json(notification).send().await?;
        check_response("Webhook", response).await?;
        info!("Webhook notification sent");
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Log
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            sender = %notification.sender,
            recipients = ?notification.recipients,
            subject = %notification.subject,
            body = %notification.body,
            "Notification"
        );
        Ok(())
    }
}

/// Create a sender for a channel configuration.
pub fn create_sender(config: &ChannelConfig) -> Box<dyn NotificationSender> {
    match config {
        ChannelConfig::EmailRelay(c) => Box::new(EmailRelaySender::new(c.clone())),
        ChannelConfig::Slack(c) => Box::new(SlackSender::new(c.clone())),
        ChannelConfig::Webhook(c) => Box::new(WebhookSender::new(c.clone())),
        ChannelConfig::Log => Box::new(LogSender),
    }
}

/// Adapts a channel sender to the [`Notifier`] port.
pub struct ChannelNotifier {
    sender: Box<dyn NotificationSender>,
}

impl ChannelNotifier {
    pub fn new(sender: Box<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(create_sender(config))
    }

    pub fn channel_type(&self) -> ChannelType {
        self.sender.channel_type()
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, notification: &Notification) -> gearbox_core::Result<()> {
        Ok(self.sender.deliver(notification).await?)
    }
}
