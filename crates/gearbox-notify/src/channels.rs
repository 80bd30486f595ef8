//! Notification channel configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    EmailRelay,
    Slack,
    Webhook,
    Log,
}

/// Channel-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    EmailRelay(EmailRelayConfig),
    Slack(SlackConfig),
    Webhook(WebhookConfig),
    /// Write notifications to the log only.
    #[default]
    Log,
}

impl ChannelConfig {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelConfig::EmailRelay(_) => ChannelType::EmailRelay,
            ChannelConfig::Slack(_) => ChannelType::Slack,
            ChannelConfig::Webhook(_) => ChannelType::Webhook,
            ChannelConfig::Log => ChannelType::Log,
        }
    }
}

/// HTTP mail relay that accepts `{from, to, cc, subject, body}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmailRelayConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub subject_prefix: String,
}

impl Default for EmailRelayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            cc: vec![],
            subject_prefix: String::new(),
        }
    }
}

/// Slack incoming webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SlackConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_icon")]
    pub icon_emoji: String,
}

fn default_username() -> String {
    "gearbox".to_string()
}

fn default_icon() -> String {
    ":gear:".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            channel: None,
            username: default_username(),
            icon_emoji: default_icon(),
        }
    }
}

/// Generic webhook configuration. The notification is sent as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum HttpMethod {
    POST,
    PUT,
}

fn default_method() -> HttpMethod {
    HttpMethod::POST
}

fn default_timeout() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebhookAuth {
    pub auth_type: AuthType,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Bearer,
    Basic,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: default_method(),
            headers: HashMap::new(),
            auth: None,
            timeout_seconds: default_timeout(),
        }
    }
}
