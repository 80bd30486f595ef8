//! Notification channels for gearbox.
//!
//! Delivers run reports and completion notices through an email relay,
//! Slack, a generic webhook, or the log.

pub mod channels;
pub mod sender;

pub use channels::{
    AuthType, ChannelConfig, ChannelType, EmailRelayConfig, HttpMethod, SlackConfig,
    WebhookAuth, WebhookConfig,
};
pub use sender::{
    ChannelNotifier, EmailRelaySender, LogSender, NotificationSender, NotifyError, SlackSender,
    WebhookSender, create_sender,
};
