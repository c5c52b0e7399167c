//! Notification channels for alert delivery.
//!
//! This module provides the [`NotificationChannel`] trait, the
//! [`RenderedMessage`] handed to every channel, and two implementations:
//! [`LogChannel`] writes to `tracing`, [`WebhookChannel`] POSTs JSON over
//! HTTP for `webhook` and `chat` configs.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::channel::{ChannelConfig, ChannelKind};
use crate::error::{AlertError, Result};
use crate::history::AlertNotification;
use crate::types::{AlertRule, AlertSeverity, ComparisonOperator};

/// Whether a message announces a firing or a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    /// The rule started firing.
    Firing,
    /// The rule's breach cleared.
    Resolved,
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firing => write!(f, "firing"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// A channel-agnostic description of one alert event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// Firing or resolved.
    pub event: NotificationEvent,
    /// The history record this message belongs to.
    pub notification_id: String,
    /// The originating rule.
    pub rule_id: String,
    /// The rule name.
    pub rule_name: String,
    /// The rule description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The rule severity.
    pub severity: AlertSeverity,
    /// The monitored metric.
    pub metric: String,
    /// The comparison applied.
    pub condition: ComparisonOperator,
    /// The threshold.
    pub threshold: f64,
    /// The value observed for this event.
    pub value: f64,
    /// When the alert fired.
    pub fired_at: DateTime<Utc>,
    /// When the alert resolved (resolved events only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Runbook reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook: Option<String>,
    /// Rule tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RenderedMessage {
    /// Renders a firing message.
    #[must_use]
    pub fn firing(rule: &AlertRule, notification: &AlertNotification) -> Self {
        Self::render(NotificationEvent::Firing, rule, notification, notification.value)
    }

    /// Renders a resolution message; `value` is the observation that cleared the breach.
    #[must_use]
    pub fn resolved(rule: &AlertRule, notification: &AlertNotification, value: f64) -> Self {
        Self::render(NotificationEvent::Resolved, rule, notification, value)
    }

    fn render(
        event: NotificationEvent,
        rule: &AlertRule,
        notification: &AlertNotification,
        value: f64,
    ) -> Self {
        Self {
            event,
            notification_id: notification.id.clone(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            description: rule.description.clone(),
            severity: notification.severity,
            metric: rule.metric.clone(),
            condition: rule.condition,
            threshold: notification.threshold,
            value,
            fired_at: notification.timestamp,
            resolved_at: notification.resolved_at,
            runbook: rule.runbook.clone(),
            tags: rule.tags.clone(),
        }
    }

    /// One-line title, e.g. `[FIRING:critical] Queue depth`.
    #[must_use]
    pub fn title(&self) -> String {
        match self.event {
            NotificationEvent::Firing => {
                format!("[FIRING:{}] {}", self.severity, self.rule_name)
            }
            NotificationEvent::Resolved => format!("[RESOLVED] {}", self.rule_name),
        }
    }

    /// Human-readable body text.
    #[must_use]
    pub fn body(&self) -> String {
        let mut body = format!(
            "{} {} {} (current value: {})",
            self.metric, self.condition, self.threshold, self.value
        );
        if let Some(ms) = self.resolution_time_ms() {
            body.push_str(&format!("\nresolved after {}s", ms / 1000));
        }
        if let Some(description) = &self.description {
            body.push('\n');
            body.push_str(description);
        }
        if let Some(runbook) = &self.runbook {
            body.push_str("\nrunbook: ");
            body.push_str(runbook);
        }
        body
    }

    /// Display color: green for resolutions, otherwise by severity.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match (self.event, self.severity) {
            (NotificationEvent::Resolved, _) => "#2e7d32",
            (NotificationEvent::Firing, AlertSeverity::Critical) => "#d32f2f",
            (NotificationEvent::Firing, AlertSeverity::Warning) => "#f9a825",
            (NotificationEvent::Firing, AlertSeverity::Info) => "#1976d2",
        }
    }

    /// Milliseconds from firing to resolution, for resolved events.
    #[must_use]
    pub fn resolution_time_ms(&self) -> Option<i64> {
        self.resolved_at
            .map(|r| r.signed_duration_since(self.fired_at).num_milliseconds().max(0))
    }
}

/// Trait for notification channels.
///
/// One implementation is registered per [`ChannelKind`] in the
/// [`NotificationDispatcher`](crate::dispatcher::NotificationDispatcher).
/// The channel receives the rule's config verbatim and owns any endpoint
/// or credential handling, rendering, and retry policy.
pub trait NotificationChannel: Send + Sync + fmt::Debug {
    /// Returns the name of this channel.
    fn name(&self) -> &str;

    /// Delivers `message` to the destination described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::NotificationFailed` if delivery fails.
    fn deliver<'a>(
        &'a self,
        config: &'a ChannelConfig,
        message: &'a RenderedMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// A channel that logs notifications for debugging.
#[derive(Debug, Clone)]
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    /// Creates a new log channel.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new("log")
    }
}

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver<'a>(
        &'a self,
        config: &'a ChannelConfig,
        message: &'a RenderedMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match message.event {
                NotificationEvent::Firing => {
                    error!(
                        alert = %message.rule_name,
                        kind = %config.kind(),
                        destination = %config.destination(),
                        severity = %message.severity,
                        value = %message.value,
                        threshold = %message.threshold,
                        "ALERT"
                    );
                }
                NotificationEvent::Resolved => {
                    info!(
                        alert = %message.rule_name,
                        kind = %config.kind(),
                        destination = %config.destination(),
                        severity = %message.severity,
                        resolution_ms = ?message.resolution_time_ms(),
                        "RESOLVED"
                    );
                }
            }
            Ok(())
        })
    }
}

/// JSON body sent to generic webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Payload format version.
    pub version: String,
    /// Firing or resolved.
    pub status: NotificationEvent,
    /// Message title.
    pub title: String,
    /// Message body.
    pub text: String,
    /// The full rendered message.
    pub alert: RenderedMessage,
}

impl WebhookPayload {
    /// Builds the payload for a message.
    #[must_use]
    pub fn from_message(message: &RenderedMessage) -> Self {
        Self {
            version: "1".to_string(),
            status: message.event,
            title: message.title(),
            text: message.body(),
            alert: message.clone(),
        }
    }
}

/// Attachment-style payload understood by common chat webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Fallback text.
    pub text: String,
    /// Channel override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Rich attachments.
    pub attachments: Vec<ChatAttachment>,
}

/// A single chat attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAttachment {
    /// Side bar color.
    pub color: String,
    /// Attachment title.
    pub title: String,
    /// Attachment text.
    pub text: String,
}

impl ChatPayload {
    /// Builds the chat payload for a message.
    #[must_use]
    pub fn from_message(message: &RenderedMessage, channel: Option<String>) -> Self {
        Self {
            text: message.title(),
            channel,
            attachments: vec![ChatAttachment {
                color: message.color().to_string(),
                title: message.title(),
                text: message.body(),
            }],
        }
    }
}

/// Delivers `webhook` and `chat` configs as HTTP POST requests.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    name: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// Creates a webhook channel whose HTTP client gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Config` if the HTTP client cannot be built.
    pub fn new(name: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            client,
        })
    }

    fn failed(&self, reason: impl Into<String>) -> AlertError {
        AlertError::NotificationFailed {
            channel: self.name.clone(),
            reason: reason.into(),
        }
    }

    async fn post<T: Serialize + Sync>(
        &self,
        url: &str,
        headers: Option<&HashMap<String, String>>,
        body: &T,
    ) -> Result<()> {
        let mut request = self.client.post(url).json(body);
        for (key, value) in headers.into_iter().flatten() {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| self.failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.failed(format!("endpoint returned HTTP {status}")));
        }

        debug!(channel = %self.name, url = %url, status = %status, "webhook delivered");
        Ok(())
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver<'a>(
        &'a self,
        config: &'a ChannelConfig,
        message: &'a RenderedMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match config {
                ChannelConfig::Webhook { url, headers } => {
                    let payload = WebhookPayload::from_message(message);
                    self.post(url, Some(headers), &payload).await
                }
                ChannelConfig::Chat {
                    webhook_url,
                    channel,
                } => {
                    let payload = ChatPayload::from_message(message, channel.clone());
                    self.post(webhook_url, None, &payload).await
                }
                other => Err(self.failed(format!(
                    "unsupported channel kind '{}'",
                    other.kind()
                ))),
            }
        })
    }
}

/// Kinds a [`WebhookChannel`] can deliver.
pub const WEBHOOK_KINDS: [ChannelKind; 2] = [ChannelKind::Webhook, ChannelKind::Chat];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::AlertHistory;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn rule(severity: AlertSeverity) -> AlertRule {
        AlertRule::builder("queue", "Queue depth", "queue_depth", ComparisonOperator::Gt, 100.0)
            .severity(severity)
            .description("Ingest queue is backing up")
            .runbook("https://runbooks.example.com/queue")
            .build()
            .unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    mod render_tests {
        use super::*;

        #[test]
        fn firing_message() {
            let rule = rule(AlertSeverity::Critical);
            let mut history = AlertHistory::new();
            let fired = history.record_firing(&rule, 150.0, t0());

            let msg = RenderedMessage::firing(&rule, &fired);
            assert_eq!(msg.event, NotificationEvent::Firing);
            assert_eq!(msg.title(), "[FIRING:critical] Queue depth");
            assert!(msg.body().starts_with("queue_depth > 100 (current value: 150)"));
            assert!(msg.body().contains("runbook: https://runbooks.example.com/queue"));
            assert_eq!(msg.color(), "#d32f2f");
            assert!(msg.resolution_time_ms().is_none());
        }

        #[test]
        fn resolved_message() {
            let rule = rule(AlertSeverity::Warning);
            let mut history = AlertHistory::new();
            let fired = history.record_firing(&rule, 150.0, t0());
            let resolved = history
                .resolve(&fired.id, t0() + ChronoDuration::seconds(75))
                .unwrap();

            let msg = RenderedMessage::resolved(&rule, &resolved, 40.0);
            assert_eq!(msg.title(), "[RESOLVED] Queue depth");
            assert_eq!(msg.resolution_time_ms(), Some(75_000));
            assert!(msg.body().contains("resolved after 75s"));
            assert!(msg.body().contains("current value: 40"));
            assert_eq!(msg.color(), "#2e7d32");
        }

        #[test]
        fn severity_colors() {
            let mut history = AlertHistory::new();
            for (severity, color) in [
                (AlertSeverity::Info, "#1976d2"),
                (AlertSeverity::Warning, "#f9a825"),
                (AlertSeverity::Critical, "#d32f2f"),
            ] {
                let rule = rule(severity);
                let fired = history.record_firing(&rule, 150.0, t0());
                assert_eq!(RenderedMessage::firing(&rule, &fired).color(), color);
            }
        }
    }

    mod payload_tests {
        use super::*;

        #[test]
        fn webhook_payload_shape() {
            let rule = rule(AlertSeverity::Warning);
            let mut history = AlertHistory::new();
            let fired = history.record_firing(&rule, 150.0, t0());
            let msg = RenderedMessage::firing(&rule, &fired);

            let json = serde_json::to_value(WebhookPayload::from_message(&msg)).unwrap();
            assert_eq!(json["version"], "1");
            assert_eq!(json["status"], "firing");
            assert_eq!(json["alert"]["rule_id"], "queue");
            assert_eq!(json["alert"]["condition"], "gt");
        }

        #[test]
        fn chat_payload_carries_color_and_channel() {
            let rule = rule(AlertSeverity::Critical);
            let mut history = AlertHistory::new();
            let fired = history.record_firing(&rule, 150.0, t0());
            let msg = RenderedMessage::firing(&rule, &fired);

            let payload = ChatPayload::from_message(&msg, Some("#ops".to_string()));
            assert_eq!(payload.channel.as_deref(), Some("#ops"));
            assert_eq!(payload.attachments.len(), 1);
            assert_eq!(payload.attachments[0].color, "#d32f2f");
        }
    }

    mod channel_tests {
        use super::*;

        #[tokio::test]
        async fn log_channel_always_succeeds() {
            let rule = rule(AlertSeverity::Info);
            let mut history = AlertHistory::new();
            let fired = history.record_firing(&rule, 150.0, t0());
            let msg = RenderedMessage::firing(&rule, &fired);

            let channel = LogChannel::default();
            assert_eq!(channel.name(), "log");
            let config = ChannelConfig::Pager {
                routing_key: "key".to_string(),
                service: None,
            };
            assert!(channel.deliver(&config, &msg).await.is_ok());
        }

        #[tokio::test]
        async fn webhook_channel_rejects_unsupported_kind() {
            let rule = rule(AlertSeverity::Info);
            let mut history = AlertHistory::new();
            let fired = history.record_firing(&rule, 150.0, t0());
            let msg = RenderedMessage::firing(&rule, &fired);

            let channel = WebhookChannel::new("http", Duration::from_secs(1)).unwrap();
            let config = ChannelConfig::Email {
                to: vec!["ops@example.com".to_string()],
                cc: Vec::new(),
            };
            match channel.deliver(&config, &msg).await {
                Err(AlertError::NotificationFailed { channel, reason }) => {
                    assert_eq!(channel, "http");
                    assert!(reason.contains("email"));
                }
                other => panic!("expected NotificationFailed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn webhook_channel_reports_connection_errors() {
            let rule = rule(AlertSeverity::Info);
            let mut history = AlertHistory::new();
            let fired = history.record_firing(&rule, 150.0, t0());
            let msg = RenderedMessage::firing(&rule, &fired);

            let channel = WebhookChannel::new("http", Duration::from_millis(500)).unwrap();
            let config = ChannelConfig::Webhook {
                url: "http://127.0.0.1:9/unreachable".to_string(),
                headers: HashMap::new(),
            };
            assert!(matches!(
                channel.deliver(&config, &msg).await,
                Err(AlertError::NotificationFailed { .. })
            ));
        }
    }
}
