//! Delivery targets attached to alert rules.
//!
//! A rule carries an ordered list of [`AlertChannel`]s. Each channel holds a
//! typed [`ChannelConfig`]; the engine never inspects the config contents,
//! it only routes on [`ChannelConfig::kind`] and hands the config verbatim
//! to whichever [`NotificationChannel`](crate::channels::NotificationChannel)
//! is registered for that kind.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of a delivery channel, used for dispatcher routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Chat webhook (Slack, Mattermost, ...).
    Chat,
    /// Email delivery.
    Email,
    /// Paging service.
    Pager,
    /// Generic HTTP callback.
    Webhook,
    /// A channel kind the engine has no built-in variant for.
    Other(String),
}

impl ChannelKind {
    /// Returns the kind as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Chat => "chat",
            Self::Email => "email",
            Self::Pager => "pager",
            Self::Webhook => "webhook",
            Self::Other(kind) => kind,
        }
    }

    /// Parses a kind name, mapping built-in names to their typed variants.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "chat" => Self::Chat,
            "email" => Self::Email,
            "pager" => Self::Pager,
            "webhook" => Self::Webhook,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    /// Post a message to a chat webhook.
    Chat {
        /// Incoming webhook URL.
        webhook_url: String,
        /// Optional room or channel override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
    /// Send an email.
    Email {
        /// Primary recipients.
        to: Vec<String>,
        /// Carbon-copy recipients.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        cc: Vec<String>,
    },
    /// Trigger a paging service incident.
    Pager {
        /// Integration / routing key.
        routing_key: String,
        /// Optional service identifier.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service: Option<String>,
    },
    /// POST a JSON payload to an arbitrary endpoint.
    Webhook {
        /// Endpoint URL.
        url: String,
        /// Extra HTTP headers.
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    /// Unknown or future channel kind with a free-form config map.
    Opaque {
        /// The channel kind name used for routing.
        kind: String,
        /// Free-form key/value configuration.
        #[serde(default)]
        config: HashMap<String, String>,
    },
}

impl ChannelConfig {
    /// Returns the routing kind for this config.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Chat { .. } => ChannelKind::Chat,
            Self::Email { .. } => ChannelKind::Email,
            Self::Pager { .. } => ChannelKind::Pager,
            Self::Webhook { .. } => ChannelKind::Webhook,
            Self::Opaque { kind, .. } => ChannelKind::from_name(kind),
        }
    }

    /// Returns a short, non-secret description of the destination for logs.
    #[must_use]
    pub fn destination(&self) -> String {
        match self {
            Self::Chat { channel, .. } => channel.clone().unwrap_or_else(|| "chat".to_string()),
            Self::Email { to, .. } => to.join(","),
            Self::Pager { service, .. } => service.clone().unwrap_or_else(|| "pager".to_string()),
            Self::Webhook { url, .. } => url.clone(),
            Self::Opaque { kind, .. } => kind.clone(),
        }
    }
}

/// A delivery target configured on a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertChannel {
    /// Optional operator-facing label, used in logs and failure reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The typed channel configuration.
    #[serde(flatten)]
    pub config: ChannelConfig,
}

impl AlertChannel {
    /// Creates an unlabelled channel.
    #[must_use]
    pub const fn new(config: ChannelConfig) -> Self {
        Self {
            label: None,
            config,
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Creates a chat channel.
    #[must_use]
    pub fn chat(webhook_url: impl Into<String>) -> Self {
        Self::new(ChannelConfig::Chat {
            webhook_url: webhook_url.into(),
            channel: None,
        })
    }

    /// Creates an email channel.
    #[must_use]
    pub fn email(to: impl Into<String>) -> Self {
        Self::new(ChannelConfig::Email {
            to: vec![to.into()],
            cc: Vec::new(),
        })
    }

    /// Creates a pager channel.
    #[must_use]
    pub fn pager(routing_key: impl Into<String>) -> Self {
        Self::new(ChannelConfig::Pager {
            routing_key: routing_key.into(),
            service: None,
        })
    }

    /// Creates a webhook channel.
    #[must_use]
    pub fn webhook(url: impl Into<String>) -> Self {
        Self::new(ChannelConfig::Webhook {
            url: url.into(),
            headers: HashMap::new(),
        })
    }

    /// Returns the routing kind.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.config.kind()
    }

    /// Returns the label, or the kind name when unlabelled.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.kind().as_str().to_string())
    }
}
