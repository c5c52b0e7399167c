//! Routing of rendered messages to channel implementations.
//!
//! The dispatcher looks up one [`NotificationChannel`] per configured
//! [`AlertChannel`] by kind, delivers to all of them concurrently with a
//! per-delivery timeout, and turns every failure into a
//! [`DeliveryFailure`] entry instead of an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::channel::{AlertChannel, ChannelKind};
use crate::channels::{NotificationChannel, RenderedMessage};
use crate::error::AlertError;

/// A delivery that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Position of the channel in the rule's channel list.
    pub index: usize,
    /// The channel's display name.
    pub channel: String,
    /// Why delivery failed.
    pub reason: String,
}

/// Outcome of dispatching one message to all of a rule's channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Number of successful deliveries.
    pub delivered: usize,
    /// Failed deliveries, in channel order.
    pub failed: Vec<DeliveryFailure>,
}

impl DispatchReport {
    /// Total number of delivery attempts.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed.extend(other.failed);
    }
}

/// Routes messages to the channel implementation registered for each kind.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
    fallback: Option<Arc<dyn NotificationChannel>>,
    delivery_timeout: Duration,
}

impl NotificationDispatcher {
    /// Default per-delivery timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a dispatcher with no channels registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            fallback: None,
            delivery_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-delivery timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Registers `channel` for `kind`, replacing any previous registration.
    #[must_use]
    pub fn with_channel(mut self, kind: ChannelKind, channel: Arc<dyn NotificationChannel>) -> Self {
        self.register(kind, channel);
        self
    }

    /// Sets the channel used for kinds without a registration.
    #[must_use]
    pub fn with_fallback(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.fallback = Some(channel);
        self
    }

    /// Registers `channel` for `kind`.
    pub fn register(&mut self, kind: ChannelKind, channel: Arc<dyn NotificationChannel>) {
        debug!(kind = %kind, channel = %channel.name(), "registered notification channel");
        self.channels.insert(kind, channel);
    }

    /// Returns the per-delivery timeout.
    #[must_use]
    pub const fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    /// Returns the implementation that would handle `kind`.
    #[must_use]
    pub fn resolve(&self, kind: &ChannelKind) -> Option<&Arc<dyn NotificationChannel>> {
        self.channels.get(kind).or(self.fallback.as_ref())
    }

    /// Returns the number of registered kinds (not counting the fallback).
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Delivers `message` to every channel in `targets`.
    ///
    /// Never fails: each delivery error, timeout, or unroutable kind is
    /// logged and recorded in the returned report, and the remaining
    /// channels are still attempted.
    pub async fn dispatch(&self, targets: &[AlertChannel], message: &RenderedMessage) -> DispatchReport {
        let deliveries = targets
            .iter()
            .enumerate()
            .map(|(index, target)| async move {
                let result = self.deliver_one(target, message).await;
                (index, target, result)
            });

        let mut report = DispatchReport::default();
        for (index, target, result) in join_all(deliveries).await {
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(
                        rule_id = %message.rule_id,
                        channel = %target.display_name(),
                        event = %message.event,
                        "notification delivered"
                    );
                }
                Err(e) => {
                    warn!(
                        rule_id = %message.rule_id,
                        channel = %target.display_name(),
                        event = %message.event,
                        error = %e,
                        "notification delivery failed"
                    );
                    report.failed.push(DeliveryFailure {
                        index,
                        channel: target.display_name(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }

    async fn deliver_one(
        &self,
        target: &AlertChannel,
        message: &RenderedMessage,
    ) -> Result<(), AlertError> {
        let kind = target.kind();
        let channel = self.resolve(&kind).ok_or_else(|| AlertError::NoChannel {
            kind: kind.as_str().to_string(),
        })?;

        match tokio::time::timeout(self.delivery_timeout, channel.deliver(&target.config, message)).await {
            Ok(result) => result,
            Err(_) => Err(AlertError::Timeout {
                operation: format!("delivery via '{}'", channel.name()),
                after_ms: self.delivery_timeout.as_millis() as u64,
            }),
        }
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
