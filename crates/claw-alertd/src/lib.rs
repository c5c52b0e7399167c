//! Threshold-based alert evaluation and notification for Clawbernetes.
//!
//! `claw-alertd` periodically compares metric values against user-defined
//! rules, debounces breaches so short spikes don't page anyone, records every
//! firing in an alert history, and fans notifications out to chat, email,
//! pager, and webhook channels.
//!
//! # Features
//!
//! - **Rules**: metric, comparison, threshold, and a hold duration
//! - **Debounce**: a breach must be sustained for the rule's duration before it fires
//! - **Lifecycle**: firing, acknowledged, and resolved records with MTTR statistics
//! - **Isolation**: one failing channel never blocks the others or the loop
//! - **Deterministic ticks**: [`AlertEngine::tick_at`] evaluates at an explicit time
//!
//! # Example
//!
//! ```rust
//! use claw_alertd::{
//!     AlertChannel, AlertEngine, AlertRule, AlertSeverity, ComparisonOperator, EngineConfig,
//!     NotificationDispatcher, StaticMetricProvider, channels::LogChannel,
//! };
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> claw_alertd::Result<()> {
//! let metrics = StaticMetricProvider::new();
//! let dispatcher = NotificationDispatcher::new().with_fallback(Arc::new(LogChannel::default()));
//! let engine = AlertEngine::new(EngineConfig::default(), Arc::new(metrics.clone()), dispatcher);
//!
//! // Fire when the queue stays above 100 for a minute.
//! let rule = AlertRule::builder("queue", "Queue backlog", "queue_depth", ComparisonOperator::Gt, 100.0)
//!     .duration_secs(60)
//!     .severity(AlertSeverity::Critical)
//!     .channel(AlertChannel::email("ops@example.com"))
//!     .build()?;
//! engine.add_rule(rule)?;
//!
//! let start = Utc::now();
//! metrics.set("queue_depth", 150.0);
//! engine.tick_at(start).await;
//! assert!(engine.get_active_alerts().is_empty());
//!
//! engine.tick_at(start + Duration::seconds(60)).await;
//! assert_eq!(engine.get_active_alerts().len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channel;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod history;
pub mod provider;
pub mod tracker;
pub mod types;

// Re-export main types at crate root
pub use channel::{AlertChannel, ChannelConfig, ChannelKind};
pub use channels::{NotificationChannel, NotificationEvent, RenderedMessage};
pub use config::{DaemonConfig, EngineConfig};
pub use dispatcher::{DeliveryFailure, DispatchReport, NotificationDispatcher};
pub use engine::{AlertEngine, RuleFailure, TickOutcome, TickReport};
pub use error::{AlertError, Result};
pub use history::{AlertNotification, AlertStats, NotificationStatus};
pub use provider::{MetricProvider, StaticMetricProvider};
pub use types::{AlertRule, AlertRuleBuilder, AlertSeverity, ComparisonOperator, RulePatch};
