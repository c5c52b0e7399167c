//! Engine and daemon configuration.
//!
//! [`EngineConfig`] tunes the evaluation loop. [`DaemonConfig`] is the JSON
//! file read by the `claw-alertd` binary: engine settings, the initial rule
//! set, and seed metric values for the built-in static provider.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};
use crate::types::AlertRule;

/// Configuration for the alert engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How often to evaluate rules (in seconds).
    pub evaluation_interval_secs: u64,
    /// Upper bound on a single metric lookup (in milliseconds).
    pub metric_timeout_ms: u64,
    /// Upper bound on a single channel delivery (in milliseconds).
    pub delivery_timeout_ms: u64,
    /// History limit used when callers don't pass one.
    pub default_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: 30,
            metric_timeout_ms: 5_000,
            delivery_timeout_ms: 10_000,
            default_history_limit: 100,
        }
    }
}

impl EngineConfig {
    /// Returns the evaluation interval.
    #[must_use]
    pub const fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    /// Returns the metric lookup timeout.
    #[must_use]
    pub const fn metric_timeout(&self) -> Duration {
        Duration::from_millis(self.metric_timeout_ms)
    }

    /// Returns the delivery timeout.
    #[must_use]
    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Config` if the interval or a timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.evaluation_interval_secs == 0 {
            return Err(AlertError::Config(
                "evaluation_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.metric_timeout_ms == 0 {
            return Err(AlertError::Config(
                "metric_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.delivery_timeout_ms == 0 {
            return Err(AlertError::Config(
                "delivery_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// File configuration for the `claw-alertd` daemon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Rules loaded at startup.
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    /// Metric values served by the static provider.
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

impl DaemonConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AlertError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or the config fails validation.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validate engine settings, every rule, and rule ID uniqueness.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        let mut seen = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(AlertError::DuplicateRule {
                    id: rule.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// A small example configuration.
    #[must_use]
    pub fn sample() -> Self {
        use crate::channel::AlertChannel;
        use crate::types::{AlertSeverity, ComparisonOperator};

        let rule = AlertRule {
            id: "queue-depth".to_string(),
            name: "Ingest queue depth".to_string(),
            description: Some("Ingest queue is not draining".to_string()),
            metric: "queue_depth".to_string(),
            condition: ComparisonOperator::Gt,
            threshold: 100.0,
            duration_secs: 60,
            severity: AlertSeverity::Critical,
            tags: vec!["ingest".to_string()],
            runbook: Some("https://runbooks.example.com/ingest-queue".to_string()),
            channels: vec![
                AlertChannel::chat("https://chat.example.com/hooks/ops").with_label("ops-chat"),
                AlertChannel::pager("ROUTING-KEY"),
            ],
            enabled: true,
        };

        Self {
            engine: EngineConfig::default(),
            rules: vec![rule],
            metrics: HashMap::from([("queue_depth".to_string(), 0.0)]),
        }
    }
}
