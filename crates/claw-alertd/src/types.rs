//! Core rule types for the alert engine.
//!
//! - [`AlertSeverity`]: The severity level of a rule
//! - [`ComparisonOperator`]: Operators for comparing metric values to thresholds
//! - [`AlertRule`]: A named threshold rule, built with [`AlertRuleBuilder`]
//! - [`RulePatch`]: A partial update applied to an existing rule

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::AlertChannel;
use crate::error::{AlertError, Result};

/// The severity level of an alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational alert, no action required.
    Info,
    /// Warning alert, should be investigated.
    #[default]
    Warning,
    /// Critical alert, requires immediate attention.
    Critical,
}

impl AlertSeverity {
    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Returns the priority of this severity (higher = more urgent).
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Warning => 2,
            Self::Critical => 3,
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Comparison operators for rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    /// Greater than (>).
    Gt,
    /// Less than (<).
    Lt,
    /// Greater than or equal (>=).
    Gte,
    /// Less than or equal (<=).
    Lte,
    /// Exactly equal (==).
    Eq,
    /// Not equal (!=).
    Ne,
}

impl ComparisonOperator {
    /// Evaluates `value <op> threshold`.
    ///
    /// `Eq` and `Ne` compare exactly, without any epsilon.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Gte => value >= threshold,
            Self::Lte => value <= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }

    /// Returns the operator as a string symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_symbol())
    }
}

/// A named, user-authored threshold rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique identifier for the rule.
    pub id: String,
    /// Human-readable name for the rule.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Metric name resolved by the metric provider.
    pub metric: String,
    /// Comparison applied as `value <condition> threshold`.
    pub condition: ComparisonOperator,
    /// The threshold value to compare against.
    pub threshold: f64,
    /// How long the condition must hold continuously before firing (in seconds).
    #[serde(default)]
    pub duration_secs: u64,
    /// The severity of notifications generated by this rule.
    #[serde(default)]
    pub severity: AlertSeverity,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Runbook reference, passed through to notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook: Option<String>,
    /// Ordered delivery targets.
    #[serde(default)]
    pub channels: Vec<AlertChannel>,
    /// Whether this rule is evaluated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

impl AlertRule {
    /// Maximum allowed length for rule names.
    pub const MAX_NAME_LENGTH: usize = 256;

    /// Creates a new alert rule builder.
    pub fn builder(
        id: impl Into<String>,
        name: impl Into<String>,
        metric: impl Into<String>,
        condition: ComparisonOperator,
        threshold: f64,
    ) -> AlertRuleBuilder {
        AlertRuleBuilder::new(id, name, metric, condition, threshold)
    }

    /// Returns the debounce duration as a [`Duration`].
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Returns true if `value` breaches this rule's threshold.
    #[must_use]
    pub fn is_breached(&self, value: f64) -> bool {
        self.condition.evaluate(value, self.threshold)
    }

    /// Checks the rule invariants.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if:
    /// - The id, name or metric is empty
    /// - The name exceeds the maximum length
    /// - The threshold is NaN or infinite
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(invalid("rule id cannot be empty"));
        }

        if self.name.trim().is_empty() {
            return Err(invalid("rule name cannot be empty"));
        }

        if self.name.len() > Self::MAX_NAME_LENGTH {
            return Err(invalid(format!(
                "rule name exceeds maximum length of {} characters",
                Self::MAX_NAME_LENGTH
            )));
        }

        if self.metric.trim().is_empty() {
            return Err(invalid("metric name cannot be empty"));
        }

        if !self.threshold.is_finite() {
            return Err(invalid(format!(
                "threshold must be a finite number, got {}",
                self.threshold
            )));
        }

        Ok(())
    }

    /// Returns a copy of this rule with `patch` applied. The result is not validated.
    #[must_use]
    pub fn apply(&self, patch: &RulePatch) -> Self {
        let mut rule = self.clone();
        if let Some(name) = &patch.name {
            rule.name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            rule.description.clone_from(description);
        }
        if let Some(metric) = &patch.metric {
            rule.metric.clone_from(metric);
        }
        if let Some(condition) = patch.condition {
            rule.condition = condition;
        }
        if let Some(threshold) = patch.threshold {
            rule.threshold = threshold;
        }
        if let Some(duration_secs) = patch.duration_secs {
            rule.duration_secs = duration_secs;
        }
        if let Some(severity) = patch.severity {
            rule.severity = severity;
        }
        if let Some(tags) = &patch.tags {
            rule.tags.clone_from(tags);
        }
        if let Some(runbook) = &patch.runbook {
            rule.runbook.clone_from(runbook);
        }
        if let Some(channels) = &patch.channels {
            rule.channels.clone_from(channels);
        }
        if let Some(enabled) = patch.enabled {
            rule.enabled = enabled;
        }
        rule
    }
}

fn invalid(reason: impl Into<String>) -> AlertError {
    AlertError::InvalidRule {
        reason: reason.into(),
    }
}

/// Builder for creating [`AlertRule`] instances.
#[derive(Debug)]
pub struct AlertRuleBuilder {
    rule: AlertRule,
}

impl AlertRuleBuilder {
    fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metric: impl Into<String>,
        condition: ComparisonOperator,
        threshold: f64,
    ) -> Self {
        Self {
            rule: AlertRule {
                id: id.into(),
                name: name.into(),
                description: None,
                metric: metric.into(),
                condition,
                threshold,
                duration_secs: 0,
                severity: AlertSeverity::Warning,
                tags: Vec::new(),
                runbook: None,
                channels: Vec::new(),
                enabled: true,
            },
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.rule.description = Some(description.into());
        self
    }

    /// Sets how long the condition must hold before firing.
    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.rule.duration_secs = duration.as_secs();
        self
    }

    /// Sets the duration in seconds.
    #[must_use]
    pub const fn duration_secs(mut self, secs: u64) -> Self {
        self.rule.duration_secs = secs;
        self
    }

    /// Sets the severity level.
    #[must_use]
    pub const fn severity(mut self, severity: AlertSeverity) -> Self {
        self.rule.severity = severity;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.rule.tags.push(tag.into());
        self
    }

    /// Sets the runbook reference.
    #[must_use]
    pub fn runbook(mut self, runbook: impl Into<String>) -> Self {
        self.rule.runbook = Some(runbook.into());
        self
    }

    /// Appends a delivery channel.
    #[must_use]
    pub fn channel(mut self, channel: AlertChannel) -> Self {
        self.rule.channels.push(channel);
        self
    }

    /// Sets whether the rule is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.rule.enabled = enabled;
        self
    }

    /// Builds the [`AlertRule`].
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the rule fails [`AlertRule::validate`].
    pub fn build(self) -> Result<AlertRule> {
        self.rule.validate()?;
        Ok(self.rule)
    }
}

/// A partial update to an [`AlertRule`]. `None` fields are left untouched.
///
/// `description` and `runbook` are doubly optional so they can be cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulePatch {
    /// New name.
    pub name: Option<String>,
    /// New description (`Some(None)` clears it).
    pub description: Option<Option<String>>,
    /// New metric name.
    pub metric: Option<String>,
    /// New comparison operator.
    pub condition: Option<ComparisonOperator>,
    /// New threshold.
    pub threshold: Option<f64>,
    /// New debounce duration in seconds.
    pub duration_secs: Option<u64>,
    /// New severity.
    pub severity: Option<AlertSeverity>,
    /// Replacement tag list.
    pub tags: Option<Vec<String>>,
    /// New runbook (`Some(None)` clears it).
    pub runbook: Option<Option<String>>,
    /// Replacement channel list.
    pub channels: Option<Vec<AlertChannel>>,
    /// Enable or disable the rule.
    pub enabled: Option<bool>,
}

impl RulePatch {
    /// A patch that only toggles `enabled`.
    #[must_use]
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// A patch that only changes the threshold.
    #[must_use]
    pub fn threshold(threshold: f64) -> Self {
        Self {
            threshold: Some(threshold),
            ..Self::default()
        }
    }
}
