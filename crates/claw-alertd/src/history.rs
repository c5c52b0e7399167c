//! Notification history and aggregate statistics.
//!
//! [`AlertHistory`] is an append-only log of [`AlertNotification`]s. Records
//! are created when a rule fires and mutated in place when they are
//! acknowledged or resolved; they are never removed. [`AlertStats`] is
//! updated in the same call as the record it describes.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AlertRule, AlertSeverity};

/// Lifecycle status of a notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    /// The breach is ongoing and nobody has acknowledged it.
    Firing,
    /// An operator has acknowledged the breach; it may still resolve.
    Acknowledged,
    /// The breach has cleared.
    Resolved,
}

impl NotificationStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    /// Returns true until the record is resolved.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Firing | Self::Acknowledged)
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One firing event and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotification {
    /// Unique identifier for this record.
    pub id: String,
    /// The rule that fired.
    pub rule_id: String,
    /// The rule name at firing time.
    pub rule_name: String,
    /// The rule severity at firing time.
    pub severity: AlertSeverity,
    /// The value that triggered the firing.
    pub value: f64,
    /// The rule threshold at firing time.
    pub threshold: f64,
    /// When the alert fired.
    pub timestamp: DateTime<Utc>,
    /// Current status.
    pub status: NotificationStatus,
    /// Who acknowledged the alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    /// When the alert was acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When the alert resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Operator notes attached on acknowledgement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AlertNotification {
    fn firing(rule: &AlertRule, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            value,
            threshold: rule.threshold,
            timestamp: now,
            status: NotificationStatus::Firing,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            notes: None,
        }
    }

    /// Milliseconds between firing and resolution, if resolved.
    #[must_use]
    pub fn resolution_time_ms(&self) -> Option<i64> {
        self.resolved_at.map(|resolved| {
            resolved
                .signed_duration_since(self.timestamp)
                .num_milliseconds()
                .max(0)
        })
    }
}

/// Aggregate counters derived from the history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStats {
    /// Number of firing events.
    pub total_fired: u64,
    /// Number of resolutions.
    pub total_resolved: u64,
    /// Running mean of resolution times in milliseconds.
    pub avg_resolution_time_ms: f64,
    /// Firing events per rule ID.
    pub alerts_by_rule: HashMap<String, u64>,
    /// Firing events per severity.
    pub alerts_by_severity: HashMap<AlertSeverity, u64>,
}

impl AlertStats {
    fn record_fired(&mut self, rule_id: &str, severity: AlertSeverity) {
        self.total_fired += 1;
        *self.alerts_by_rule.entry(rule_id.to_string()).or_insert(0) += 1;
        *self.alerts_by_severity.entry(severity).or_insert(0) += 1;
    }

    fn record_resolved(&mut self, resolution_time_ms: f64) {
        self.total_resolved += 1;
        let n = self.total_resolved as f64;
        self.avg_resolution_time_ms =
            self.avg_resolution_time_ms.mul_add(n - 1.0, resolution_time_ms) / n;
    }
}

/// Append-only notification log with incrementally maintained stats.
#[derive(Debug, Default)]
pub struct AlertHistory {
    records: Vec<AlertNotification>,
    index: HashMap<String, usize>,
    stats: AlertStats,
}

impl AlertHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a firing record for `rule` and updates the counters.
    pub fn record_firing(
        &mut self,
        rule: &AlertRule,
        value: f64,
        now: DateTime<Utc>,
    ) -> AlertNotification {
        let notification = AlertNotification::firing(rule, value, now);
        self.stats.record_fired(&rule.id, rule.severity);
        self.index
            .insert(notification.id.clone(), self.records.len());
        self.records.push(notification.clone());
        notification
    }

    /// Resolves an open record and folds its resolution time into the mean.
    ///
    /// Returns `None` if the record does not exist or is already resolved.
    pub fn resolve(&mut self, id: &str, now: DateTime<Utc>) -> Option<AlertNotification> {
        let record = self.get_mut(id)?;
        if !record.status.is_open() {
            return None;
        }

        record.status = NotificationStatus::Resolved;
        record.resolved_at = Some(now.max(record.timestamp));
        let resolution_ms = record.resolution_time_ms().unwrap_or(0);
        let resolved = record.clone();

        self.stats.record_resolved(resolution_ms as f64);
        Some(resolved)
    }

    /// Acknowledges a firing record.
    ///
    /// Returns false without touching the record unless its status is
    /// [`NotificationStatus::Firing`].
    pub fn acknowledge(
        &mut self,
        id: &str,
        who: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.get_mut(id) {
            Some(record) if record.status == NotificationStatus::Firing => {
                record.status = NotificationStatus::Acknowledged;
                record.acknowledged_by = Some(who.to_string());
                record.acknowledged_at = Some(now);
                record.notes = notes;
                true
            }
            _ => false,
        }
    }

    /// Returns a record by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&AlertNotification> {
        self.index.get(id).and_then(|&i| self.records.get(i))
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut AlertNotification> {
        let i = *self.index.get(id)?;
        self.records.get_mut(i)
    }

    /// Returns records whose status is exactly `firing`, oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<AlertNotification> {
        self.records
            .iter()
            .filter(|r| r.status == NotificationStatus::Firing)
            .cloned()
            .collect()
    }

    /// Returns up to `limit` records, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<AlertNotification> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> AlertStats {
        self.stats.clone()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has fired yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
