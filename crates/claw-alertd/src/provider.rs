//! Metric providers.
//!
//! The engine never produces metric values itself. It asks a
//! [`MetricProvider`] for the current value of each rule's metric once per
//! tick, bounded by the configured metric timeout.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AlertError, Result};

/// Resolves metric names to their current value.
pub trait MetricProvider: Send + Sync + fmt::Debug {
    /// Returns the current value of `metric`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::MetricUnavailable` if the metric is unknown or
    /// cannot be read right now.
    fn get_value<'a>(
        &'a self,
        metric: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<f64>> + Send + 'a>>;
}

/// In-memory provider backed by a shared map.
///
/// Clones share the same values, so a test or a file watcher can update
/// metrics while the engine holds another handle.
#[derive(Debug, Clone, Default)]
pub struct StaticMetricProvider {
    values: Arc<RwLock<HashMap<String, f64>>>,
}

impl StaticMetricProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider seeded with `values`.
    #[must_use]
    pub fn with_values(values: HashMap<String, f64>) -> Self {
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    /// Sets a metric value.
    pub fn set(&self, metric: impl Into<String>, value: f64) {
        self.values.write().insert(metric.into(), value);
    }

    /// Removes a metric, making subsequent reads fail.
    pub fn remove(&self, metric: &str) -> Option<f64> {
        self.values.write().remove(metric)
    }

    /// Replaces every value at once.
    pub fn replace_all(&self, values: HashMap<String, f64>) {
        *self.values.write() = values;
    }

    /// Returns the current value without going through the async interface.
    #[must_use]
    pub fn current(&self, metric: &str) -> Option<f64> {
        self.values.read().get(metric).copied()
    }
}

impl MetricProvider for StaticMetricProvider {
    fn get_value<'a>(
        &'a self,
        metric: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<f64>> + Send + 'a>> {
        let value = self.current(metric);
        Box::pin(async move {
            value.ok_or_else(|| AlertError::MetricUnavailable {
                metric: metric.to_string(),
                reason: "unknown metric".to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_set_value() {
        let provider = StaticMetricProvider::new();
        provider.set("queue_depth", 42.0);

        let value = provider.get_value("queue_depth").await.unwrap();
        assert!((value - 42.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unknown_metric_is_unavailable() {
        let provider = StaticMetricProvider::new();

        match provider.get_value("nope").await {
            Err(AlertError::MetricUnavailable { metric, .. }) => assert_eq!(metric, "nope"),
            other => panic!("expected MetricUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clones_share_values() {
        let provider = StaticMetricProvider::new();
        let handle = provider.clone();
        handle.set("cpu", 0.5);

        assert_eq!(provider.current("cpu"), Some(0.5));
        handle.remove("cpu");
        assert!(provider.get_value("cpu").await.is_err());
    }

    #[test]
    fn replace_all_swaps_values() {
        let provider = StaticMetricProvider::with_values(HashMap::from([("a".to_string(), 1.0)]));
        provider.replace_all(HashMap::from([("b".to_string(), 2.0)]));

        assert_eq!(provider.current("a"), None);
        assert_eq!(provider.current("b"), Some(2.0));
    }
}
