//! Error types for the claw-alertd crate.

use thiserror::Error;

/// Errors that can occur in the alert engine.
#[derive(Debug, Error)]
pub enum AlertError {
    /// Invalid alert rule configuration.
    #[error("invalid alert rule: {reason}")]
    InvalidRule {
        /// The reason the rule is invalid.
        reason: String,
    },

    /// A rule with the same ID is already registered.
    #[error("rule with ID '{id}' already exists")]
    DuplicateRule {
        /// The conflicting rule ID.
        id: String,
    },

    /// The metric provider could not resolve a value.
    #[error("metric '{metric}' unavailable: {reason}")]
    MetricUnavailable {
        /// The metric name that was requested.
        metric: String,
        /// Why the value could not be produced.
        reason: String,
    },

    /// An external call did not complete in time.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout that elapsed, in milliseconds.
        after_ms: u64,
    },

    /// Failed to evaluate a rule condition.
    #[error("condition evaluation failed: {reason}")]
    EvaluationError {
        /// The reason the evaluation failed.
        reason: String,
    },

    /// Notification delivery failed.
    #[error("notification via '{channel}' failed: {reason}")]
    NotificationFailed {
        /// The channel that failed.
        channel: String,
        /// The reason the notification failed.
        reason: String,
    },

    /// No channel implementation is registered for a channel kind.
    #[error("no notification channel registered for kind '{kind}'")]
    NoChannel {
        /// The channel kind with no implementation.
        kind: String,
    },

    /// The evaluation loop was started twice.
    #[error("evaluation loop is already running")]
    AlreadyRunning,

    /// Invalid engine or daemon configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while reading or writing configuration.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for AlertError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_rule() {
        let err = AlertError::InvalidRule {
            reason: "empty name".to_string(),
        };
        assert_eq!(err.to_string(), "invalid alert rule: empty name");
    }

    #[test]
    fn error_display_duplicate_rule() {
        let err = AlertError::DuplicateRule {
            id: "queue-depth".to_string(),
        };
        assert_eq!(err.to_string(), "rule with ID 'queue-depth' already exists");
    }

    #[test]
    fn error_display_metric_unavailable() {
        let err = AlertError::MetricUnavailable {
            metric: "queue_depth".to_string(),
            reason: "unknown metric".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "metric 'queue_depth' unavailable: unknown metric"
        );
    }

    #[test]
    fn error_display_timeout() {
        let err = AlertError::Timeout {
            operation: "metric lookup".to_string(),
            after_ms: 250,
        };
        assert_eq!(err.to_string(), "metric lookup timed out after 250ms");
    }

    #[test]
    fn error_display_notification_failed() {
        let err = AlertError::NotificationFailed {
            channel: "webhook".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "notification via 'webhook' failed: connection refused"
        );
    }

    #[test]
    fn error_display_no_channel() {
        let err = AlertError::NoChannel {
            kind: "pager".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no notification channel registered for kind 'pager'"
        );
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());
        let alert_err: AlertError = json_err.unwrap_err().into();
        assert!(matches!(alert_err, AlertError::SerializationError(_)));
    }

    #[test]
    fn error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let alert_err: AlertError = io.into();
        assert!(matches!(alert_err, AlertError::Io(_)));
    }
}
