//! The alert engine: rule store, evaluation ticks, and the periodic loop.
//!
//! [`AlertEngine`] is the entry point. It owns the rules, the per-rule
//! [`AlertTracker`], and the [`AlertHistory`], all behind one lock. Each
//! tick reads every enabled rule's metric through the [`MetricProvider`],
//! advances the tracker under the lock, and then hands firing and
//! resolution messages to the [`NotificationDispatcher`] after the lock is
//! released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::AlertChannel;
use crate::channels::RenderedMessage;
use crate::config::EngineConfig;
use crate::dispatcher::{DeliveryFailure, DispatchReport, NotificationDispatcher};
use crate::error::{AlertError, Result};
use crate::history::{AlertHistory, AlertNotification, AlertStats};
use crate::provider::MetricProvider;
use crate::tracker::{AlertTracker, Transition};
use crate::types::{AlertRule, RulePatch};

/// A rule that could not be evaluated this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    /// The affected rule.
    pub rule_id: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Summary of one evaluation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Rules whose condition was evaluated.
    pub rules_evaluated: usize,
    /// Rules skipped because they are disabled.
    pub rules_disabled: usize,
    /// Rules skipped because the metric could not be read in time.
    pub metric_failures: Vec<RuleFailure>,
    /// Rules skipped because their condition could not be evaluated.
    pub rules_errored: Vec<RuleFailure>,
    /// Notification IDs created this tick.
    pub fired: Vec<String>,
    /// Notification IDs resolved this tick.
    pub resolved: Vec<String>,
    /// Successful channel deliveries.
    pub deliveries: usize,
    /// Failed channel deliveries.
    pub delivery_failures: Vec<DeliveryFailure>,
}

/// Result of asking the engine to tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran.
    Completed(TickReport),
    /// Another tick was still in progress, so this one did not run.
    Skipped,
}

impl TickOutcome {
    /// Returns the report if the tick ran.
    #[must_use]
    pub fn report(self) -> Option<TickReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped => None,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    rules: HashMap<String, AlertRule>,
    tracker: AlertTracker,
    history: AlertHistory,
    rule_errors: HashMap<String, String>,
}

#[derive(Debug)]
struct LoopHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Evaluates threshold rules and manages the alert lifecycle.
///
/// Cloning is cheap; clones share all state.
#[derive(Debug)]
pub struct AlertEngine {
    config: EngineConfig,
    provider: Arc<dyn MetricProvider>,
    dispatcher: Arc<NotificationDispatcher>,
    state: Arc<Mutex<EngineState>>,
    tick_lock: Arc<tokio::sync::Mutex<()>>,
    runner: Arc<Mutex<Option<LoopHandle>>>,
}

impl AlertEngine {
    /// Creates an engine that reads metrics from `provider` and delivers
    /// through `dispatcher`.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn MetricProvider>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            config,
            provider,
            dispatcher: Arc::new(dispatcher),
            state: Arc::new(Mutex::new(EngineState::default())),
            tick_lock: Arc::new(tokio::sync::Mutex::new(())),
            runner: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ============ Rule Management ============

    /// Adds a new alert rule.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the rule fails validation, or
    /// `AlertError::DuplicateRule` if its ID is taken.
    pub fn add_rule(&self, rule: AlertRule) -> Result<()> {
        rule.validate()?;
        let mut state = self.state.lock();

        if state.rules.contains_key(&rule.id) {
            return Err(AlertError::DuplicateRule { id: rule.id });
        }

        info!(rule_id = %rule.id, rule_name = %rule.name, metric = %rule.metric, "added alert rule");
        state.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// Applies `patch` to the rule with `rule_id`.
    ///
    /// Returns `Ok(false)` if no such rule exists. Disabling a rule drops its
    /// in-flight breach; an open notification stays in `firing` status.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the patched rule fails
    /// validation. The stored rule is left unchanged.
    pub fn update_rule(&self, rule_id: &str, patch: &RulePatch) -> Result<bool> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(existing) = state.rules.get(rule_id) else {
            return Ok(false);
        };
        let updated = existing.apply(patch);
        updated.validate()?;

        if !updated.enabled {
            abandon(&mut state.tracker, rule_id, "rule disabled");
            state.rule_errors.remove(rule_id);
        }

        info!(rule_id = %rule_id, rule_name = %updated.name, enabled = updated.enabled, "updated alert rule");
        state.rules.insert(rule_id.to_string(), updated);
        Ok(true)
    }

    /// Removes a rule by ID, discarding any in-flight breach for it.
    ///
    /// Returns `true` if the rule was removed.
    pub fn remove_rule(&self, rule_id: &str) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let removed = state.rules.remove(rule_id).is_some();
        if removed {
            abandon(&mut state.tracker, rule_id, "rule removed");
            state.rule_errors.remove(rule_id);
            info!(rule_id = %rule_id, "removed alert rule");
        }
        removed
    }

    /// Gets a rule by ID.
    #[must_use]
    pub fn get_rule(&self, rule_id: &str) -> Option<AlertRule> {
        self.state.lock().rules.get(rule_id).cloned()
    }

    /// Returns all rules, sorted by ID.
    #[must_use]
    pub fn list_rules(&self) -> Vec<AlertRule> {
        let mut rules: Vec<_> = self.state.lock().rules.values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.state.lock().rules.len()
    }

    // ============ Alert Management ============

    /// Acknowledges a firing notification.
    ///
    /// Returns `false` without changing anything unless the notification
    /// exists and is currently `firing`.
    pub fn acknowledge_alert(&self, notification_id: &str, who: &str, notes: Option<String>) -> bool {
        let acknowledged =
            self.state
                .lock()
                .history
                .acknowledge(notification_id, who, notes, Utc::now());

        if acknowledged {
            info!(notification_id = %notification_id, by = %who, "alert acknowledged");
        } else {
            debug!(notification_id = %notification_id, "acknowledge rejected, alert is not firing");
        }
        acknowledged
    }

    /// Returns notifications whose status is `firing`.
    #[must_use]
    pub fn get_active_alerts(&self) -> Vec<AlertNotification> {
        self.state.lock().history.active()
    }

    /// Returns up to `limit` notifications, newest first.
    #[must_use]
    pub fn get_alert_history(&self, limit: usize) -> Vec<AlertNotification> {
        self.state.lock().history.recent(limit)
    }

    /// Returns the most recent notifications using the configured default limit.
    #[must_use]
    pub fn recent_history(&self) -> Vec<AlertNotification> {
        self.get_alert_history(self.config.default_history_limit)
    }

    /// Returns a notification by ID.
    #[must_use]
    pub fn get_notification(&self, notification_id: &str) -> Option<AlertNotification> {
        self.state.lock().history.get(notification_id).cloned()
    }

    /// Returns aggregate statistics.
    #[must_use]
    pub fn get_stats(&self) -> AlertStats {
        self.state.lock().history.stats()
    }

    /// Returns rules whose last evaluation failed, with the reason.
    #[must_use]
    pub fn rule_errors(&self) -> HashMap<String, String> {
        self.state.lock().rule_errors.clone()
    }

    /// Returns true if the rule is currently tracking or firing a breach.
    #[must_use]
    pub fn is_tracking(&self, rule_id: &str) -> bool {
        self.state.lock().tracker.get(rule_id).is_some()
    }

    // ============ Evaluation ============

    /// Runs one evaluation pass at the current time.
    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Utc::now()).await
    }

    /// Runs one evaluation pass as if the current time were `now`.
    ///
    /// Returns [`TickOutcome::Skipped`] without doing anything if another
    /// tick is still running.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let Ok(_running) = self.tick_lock.try_lock() else {
            debug!("previous tick still running, skipping");
            return TickOutcome::Skipped;
        };

        let mut report = TickReport::default();
        let rules: Vec<AlertRule> = {
            let state = self.state.lock();
            report.rules_disabled = state.rules.values().filter(|r| !r.enabled).count();
            let mut enabled: Vec<_> = state.rules.values().filter(|r| r.enabled).cloned().collect();
            enabled.sort_by(|a, b| a.id.cmp(&b.id));
            enabled
        };

        let values = join_all(rules.iter().map(|rule| self.read_metric(rule))).await;

        let outgoing = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut outgoing = Vec::new();

            for (rule, read) in rules.iter().zip(values) {
                // The rule may have been edited or removed while metrics were read.
                if state.rules.get(&rule.id) != Some(rule) {
                    debug!(rule_id = %rule.id, "rule changed during tick, skipping");
                    continue;
                }

                let value = match read {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(rule_id = %rule.id, metric = %rule.metric, error = %e, "metric unavailable, skipping rule");
                        report.metric_failures.push(RuleFailure {
                            rule_id: rule.id.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                if !value.is_finite() {
                    let e = AlertError::EvaluationError {
                        reason: format!("metric '{}' returned non-finite value {value}", rule.metric),
                    };
                    warn!(rule_id = %rule.id, error = %e, "failed to evaluate rule");
                    state.rule_errors.insert(rule.id.clone(), e.to_string());
                    report.rules_errored.push(RuleFailure {
                        rule_id: rule.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }

                state.rule_errors.remove(&rule.id);
                report.rules_evaluated += 1;

                let breached = rule.is_breached(value);
                if let Some(message) = apply_transition(state, rule, breached, value, now, &mut report) {
                    outgoing.push((rule.channels.clone(), message));
                }
            }
            outgoing
        };

        for delivery in join_all(
            outgoing
                .iter()
                .map(|(channels, message)| self.notify(channels, message)),
        )
        .await
        {
            report.deliveries += delivery.delivered;
            report.delivery_failures.extend(delivery.failed);
        }

        debug!(
            rules_evaluated = report.rules_evaluated,
            alerts_fired = report.fired.len(),
            alerts_resolved = report.resolved.len(),
            delivery_failures = report.delivery_failures.len(),
            "evaluation complete"
        );
        TickOutcome::Completed(report)
    }

    async fn read_metric(&self, rule: &AlertRule) -> Result<f64> {
        let timeout = self.config.metric_timeout();
        match tokio::time::timeout(timeout, self.provider.get_value(&rule.metric)).await {
            Ok(result) => result,
            Err(_) => Err(AlertError::Timeout {
                operation: format!("metric lookup '{}'", rule.metric),
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn notify(
        &self,
        channels: &[AlertChannel],
        message: &RenderedMessage,
    ) -> DispatchReport {
        if channels.is_empty() {
            debug!(rule_id = %message.rule_id, event = %message.event, "rule has no channels, notification recorded only");
        }
        self.dispatcher.dispatch(channels, message).await
    }

    // ============ Loop Control ============

    /// Starts ticking every `interval` on the current tokio runtime.
    ///
    /// The first tick runs immediately. Ticks never overlap; a tick that
    /// comes due while the previous one is still running is skipped.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::AlreadyRunning` if the loop is running, or
    /// `AlertError::Config` if `interval` is zero.
    pub fn start(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(AlertError::Config(
                "evaluation interval must be greater than zero".to_string(),
            ));
        }

        let mut runner = self.runner.lock();
        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(AlertError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let engine = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if engine.tick().await == TickOutcome::Skipped {
                    debug!("scheduled tick skipped");
                }
            }

            info!("evaluation loop stopped");
        });

        info!(interval_ms = interval.as_millis() as u64, "evaluation loop started");
        *runner = Some(LoopHandle { cancel, handle });
        Ok(())
    }

    /// Starts ticking at the configured evaluation interval.
    ///
    /// # Errors
    ///
    /// See [`AlertEngine::start`].
    pub fn start_default(&self) -> Result<()> {
        self.start(self.config.evaluation_interval())
    }

    /// Stops the loop. A tick already in progress runs to completion.
    ///
    /// Returns `true` if a loop was running.
    pub fn stop(&self) -> bool {
        let runner = self.runner.lock().take();
        runner.is_some_and(|r| {
            r.cancel.cancel();
            true
        })
    }

    /// Stops the loop and waits for an in-progress tick to finish.
    pub async fn shutdown(&self) {
        let runner = self.runner.lock().take();
        if let Some(r) = runner {
            r.cancel.cancel();
            if let Err(e) = r.handle.await {
                warn!(error = %e, "evaluation loop task failed");
            }
        }
    }

    /// Returns true while the loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runner
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Clone for AlertEngine {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            provider: Arc::clone(&self.provider),
            dispatcher: Arc::clone(&self.dispatcher),
            state: Arc::clone(&self.state),
            tick_lock: Arc::clone(&self.tick_lock),
            runner: Arc::clone(&self.runner),
        }
    }
}

fn abandon(tracker: &mut AlertTracker, rule_id: &str, why: &str) {
    let abandoned = tracker
        .discard(rule_id)
        .filter(|active| active.fired)
        .and_then(|active| active.notification_id);

    if let Some(notification_id) = abandoned {
        warn!(
            rule_id = %rule_id,
            notification_id = %notification_id,
            reason = why,
            "firing alert abandoned without resolution"
        );
    }
}

/// Advances one rule and records history. Returns the message to send, if any.
fn apply_transition(
    state: &mut EngineState,
    rule: &AlertRule,
    breached: bool,
    value: f64,
    now: DateTime<Utc>,
    report: &mut TickReport,
) -> Option<RenderedMessage> {
    match state.tracker.observe(rule, breached, value, now) {
        Transition::None => None,
        Transition::Started => {
            debug!(rule_id = %rule.id, value = %value, duration_secs = rule.duration_secs, "breach started");
            None
        }
        Transition::Cleared => {
            debug!(rule_id = %rule.id, value = %value, "breach cleared before firing");
            None
        }
        Transition::Fire { value, started_at } => {
            let notification = state.history.record_firing(rule, value, now);
            state.tracker.mark_fired(&rule.id, notification.id.clone());
            info!(
                rule_id = %rule.id,
                rule_name = %rule.name,
                notification_id = %notification.id,
                severity = %rule.severity,
                value = %value,
                breached_since = %started_at,
                "alert fired"
            );
            report.fired.push(notification.id.clone());
            Some(RenderedMessage::firing(rule, &notification))
        }
        Transition::Resolve {
            notification_id,
            value,
        } => {
            let resolved = notification_id
                .as_deref()
                .and_then(|id| state.history.resolve(id, now));
            match resolved {
                Some(notification) => {
                    info!(
                        rule_id = %rule.id,
                        rule_name = %rule.name,
                        notification_id = %notification.id,
                        resolution_ms = notification.resolution_time_ms().unwrap_or_default(),
                        "alert resolved"
                    );
                    report.resolved.push(notification.id.clone());
                    Some(RenderedMessage::resolved(rule, &notification, value))
                }
                None => {
                    warn!(rule_id = %rule.id, notification_id = ?notification_id, "no open notification to resolve");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use crate::channels::LogChannel;
    use crate::provider::StaticMetricProvider;
    use crate::types::{AlertSeverity, ComparisonOperator};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn engine() -> (AlertEngine, StaticMetricProvider) {
        let provider = StaticMetricProvider::new();
        let dispatcher = NotificationDispatcher::new().with_fallback(Arc::new(LogChannel::default()));
        let engine = AlertEngine::new(EngineConfig::default(), Arc::new(provider.clone()), dispatcher);
        (engine, provider)
    }

    fn rule(id: &str, duration_secs: u64) -> AlertRule {
        AlertRule::builder(id, format!("rule {id}"), "queue_depth", ComparisonOperator::Gt, 100.0)
            .duration_secs(duration_secs)
            .severity(AlertSeverity::Critical)
            .build()
            .unwrap()
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    async fn tick(engine: &AlertEngine, secs: i64) -> TickReport {
        engine.tick_at(t(secs)).await.report().unwrap()
    }

    mod rule_management_tests {
        use super::*;

        #[test]
        fn add_and_get_rule() {
            let (engine, _) = engine();
            engine.add_rule(rule("a", 0)).unwrap();

            assert_eq!(engine.rule_count(), 1);
            assert_eq!(engine.get_rule("a").unwrap().name, "rule a");
            assert!(engine.get_rule("b").is_none());
        }

        #[test]
        fn add_duplicate_rule_fails() {
            let (engine, _) = engine();
            engine.add_rule(rule("a", 0)).unwrap();

            match engine.add_rule(rule("a", 30)) {
                Err(AlertError::DuplicateRule { id }) => assert_eq!(id, "a"),
                other => panic!("expected DuplicateRule, got {other:?}"),
            }
            assert_eq!(engine.get_rule("a").unwrap().duration_secs, 0);
        }

        #[test]
        fn add_invalid_rule_fails() {
            let (engine, _) = engine();
            let mut bad = rule("a", 0);
            bad.threshold = f64::NAN;

            assert!(matches!(engine.add_rule(bad), Err(AlertError::InvalidRule { .. })));
            assert_eq!(engine.rule_count(), 0);
        }

        #[test]
        fn update_rule_applies_patch() {
            let (engine, _) = engine();
            engine.add_rule(rule("a", 0)).unwrap();

            assert!(engine.update_rule("a", &RulePatch::threshold(500.0)).unwrap());
            assert!((engine.get_rule("a").unwrap().threshold - 500.0).abs() < f64::EPSILON);
        }

        #[test]
        fn update_missing_rule_returns_false() {
            let (engine, _) = engine();
            assert!(!engine.update_rule("missing", &RulePatch::enabled(false)).unwrap());
        }

        #[test]
        fn invalid_update_leaves_rule_untouched() {
            let (engine, _) = engine();
            engine.add_rule(rule("a", 0)).unwrap();

            let patch = RulePatch {
                name: Some(String::new()),
                threshold: Some(1.0),
                ..RulePatch::default()
            };
            assert!(matches!(
                engine.update_rule("a", &patch),
                Err(AlertError::InvalidRule { .. })
            ));
            let stored = engine.get_rule("a").unwrap();
            assert_eq!(stored.name, "rule a");
            assert!((stored.threshold - 100.0).abs() < f64::EPSILON);
        }

        #[test]
        fn list_rules_is_sorted_copy() {
            let (engine, _) = engine();
            engine.add_rule(rule("b", 0)).unwrap();
            engine.add_rule(rule("a", 0)).unwrap();

            let mut rules = engine.list_rules();
            assert_eq!(rules.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

            rules[0].name = "mutated".to_string();
            assert_eq!(engine.get_rule("a").unwrap().name, "rule a");
        }

        #[test]
        fn remove_rule() {
            let (engine, _) = engine();
            engine.add_rule(rule("a", 0)).unwrap();

            assert!(engine.remove_rule("a"));
            assert!(!engine.remove_rule("a"));
            assert_eq!(engine.rule_count(), 0);
        }

        #[test]
        fn engine_is_cloneable() {
            let (engine, _) = engine();
            let other = engine.clone();
            engine.add_rule(rule("a", 0)).unwrap();
            assert_eq!(other.rule_count(), 1);
        }
    }

    mod evaluation_tests {
        use super::*;

        #[tokio::test]
        async fn breach_is_tracked_then_fired() {
            let (engine, provider) = engine();
            engine.add_rule(rule("a", 60)).unwrap();
            provider.set("queue_depth", 150.0);

            let report = tick(&engine, 0).await;
            assert_eq!(report.rules_evaluated, 1);
            assert!(report.fired.is_empty());
            assert!(engine.is_tracking("a"));

            let report = tick(&engine, 60).await;
            assert_eq!(report.fired.len(), 1);
            assert_eq!(report.deliveries, 0);
            assert_eq!(engine.get_active_alerts().len(), 1);
        }

        #[tokio::test]
        async fn disabled_rules_are_skipped() {
            let (engine, provider) = engine();
            engine.add_rule(rule("a", 0)).unwrap();
            engine.update_rule("a", &RulePatch::enabled(false)).unwrap();
            provider.set("queue_depth", 150.0);

            let report = tick(&engine, 0).await;
            assert_eq!(report.rules_evaluated, 0);
            assert_eq!(report.rules_disabled, 1);
            assert!(engine.get_alert_history(10).is_empty());
        }

        #[tokio::test]
        async fn missing_metric_is_no_signal() {
            let (engine, provider) = engine();
            engine.add_rule(rule("a", 0)).unwrap();
            provider.set("queue_depth", 150.0);
            tick(&engine, 0).await;

            provider.remove("queue_depth");
            let report = tick(&engine, 10).await;
            assert_eq!(report.metric_failures.len(), 1);
            assert!(report.resolved.is_empty());
            assert_eq!(engine.get_active_alerts().len(), 1);
            assert!(engine.is_tracking("a"));
        }

        #[tokio::test]
        async fn non_finite_value_flags_rule() {
            let (engine, provider) = engine();
            engine.add_rule(rule("a", 0)).unwrap();
            provider.set("queue_depth", f64::NAN);

            let report = tick(&engine, 0).await;
            assert_eq!(report.rules_errored.len(), 1);
            assert!(engine.rule_errors().contains_key("a"));

            provider.set("queue_depth", 1.0);
            tick(&engine, 10).await;
            assert!(engine.rule_errors().is_empty());
        }

        #[tokio::test]
        async fn remove_rule_discards_tracking() {
            let (engine, provider) = engine();
            engine.add_rule(rule("a", 0)).unwrap();
            provider.set("queue_depth", 150.0);
            tick(&engine, 0).await;
            assert!(engine.is_tracking("a"));

            engine.remove_rule("a");
            assert!(!engine.is_tracking("a"));
            // The open record is abandoned, not resolved.
            assert_eq!(engine.get_active_alerts().len(), 1);
            assert_eq!(engine.get_stats().total_resolved, 0);
        }

        #[tokio::test]
        async fn disabling_abandons_firing_alert() {
            let (engine, provider) = engine();
            engine.add_rule(rule("a", 0)).unwrap();
            provider.set("queue_depth", 150.0);
            tick(&engine, 0).await;

            engine.update_rule("a", &RulePatch::enabled(false)).unwrap();
            assert!(!engine.is_tracking("a"));

            provider.set("queue_depth", 0.0);
            tick(&engine, 10).await;
            assert_eq!(engine.get_active_alerts().len(), 1);
        }

        #[tokio::test]
        async fn recent_history_uses_default_limit() {
            let provider = StaticMetricProvider::new();
            let config = EngineConfig {
                default_history_limit: 2,
                ..EngineConfig::default()
            };
            let engine = AlertEngine::new(config, Arc::new(provider.clone()), NotificationDispatcher::new());
            engine.add_rule(rule("a", 0)).unwrap();

            for i in 0..3 {
                provider.set("queue_depth", 150.0);
                tick(&engine, i * 20).await;
                provider.set("queue_depth", 0.0);
                tick(&engine, i * 20 + 10).await;
            }

            assert_eq!(engine.get_alert_history(10).len(), 3);
            assert_eq!(engine.recent_history().len(), 2);
        }

        #[tokio::test]
        async fn unknown_channel_kind_counts_as_failure() {
            let provider = StaticMetricProvider::new();
            let dispatcher = NotificationDispatcher::new()
                .with_channel(ChannelKind::Email, Arc::new(LogChannel::default()));
            let engine = AlertEngine::new(EngineConfig::default(), Arc::new(provider.clone()), dispatcher);

            let mut r = rule("a", 0);
            r.channels = vec![AlertChannel::email("ops@example.com"), AlertChannel::pager("key")];
            engine.add_rule(r).unwrap();
            provider.set("queue_depth", 150.0);

            let report = tick(&engine, 0).await;
            assert_eq!(report.fired.len(), 1);
            assert_eq!(report.deliveries, 1);
            assert_eq!(report.delivery_failures.len(), 1);
        }
    }

    mod loop_tests {
        use super::*;

        #[tokio::test]
        async fn zero_interval_is_rejected() {
            let (engine, _) = engine();
            assert!(matches!(engine.start(Duration::ZERO), Err(AlertError::Config(_))));
            assert!(!engine.is_running());
        }

        #[tokio::test]
        async fn start_twice_fails() {
            let (engine, _) = engine();
            engine.start(Duration::from_secs(60)).unwrap();

            assert!(engine.is_running());
            assert!(matches!(
                engine.start(Duration::from_secs(60)),
                Err(AlertError::AlreadyRunning)
            ));

            engine.shutdown().await;
            assert!(!engine.is_running());
        }

        #[tokio::test]
        async fn stop_when_idle_returns_false() {
            let (engine, _) = engine();
            assert!(!engine.stop());
        }
    }
}
