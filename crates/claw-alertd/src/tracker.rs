//! Per-rule breach tracking.
//!
//! The tracker holds one [`ActiveAlert`] per rule whose condition currently
//! holds. A rule with no entry is idle. An entry with `fired == false` is
//! tracking a breach that has not lasted `duration_secs` yet; once it has,
//! [`AlertTracker::observe`] reports [`Transition::Fire`] exactly once for
//! the episode. The first non-breached observation ends the episode.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::AlertRule;

/// Transient state for one rule's current breach episode.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAlert {
    /// The rule this breach belongs to.
    pub rule_id: String,
    /// When the breach was first observed.
    pub started_at: DateTime<Utc>,
    /// The most recently observed value.
    pub value: f64,
    /// Whether the episode has fired.
    pub fired: bool,
    /// History record created when the episode fired.
    pub notification_id: Option<String>,
}

impl ActiveAlert {
    fn new(rule_id: &str, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            started_at: now,
            value,
            fired: false,
            notification_id: None,
        }
    }

    /// Milliseconds the breach has been held as of `now`.
    #[must_use]
    pub fn held_for_ms(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.started_at).num_milliseconds()
    }
}

/// What an observation did to a rule's state.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Nothing changed that callers need to act on.
    None,
    /// Idle -> tracking.
    Started,
    /// The breach has lasted long enough; the caller must fire and then
    /// call [`AlertTracker::mark_fired`].
    Fire {
        /// The value at firing time.
        value: f64,
        /// When the breach started.
        started_at: DateTime<Utc>,
    },
    /// A fired episode ended; the entry has been discarded.
    Resolve {
        /// The history record attached at fire time, if any.
        notification_id: Option<String>,
        /// The value that ended the episode.
        value: f64,
    },
    /// A breach that never fired ended; the entry has been discarded.
    Cleared,
}

/// Breach state for all rules, keyed by rule ID.
#[derive(Debug, Default)]
pub struct AlertTracker {
    active: HashMap<String, ActiveAlert>,
}

impl AlertTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances `rule`'s state machine with one observation.
    pub fn observe(
        &mut self,
        rule: &AlertRule,
        breached: bool,
        value: f64,
        now: DateTime<Utc>,
    ) -> Transition {
        if !breached {
            return match self.active.remove(&rule.id) {
                Some(active) if active.fired => Transition::Resolve {
                    notification_id: active.notification_id,
                    value,
                },
                Some(_) => Transition::Cleared,
                None => Transition::None,
            };
        }

        let required_ms = i64::try_from(rule.duration_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);

        match self.active.get_mut(&rule.id) {
            Some(active) => {
                active.value = value;
                if !active.fired && active.held_for_ms(now) >= required_ms {
                    active.fired = true;
                    Transition::Fire {
                        value,
                        started_at: active.started_at,
                    }
                } else {
                    Transition::None
                }
            }
            None => {
                let mut active = ActiveAlert::new(&rule.id, value, now);
                let transition = if required_ms == 0 {
                    active.fired = true;
                    Transition::Fire {
                        value,
                        started_at: now,
                    }
                } else {
                    Transition::Started
                };
                self.active.insert(rule.id.clone(), active);
                transition
            }
        }
    }

    /// Attaches the history record created for a fired episode.
    pub fn mark_fired(&mut self, rule_id: &str, notification_id: impl Into<String>) {
        if let Some(active) = self.active.get_mut(rule_id) {
            active.notification_id = Some(notification_id.into());
        }
    }

    /// Drops any in-flight episode for a rule without resolving it.
    pub fn discard(&mut self, rule_id: &str) -> Option<ActiveAlert> {
        self.active.remove(rule_id)
    }

    /// Returns the active episode for a rule.
    #[must_use]
    pub fn get(&self, rule_id: &str) -> Option<&ActiveAlert> {
        self.active.get(rule_id)
    }

    /// Returns the number of rules currently tracking or firing.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Returns true if no rule is tracking or firing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComparisonOperator;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn rule(duration_secs: u64) -> AlertRule {
        AlertRule::builder("queue", "Queue depth", "queue_depth", ComparisonOperator::Gt, 100.0)
            .duration_secs(duration_secs)
            .build()
            .unwrap()
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn idle_to_tracking() {
        let mut tracker = AlertTracker::new();
        let rule = rule(60);

        assert_eq!(tracker.observe(&rule, true, 150.0, t(0)), Transition::Started);
        let active = tracker.get("queue").unwrap();
        assert!(!active.fired);
        assert_eq!(active.started_at, t(0));
    }

    #[test]
    fn tracking_fires_after_duration() {
        let mut tracker = AlertTracker::new();
        let rule = rule(60);

        tracker.observe(&rule, true, 150.0, t(0));
        assert_eq!(tracker.observe(&rule, true, 160.0, t(59)), Transition::None);
        assert_eq!(
            tracker.observe(&rule, true, 170.0, t(60)),
            Transition::Fire {
                value: 170.0,
                started_at: t(0)
            }
        );
        assert!(tracker.get("queue").unwrap().fired);
    }

    #[test]
    fn firing_does_not_refire() {
        let mut tracker = AlertTracker::new();
        let rule = rule(10);

        tracker.observe(&rule, true, 150.0, t(0));
        assert!(matches!(tracker.observe(&rule, true, 150.0, t(10)), Transition::Fire { .. }));
        for secs in 11..40 {
            assert_eq!(tracker.observe(&rule, true, 180.0, t(secs)), Transition::None);
        }
        assert!((tracker.get("queue").unwrap().value - 180.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tracking_clears_silently() {
        let mut tracker = AlertTracker::new();
        let rule = rule(60);

        tracker.observe(&rule, true, 150.0, t(0));
        assert_eq!(tracker.observe(&rule, false, 50.0, t(30)), Transition::Cleared);
        assert!(tracker.is_empty());
    }

    #[test]
    fn firing_resolves_with_notification() {
        let mut tracker = AlertTracker::new();
        let rule = rule(0);

        assert!(matches!(tracker.observe(&rule, true, 150.0, t(0)), Transition::Fire { .. }));
        tracker.mark_fired("queue", "n-1");
        assert_eq!(
            tracker.observe(&rule, false, 50.0, t(5)),
            Transition::Resolve {
                notification_id: Some("n-1".to_string()),
                value: 50.0
            }
        );
        assert!(tracker.get("queue").is_none());
    }

    #[test]
    fn idle_stays_idle() {
        let mut tracker = AlertTracker::new();
        assert_eq!(tracker.observe(&rule(0), false, 1.0, t(0)), Transition::None);
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn zero_duration_fires_on_first_breach() {
        let mut tracker = AlertTracker::new();
        assert_eq!(
            tracker.observe(&rule(0), true, 101.0, t(0)),
            Transition::Fire {
                value: 101.0,
                started_at: t(0)
            }
        );
    }

    #[test]
    fn discard_drops_episode() {
        let mut tracker = AlertTracker::new();
        let rule = rule(0);
        tracker.observe(&rule, true, 150.0, t(0));

        assert!(tracker.discard("queue").is_some());
        assert!(tracker.discard("queue").is_none());
        assert_eq!(tracker.observe(&rule, false, 0.0, t(1)), Transition::None);
    }

    #[test]
    fn huge_duration_never_fires() {
        let mut tracker = AlertTracker::new();
        let rule = rule(u64::MAX);

        assert_eq!(tracker.observe(&rule, true, 150.0, t(0)), Transition::Started);
        for secs in [1, 60, 86_400 * 365 * 100] {
            assert_eq!(tracker.observe(&rule, true, 150.0, t(secs)), Transition::None);
        }
        assert!(!tracker.get("queue").unwrap().fired);
    }

    #[test]
    fn sub_second_debounce_uses_milliseconds() {
        let mut tracker = AlertTracker::new();
        let rule = rule(1);

        tracker.observe(&rule, true, 150.0, t(0));
        let almost = t(0) + Duration::milliseconds(999);
        assert_eq!(tracker.observe(&rule, true, 150.0, almost), Transition::None);
        assert!(matches!(
            tracker.observe(&rule, true, 150.0, t(1)),
            Transition::Fire { .. }
        ));
    }

    proptest! {
        #[test]
        fn prop_short_breach_never_fires(duration in 1u64..600, held in 0i64..600) {
            prop_assume!(held < duration as i64);
            let mut tracker = AlertTracker::new();
            let rule = rule(duration);

            let mut fired = false;
            for secs in 0..=held {
                if let Transition::Fire { .. } = tracker.observe(&rule, true, 150.0, t(secs)) {
                    fired = true;
                }
            }
            let end = tracker.observe(&rule, false, 50.0, t(held + 1));

            prop_assert!(!fired);
            prop_assert_eq!(end, Transition::Cleared);
        }

        #[test]
        fn prop_sustained_breach_fires_once(duration in 0u64..120, extra in 0i64..120, step in 1i64..15) {
            let mut tracker = AlertTracker::new();
            let rule = rule(duration);

            let mut fires = 0;
            let mut secs = 0;
            while secs <= duration as i64 + extra + step {
                if let Transition::Fire { .. } = tracker.observe(&rule, true, 150.0, t(secs)) {
                    fires += 1;
                }
                secs += step;
            }

            prop_assert_eq!(fires, 1);
        }
    }
}
