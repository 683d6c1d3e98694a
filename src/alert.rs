use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::AlertPolicy;
use crate::domain::{Alert, MonitorState};

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    AboveThreshold,
    MaxNotificationsReached,
    Cooldown { minutes_remaining: i64 },
    ChangeTooSmall { change: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AboveThreshold => write!(f, "balance above threshold"),
            SkipReason::MaxNotificationsReached => {
                write!(f, "max consecutive notifications reached")
            }
            SkipReason::Cooldown { minutes_remaining } => write!(
                f,
                "within cooldown period, {minutes_remaining} minutes remaining"
            ),
            SkipReason::ChangeTooSmall { .. } => write!(f, "balance change too small"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// `notification_number` is the episode count after this send (1 for the first alert).
    Send { notification_number: u32 },
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    Unchanged,
    Recovered { balance: f64, reset_count: bool },
    Notified { at: DateTime<Utc>, balance: f64 },
}

impl StateUpdate {
    pub fn apply(&self, state: &mut MonitorState) -> bool {
        match *self {
            StateUpdate::Unchanged => false,
            StateUpdate::Recovered {
                balance,
                reset_count,
            } => {
                if reset_count {
                    state.consecutive_notification_count = 0;
                }
                state.last_known_balance = Some(balance);
                true
            }
            StateUpdate::Notified { at, balance } => {
                state.consecutive_notification_count += 1;
                state.last_notification_time = Some(at);
                state.last_known_balance = Some(balance);
                state.total_notifications += 1;
                true
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub update: StateUpdate,
}

impl Decision {
    fn skip(reason: SkipReason) -> Self {
        Self {
            action: Action::Skip(reason),
            update: StateUpdate::Unchanged,
        }
    }

    fn send(now: DateTime<Utc>, balance: f64, state: &MonitorState) -> Self {
        Self {
            action: Action::Send {
                notification_number: state.consecutive_notification_count + 1,
            },
            update: StateUpdate::Notified { at: now, balance },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertEngine {
    policy: AlertPolicy,
}

impl AlertEngine {
    pub fn new(policy: AlertPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub fn decide(&self, now: DateTime<Utc>, balance: f64, state: &MonitorState) -> Decision {
        let policy = &self.policy;
        let count = state.consecutive_notification_count;

        if balance > policy.threshold {
            return Decision {
                action: Action::Skip(SkipReason::AboveThreshold),
                update: StateUpdate::Recovered {
                    balance,
                    reset_count: count > 0,
                },
            };
        }

        if count >= policy.max_consecutive_notifications {
            return Decision::skip(SkipReason::MaxNotificationsReached);
        }

        // First alert of an episode bypasses cooldown and change checks.
        if count == 0 {
            return Decision::send(now, balance, state);
        }

        if let Some(last) = state.last_notification_time {
            let elapsed = now.signed_duration_since(last);
            let cooldown = self.cooldown();
            if elapsed < cooldown {
                let remaining = cooldown.checked_sub(&elapsed).unwrap_or(TimeDelta::MAX);
                return Decision::skip(SkipReason::Cooldown {
                    minutes_remaining: ceil_minutes(remaining),
                });
            }
        }

        if let Some(last_balance) = state.last_known_balance {
            let change = (balance - last_balance).abs();
            if change < policy.balance_change_threshold {
                return Decision::skip(SkipReason::ChangeTooSmall { change });
            }
        }

        Decision::send(now, balance, state)
    }

    pub fn compose_alert(
        &self,
        provider: &str,
        balance: f64,
        notification_number: u32,
        now: DateTime<Utc>,
    ) -> Alert {
        Alert::new(
            "Low SMS Balance",
            format!(
                "{provider} balance is {balance} (threshold {}). Notification #{notification_number} of {}",
                self.policy.threshold, self.policy.max_consecutive_notifications
            ),
            now,
        )
    }

    fn cooldown(&self) -> TimeDelta {
        TimeDelta::from_std(self.policy.notification_cooldown).unwrap_or(TimeDelta::MAX)
    }
}

fn ceil_minutes(remaining: TimeDelta) -> i64 {
    let whole = remaining.num_minutes();
    if remaining > TimeDelta::minutes(whole) {
        whole + 1
    } else {
        whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn engine() -> AlertEngine {
        AlertEngine::new(AlertPolicy {
            threshold: 700.0,
            notification_cooldown: Duration::from_secs(30 * 60),
            max_consecutive_notifications: 4,
            balance_change_threshold: 10.0,
        })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    fn minutes_ago(m: i64) -> Option<DateTime<Utc>> {
        Some(now() - TimeDelta::minutes(m))
    }

    fn episode(count: u32, last_sent: Option<DateTime<Utc>>, last_balance: Option<f64>) -> MonitorState {
        MonitorState {
            consecutive_notification_count: count,
            last_notification_time: last_sent,
            last_known_balance: last_balance,
            total_notifications: count as u64,
            ..Default::default()
        }
    }

    #[test]
    fn first_drop_sends_notification_one() {
        let mut state = MonitorState::default();
        let decision = engine().decide(now(), 650.0, &state);

        assert_eq!(decision.action, Action::Send { notification_number: 1 });
        assert!(decision.update.apply(&mut state));
        assert_eq!(state.consecutive_notification_count, 1);
        assert_eq!(state.last_notification_time, Some(now()));
        assert_eq!(state.last_known_balance, Some(650.0));
        assert_eq!(state.total_notifications, 1);
    }

    #[test]
    fn skips_inside_cooldown_with_minutes_remaining() {
        let state = episode(1, minutes_ago(5), Some(650.0));
        let decision = engine().decide(now(), 640.0, &state);

        let reason = SkipReason::Cooldown { minutes_remaining: 25 };
        assert_eq!(decision.action, Action::Skip(reason.clone()));
        assert_eq!(decision.update, StateUpdate::Unchanged);
        assert_eq!(reason.to_string(), "within cooldown period, 25 minutes remaining");
    }

    #[test]
    fn cooldown_minutes_round_up() {
        let state = episode(1, Some(now() - TimeDelta::seconds(29 * 60 + 30)), Some(650.0));
        let decision = engine().decide(now(), 500.0, &state);

        assert_eq!(
            decision.action,
            Action::Skip(SkipReason::Cooldown { minutes_remaining: 1 })
        );
    }

    #[test]
    fn cooldown_minutes_round_up_below_a_millisecond() {
        let last = now() - TimeDelta::minutes(29) + TimeDelta::microseconds(500);
        let state = episode(1, Some(last), Some(650.0));
        let decision = engine().decide(now(), 500.0, &state);

        assert_eq!(
            decision.action,
            Action::Skip(SkipReason::Cooldown { minutes_remaining: 2 })
        );
    }

    #[test]
    fn huge_cooldown_with_future_timestamp_does_not_overflow() {
        let engine = AlertEngine::new(AlertPolicy {
            notification_cooldown: Duration::from_millis(u64::MAX),
            ..AlertPolicy::default()
        });

        for last_sent in [Some(now()), minutes_ago(-24 * 60), minutes_ago(60)] {
            let state = episode(1, last_sent, Some(650.0));
            match engine.decide(now(), 600.0, &state).action {
                Action::Skip(SkipReason::Cooldown { minutes_remaining }) => {
                    assert!(minutes_remaining > 0)
                }
                other => panic!("expected cooldown skip, got {other:?}"),
            }
        }
    }

    #[test]
    fn small_change_after_cooldown_is_suppressed() {
        let state = episode(1, minutes_ago(35), Some(640.0));
        let decision = engine().decide(now(), 645.0, &state);

        assert_eq!(
            decision.action,
            Action::Skip(SkipReason::ChangeTooSmall { change: 5.0 })
        );
        assert_eq!(decision.update, StateUpdate::Unchanged);
    }

    #[test]
    fn significant_drop_after_cooldown_sends_next_notification() {
        let mut state = episode(1, minutes_ago(35), Some(640.0));
        let decision = engine().decide(now(), 620.0, &state);

        assert_eq!(decision.action, Action::Send { notification_number: 2 });
        decision.update.apply(&mut state);
        assert_eq!(state.consecutive_notification_count, 2);
        assert_eq!(state.last_known_balance, Some(620.0));
    }

    #[test]
    fn significant_increase_still_below_threshold_also_sends() {
        let state = episode(1, minutes_ago(35), Some(600.0));
        let decision = engine().decide(now(), 690.0, &state);

        assert_eq!(decision.action, Action::Send { notification_number: 2 });
    }

    #[test]
    fn change_exactly_at_threshold_is_enough() {
        let state = episode(1, minutes_ago(35), Some(640.0));
        let decision = engine().decide(now(), 630.0, &state);

        assert_eq!(decision.action, Action::Send { notification_number: 2 });
    }

    #[test]
    fn stops_at_max_consecutive_notifications() {
        let state = episode(4, minutes_ago(120), Some(900.0));
        let decision = engine().decide(now(), 600.0, &state);

        assert_eq!(
            decision.action,
            Action::Skip(SkipReason::MaxNotificationsReached)
        );
        assert_eq!(decision.update, StateUpdate::Unchanged);
    }

    #[test]
    fn recovery_resets_counter_and_records_balance() {
        let mut state = episode(2, minutes_ago(1), Some(640.0));
        let decision = engine().decide(now(), 750.0, &state);

        assert_eq!(decision.action, Action::Skip(SkipReason::AboveThreshold));
        assert_eq!(
            decision.update,
            StateUpdate::Recovered {
                balance: 750.0,
                reset_count: true
            }
        );
        assert!(decision.update.apply(&mut state));
        assert_eq!(state.consecutive_notification_count, 0);
        assert_eq!(state.last_known_balance, Some(750.0));
        assert_eq!(state.total_notifications, 2);
    }

    #[test]
    fn healthy_balance_without_episode_is_a_silent_reset() {
        let decision = engine().decide(now(), 900.0, &MonitorState::default());

        assert_eq!(
            decision.update,
            StateUpdate::Recovered {
                balance: 900.0,
                reset_count: false
            }
        );
    }

    #[test]
    fn balance_at_threshold_counts_as_low() {
        let decision = engine().decide(now(), 700.0, &MonitorState::default());
        assert_eq!(decision.action, Action::Send { notification_number: 1 });
    }

    #[test]
    fn above_threshold_always_skips_and_resets() {
        for count in 0..=6 {
            for balance in [700.01, 701.0, 10_000.0] {
                let mut state = episode(count, minutes_ago(1), Some(1.0));
                let decision = engine().decide(now(), balance, &state);
                assert_eq!(decision.action, Action::Skip(SkipReason::AboveThreshold));
                decision.update.apply(&mut state);
                assert_eq!(state.consecutive_notification_count, 0);
                assert_eq!(state.last_known_balance, Some(balance));
            }
        }
    }

    #[test]
    fn first_alert_ignores_cooldown_and_change_threshold() {
        for last_sent in [None, minutes_ago(0), minutes_ago(1), minutes_ago(-10)] {
            for last_balance in [None, Some(650.0), Some(650.5)] {
                let state = episode(0, last_sent, last_balance);
                let decision = engine().decide(now(), 650.0, &state);
                assert_eq!(decision.action, Action::Send { notification_number: 1 });
            }
        }
    }

    #[test]
    fn at_or_over_max_always_skips() {
        for count in 4..8 {
            for balance in [0.0, 100.0, 700.0] {
                let state = episode(count, None, None);
                let decision = engine().decide(now(), balance, &state);
                assert_eq!(
                    decision.action,
                    Action::Skip(SkipReason::MaxNotificationsReached)
                );
            }
        }
    }

    #[test]
    fn repeated_skip_inputs_give_identical_decisions() {
        let states = [
            episode(4, minutes_ago(1), Some(600.0)),
            episode(2, minutes_ago(10), Some(600.0)),
            episode(2, minutes_ago(40), Some(600.0)),
        ];
        for state in states {
            let first = engine().decide(now(), 603.0, &state);
            assert!(matches!(first.action, Action::Skip(_)));
            for _ in 0..3 {
                assert_eq!(engine().decide(now(), 603.0, &state), first);
            }
        }
    }

    #[test]
    fn reloaded_state_reproduces_the_same_decision() {
        let state = episode(2, minutes_ago(31), Some(612.25));
        let json = serde_json::to_string(&state).unwrap();
        let reloaded: MonitorState = serde_json::from_str(&json).unwrap();

        for balance in [605.0, 590.0, 720.0] {
            assert_eq!(
                engine().decide(now(), balance, &state),
                engine().decide(now(), balance, &reloaded)
            );
        }
    }

    #[test]
    fn full_episode_caps_at_max_then_recovers() {
        let engine = engine();
        let mut state = MonitorState::default();
        let mut t = now();
        let mut balance = 690.0;
        let mut sent = 0;

        for _ in 0..10 {
            let decision = engine.decide(t, balance, &state);
            if let Action::Send { notification_number } = decision.action {
                sent += 1;
                assert_eq!(notification_number, sent);
            }
            decision.update.apply(&mut state);
            t += TimeDelta::minutes(31);
            balance -= 15.0;
        }
        assert_eq!(sent, 4);
        assert_eq!(state.consecutive_notification_count, 4);

        engine.decide(t, 800.0, &state).update.apply(&mut state);
        assert_eq!(state.consecutive_notification_count, 0);
        assert_eq!(
            engine.decide(t, 500.0, &state).action,
            Action::Send { notification_number: 1 }
        );
    }

    #[test]
    fn alert_text_carries_notification_number() {
        let alert = engine().compose_alert("textlocal", 650.0, 1, now());

        assert_eq!(alert.title, "Low SMS Balance");
        assert!(alert.message.contains("textlocal balance is 650"));
        assert!(alert.message.contains("threshold 700"));
        assert!(alert.message.contains("Notification #1 of 4"));
        assert_eq!(alert.timestamp, now());
    }
}
