use chrono::serde::ts_milliseconds_option;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted monitoring history. Timestamps are stored as epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorState {
    #[serde(with = "ts_milliseconds_option")]
    pub last_notification_time: Option<DateTime<Utc>>,
    pub consecutive_notification_count: u32,
    pub last_known_balance: Option<f64>,
    #[serde(with = "ts_milliseconds_option")]
    pub last_check_time: Option<DateTime<Utc>>,
    pub total_checks: u64,
    pub total_notifications: u64,
}

impl MonitorState {
    pub fn record_check(&mut self, now: DateTime<Utc>) {
        self.total_checks += 1;
        self.last_check_time = Some(now);
    }
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            timestamp,
        }
    }
}
