use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;

pub const DEFAULT_TEXTLOCAL_BASE_URL: &str = "https://api.textlocal.in";
pub const DEFAULT_FAST2SMS_BASE_URL: &str = "https://www.fast2sms.com";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("NOTIFICATION_RECIPIENTS cannot be empty")]
    NoRecipients,

    #[error("unknown SMS_PROVIDER {0:?} (expected \"textlocal\" or \"fast2sms\")")]
    UnknownProvider(String),
}

/// Thresholds the alert engine evaluates every observed balance against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    pub threshold: f64,
    pub notification_cooldown: Duration,
    pub max_consecutive_notifications: u32,
    pub balance_change_threshold: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            threshold: 700.0,
            notification_cooldown: Duration::from_millis(1_800_000),
            max_consecutive_notifications: 4,
            balance_change_threshold: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextlocalConfig {
    pub api_key: String,
    pub sender: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fast2SmsConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    Textlocal(TextlocalConfig),
    Fast2Sms(Fast2SmsConfig),
}

impl ProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::Textlocal(_) => "textlocal",
            ProviderConfig::Fast2Sms(_) => "fast2sms",
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            ProviderConfig::Textlocal(c) => &c.base_url,
            ProviderConfig::Fast2Sms(c) => &c.base_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub policy: AlertPolicy,
    pub check_interval: Duration,
    pub request_timeout: Duration,
    pub recipients: Vec<String>,
    pub state_file: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider_name = get("SMS_PROVIDER").unwrap_or_else(|| "textlocal".to_string());
        let provider = match provider_name.to_lowercase().as_str() {
            "textlocal" => ProviderConfig::Textlocal(TextlocalConfig {
                api_key: get("TEXTLOCAL_API_KEY").ok_or(ConfigError::Missing("TEXTLOCAL_API_KEY"))?,
                sender: get("TEXTLOCAL_SENDER"),
                base_url: get("TEXTLOCAL_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_TEXTLOCAL_BASE_URL.to_string()),
            }),
            "fast2sms" => ProviderConfig::Fast2Sms(Fast2SmsConfig {
                api_key: get("FAST2SMS_API_KEY").ok_or(ConfigError::Missing("FAST2SMS_API_KEY"))?,
                base_url: get("FAST2SMS_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_FAST2SMS_BASE_URL.to_string()),
            }),
            _ => return Err(ConfigError::UnknownProvider(provider_name)),
        };

        let recipients = parse_recipients(&get("NOTIFICATION_RECIPIENTS").unwrap_or_default());
        if recipients.is_empty() {
            return Err(ConfigError::NoRecipients);
        }

        let threshold: f64 = parse_or("BALANCE_THRESHOLD", get("BALANCE_THRESHOLD"), 700.0)?;
        if !threshold.is_finite() {
            return Err(invalid("BALANCE_THRESHOLD", threshold, "must be a finite number"));
        }

        let max_consecutive_notifications: u32 = parse_or(
            "MAX_CONSECUTIVE_NOTIFICATIONS",
            get("MAX_CONSECUTIVE_NOTIFICATIONS"),
            4,
        )?;
        if max_consecutive_notifications == 0 {
            return Err(invalid("MAX_CONSECUTIVE_NOTIFICATIONS", 0, "must be at least 1"));
        }

        let balance_change_threshold: f64 = parse_or(
            "BALANCE_CHANGE_THRESHOLD",
            get("BALANCE_CHANGE_THRESHOLD"),
            10.0,
        )?;
        if !(balance_change_threshold.is_finite() && balance_change_threshold >= 0.0) {
            return Err(invalid(
                "BALANCE_CHANGE_THRESHOLD",
                balance_change_threshold,
                "must be a non-negative number",
            ));
        }

        let check_interval: u64 = parse_or("CHECK_INTERVAL", get("CHECK_INTERVAL"), 300_000)?;
        if check_interval == 0 {
            return Err(invalid("CHECK_INTERVAL", 0, "must be greater than zero"));
        }
        let notification_cooldown: u64 =
            parse_or("NOTIFICATION_COOLDOWN", get("NOTIFICATION_COOLDOWN"), 1_800_000)?;
        if TimeDelta::from_std(Duration::from_millis(notification_cooldown)).is_err() {
            return Err(invalid(
                "NOTIFICATION_COOLDOWN",
                notification_cooldown,
                "is too large",
            ));
        }
        let request_timeout: u64 = parse_or("REQUEST_TIMEOUT", get("REQUEST_TIMEOUT"), 30_000)?;
        if request_timeout == 0 {
            return Err(invalid("REQUEST_TIMEOUT", 0, "must be greater than zero"));
        }

        let state_file = get("STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("monitor-state.json"));

        Ok(Self {
            provider,
            policy: AlertPolicy {
                threshold,
                notification_cooldown: Duration::from_millis(notification_cooldown),
                max_consecutive_notifications,
                balance_change_threshold,
            },
            check_interval: Duration::from_millis(check_interval),
            request_timeout: Duration::from_millis(request_timeout),
            recipients,
            state_file,
        })
    }
}

pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
