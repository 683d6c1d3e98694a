mod fast2sms;
mod textlocal;

pub use fast2sms::Fast2SmsProvider;
pub use textlocal::TextlocalProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::config::{ConfigError, ProviderConfig};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedPayload(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub provider: &'static str,
    pub reference: Option<String>,
    pub recipients: usize,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn check_balance(&self) -> Result<f64, ProviderError>;

    async fn send_message(
        &self,
        recipients: &[String],
        body: &str,
    ) -> Result<DeliveryReport, ProviderError>;

    fn validate_config(&self) -> Result<(), ConfigError>;

    fn name(&self) -> &'static str;
}

pub fn build_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn SmsProvider>, ProviderError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;

    let provider: Arc<dyn SmsProvider> = match config {
        ProviderConfig::Textlocal(c) => Arc::new(TextlocalProvider::new(c.clone(), client)),
        ProviderConfig::Fast2Sms(c) => Arc::new(Fast2SmsProvider::new(c.clone(), client)),
    };
    provider.validate_config()?;
    Ok(provider)
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

fn require_api_key(key: &'static str, api_key: &str) -> Result<(), ConfigError> {
    if api_key.trim().is_empty() {
        return Err(ConfigError::Missing(key));
    }
    Ok(())
}

fn require_http_url(key: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        key,
        value: url.to_string(),
        reason: "must start with http:// or https://".to_string(),
    })
}

fn finite_balance(value: f64) -> Result<f64, ProviderError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProviderError::MalformedPayload(format!(
            "balance is not a finite number: {value}"
        )))
    }
}
