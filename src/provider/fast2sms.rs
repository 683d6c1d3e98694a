use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    error_for_status, finite_balance, require_api_key, require_http_url, DeliveryReport,
    ProviderError, SmsProvider,
};
use crate::config::{ConfigError, Fast2SmsConfig};

#[derive(Debug, Deserialize)]
struct Fast2SmsResponse {
    #[serde(rename = "return")]
    ok: bool,
    #[serde(default)]
    wallet: Option<Value>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    message: Option<Value>,
}

impl Fast2SmsResponse {
    fn into_success(self) -> Result<Self, ProviderError> {
        if self.ok {
            return Ok(self);
        }
        let reason = match &self.message {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join("; "),
            Some(other) => other.to_string(),
            None => "request refused".to_string(),
        };
        Err(ProviderError::Rejected(reason))
    }
}

/// The wallet amount arrives as either a JSON string or number.
fn parse_wallet(value: Option<Value>) -> Result<f64, ProviderError> {
    let amount = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    amount
        .ok_or_else(|| ProviderError::MalformedPayload("missing or invalid wallet".to_string()))
        .and_then(finite_balance)
}

#[derive(Debug, Clone)]
pub struct Fast2SmsProvider {
    config: Fast2SmsConfig,
    client: reqwest::Client,
}

impl Fast2SmsProvider {
    pub fn new(config: Fast2SmsConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/dev/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn parse(response: reqwest::Response) -> Result<Fast2SmsResponse, ProviderError> {
        let response = error_for_status(response).await?;
        let body: Fast2SmsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        body.into_success()
    }
}

#[async_trait]
impl SmsProvider for Fast2SmsProvider {
    async fn check_balance(&self) -> Result<f64, ProviderError> {
        let response = self
            .client
            .get(self.endpoint("wallet"))
            .header("authorization", &self.config.api_key)
            .send()
            .await?;

        let body = Self::parse(response).await?;
        let wallet = parse_wallet(body.wallet)?;
        debug!("Fast2SMS wallet balance is {}", wallet);
        Ok(wallet)
    }

    async fn send_message(
        &self,
        recipients: &[String],
        body: &str,
    ) -> Result<DeliveryReport, ProviderError> {
        let payload = json!({
            "route": "q",
            "message": body,
            "numbers": recipients.join(","),
            "flash": "0"
        });

        let response = self
            .client
            .post(self.endpoint("bulkV2"))
            .header("authorization", &self.config.api_key)
            .json(&payload)
            .send()
            .await?;
        let reply = Self::parse(response).await?;

        info!("SMS accepted by Fast2SMS for {} recipient(s)", recipients.len());
        Ok(DeliveryReport {
            provider: self.name(),
            reference: reply.request_id,
            recipients: recipients.len(),
        })
    }

    fn validate_config(&self) -> Result<(), ConfigError> {
        require_api_key("FAST2SMS_API_KEY", &self.config.api_key)?;
        require_http_url("FAST2SMS_BASE_URL", &self.config.base_url)
    }

    fn name(&self) -> &'static str {
        "fast2sms"
    }
}
