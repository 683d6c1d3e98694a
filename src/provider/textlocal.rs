use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    error_for_status, finite_balance, require_api_key, require_http_url, DeliveryReport,
    ProviderError, SmsProvider,
};
use crate::config::{ConfigError, TextlocalConfig};

#[derive(Debug, Deserialize)]
struct TextlocalResponse {
    status: String,
    #[serde(default)]
    balance: Option<TextlocalBalance>,
    #[serde(default)]
    batch_id: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<TextlocalMessage>,
}

#[derive(Debug, Deserialize)]
struct TextlocalBalance {
    sms: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TextlocalMessage {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

impl TextlocalResponse {
    fn into_success(self) -> Result<Self, ProviderError> {
        if self.status == "success" {
            return Ok(self);
        }
        let reason = self
            .errors
            .iter()
            .map(|e| match e.code {
                Some(code) => format!("{} ({code})", e.message),
                None => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        Err(ProviderError::Rejected(if reason.is_empty() {
            format!("status {}", self.status)
        } else {
            reason
        }))
    }
}

#[derive(Debug, Clone)]
pub struct TextlocalProvider {
    config: TextlocalConfig,
    client: reqwest::Client,
}

impl TextlocalProvider {
    pub fn new(config: TextlocalConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}/", self.config.base_url.trim_end_matches('/'))
    }

    async fn parse(response: reqwest::Response) -> Result<TextlocalResponse, ProviderError> {
        let response = error_for_status(response).await?;
        let body: TextlocalResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        body.into_success()
    }
}

#[async_trait]
impl SmsProvider for TextlocalProvider {
    async fn check_balance(&self) -> Result<f64, ProviderError> {
        let response = self
            .client
            .get(self.endpoint("balance"))
            .query(&[("apikey", self.config.api_key.as_str())])
            .send()
            .await?;

        let body = Self::parse(response).await?;
        let sms = body
            .balance
            .and_then(|b| b.sms)
            .ok_or_else(|| ProviderError::MalformedPayload("missing balance.sms".to_string()))?;
        debug!("Textlocal reported {} SMS credits", sms);
        finite_balance(sms)
    }

    async fn send_message(
        &self,
        recipients: &[String],
        body: &str,
    ) -> Result<DeliveryReport, ProviderError> {
        let numbers = recipients.join(",");
        let mut form = vec![
            ("apikey", self.config.api_key.as_str()),
            ("numbers", numbers.as_str()),
            ("message", body),
        ];
        if let Some(sender) = &self.config.sender {
            form.push(("sender", sender.as_str()));
        }

        let response = self
            .client
            .post(self.endpoint("send"))
            .form(&form)
            .send()
            .await?;
        let reply = Self::parse(response).await?;

        let reference = reply.batch_id.map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        info!("SMS accepted by Textlocal for {} recipient(s)", recipients.len());
        Ok(DeliveryReport {
            provider: self.name(),
            reference,
            recipients: recipients.len(),
        })
    }

    fn validate_config(&self) -> Result<(), ConfigError> {
        require_api_key("TEXTLOCAL_API_KEY", &self.config.api_key)?;
        require_http_url("TEXTLOCAL_BASE_URL", &self.config.base_url)
    }

    fn name(&self) -> &'static str {
        "textlocal"
    }
}
