mod console;

pub use console::ConsoleNotifier;

use std::sync::Arc;

use crate::domain::Alert;
use crate::provider::{DeliveryReport, ProviderError, SmsProvider};
use tracing::{info, warn};

pub struct NotifierHub {
    console: ConsoleNotifier,
    provider: Arc<dyn SmsProvider>,
    recipients: Vec<String>,
}

impl NotifierHub {
    pub fn new(
        console: ConsoleNotifier,
        provider: Arc<dyn SmsProvider>,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            console,
            provider,
            recipients,
        }
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Echoes the alert locally, then delivers it over SMS exactly once.
    pub async fn send(&self, alert: &Alert) -> Result<DeliveryReport, ProviderError> {
        self.console.send(alert);

        let text = format_sms(alert);
        match self.provider.send_message(&self.recipients, &text).await {
            Ok(report) => {
                info!(
                    "📨 Alert delivered via {} to {} recipient(s)",
                    report.provider, report.recipients
                );
                Ok(report)
            }
            Err(e) => {
                warn!("SMS notification via {} failed: {}", self.provider.name(), e);
                Err(e)
            }
        }
    }
}

pub fn format_sms(alert: &Alert) -> String {
    format!(
        "⚠️ {}\n{}\nTime: {}",
        alert.title,
        alert.message,
        alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    )
}
