//! Notification sinks.

use crate::BoxError;
use serde_json::json;
use tracing::info;

/// Delivers one formatted message per dispatch
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), BoxError>;
}

/// Posts the message as JSON to a configured webhook
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait::async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), BoxError> {
        self.client
            .post(&self.url)
            .json(&json!({
                "subject": subject,
                "body": body,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Fallback sink that only logs, used when no webhook is configured
pub struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), BoxError> {
        info!(subject, "notification:\n{}", body);
        Ok(())
    }
}
