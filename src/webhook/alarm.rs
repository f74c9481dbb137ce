//! Alarm notification channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::core::http::{build_client, post_json};
use crate::error::Result;

/// Receives alarm messages.
#[async_trait]
pub trait AlarmNotifier: Send + Sync {
    /// Deliver one message.
    ///
    /// Returns `Ok(true)` when the message went out, `Ok(false)` when the
    /// channel is not configured.
    async fn notify(&self, message: &str) -> Result<bool>;
}

#[derive(Serialize)]
struct AlarmPayload<'a> {
    message: &'a str,
}

/// Posts `{"message": ...}` to a webhook URL.
pub struct WebhookAlarmNotifier {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookAlarmNotifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl AlarmNotifier for WebhookAlarmNotifier {
    async fn notify(&self, message: &str) -> Result<bool> {
        post_json(&self.client, &self.url, &AlarmPayload { message }, self.timeout).await?;
        tracing::info!(endpoint = %self.url, "alarm delivered");
        Ok(true)
    }
}

/// Used when no alarm webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyNotifier;

#[async_trait]
impl AlarmNotifier for LogOnlyNotifier {
    async fn notify(&self, message: &str) -> Result<bool> {
        tracing::warn!(message, "alarm webhook not configured, message not sent");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn webhook_notifier_posts_message_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({"message": "usage dropped"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookAlarmNotifier::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(notifier.notify("usage dropped").await.unwrap());
    }

    #[tokio::test]
    async fn log_only_notifier_reports_not_sent() {
        assert!(!LogOnlyNotifier.notify("anything").await.unwrap());
    }
}
