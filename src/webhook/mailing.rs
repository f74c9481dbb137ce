//! Mailing-list sync channel.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;

use crate::core::http::{build_client, post_json};
use crate::error::{Result, StatError};

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,4}$").ok());

/// Client-side gate applied before any mailing-list call.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}

/// Adds tagged members to an external mailing list.
#[async_trait]
pub trait MailingList: Send + Sync {
    /// Add or tag one member.
    ///
    /// Returns `Ok(true)` when the call went out, `Ok(false)` when the list
    /// is disabled.
    async fn add_member(&self, email: &str, tags: &[String]) -> Result<bool>;
}

#[derive(Serialize)]
struct MemberPayload<'a> {
    email: &'a str,
    tags: &'a [String],
}

/// Posts `{"email": ..., "tags": [...]}` to a webhook URL.
pub struct WebhookMailingList {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookMailingList {
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
impl MailingList for WebhookMailingList {
    async fn add_member(&self, email: &str, tags: &[String]) -> Result<bool> {
        if !is_valid_email(email) {
            return Err(StatError::InvalidEmail(email.to_string()));
        }
        post_json(
            &self.client,
            &self.url,
            &MemberPayload { email, tags },
            self.timeout,
        )
        .await?;
        tracing::debug!(email, ?tags, "mailing list member added");
        Ok(true)
    }
}

/// Used when the mailing list is turned off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMailingList;

#[async_trait]
impl MailingList for DisabledMailingList {
    async fn add_member(&self, email: &str, tags: &[String]) -> Result<bool> {
        tracing::info!(email, ?tags, "mailing list disabled, skipping");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn email_gate() {
        assert!(is_valid_email("jane.doe+test@example.com"));
        assert!(is_valid_email("ops@sub.example.io"));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("jane@example.technology"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn invalid_email_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let list = WebhookMailingList::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = list.add_member("bogus", &["x".into()]).await.unwrap_err();
        assert!(matches!(err, StatError::InvalidEmail(_)));
    }

    #[tokio::test]
    async fn posts_email_and_tags() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "email": "a@example.com",
                "tags": ["vanus_ai", "no_knowledge_base"]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let list = WebhookMailingList::new(server.uri(), Duration::from_secs(5)).unwrap();
        let tags = vec!["vanus_ai".to_string(), "no_knowledge_base".to_string()];
        assert!(list.add_member("a@example.com", &tags).await.unwrap());
    }
}
