//! HTTP client utilities.
//!
//! Provides the shared client used by the outbound webhooks.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde::Serialize;

use crate::error::{Result, StatError};

/// Default timeout for webhook requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("ustat/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| StatError::Webhook {
            endpoint: String::new(),
            status: None,
            message: format!("build client: {e}"),
        })
}

/// POST `body` as JSON to `url`. Only a 2xx response counts as delivered.
///
/// # Errors
///
/// Returns `Timeout` when the request times out and `Webhook` on any other
/// transport failure or a non-success status.
pub async fn post_json<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    body: &B,
    timeout: Duration,
) -> Result<()> {
    let response = client.post(url).json(body).send().await.map_err(|e| {
        if e.is_timeout() {
            StatError::Timeout(timeout.as_secs())
        } else {
            StatError::Webhook {
                endpoint: url.to_string(),
                status: None,
                message: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(StatError::Webhook {
            endpoint: url.to_string(),
            status: Some(status.as_u16()),
            message: format!("HTTP {status}"),
        });
    }

    Ok(())
}
