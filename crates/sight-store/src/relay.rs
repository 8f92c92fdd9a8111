//! Alert relay backends

use crate::{AlertRelay, RelayError, RelayResult};
use async_trait::async_trait;
use serde::Serialize;
use sight_core::UserId;
use std::time::Duration;
use tracing::{debug, warn};

/// Writes alerts to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRelay;

#[async_trait]
impl AlertRelay for LogRelay {
    async fn send_alert(&self, user: &UserId, message: &str) -> RelayResult<()> {
        warn!("🚨 ALERT for {}: {}", user, message);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "log"
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertPayload<'a> {
    user_id: &'a str,
    message: &'a str,
}

/// Posts `{"userId", "message"}` to a push-notification backend
pub struct WebhookRelay {
    client: reqwest::Client,
    url: String,
}

impl WebhookRelay {
    pub fn new(url: &str, timeout: Duration) -> RelayResult<Self> {
        if url.is_empty() {
            return Err(RelayError::Configuration("webhook url is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Configuration(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl AlertRelay for WebhookRelay {
    async fn send_alert(&self, user: &UserId, message: &str) -> RelayResult<()> {
        let payload = AlertPayload {
            user_id: user.as_str(),
            message,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Rejected(status.as_u16()));
        }
        debug!("Alert delivered for {} (HTTP {})", user, status.as_u16());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "webhook"
    }
}
