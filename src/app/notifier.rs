//! Human-readable status notifications
//!
//! Failures and retry exhaustion are mirrored to an external sink. A sink
//! that cannot be reached is logged and otherwise ignored: notification
//! problems never change download or reconciliation control flow.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::notify::{DEFAULT_USERNAME, WEBHOOK_TIMEOUT};
use crate::errors::{NotifyError, NotifyResult};

/// Sink for status messages
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Deliver one message
    async fn send(&self, message: &str) -> NotifyResult<()>;
}

/// Send a message and log, rather than return, any delivery failure
pub async fn notify(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.send(message).await {
        warn!(error = %e, "Failed to send notification");
    }
}

/// Sink used when no webhook is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _message: &str) -> NotifyResult<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    username: &'a str,
    content: &'a str,
}

/// Posts messages to a Discord-compatible webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    username: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            username: DEFAULT_USERNAME.to_string(),
            timeout: WEBHOOK_TIMEOUT,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> NotifyResult<()> {
        let payload = WebhookMessage {
            username: &self.username,
            content: message,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status {
                status: response.status().as_u16(),
            });
        }

        debug!("Webhook notification delivered");
        Ok(())
    }
}

/// Build the sink for an optional webhook URL
///
/// An empty or missing URL yields the no-op sink.
pub fn build_notifier(
    webhook_url: Option<&str>,
    username: &str,
    timeout: Duration,
) -> Arc<dyn Notifier> {
    match webhook_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => Arc::new(
            WebhookNotifier::new(url)
                .with_username(username)
                .with_timeout(timeout),
        ),
        None => Arc::new(NoopNotifier),
    }
}
