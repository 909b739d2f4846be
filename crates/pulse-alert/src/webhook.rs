//! Webhook notifier: POSTs alert transitions as JSON.

use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::Serialize;
use tracing::{debug, warn};

use pulse_core::{Alert, AlertStatus};
use pulse_health::{BoxFuture, HttpClient, Target, TransportError};

use crate::notifier::Notifier;

const DEFAULT_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Fits three attempts and their backoff inside the default notify timeout.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    alert: &'a Alert,
}

/// Delivers `{"event": "triggered"|"resolved", "alert": {..}}` to a URL.
///
/// Transport errors and non-2xx responses are retried with exponential
/// backoff.
pub struct WebhookNotifier {
    url: String,
    target: Target,
    client: HttpClient,
    attempts: u32,
    initial_backoff: Duration,
    attempt_timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        Self::with_client(url, HttpClient::new()?)
    }

    pub fn with_client(url: &str, client: HttpClient) -> Result<Self, TransportError> {
        Ok(Self {
            url: url.to_string(),
            target: Target::parse(url)?,
            client,
            attempts: DEFAULT_ATTEMPTS,
            initial_backoff: INITIAL_BACKOFF,
            attempt_timeout: ATTEMPT_TIMEOUT,
        })
    }

    /// Total delivery attempts, including the first (at least 1).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self
    }

    /// Upper bound for one request/response exchange.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post_once(&self, body: Bytes) -> anyhow::Result<()> {
        let exchange = self
            .client
            .send(&self.target, Method::POST, body, Some("application/json"));
        let status = tokio::time::timeout(self.attempt_timeout, exchange)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "webhook did not respond within {}ms",
                    self.attempt_timeout.as_millis()
                )
            })??;
        if status.is_success() {
            Ok(())
        } else {
            anyhow::bail!("webhook responded with HTTP {status}")
        }
    }

    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        let event = match alert.status {
            AlertStatus::Active => "triggered",
            AlertStatus::Resolved => "resolved",
        };
        let body = Bytes::from(serde_json::to_vec(&WebhookPayload { event, alert })?);

        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.post_once(body.clone()).await {
                Ok(()) => {
                    debug!(url = %self.url, alert_id = %alert.id, event, attempt, "webhook delivered");
                    return Ok(());
                }
                Err(e) if attempt >= self.attempts => {
                    return Err(e.context(format!(
                        "webhook delivery to {} failed after {attempt} attempt(s)",
                        self.url
                    )));
                }
                Err(e) => {
                    warn!(url = %self.url, alert_id = %alert.id, attempt, error = %e, "webhook delivery failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
            }
        }
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    fn notify<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.deliver(alert))
    }
}
