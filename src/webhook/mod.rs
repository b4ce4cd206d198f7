//! Webhook Dispatcher (spec.md §4.7): fire-and-forget event fan-out with
//! retries, HMAC signing, a SQLite delivery ledger, and manual resend.
//! Grounded in the teacher's `telemetry::spawn` queue-and-flush shape, but
//! delivering one event per attempt rather than batching (each webhook
//! event is independently retried and ledgered).

pub mod ledger;
pub mod signing;
pub mod ssrf;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::site::SiteConfig;
use crate::db::Database;
use crate::error::AppResult;
use crate::metrics::DaemonMetrics;
use ledger::Ledger;

const QUEUE_CAPACITY: usize = 512;
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(5),
    Duration::from_secs(30),
    Duration::from_secs(120),
];
/// HTTP 406 means "do not retry" (spec.md §4.7).
const DO_NOT_RETRY_STATUS: u16 = 406;

/// One outbound notification, queued by the caller after a qualifying
/// event (spec.md §4.7 "fire is non-blocking").
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event: String,
    pub site: String,
    pub config: SiteConfig,
    pub data: Value,
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    tx: mpsc::Sender<WebhookEvent>,
}

impl WebhookDispatcher {
    /// Spawns the delivery worker and returns the sender handle. A single
    /// worker task processes the queue serially — spec.md §4.7 describes
    /// "a worker" (singular); retries for one event do not block delivery
    /// of a later, unrelated event because each delivery is itself spawned.
    pub fn spawn(db: Database, metrics: Arc<DaemonMetrics>) -> Self {
        let (tx, mut rx) = mpsc::channel::<WebhookEvent>(QUEUE_CAPACITY);
        let ledger = Arc::new(Ledger::new(db));

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let ledger = ledger.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    deliver_with_retries(&ledger, &metrics, &event).await;
                });
            }
        });

        Self { tx }
    }

    /// Non-blocking: pushes onto the internal queue. No webhook is sent
    /// (and nothing is queued) if `webhook_url` is empty or
    /// `webhook_events` is non-empty and excludes this event name
    /// (spec.md §4.7 "configuration resolution").
    pub fn fire(&self, event: WebhookEvent) {
        if event.config.webhook_url.is_empty() {
            return;
        }
        if !event.config.webhook_events.is_empty() && !event.config.webhook_events.contains(&event.event) {
            return;
        }
        if self.tx.try_send(event).is_err() {
            warn!("webhook queue full, dropping event");
        }
    }
}

async fn deliver_with_retries(ledger: &Ledger, metrics: &DaemonMetrics, event: &WebhookEvent) {
    let webhook_id = signing::webhook_id();
    let payload = build_payload(event);
    let body = payload.to_string();

    for (idx, delay) in std::iter::once(None).chain(RETRY_DELAYS.into_iter().map(Some)).enumerate() {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let attempt = (idx + 1) as i64;

        let outcome = attempt_delivery(&webhook_id, event, &body).await;
        let failed = !matches!(&outcome, Ok(status) if (200..300).contains(status));
        metrics.inc_webhook_delivery(failed);

        let (status, error) = match &outcome {
            Ok(status) => (*status as i64, None),
            Err(e) => (0, Some(e.clone())),
        };
        if let Err(e) = ledger
            .record_attempt(
                &webhook_id,
                &event.event,
                &event.site,
                &event.config.webhook_url,
                &body,
                attempt,
                status,
                error.as_deref(),
            )
            .await
        {
            warn!(err = %e, webhook_id, "failed to record webhook delivery attempt");
        }

        match outcome {
            Ok(status) if (200..300).contains(&status) => {
                info!(webhook_id, attempt, status, "webhook delivered");
                return;
            }
            Ok(status) if status == DO_NOT_RETRY_STATUS as u16 => {
                info!(webhook_id, attempt, status, "webhook rejected, not retrying");
                return;
            }
            Ok(status) if !(500..600).contains(&status) => {
                // Any other non-5xx, non-406 response is treated as
                // terminal too: only 5xx and network errors are retried.
                info!(webhook_id, attempt, status, "webhook not retried (non-5xx failure)");
                return;
            }
            _ => continue,
        }
    }
    warn!(webhook_id, "webhook delivery exhausted retries");
}

async fn attempt_delivery(webhook_id: &str, event: &WebhookEvent, body: &str) -> Result<u16, String> {
    let url = ssrf::validate_url(&event.config.webhook_url)
        .await
        .map_err(|e| e.to_string())?;

    let timestamp = chrono::Utc::now().timestamp();
    let signature = signing::sign(&event.config.webhook_secret, webhook_id, timestamp, body);

    let client = reqwest::Client::builder()
        .connect_timeout(DIAL_TIMEOUT)
        .timeout(TOTAL_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;

    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("webhook-id", webhook_id)
        .header("webhook-timestamp", timestamp.to_string())
        .body(body.to_string());
    if let Some(sig) = signature {
        request = request.header("webhook-signature", sig);
    }

    let response = request.send().await.map_err(|e| e.to_string())?;
    Ok(response.status().as_u16())
}

fn build_payload(event: &WebhookEvent) -> Value {
    serde_json::json!({
        "event": event.event,
        "site": event.site,
        "data": event.data,
    })
}

/// Manual resend (spec.md §4.7 "manual resend"): re-sign the original
/// payload and URL with the *current* secret, recorded as a new attempt
/// under the same `webhook_id`.
pub async fn resend(ledger: &Ledger, webhook_id: &str, current_secret: &str) -> AppResult<i64> {
    let Some(last) = ledger.last_attempt(webhook_id).await? else {
        return Err(crate::error::AppError::NotFound(format!(
            "no delivery history for webhook '{webhook_id}'"
        )));
    };

    let timestamp = chrono::Utc::now().timestamp();
    let signature = signing::sign(current_secret, webhook_id, timestamp, &last.payload);

    let client = reqwest::Client::builder()
        .connect_timeout(DIAL_TIMEOUT)
        .timeout(TOTAL_TIMEOUT)
        .build()
        .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e)))?;

    let mut request = client
        .post(&last.url)
        .header("Content-Type", "application/json")
        .header("webhook-id", webhook_id)
        .header("webhook-timestamp", timestamp.to_string())
        .body(last.payload.clone());
    if let Some(sig) = signature {
        request = request.header("webhook-signature", sig);
    }

    let (status, error): (i64, Option<String>) = match request.send().await {
        Ok(resp) => (resp.status().as_u16() as i64, None),
        Err(e) => (0, Some(e.to_string())),
    };

    let attempt = ledger.next_attempt_number(webhook_id).await?;
    ledger
        .record_attempt(
            webhook_id,
            &last.event,
            &last.site,
            &last.url,
            &last.payload,
            attempt,
            status,
            error.as_deref(),
        )
        .await?;
    Ok(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_with_webhook(url: &str, events: &[&str]) -> SiteConfig {
        let mut cfg = SiteConfig::default();
        cfg.webhook_url = url.to_string();
        cfg.webhook_events = events.iter().map(|s| s.to_string()).collect();
        cfg
    }

    #[tokio::test]
    async fn no_fire_without_webhook_url() {
        let db = Database::open_in_memory().await.unwrap();
        let metrics = Arc::new(DaemonMetrics::new());
        let dispatcher = WebhookDispatcher::spawn(db.clone(), metrics);
        dispatcher.fire(WebhookEvent {
            event: "deploy".to_string(),
            site: "docs".to_string(),
            config: SiteConfig::default(),
            data: serde_json::json!({}),
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let ledger = Ledger::new(db);
        let summaries = ledger.list_summaries(None, None, None, 10, 0).await.unwrap();
        assert!(summaries.is_empty());
    }

    #[tokio::test]
    async fn no_fire_when_event_not_subscribed() {
        let db = Database::open_in_memory().await.unwrap();
        let metrics = Arc::new(DaemonMetrics::new());
        let dispatcher = WebhookDispatcher::spawn(db.clone(), metrics);
        dispatcher.fire(WebhookEvent {
            event: "deploy".to_string(),
            site: "docs".to_string(),
            config: cfg_with_webhook("https://example.test/hook", &["activate"]),
            data: serde_json::json!({}),
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let ledger = Ledger::new(db);
        let summaries = ledger.list_summaries(None, None, None, 10, 0).await.unwrap();
        assert!(summaries.is_empty());
    }
}
