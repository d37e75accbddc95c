//! Outbound delivery of job notifications.
//!
//! Dispatch happens after the transaction commits, on its own task. A
//! delivery failure is logged and counted; the job transition stands.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::events::JobNotification;
use crate::metrics;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: &str, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// Only logs. Used when no webhook target is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, kind: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        tracing::info!(
            kind,
            job_id = %payload["job"]["id"],
            status = %payload["status"],
            "Job notification"
        );
        Ok(())
    }
}

/// POSTs every notification as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, kind: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .header("User-Agent", "dci-server")
            .header("X-DCI-Event", kind)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("notification webhook returned {status}: {text}");
        }
        Ok(())
    }
}

/// Fire and forget. The returned handle is only awaited by tests.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: JobNotification) -> JoinHandle<()> {
    tokio::spawn(async move {
        let kind = notification.kind();
        let job_id = notification.job_id();
        let payload = match serde_json::to_value(&notification) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(job_id = %job_id, "Failed to serialize notification: {}", e);
                metrics::notification_failed();
                return;
            }
        };
        if let Err(e) = notifier.notify(kind, payload).await {
            tracing::warn!(job_id = %job_id, kind, "Notification delivery failed: {:#}", e);
            metrics::notification_failed();
        }
    })
}
