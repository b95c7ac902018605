//! Notifier - Outbound Alert Notifications
//!
//! ## Responsibilities
//!
//! - Deliver created/escalated alert notices to an external channel
//! - Keep delivery off the alert path (detached dispatch, errors only logged)

use crate::alert_engine::Alert;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What happened to the alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoticeKind {
    Created,
    Escalated { level: i32, elapsed: String },
}

/// Notification payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotice {
    #[serde(flatten)]
    pub kind: NoticeKind,
    pub router_name: String,
    pub alert: Alert,
}

/// External notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: &AlertNotice) -> Result<()>;
}

/// Fire-and-forget delivery. Failures are logged here and never reach the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, notice: AlertNotice) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&notice).await {
            tracing::error!(
                alert_id = notice.alert.id,
                router_id = notice.alert.router_id,
                error = %e,
                "Failed to dispatch alert notification"
            );
        }
    });
}

/// Webhook notifier: POSTs the notice as JSON
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    /// Create notifier; without a URL notices are only logged
    pub fn new(url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notice: &AlertNotice) -> Result<()> {
        let Some(url) = &self.url else {
            tracing::debug!(
                alert_id = notice.alert.id,
                title = %notice.alert.title,
                "No webhook configured, notification skipped"
            );
            return Ok(());
        };

        let resp = self.client.post(url).json(notice).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Notification(format!(
                "Webhook responded with {}",
                resp.status()
            )));
        }

        tracing::info!(
            alert_id = notice.alert.id,
            router = %notice.router_name,
            "Alert notification delivered"
        );
        Ok(())
    }
}
