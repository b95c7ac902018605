//! Collector client
//!
//! The management protocol itself lives in a collector service. This
//! adapter asks it to refresh one router and decodes the resulting state.

use super::types::{RefreshOptions, RefreshReport};
use super::RouterClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// HTTP client for the collector service
pub struct HttpRouterClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRouterClient {
    /// Create new client; `timeout` bounds each request at the socket level
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check collector health
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl RouterClient for HttpRouterClient {
    async fn refresh_router(&self, id: i64, options: RefreshOptions) -> Result<RefreshReport> {
        let url = format!("{}/routers/{}/refresh", self.base_url, id);
        let resp = self.client.post(&url).json(&options).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Device(format!(
                "Collector refresh of router {} failed: {} {}",
                id, status, body
            )));
        }

        let report: RefreshReport = resp.json().await?;
        Ok(report)
    }
}
