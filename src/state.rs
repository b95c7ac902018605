//! Application state
//!
//! Holds all shared components and state

use crate::alert_engine::AlertEngine;
use crate::config_store::SettingsRepository;
use crate::escalation_engine::EscalationEngine;
use crate::polling_scheduler::{PollingScheduler, DEVICE_TIMEOUT, STARTUP_DELAY};
use crate::realtime_hub::RealtimeHub;
use crate::router_registry::HttpRouterClient;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Collector service URL (management-protocol side)
    pub collector_url: String,
    /// Webhook for alert notifications; unset means log only
    pub notify_webhook_url: Option<String>,
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Per-device refresh deadline
    pub device_timeout: Duration,
    /// Delay before the first poll cycle
    pub startup_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "mysql://root@localhost/routerwatch".to_string()),
            collector_url: std::env::var("COLLECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:9100".to_string()),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            device_timeout: std::env::var("DEVICE_TIMEOUT_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEVICE_TIMEOUT),
            startup_delay: std::env::var("STARTUP_DELAY_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(STARTUP_DELAY),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database pool
    pub pool: MySqlPool,
    /// Application config
    pub config: AppConfig,
    /// Runtime settings
    pub settings: SettingsRepository,
    /// Collector client (health reporting)
    pub collector: Arc<HttpRouterClient>,
    /// AlertEngine
    pub alerts: Arc<AlertEngine>,
    /// EscalationEngine
    pub escalation: Arc<EscalationEngine>,
    /// PollingScheduler
    pub scheduler: Arc<PollingScheduler>,
    /// RealtimeHub (WebSocket)
    pub realtime: Arc<RealtimeHub>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}
