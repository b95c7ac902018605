//! Shared data models

use serde::{Deserialize, Serialize};

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub collector_connected: bool,
    pub db_connected: bool,
    pub ws_connections: u64,
}

/// Result of an acknowledge / resolve request
#[derive(Debug, Serialize, Deserialize)]
pub struct AlertActionResponse {
    pub alert_id: i64,
    /// False when the alert was already in that state (or not visible to the caller)
    pub changed: bool,
}

/// Runtime setting value
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingValue {
    pub key: String,
    pub value: Option<serde_json::Value>,
}
