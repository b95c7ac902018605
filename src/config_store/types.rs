//! ConfigStore data types
//!
//! Setting keys and typed views over raw settings values

use super::{read_flag, read_number, SettingsSource};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Setting keys
pub mod keys {
    pub const POLLING_INTERVAL_MINUTES: &str = "polling_interval_minutes";
    pub const ALERTS_ENABLED: &str = "alerts_enabled";
    pub const ALERT_STATUS_CHANGE: &str = "alert_status_change";
    pub const ALERT_HIGH_CPU: &str = "alert_high_cpu";
    pub const ALERT_HIGH_MEMORY: &str = "alert_high_memory";
    pub const ALERT_HIGH_DISK: &str = "alert_high_disk";
    pub const CPU_WARNING_THRESHOLD: &str = "cpu_warning_threshold";
    pub const CPU_CRITICAL_THRESHOLD: &str = "cpu_critical_threshold";
    pub const MEMORY_WARNING_THRESHOLD: &str = "memory_warning_threshold";
    pub const MEMORY_CRITICAL_THRESHOLD: &str = "memory_critical_threshold";
    pub const DISK_WARNING_THRESHOLD: &str = "disk_warning_threshold";
    pub const DISK_CRITICAL_THRESHOLD: &str = "disk_critical_threshold";
}

/// Warning/critical percentage pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub warning: f64,
    pub critical: f64,
}

/// Alert switches and thresholds, loaded fresh for every check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Master switch
    pub alerts_enabled: bool,
    pub status_change: bool,
    pub high_cpu: bool,
    pub high_memory: bool,
    pub high_disk: bool,
    pub cpu: ThresholdPair,
    pub memory: ThresholdPair,
    pub disk: ThresholdPair,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            alerts_enabled: true,
            status_change: true,
            high_cpu: true,
            high_memory: true,
            high_disk: true,
            cpu: ThresholdPair {
                warning: 70.0,
                critical: 90.0,
            },
            memory: ThresholdPair {
                warning: 80.0,
                critical: 95.0,
            },
            disk: ThresholdPair {
                warning: 80.0,
                critical: 95.0,
            },
        }
    }
}

impl AlertSettings {
    /// Load from the settings source; missing keys keep their defaults
    pub async fn load(source: &dyn SettingsSource) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            alerts_enabled: read_flag(source, keys::ALERTS_ENABLED, d.alerts_enabled).await?,
            status_change: read_flag(source, keys::ALERT_STATUS_CHANGE, d.status_change).await?,
            high_cpu: read_flag(source, keys::ALERT_HIGH_CPU, d.high_cpu).await?,
            high_memory: read_flag(source, keys::ALERT_HIGH_MEMORY, d.high_memory).await?,
            high_disk: read_flag(source, keys::ALERT_HIGH_DISK, d.high_disk).await?,
            cpu: ThresholdPair {
                warning: read_number(source, keys::CPU_WARNING_THRESHOLD, d.cpu.warning).await?,
                critical: read_number(source, keys::CPU_CRITICAL_THRESHOLD, d.cpu.critical).await?,
            },
            memory: ThresholdPair {
                warning: read_number(source, keys::MEMORY_WARNING_THRESHOLD, d.memory.warning)
                    .await?,
                critical: read_number(source, keys::MEMORY_CRITICAL_THRESHOLD, d.memory.critical)
                    .await?,
            },
            disk: ThresholdPair {
                warning: read_number(source, keys::DISK_WARNING_THRESHOLD, d.disk.warning).await?,
                critical: read_number(source, keys::DISK_CRITICAL_THRESHOLD, d.disk.critical)
                    .await?,
            },
        })
    }
}

/// Interpret a stored flag. Accepts JSON booleans, 0/1 and "true"/"false" strings.
pub fn parse_flag(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_i64().map(|n| n != 0),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Interpret a stored number. Accepts JSON numbers and numeric strings.
pub fn parse_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Interpret the manual polling override. Only whole minutes >= 1 count.
pub fn parse_interval_override(value: &serde_json::Value) -> Option<u64> {
    let minutes = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if minutes >= 1 {
        Some(minutes as u64)
    } else {
        None
    }
}
