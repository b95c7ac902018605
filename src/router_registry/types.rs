//! RouterRegistry data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Router reachability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterStatus {
    Online,
    Offline,
    Maintenance,
    Unknown,
}

impl RouterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Maintenance => "maintenance",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RouterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "maintenance" => Ok(Self::Maintenance),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown router status: {}", other)),
        }
    }
}

/// Latest metrics snapshot reported by a refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterMetrics {
    /// CPU load in percent
    pub cpu_load: Option<f64>,
    pub memory_used: Option<i64>,
    pub memory_total: Option<i64>,
    pub disk_used: Option<i64>,
    pub disk_total: Option<i64>,
    pub uptime_secs: Option<i64>,
}

impl RouterMetrics {
    /// Memory usage in percent, when both sides are known
    pub fn memory_percent(&self) -> Option<f64> {
        percent(self.memory_used, self.memory_total)
    }

    /// Disk usage in percent, when both sides are known
    pub fn disk_percent(&self) -> Option<f64> {
        percent(self.disk_used, self.disk_total)
    }
}

fn percent(used: Option<i64>, total: Option<i64>) -> Option<f64> {
    match (used, total) {
        (Some(used), Some(total)) if total > 0 => Some(used as f64 / total as f64 * 100.0),
        _ => None,
    }
}

/// Router polling state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Router {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub status: RouterStatus,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: RouterMetrics,
}

/// Netwatch host status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetwatchStatus {
    Up,
    Down,
    Unknown,
}

impl NetwatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for NetwatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown netwatch status: {}", other)),
        }
    }
}

/// Netwatch target as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetwatchTarget {
    pub id: i64,
    pub router_id: i64,
    pub host: String,
    pub status: NetwatchStatus,
    pub last_up: Option<DateTime<Utc>>,
    pub last_down: Option<DateTime<Utc>>,
}

/// Netwatch state seen by a refresh, with the status it replaced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetwatchObservation {
    pub host: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub status: NetwatchStatus,
    pub previous_status: NetwatchStatus,
}

impl NetwatchObservation {
    pub fn changed(&self) -> bool {
        self.status != self.previous_status
    }
}

/// PPPoE session as reported by the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedSession {
    /// Session identity (PPP secret name)
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub uptime_secs: Option<i64>,
}

/// Refresh options passed to the device client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOptions {
    pub include_dependents: bool,
    pub full_sync: bool,
}

/// Result of one successful device refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub router: Router,
    #[serde(default)]
    pub netwatch: Vec<NetwatchObservation>,
    /// `None` when the router does not report PPPoE sessions
    #[serde(default)]
    pub sessions: Option<Vec<ObservedSession>>,
}
