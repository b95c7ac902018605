//! AlertEngine data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Monitored condition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    StatusChange,
    HighCpu,
    HighMemory,
    HighDisk,
    InterfaceDown,
    NetwatchDown,
    Threshold,
    Reboot,
    PppoeConnect,
    PppoeDisconnect,
}

impl AlertType {
    /// Types the escalation engine walks up the tier ladder
    pub const ESCALATABLE: [AlertType; 2] = [AlertType::StatusChange, AlertType::NetwatchDown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::HighCpu => "high_cpu",
            Self::HighMemory => "high_memory",
            Self::HighDisk => "high_disk",
            Self::InterfaceDown => "interface_down",
            Self::NetwatchDown => "netwatch_down",
            Self::Threshold => "threshold",
            Self::Reboot => "reboot",
            Self::PppoeConnect => "pppoe_connect",
            Self::PppoeDisconnect => "pppoe_disconnect",
        }
    }

    pub fn is_escalatable(&self) -> bool {
        Self::ESCALATABLE.contains(self)
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status_change" => Ok(Self::StatusChange),
            "high_cpu" => Ok(Self::HighCpu),
            "high_memory" => Ok(Self::HighMemory),
            "high_disk" => Ok(Self::HighDisk),
            "interface_down" => Ok(Self::InterfaceDown),
            "netwatch_down" => Ok(Self::NetwatchDown),
            "threshold" => Ok(Self::Threshold),
            "reboot" => Ok(Self::Reboot),
            "pppoe_connect" => Ok(Self::PppoeConnect),
            "pppoe_disconnect" => Ok(Self::PppoeDisconnect),
            other => Err(format!("unknown alert type: {}", other)),
        }
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown alert severity: {}", other)),
        }
    }
}

/// One monitored condition instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub router_id: i64,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    /// Netwatch host or session name inside the router, if any
    pub target: Option<String>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub escalation_level: i32,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Alert to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub router_id: i64,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub target: Option<String>,
    /// Informational records (e.g. "back up") are stored already resolved
    pub resolved: bool,
}

impl NewAlert {
    pub fn new(
        router_id: i64,
        alert_type: AlertType,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            router_id,
            alert_type,
            severity,
            title: title.into(),
            message: message.into(),
            target: None,
            resolved: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn already_resolved(mut self) -> Self {
        self.resolved = true;
        self
    }
}

/// Result of a creation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// A new row was inserted
    Created(Alert),
    /// A recent unresolved alert for the same condition was returned instead
    Suppressed(Alert),
}

impl CreateOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            CreateOutcome::Created(a) | CreateOutcome::Suppressed(a) => a,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Caller role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Admin,
    Operator,
    Viewer,
}

/// Authenticated caller of alert operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: ActorRole::Admin,
        }
    }

    pub fn operator(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: ActorRole::Operator,
        }
    }

    /// Query-time restriction for this caller
    pub fn scope(&self) -> AlertScope {
        match self.role {
            ActorRole::Admin => AlertScope::All,
            ActorRole::Operator | ActorRole::Viewer => AlertScope::AssignedTo(self.user_id.clone()),
        }
    }
}

/// Router visibility applied inside repository queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertScope {
    All,
    /// Only routers explicitly assigned to this user
    AssignedTo(String),
}

/// Alert list filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub unresolved_only: bool,
    pub router_id: Option<i64>,
    pub severity: Option<AlertSeverity>,
    pub limit: Option<u32>,
}
