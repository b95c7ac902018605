//! AlertEngine - Alert Lifecycle
//!
//! ## Responsibilities
//!
//! - Create alerts with cooldown deduplication
//! - Threshold checks (CPU / memory / disk) against live settings
//! - Router status, reboot, netwatch and PPPoE session alerts
//! - Acknowledge / resolve / query under the caller's router scope
//! - Real-time and external notification of created alerts
//!
//! ## Deduplication
//!
//! A repeat detection returns the most recent unresolved alert for the same
//! router + type + target when it is younger than the cooldown. Once the
//! cooldown has passed a new row is created even if the old one is still
//! unresolved, so a flapping router never goes silent.

mod repository;
mod thresholds;
mod types;

pub use repository::{AccessDirectory, AccessDirectoryImpl, AlertRepository, AlertRepositoryImpl};
pub use thresholds::threshold_severity;
pub use types::*;

use crate::config_store::{AlertSettings, SettingsSource, ThresholdPair};
use crate::error::Result;
use crate::escalation_engine::format_elapsed;
use crate::notifier::{self, AlertNotice, NoticeKind, Notifier};
use crate::realtime_hub::{AlertEscalatedMessage, AlertResolvedMessage, HubMessage, RealtimeHub};
use crate::router_registry::{
    NetwatchObservation, NetwatchStatus, ObservedSession, Router, RouterRepository, RouterStatus,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Window in which a repeat detection reuses the existing alert
pub const ALERT_COOLDOWN_MINUTES: i64 = 30;

/// Collector-reported uptime for messages; out-of-range values print raw
fn format_uptime(secs: i64) -> String {
    match Duration::try_seconds(secs) {
        Some(uptime) => format_elapsed(uptime),
        None => format!("{}s", secs),
    }
}

/// AlertEngine instance
pub struct AlertEngine {
    repo: Arc<dyn AlertRepository>,
    routers: Arc<dyn RouterRepository>,
    settings: Arc<dyn SettingsSource>,
    access: Arc<dyn AccessDirectory>,
    notifier: Arc<dyn Notifier>,
    realtime: Arc<RealtimeHub>,
    cooldown: Duration,
}

impl AlertEngine {
    /// Create new AlertEngine
    pub fn new(
        repo: Arc<dyn AlertRepository>,
        routers: Arc<dyn RouterRepository>,
        settings: Arc<dyn SettingsSource>,
        access: Arc<dyn AccessDirectory>,
        notifier: Arc<dyn Notifier>,
        realtime: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            repo,
            routers,
            settings,
            access,
            notifier,
            realtime,
            cooldown: Duration::minutes(ALERT_COOLDOWN_MINUTES),
        }
    }

    // ========================================
    // Creation
    // ========================================

    /// Create the alert unless a recent unresolved one covers the same condition
    pub async fn create_if_warranted(&self, alert: NewAlert) -> Result<CreateOutcome> {
        self.create_if_warranted_at(alert, Utc::now()).await
    }

    pub(crate) async fn create_if_warranted_at(
        &self,
        alert: NewAlert,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome> {
        let existing = self
            .repo
            .find_latest_unresolved(alert.router_id, alert.alert_type, alert.target.as_deref())
            .await?;

        if let Some(existing) = existing {
            if now - existing.created_at < self.cooldown {
                tracing::debug!(
                    alert_id = existing.id,
                    router_id = alert.router_id,
                    alert_type = %alert.alert_type,
                    "Alert suppressed by cooldown"
                );
                return Ok(CreateOutcome::Suppressed(existing));
            }
        }

        let created = self.repo.insert(&alert, now).await?;
        tracing::info!(
            alert_id = created.id,
            router_id = created.router_id,
            alert_type = %created.alert_type,
            severity = %created.severity,
            "Alert created"
        );

        self.announce(&created);
        Ok(CreateOutcome::Created(created))
    }

    /// Insert an informational record without deduplication (stored resolved)
    async fn record_notice(&self, alert: NewAlert, now: DateTime<Utc>) -> Result<Alert> {
        let created = self.repo.insert(&alert.already_resolved(), now).await?;
        tracing::info!(
            alert_id = created.id,
            router_id = created.router_id,
            alert_type = %created.alert_type,
            "Informational alert recorded"
        );

        self.announce(&created);
        Ok(created)
    }

    /// External notification + scoped real-time push, both detached
    fn announce(&self, alert: &Alert) {
        self.notify_detached(alert.clone(), NoticeKind::Created);
        self.push_scoped(alert.router_id, HubMessage::AlertCreated(alert.clone()));
    }

    fn notify_detached(&self, alert: Alert, kind: NoticeKind) {
        let routers = self.routers.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            let router_name = match routers.get_router(alert.router_id).await {
                Ok(Some(router)) => router.name,
                Ok(None) => format!("router #{}", alert.router_id),
                Err(e) => {
                    tracing::warn!(router_id = alert.router_id, error = %e, "Router lookup failed for notification");
                    format!("router #{}", alert.router_id)
                }
            };

            notifier::dispatch(
                notifier,
                AlertNotice {
                    kind,
                    router_name,
                    alert,
                },
            );
        });
    }

    /// Send to the users with access to the router, or everyone when that audience is unknown
    fn push_scoped(&self, router_id: i64, message: HubMessage) {
        let access = self.access.clone();
        let realtime = self.realtime.clone();

        tokio::spawn(async move {
            match access.users_for_router(router_id).await {
                Ok(users) if !users.is_empty() => realtime.send_to_users(&users, message).await,
                Ok(_) => realtime.broadcast(message).await,
                Err(e) => {
                    tracing::warn!(router_id = router_id, error = %e, "Audience lookup failed, broadcasting to all");
                    realtime.broadcast(message).await;
                }
            }
        });
    }

    // ========================================
    // Detection paths
    // ========================================

    /// CPU / memory / disk checks for a freshly refreshed router
    pub async fn check_metrics(&self, router: &Router) -> Result<Vec<CreateOutcome>> {
        let settings = AlertSettings::load(self.settings.as_ref()).await?;
        let mut outcomes = Vec::new();

        if let Some(cpu) = router.metrics.cpu_load {
            outcomes.extend(self.check_cpu_with(router, cpu, &settings).await?);
        }
        if let Some(memory) = router.metrics.memory_percent() {
            outcomes.extend(self.check_memory_with(router, memory, &settings).await?);
        }
        if let Some(disk) = router.metrics.disk_percent() {
            outcomes.extend(self.check_disk_with(router, disk, &settings).await?);
        }

        Ok(outcomes)
    }

    /// High-CPU check; settings are read on every call
    pub async fn check_cpu(&self, router: &Router, cpu_load: f64) -> Result<Option<CreateOutcome>> {
        let settings = AlertSettings::load(self.settings.as_ref()).await?;
        self.check_cpu_with(router, cpu_load, &settings).await
    }

    /// High-memory check; settings are read on every call
    pub async fn check_memory(&self, router: &Router, percent: f64) -> Result<Option<CreateOutcome>> {
        let settings = AlertSettings::load(self.settings.as_ref()).await?;
        self.check_memory_with(router, percent, &settings).await
    }

    async fn check_cpu_with(
        &self,
        router: &Router,
        cpu_load: f64,
        settings: &AlertSettings,
    ) -> Result<Option<CreateOutcome>> {
        if !settings.alerts_enabled || !settings.high_cpu {
            return Ok(None);
        }
        self.threshold_alert(router, AlertType::HighCpu, "CPU load", cpu_load, settings.cpu)
            .await
    }

    async fn check_memory_with(
        &self,
        router: &Router,
        percent: f64,
        settings: &AlertSettings,
    ) -> Result<Option<CreateOutcome>> {
        if !settings.alerts_enabled || !settings.high_memory {
            return Ok(None);
        }
        self.threshold_alert(router, AlertType::HighMemory, "Memory usage", percent, settings.memory)
            .await
    }

    async fn check_disk_with(
        &self,
        router: &Router,
        percent: f64,
        settings: &AlertSettings,
    ) -> Result<Option<CreateOutcome>> {
        if !settings.alerts_enabled || !settings.high_disk {
            return Ok(None);
        }
        self.threshold_alert(router, AlertType::HighDisk, "Disk usage", percent, settings.disk)
            .await
    }

    async fn threshold_alert(
        &self,
        router: &Router,
        alert_type: AlertType,
        metric: &str,
        value: f64,
        pair: ThresholdPair,
    ) -> Result<Option<CreateOutcome>> {
        let Some(severity) = threshold_severity(value, pair) else {
            return Ok(None);
        };

        let alert = NewAlert::new(
            router.id,
            alert_type,
            severity,
            format!("High {} on {}", metric.to_lowercase(), router.name),
            format!(
                "{} is {:.1}% (warning {:.0}%, critical {:.0}%)",
                metric, value, pair.warning, pair.critical
            ),
        );

        self.create_if_warranted(alert).await.map(Some)
    }

    /// Online/offline transitions observed by the poll cycle
    pub async fn router_status_changed(
        &self,
        router: &Router,
        previous: RouterStatus,
    ) -> Result<Option<CreateOutcome>> {
        let settings = AlertSettings::load(self.settings.as_ref()).await?;
        if !settings.alerts_enabled || !settings.status_change {
            return Ok(None);
        }

        match (previous, router.status) {
            (RouterStatus::Online | RouterStatus::Unknown, RouterStatus::Offline) => {
                let alert = NewAlert::new(
                    router.id,
                    AlertType::StatusChange,
                    AlertSeverity::Critical,
                    format!("Router {} is offline", router.name),
                    format!("{} ({}) stopped responding", router.name, router.host),
                );
                self.create_if_warranted(alert).await.map(Some)
            }
            (RouterStatus::Offline, RouterStatus::Online) => {
                let now = Utc::now();
                let cleared = self
                    .repo
                    .resolve_matching(router.id, AlertType::StatusChange, None, now)
                    .await?;
                tracing::info!(router_id = router.id, cleared = cleared, "Router back online");

                let notice = NewAlert::new(
                    router.id,
                    AlertType::StatusChange,
                    AlertSeverity::Info,
                    format!("Router {} is back online", router.name),
                    format!("{} ({}) is responding again", router.name, router.host),
                );
                self.record_notice(notice, now).await.map(|a| Some(CreateOutcome::Created(a)))
            }
            _ => Ok(None),
        }
    }

    /// Uptime went backwards between two polls
    pub async fn reboot_detected(
        &self,
        router: &Router,
        previous_uptime_secs: i64,
        current_uptime_secs: i64,
    ) -> Result<Option<CreateOutcome>> {
        let settings = AlertSettings::load(self.settings.as_ref()).await?;
        if !settings.alerts_enabled {
            return Ok(None);
        }

        let alert = NewAlert::new(
            router.id,
            AlertType::Reboot,
            AlertSeverity::Warning,
            format!("Router {} rebooted", router.name),
            format!(
                "Uptime dropped from {} to {}",
                format_uptime(previous_uptime_secs),
                format_uptime(current_uptime_secs)
            ),
        );
        self.create_if_warranted(alert).await.map(Some)
    }

    /// Netwatch host flipped status
    pub async fn netwatch_changed(
        &self,
        router: &Router,
        observation: &NetwatchObservation,
    ) -> Result<Option<CreateOutcome>> {
        let settings = AlertSettings::load(self.settings.as_ref()).await?;
        if !settings.alerts_enabled || !observation.changed() {
            return Ok(None);
        }

        let host = observation.host.as_str();
        let label = observation.comment.as_deref().unwrap_or(host);

        match (observation.previous_status, observation.status) {
            (NetwatchStatus::Down, NetwatchStatus::Up) => {
                let now = Utc::now();
                let cleared = self
                    .repo
                    .resolve_matching(router.id, AlertType::NetwatchDown, Some(host), now)
                    .await?;
                tracing::info!(router_id = router.id, host = %host, cleared = cleared, "Netwatch host back up");

                let notice = NewAlert::new(
                    router.id,
                    AlertType::NetwatchDown,
                    AlertSeverity::Info,
                    format!("{} is back up", label),
                    format!("Netwatch host {} on {} is reachable again", host, router.name),
                )
                .with_target(host);
                self.record_notice(notice, now).await.map(|a| Some(CreateOutcome::Created(a)))
            }
            (_, NetwatchStatus::Down) => {
                let alert = NewAlert::new(
                    router.id,
                    AlertType::NetwatchDown,
                    AlertSeverity::Warning,
                    format!("{} is down", label),
                    format!("Netwatch host {} on {} is unreachable", host, router.name),
                )
                .with_target(host);
                self.create_if_warranted(alert).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// New PPPoE session appeared
    pub async fn session_connected(
        &self,
        router: &Router,
        session: &ObservedSession,
    ) -> Result<Option<CreateOutcome>> {
        let settings = AlertSettings::load(self.settings.as_ref()).await?;
        if !settings.alerts_enabled {
            return Ok(None);
        }

        let address = session.address.as_deref().unwrap_or("no address");
        let alert = NewAlert::new(
            router.id,
            AlertType::PppoeConnect,
            AlertSeverity::Info,
            format!("PPPoE {} connected", session.name),
            format!("{} connected on {} ({})", session.name, router.name, address),
        )
        .with_target(&session.name);
        self.create_if_warranted(alert).await.map(Some)
    }

    /// Tracked PPPoE session vanished
    pub async fn session_disconnected(
        &self,
        router: &Router,
        session_name: &str,
        connected_for: Duration,
    ) -> Result<Option<CreateOutcome>> {
        let settings = AlertSettings::load(self.settings.as_ref()).await?;
        if !settings.alerts_enabled {
            return Ok(None);
        }

        let alert = NewAlert::new(
            router.id,
            AlertType::PppoeDisconnect,
            AlertSeverity::Warning,
            format!("PPPoE {} disconnected", session_name),
            format!(
                "{} disconnected from {} after {}",
                session_name,
                router.name,
                format_elapsed(connected_for)
            ),
        )
        .with_target(session_name);
        self.create_if_warranted(alert).await.map(Some)
    }

    // ========================================
    // Operator actions
    // ========================================

    /// Acknowledge; false when already acknowledged or outside the actor's routers
    pub async fn acknowledge(&self, id: i64, actor: &Actor) -> Result<bool> {
        let changed = self
            .repo
            .acknowledge(id, &actor.user_id, Utc::now(), &actor.scope())
            .await?;

        if changed {
            tracing::info!(alert_id = id, user_id = %actor.user_id, "Alert acknowledged");
        }
        Ok(changed)
    }

    /// Resolve; false when already resolved or outside the actor's routers
    pub async fn resolve(&self, id: i64, actor: &Actor) -> Result<bool> {
        let now = Utc::now();
        let changed = self.repo.resolve(id, now, &actor.scope()).await?;

        if changed {
            tracing::info!(alert_id = id, user_id = %actor.user_id, "Alert resolved");
            // the row is already resolved; a failed reload only costs the realtime push
            match self.repo.get(id).await {
                Ok(Some(alert)) => self.push_resolved(&alert, &actor.user_id, now),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(alert_id = id, error = %e, "Failed to reload resolved alert");
                }
            }
        }
        Ok(changed)
    }

    /// List alerts visible to the actor
    pub async fn list(&self, query: &AlertQuery, actor: &Actor) -> Result<Vec<Alert>> {
        self.repo.list(query, &actor.scope()).await
    }

    // ========================================
    // Escalation support
    // ========================================

    /// Unresolved alerts of the escalatable types
    pub async fn unresolved_escalatable(&self) -> Result<Vec<Alert>> {
        self.repo.list_unresolved_of_types(&AlertType::ESCALATABLE).await
    }

    /// Resolve an alert whose condition has cleared
    pub async fn auto_resolve(&self, alert: &Alert, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.repo.resolve(alert.id, now, &AlertScope::All).await?;
        if changed {
            tracing::info!(alert_id = alert.id, router_id = alert.router_id, "Alert auto-resolved");
            self.push_resolved(alert, "auto", now);
        }
        Ok(changed)
    }

    /// Move the alert one level up and notify; false when another scan got there first
    pub async fn escalate(&self, alert: &Alert, now: DateTime<Utc>) -> Result<bool> {
        let changed = self
            .repo
            .record_escalation(alert.id, alert.escalation_level, now)
            .await?;
        if !changed {
            return Ok(false);
        }

        let level = alert.escalation_level + 1;
        let elapsed = format_elapsed(now - alert.created_at);
        tracing::warn!(
            alert_id = alert.id,
            router_id = alert.router_id,
            level = level,
            elapsed = %elapsed,
            "Alert escalated"
        );

        let mut escalated = alert.clone();
        escalated.escalation_level = level;
        escalated.last_escalated_at = Some(now);

        self.push_scoped(
            alert.router_id,
            HubMessage::AlertEscalated(AlertEscalatedMessage {
                alert_id: alert.id,
                router_id: alert.router_id,
                escalation_level: level,
                elapsed: elapsed.clone(),
                title: alert.title.clone(),
            }),
        );
        self.notify_detached(escalated, NoticeKind::Escalated { level, elapsed });

        Ok(true)
    }

    fn push_resolved(&self, alert: &Alert, resolved_by: &str, at: DateTime<Utc>) {
        self.push_scoped(
            alert.router_id,
            HubMessage::AlertResolved(AlertResolvedMessage {
                alert_id: alert.id,
                router_id: alert.router_id,
                resolved_by: resolved_by.to_string(),
                resolved_at: at.to_rfc3339(),
            }),
        );
    }
}
