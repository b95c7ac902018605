//! EscalationEngine - Time-Driven Alert Escalation
//!
//! ## Responsibilities
//!
//! - Periodic scan of unresolved status-change / netwatch-down alerts
//! - Auto-resolve alerts whose condition has cleared
//! - Walk remaining alerts up the fixed tier ladder, notifying at each tier
//!
//! ## Ladder
//!
//! | level after bump | elapsed since creation |
//! |---|---|
//! | 1 | 1 hour |
//! | 2 | 3 hours |
//! | 3 | 12 hours |
//! | 4 | 1 day |
//! | 5 | 3 days |
//!
//! A bump also needs 5 minutes since the previous one. The repository bump
//! is a compare-and-set on the old level and scans never overlap, so a late
//! timer tick cannot escalate twice.

use crate::alert_engine::{Alert, AlertEngine, AlertType};
use crate::error::Result;
use crate::router_registry::{NetwatchRepository, NetwatchStatus, RouterRepository, RouterStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Tier thresholds in hours, ascending
pub const ESCALATION_TIER_HOURS: [i64; 5] = [1, 3, 12, 24, 72];

/// Minimum gap between two bumps of the same alert
pub const ESCALATION_COOLDOWN_MINUTES: i64 = 5;

/// Default scan period
pub const SCAN_INTERVAL_SECS: u64 = 300;

/// Highest reachable level
pub fn max_level() -> i32 {
    ESCALATION_TIER_HOURS.len() as i32
}

/// Level the alert should move to now, if any
pub fn next_level(alert: &Alert, now: DateTime<Utc>) -> Option<i32> {
    if alert.resolved || alert.escalation_level < 0 || alert.escalation_level >= max_level() {
        return None;
    }

    let threshold = Duration::hours(ESCALATION_TIER_HOURS[alert.escalation_level as usize]);
    if now - alert.created_at < threshold {
        return None;
    }

    if let Some(last) = alert.last_escalated_at {
        if now - last < Duration::minutes(ESCALATION_COOLDOWN_MINUTES) {
            return None;
        }
    }

    Some(alert.escalation_level + 1)
}

/// Human-readable elapsed time: "45m", "3h 5m", "2d 4h"
pub fn format_elapsed(elapsed: Duration) -> String {
    let minutes = elapsed.num_minutes().max(0);
    let days = minutes / (24 * 60);
    let hours = (minutes / 60) % 24;
    let mins = minutes % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

/// Counts from one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationReport {
    pub scanned: usize,
    pub resolved: usize,
    pub escalated: usize,
    pub failed: usize,
    /// True when another scan was already running and this one did nothing
    #[serde(default)]
    pub skipped: bool,
}

/// Holds the scan flag; clears it on drop so a cancelled scan cannot wedge the engine
struct ScanToken<'a>(&'a AtomicBool);

impl Drop for ScanToken<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum ItemOutcome {
    Resolved,
    Escalated,
    Unchanged,
}

/// EscalationEngine instance
pub struct EscalationEngine {
    alert_engine: Arc<AlertEngine>,
    routers: Arc<dyn RouterRepository>,
    netwatch: Arc<dyn NetwatchRepository>,
    scan_interval: std::time::Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    scanning: AtomicBool,
}

impl EscalationEngine {
    /// Create new EscalationEngine
    pub fn new(
        alert_engine: Arc<AlertEngine>,
        routers: Arc<dyn RouterRepository>,
        netwatch: Arc<dyn NetwatchRepository>,
    ) -> Self {
        Self {
            alert_engine,
            routers,
            netwatch,
            scan_interval: std::time::Duration::from_secs(SCAN_INTERVAL_SECS),
            task: Mutex::new(None),
            scanning: AtomicBool::new(false),
        }
    }

    /// Set scan period (for tests)
    pub fn with_scan_interval(mut self, interval: std::time::Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Start the background scan loop
    pub async fn start(self: Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::warn!("Escalation engine already running");
            return;
        }

        tracing::info!(
            interval_secs = self.scan_interval.as_secs(),
            "Escalation engine started"
        );

        let engine = self.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.scan_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick fires immediately; the first scan waits one period
            ticker.tick().await;

            loop {
                ticker.tick().await;
                engine.check_now().await;
            }
        }));
    }

    /// Stop the background scan loop
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            tracing::info!("Escalation engine stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run one scan immediately
    pub async fn check_now(&self) -> EscalationReport {
        self.scan_at(Utc::now()).await
    }

    pub(crate) async fn scan_at(&self, now: DateTime<Utc>) -> EscalationReport {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Escalation scan already in progress, skipping");
            return EscalationReport {
                skipped: true,
                ..Default::default()
            };
        }

        let _token = ScanToken(&self.scanning);
        self.scan_inner(now).await
    }

    async fn scan_inner(&self, now: DateTime<Utc>) -> EscalationReport {
        let mut report = EscalationReport::default();

        let alerts = match self.alert_engine.unresolved_escalatable().await {
            Ok(alerts) => alerts,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load unresolved alerts for escalation");
                report.failed = 1;
                return report;
            }
        };

        report.scanned = alerts.len();

        for alert in &alerts {
            match self.process(alert, now).await {
                Ok(ItemOutcome::Resolved) => report.resolved += 1,
                Ok(ItemOutcome::Escalated) => report.escalated += 1,
                Ok(ItemOutcome::Unchanged) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        alert_id = alert.id,
                        router_id = alert.router_id,
                        error = %e,
                        "Escalation check failed for alert"
                    );
                }
            }
        }

        if report.resolved > 0 || report.escalated > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                resolved = report.resolved,
                escalated = report.escalated,
                failed = report.failed,
                "Escalation scan complete"
            );
        } else {
            tracing::debug!(scanned = report.scanned, "Escalation scan complete");
        }

        report
    }

    async fn process(&self, alert: &Alert, now: DateTime<Utc>) -> Result<ItemOutcome> {
        if self.condition_cleared(alert).await? {
            return Ok(if self.alert_engine.auto_resolve(alert, now).await? {
                ItemOutcome::Resolved
            } else {
                ItemOutcome::Unchanged
            });
        }

        if next_level(alert, now).is_none() {
            return Ok(ItemOutcome::Unchanged);
        }

        Ok(if self.alert_engine.escalate(alert, now).await? {
            ItemOutcome::Escalated
        } else {
            ItemOutcome::Unchanged
        })
    }

    /// Whether current device state contradicts the alert
    async fn condition_cleared(&self, alert: &Alert) -> Result<bool> {
        match alert.alert_type {
            AlertType::StatusChange => {
                let router = self.routers.get_router(alert.router_id).await?;
                Ok(router.is_some_and(|r| r.status == RouterStatus::Online))
            }
            AlertType::NetwatchDown => {
                let Some(host) = alert.target.as_deref() else {
                    return Ok(false);
                };
                let target = self.netwatch.get_target(alert.router_id, host).await?;
                Ok(target.is_some_and(|t| t.status == NetwatchStatus::Up))
            }
            _ => Ok(false),
        }
    }
}
