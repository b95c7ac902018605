//! PollingScheduler - Batched Router Polling
//!
//! ## Responsibilities
//!
//! - Repeating timer with adaptive cadence (IntervalController)
//! - At most one poll cycle at a time, with a stuck-cycle watchdog (CycleGuard)
//! - Batched refresh: batches run one after another, routers inside a batch
//!   run concurrently, every refresh under a per-device deadline
//! - Hand successful refreshes to the alert checks and the session tracker
//!
//! ## Failure handling
//!
//! A per-device failure or timeout is counted and the cycle moves on. Such a
//! router is marked unreachable and never reaches the session tracker, so a
//! failed poll cannot be mistaken for "every session disconnected".

mod cycle_guard;
mod interval_controller;
mod types;

pub use cycle_guard::{CycleGuard, CycleToken, WATCHDOG_TIMEOUT_MS};
pub use interval_controller::{
    tier_for, IntervalController, PlanSource, PollingPlan, PollingTier, FALLBACK_INTERVAL,
    POLLING_TIERS,
};
pub use types::*;

use crate::alert_engine::AlertEngine;
use crate::realtime_hub::{HubMessage, RealtimeHub, RouterStatusMessage};
use crate::router_registry::{
    RefreshOptions, RefreshReport, Router, RouterClient, RouterRepository, RouterStatus,
};
use crate::session_tracker::SessionTracker;
use crate::timeout_guard::with_timeout;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Per-device refresh ceiling
pub const DEVICE_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay before the first cycle after start
pub const STARTUP_DELAY: Duration = Duration::from_secs(10);

/// PollingScheduler instance
pub struct PollingScheduler {
    routers: Arc<dyn RouterRepository>,
    client: Arc<dyn RouterClient>,
    controller: IntervalController,
    alert_engine: Arc<AlertEngine>,
    sessions: Arc<SessionTracker>,
    realtime: Arc<RealtimeHub>,
    guard: CycleGuard,
    device_timeout: Duration,
    startup_delay: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    last_plan: RwLock<Option<PollingPlan>>,
    last_cycle: RwLock<Option<CycleSummary>>,
}

impl PollingScheduler {
    /// Create new PollingScheduler
    pub fn new(
        routers: Arc<dyn RouterRepository>,
        client: Arc<dyn RouterClient>,
        controller: IntervalController,
        alert_engine: Arc<AlertEngine>,
        sessions: Arc<SessionTracker>,
        realtime: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            routers,
            client,
            controller,
            alert_engine,
            sessions,
            realtime,
            guard: CycleGuard::new(),
            device_timeout: DEVICE_TIMEOUT,
            startup_delay: STARTUP_DELAY,
            task: Mutex::new(None),
            last_plan: RwLock::new(None),
            last_cycle: RwLock::new(None),
        }
    }

    pub fn with_device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout = timeout;
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    // ========================================
    // Control
    // ========================================

    /// Start the timer loop. No-op when already running.
    pub async fn start(self: Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::warn!("Polling scheduler already running");
            return;
        }

        tracing::info!(
            startup_delay_secs = self.startup_delay.as_secs(),
            device_timeout_secs = self.device_timeout.as_secs(),
            "Starting polling scheduler"
        );

        let scheduler = self.clone();
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(scheduler.startup_delay).await;

            loop {
                let plan = scheduler.controller.plan().await;
                tracing::debug!(
                    interval_ms = plan.interval_ms,
                    batch_size = plan.batch_size,
                    "Polling plan computed"
                );
                *scheduler.last_plan.write().await = Some(plan.clone());

                // detached so a slow cycle never delays the timer; the guard rejects overlaps
                let cycle = scheduler.clone();
                let batch_size = plan.batch_size;
                tokio::spawn(async move {
                    cycle.run_cycle(CycleTrigger::Timer, batch_size).await;
                });

                tokio::time::sleep(plan.interval()).await;
            }
        }));
    }

    /// Stop the timer loop. A cycle already in flight runs to completion.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            tracing::info!("Polling scheduler stopped");
        }
    }

    pub async fn restart(self: Arc<Self>) {
        self.stop().await;
        self.start().await;
    }

    /// Run a full-sync cycle right away, still subject to the re-entrancy guard
    pub async fn poll_now(&self) -> CycleOutcome {
        let plan = self.controller.plan().await;
        *self.last_plan.write().await = Some(plan.clone());
        self.run_cycle(CycleTrigger::Manual, plan.batch_size).await
    }

    pub async fn status(&self) -> SchedulerStatus {
        let running = self
            .task
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished());

        SchedulerStatus {
            running,
            cycle_in_progress: self.guard.in_progress(),
            cycle_started_at: self.guard.started_at(),
            plan: self.last_plan.read().await.clone(),
            last_cycle: self.last_cycle.read().await.clone(),
        }
    }

    // ========================================
    // Cycle
    // ========================================

    async fn run_cycle(&self, trigger: CycleTrigger, batch_size: usize) -> CycleOutcome {
        let Some(_token) = self.guard.try_begin() else {
            tracing::debug!(trigger = ?trigger, "Poll cycle still in progress, skipping trigger");
            return CycleOutcome::Skipped;
        };

        let started = Instant::now();
        let batch_size = batch_size.max(1);
        let mut summary = CycleSummary::new(trigger, Utc::now(), batch_size);

        let routers = match self.routers.list_routers().await {
            Ok(routers) => routers,
            Err(e) => {
                tracing::error!(error = %e, "Poll cycle aborted: failed to list routers");
                return CycleOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let (active, maintenance): (Vec<Router>, Vec<Router>) = routers
            .into_iter()
            .partition(|r| r.status != RouterStatus::Maintenance);

        summary.routers = active.len();
        summary.skipped_maintenance = maintenance.len();

        let options = RefreshOptions {
            include_dependents: true,
            full_sync: trigger == CycleTrigger::Manual,
        };

        for (index, batch) in active.chunks(batch_size).enumerate() {
            tracing::debug!(batch = index + 1, size = batch.len(), "Polling batch");
            let outcomes = join_all(batch.iter().map(|r| self.poll_router(r, options))).await;
            for outcome in outcomes {
                summary.record(outcome);
            }
            summary.batches += 1;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            trigger = ?trigger,
            routers = summary.routers,
            batches = summary.batches,
            success = summary.success,
            failed = summary.failed,
            timed_out = summary.timed_out,
            duration_ms = summary.duration_ms,
            "Poll cycle complete"
        );

        *self.last_cycle.write().await = Some(summary.clone());
        self.realtime
            .broadcast(HubMessage::CycleStats(summary.clone()))
            .await;

        CycleOutcome::Completed(summary)
    }

    async fn poll_router(&self, router: &Router, options: RefreshOptions) -> DeviceOutcome {
        let refresh = self.client.refresh_router(router.id, options);
        let message = format!("Refresh of router {} timed out", router.name);

        match with_timeout(refresh, self.device_timeout, message).await {
            Ok(report) => {
                self.after_refresh(router, report).await;
                DeviceOutcome::Success
            }
            Err(e) => {
                let outcome = if e.is_timeout() {
                    DeviceOutcome::TimedOut
                } else {
                    DeviceOutcome::Failed
                };
                tracing::warn!(
                    router_id = router.id,
                    router = %router.name,
                    outcome = ?outcome,
                    error = %e,
                    "Router refresh failed"
                );
                self.handle_unreachable(router).await;
                outcome
            }
        }
    }

    /// Failure path: mark offline and alert, never touch sessions
    async fn handle_unreachable(&self, router: &Router) {
        if let Err(e) = self.routers.mark_unreachable(router.id, Utc::now()).await {
            tracing::error!(router_id = router.id, error = %e, "Failed to mark router unreachable");
        }

        if matches!(router.status, RouterStatus::Online | RouterStatus::Unknown) {
            let offline = Router {
                status: RouterStatus::Offline,
                ..router.clone()
            };
            self.status_transition(&offline, router.status).await;
        }
    }

    async fn after_refresh(&self, previous: &Router, report: RefreshReport) {
        let current = &report.router;

        if current.status != previous.status {
            self.status_transition(current, previous.status).await;
        }

        if let (Some(before), Some(now)) = (previous.metrics.uptime_secs, current.metrics.uptime_secs) {
            if now < before {
                if let Err(e) = self.alert_engine.reboot_detected(current, before, now).await {
                    tracing::warn!(router_id = current.id, error = %e, "Reboot alert failed");
                }
            }
        }

        if let Err(e) = self.alert_engine.check_metrics(current).await {
            tracing::warn!(router_id = current.id, error = %e, "Threshold checks failed");
        }

        for observation in report.netwatch.iter().filter(|o| o.changed()) {
            if let Err(e) = self.alert_engine.netwatch_changed(current, observation).await {
                tracing::warn!(
                    router_id = current.id,
                    host = %observation.host,
                    error = %e,
                    "Netwatch alert failed"
                );
            }
        }

        if let Some(sessions) = &report.sessions {
            if let Err(e) = self.sessions.track(current, sessions).await {
                tracing::warn!(router_id = current.id, error = %e, "Session tracking failed");
            }
        }
    }

    async fn status_transition(&self, router: &Router, previous: RouterStatus) {
        tracing::info!(
            router_id = router.id,
            router = %router.name,
            previous = %previous,
            current = %router.status,
            "Router status changed"
        );

        if let Err(e) = self.alert_engine.router_status_changed(router, previous).await {
            tracing::warn!(router_id = router.id, error = %e, "Status change alert failed");
        }

        self.realtime
            .broadcast(HubMessage::RouterStatus(RouterStatusMessage {
                router_id: router.id,
                name: router.name.clone(),
                previous,
                current: router.status,
                timestamp: Utc::now().to_rfc3339(),
            }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_engine::AlertType;
    use crate::router_registry::ObservedSession;
    use crate::test_support::{router, router_with_status, Behavior, Fixture, ScriptedRouterClient};

    fn scheduler(fx: &Fixture, client: &Arc<ScriptedRouterClient>) -> PollingScheduler {
        let controller = IntervalController::new(fx.netwatch.clone(), fx.settings.clone());
        let tracker = Arc::new(SessionTracker::new(fx.sessions.clone(), fx.engine.clone()));
        PollingScheduler::new(
            fx.routers.clone(),
            client.clone(),
            controller,
            fx.engine.clone(),
            tracker,
            fx.realtime.clone(),
        )
        .with_device_timeout(Duration::from_millis(100))
        .with_startup_delay(Duration::ZERO)
    }

    fn session(name: &str) -> ObservedSession {
        ObservedSession {
            name: name.to_string(),
            address: None,
            uptime_secs: None,
        }
    }

    #[tokio::test]
    async fn test_batches_run_sequentially_with_bounded_concurrency() {
        let fx = Fixture::new();
        for id in 1..=7 {
            fx.routers.put(router(id));
        }
        let client = Arc::new(ScriptedRouterClient::new());
        for id in 1..=7 {
            client.script(id, Behavior::Delay(Duration::from_millis(10 * (id as u64 % 3 + 1))));
        }
        let s = scheduler(&fx, &client);

        let CycleOutcome::Completed(summary) = s.run_cycle(CycleTrigger::Timer, 3).await else {
            panic!("cycle did not complete");
        };

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.success, 7);
        assert!(client.max_in_flight() <= 3);

        // every refresh of batch k settles before any refresh of batch k+1 starts
        let events = client.events();
        let batch_of = |id: i64| (id - 1) / 3;
        for (i, (is_start, id)) in events.iter().enumerate() {
            if !*is_start {
                continue;
            }
            for (later_is_start, other) in &events[i..] {
                if !*later_is_start && batch_of(*other) < batch_of(*id) {
                    panic!("router {} started before router {} settled", id, other);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_timeouts_and_failures_counted_separately() {
        let fx = Fixture::new();
        for id in 1..=4 {
            fx.routers.put(router(id));
        }
        let client = Arc::new(ScriptedRouterClient::new());
        client.script(2, Behavior::Fail);
        client.script(3, Behavior::Hang);
        let s = scheduler(&fx, &client);

        let CycleOutcome::Completed(summary) = s.run_cycle(CycleTrigger::Timer, 10).await else {
            panic!("cycle did not complete");
        };

        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(fx.routers.unreachable_marks(), vec![2, 3]);
        assert!(!s.guard.in_progress());
    }

    #[tokio::test]
    async fn test_failed_refresh_bypasses_session_tracking() {
        let fx = Fixture::new();
        fx.routers.put(router(1));
        let client = Arc::new(ScriptedRouterClient::new());
        client.script(
            1,
            Behavior::Report {
                sessions: Some(vec![session("A"), session("B")]),
            },
        );
        let s = scheduler(&fx, &client);
        s.run_cycle(CycleTrigger::Timer, 10).await;
        assert!(fx.sessions.find(1, "A").is_some());

        client.script(1, Behavior::Fail);
        s.run_cycle(CycleTrigger::Timer, 10).await;

        assert!(fx.sessions.find(1, "A").is_some());
        assert!(fx.sessions.find(1, "B").is_some());
        let alerts = fx.alerts.all();
        assert!(alerts.iter().all(|a| a.alert_type != AlertType::PppoeDisconnect));
        assert!(alerts.iter().any(|a| a.alert_type == AlertType::StatusChange));
    }

    #[tokio::test]
    async fn test_missing_session_list_is_not_treated_as_empty() {
        let fx = Fixture::new();
        fx.routers.put(router(1));
        let client = Arc::new(ScriptedRouterClient::new());
        client.script(
            1,
            Behavior::Report {
                sessions: Some(vec![session("A")]),
            },
        );
        let s = scheduler(&fx, &client);
        s.run_cycle(CycleTrigger::Timer, 10).await;

        client.script(1, Behavior::Report { sessions: None });
        s.run_cycle(CycleTrigger::Timer, 10).await;

        assert!(fx.sessions.find(1, "A").is_some());
    }

    #[tokio::test]
    async fn test_maintenance_routers_are_skipped() {
        let fx = Fixture::new();
        fx.routers.put(router(1));
        fx.routers.put(router_with_status(2, RouterStatus::Maintenance));
        let client = Arc::new(ScriptedRouterClient::new());
        let s = scheduler(&fx, &client);

        let CycleOutcome::Completed(summary) = s.run_cycle(CycleTrigger::Timer, 10).await else {
            panic!("cycle did not complete");
        };

        assert_eq!(summary.routers, 1);
        assert_eq!(summary.skipped_maintenance, 1);
        assert_eq!(client.calls(), vec![(1, false)]);
    }

    #[tokio::test]
    async fn test_poll_now_full_syncs_and_respects_guard() {
        let fx = Fixture::new();
        fx.routers.put(router(1));
        let client = Arc::new(ScriptedRouterClient::new());
        let s = scheduler(&fx, &client);

        {
            let _running = s.guard.try_begin().unwrap();
            assert_eq!(s.poll_now().await, CycleOutcome::Skipped);
        }

        assert!(matches!(s.poll_now().await, CycleOutcome::Completed(_)));
        assert_eq!(client.calls(), vec![(1, true)]);
    }

    #[tokio::test]
    async fn test_list_failure_aborts_cycle_and_releases_guard() {
        let fx = Fixture::new();
        fx.routers.fail_listing();
        let client = Arc::new(ScriptedRouterClient::new());
        let s = scheduler(&fx, &client);

        assert!(matches!(
            s.run_cycle(CycleTrigger::Timer, 10).await,
            CycleOutcome::Failed { .. }
        ));
        assert!(!s.guard.in_progress());
    }

    #[tokio::test]
    async fn test_reboot_detected_from_uptime() {
        let fx = Fixture::new();
        let mut before = router(1);
        before.metrics.uptime_secs = Some(86_400);
        fx.routers.put(before);
        let client = Arc::new(ScriptedRouterClient::new());
        client.script(1, Behavior::Uptime(120));
        let s = scheduler(&fx, &client);

        s.run_cycle(CycleTrigger::Timer, 10).await;

        assert!(fx.alerts.all().iter().any(|a| a.alert_type == AlertType::Reboot));
    }

    #[tokio::test]
    async fn test_start_stop_restart() {
        let fx = Fixture::new();
        fx.routers.put(router(1));
        let client = Arc::new(ScriptedRouterClient::new());
        let s = Arc::new(scheduler(&fx, &client));

        s.clone().start().await;
        assert!(s.status().await.running);
        client.wait_for_calls(1).await;

        s.clone().restart().await;
        assert!(s.status().await.running);

        s.stop().await;
        assert!(!s.status().await.running);
        assert!(s.status().await.plan.is_some());
    }
}
