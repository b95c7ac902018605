//! In-memory collaborators for unit tests

use crate::alert_engine::{
    AccessDirectory, Alert, AlertEngine, AlertQuery, AlertRepository, AlertScope, AlertSeverity,
    AlertType, NewAlert,
};
use crate::config_store::SettingsSource;
use crate::error::{Error, Result};
use crate::notifier::{AlertNotice, Notifier};
use crate::realtime_hub::RealtimeHub;
use crate::router_registry::{
    NetwatchRepository, NetwatchTarget, ObservedSession, RefreshOptions, RefreshReport, Router,
    RouterClient, RouterMetrics, RouterRepository, RouterStatus,
};
use crate::session_tracker::{SessionRepository, TrackedSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn wait_until(mut done: impl FnMut() -> bool) {
    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

// ========================================
// Builders
// ========================================

pub fn router(id: i64) -> Router {
    router_with_status(id, RouterStatus::Online)
}

pub fn router_with_status(id: i64, status: RouterStatus) -> Router {
    Router {
        id,
        name: format!("router-{}", id),
        host: format!("10.0.0.{}", id),
        status,
        last_seen: None,
        metrics: RouterMetrics::default(),
    }
}

pub fn sample_alert(id: i64, router_id: i64) -> Alert {
    Alert {
        id,
        router_id,
        alert_type: AlertType::StatusChange,
        severity: AlertSeverity::Critical,
        title: format!("Router {} is offline", router_id),
        message: "stopped responding".to_string(),
        target: None,
        acknowledged: false,
        acknowledged_by: None,
        acknowledged_at: None,
        resolved: false,
        resolved_at: None,
        escalation_level: 0,
        last_escalated_at: None,
        created_at: Utc::now(),
    }
}

// ========================================
// Settings
// ========================================

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: serde_json::Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }
}

#[async_trait]
impl SettingsSource for MemorySettings {
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }
}

// ========================================
// Access
// ========================================

#[derive(Default)]
pub struct MemoryAccessDirectory {
    assignments: Mutex<Vec<(String, i64)>>,
}

impl MemoryAccessDirectory {
    pub fn assign(&self, user_id: &str, router_id: i64) {
        self.assignments
            .lock()
            .unwrap()
            .push((user_id.to_string(), router_id));
    }

    fn is_assigned(&self, user_id: &str, router_id: i64) -> bool {
        self.assignments
            .lock()
            .unwrap()
            .iter()
            .any(|(u, r)| u == user_id && *r == router_id)
    }
}

#[async_trait]
impl AccessDirectory for MemoryAccessDirectory {
    async fn users_for_router(&self, router_id: i64) -> Result<Vec<String>> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| *r == router_id)
            .map(|(u, _)| u.clone())
            .collect())
    }
}

// ========================================
// Alerts
// ========================================

pub struct MemoryAlertRepository {
    alerts: Mutex<Vec<Alert>>,
    next_id: AtomicI64,
    access: Arc<MemoryAccessDirectory>,
    fail_get: AtomicBool,
}

impl MemoryAlertRepository {
    pub fn new(access: Arc<MemoryAccessDirectory>) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            access,
            fail_get: AtomicBool::new(false),
        }
    }

    /// Make single-alert lookups fail; writes keep working
    pub fn fail_gets(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn get_sync(&self, id: i64) -> Option<Alert> {
        self.alerts.lock().unwrap().iter().find(|a| a.id == id).cloned()
    }

    /// Insert an unresolved alert with an explicit creation time
    pub fn seed(
        &self,
        router_id: i64,
        alert_type: AlertType,
        severity: AlertSeverity,
        target: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let mut alert = NewAlert::new(router_id, alert_type, severity, "seeded", "seeded");
        alert.target = target.map(str::to_string);
        self.insert_sync(&alert, created_at).id
    }

    pub fn set_escalation(&self, id: i64, level: i32, last: Option<DateTime<Utc>>) {
        if let Some(a) = self.alerts.lock().unwrap().iter_mut().find(|a| a.id == id) {
            a.escalation_level = level;
            a.last_escalated_at = last;
        }
    }

    fn insert_sync(&self, new: &NewAlert, created_at: DateTime<Utc>) -> Alert {
        let alert = Alert {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            router_id: new.router_id,
            alert_type: new.alert_type,
            severity: new.severity,
            title: new.title.clone(),
            message: new.message.clone(),
            target: new.target.clone(),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved: new.resolved,
            resolved_at: new.resolved.then_some(created_at),
            escalation_level: 0,
            last_escalated_at: None,
            created_at,
        };
        self.alerts.lock().unwrap().push(alert.clone());
        alert
    }

    fn in_scope(&self, scope: &AlertScope, router_id: i64) -> bool {
        match scope {
            AlertScope::All => true,
            AlertScope::AssignedTo(user) => self.access.is_assigned(user, router_id),
        }
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn insert(&self, alert: &NewAlert, created_at: DateTime<Utc>) -> Result<Alert> {
        Ok(self.insert_sync(alert, created_at))
    }

    async fn get(&self, id: i64) -> Result<Option<Alert>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Error::Internal(format!("lookup of alert {} failed", id)));
        }
        Ok(self.get_sync(id))
    }

    async fn find_latest_unresolved(
        &self,
        router_id: i64,
        alert_type: AlertType,
        target: Option<&str>,
    ) -> Result<Option<Alert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                a.router_id == router_id
                    && a.alert_type == alert_type
                    && a.target.as_deref() == target
                    && !a.resolved
            })
            .max_by_key(|a| (a.created_at, a.id))
            .cloned())
    }

    async fn list(&self, query: &AlertQuery, scope: &AlertScope) -> Result<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| !query.unresolved_only || !a.resolved)
            .filter(|a| query.router_id.map_or(true, |r| a.router_id == r))
            .filter(|a| query.severity.map_or(true, |s| a.severity == s))
            .filter(|a| self.in_scope(scope, a.router_id))
            .cloned()
            .collect();
        alerts.sort_by_key(|a| std::cmp::Reverse((a.created_at, a.id)));
        alerts.truncate(query.limit.unwrap_or(100) as usize);
        Ok(alerts)
    }

    async fn list_unresolved_of_types(&self, types: &[AlertType]) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| !a.resolved && types.contains(&a.alert_type))
            .cloned()
            .collect())
    }

    async fn acknowledge(
        &self,
        id: i64,
        by: &str,
        at: DateTime<Utc>,
        scope: &AlertScope,
    ) -> Result<bool> {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.iter_mut().find(|a| a.id == id && !a.acknowledged) {
            Some(a) if self.in_scope(scope, a.router_id) => {
                a.acknowledged = true;
                a.acknowledged_by = Some(by.to_string());
                a.acknowledged_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn resolve(&self, id: i64, at: DateTime<Utc>, scope: &AlertScope) -> Result<bool> {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.iter_mut().find(|a| a.id == id && !a.resolved) {
            Some(a) if self.in_scope(scope, a.router_id) => {
                a.resolved = true;
                a.resolved_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn resolve_matching(
        &self,
        router_id: i64,
        alert_type: AlertType,
        target: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut count = 0;
        for a in self.alerts.lock().unwrap().iter_mut() {
            if a.router_id == router_id
                && a.alert_type == alert_type
                && a.target.as_deref() == target
                && !a.resolved
            {
                a.resolved = true;
                a.resolved_at = Some(at);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn record_escalation(&self, id: i64, from_level: i32, at: DateTime<Utc>) -> Result<bool> {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts
            .iter_mut()
            .find(|a| a.id == id && a.escalation_level == from_level && !a.resolved)
        {
            Some(a) => {
                a.escalation_level = from_level + 1;
                a.last_escalated_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ========================================
// Routers / netwatch
// ========================================

#[derive(Default)]
pub struct MemoryRouterRepository {
    routers: Mutex<BTreeMap<i64, Router>>,
    failing_lookups: Mutex<HashSet<i64>>,
    fail_list: AtomicBool,
    lookup_delay: Mutex<Option<Duration>>,
    marks: Mutex<Vec<i64>>,
}

impl MemoryRouterRepository {
    pub fn put(&self, router: Router) {
        self.routers.lock().unwrap().insert(router.id, router);
    }

    pub fn fail_lookup_for(&self, id: i64) {
        self.failing_lookups.lock().unwrap().insert(id);
    }

    /// Every `get_router` sleeps this long first; `None` clears it
    pub fn delay_lookups(&self, delay: Option<Duration>) {
        *self.lookup_delay.lock().unwrap() = delay;
    }

    pub fn fail_listing(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn unreachable_marks(&self) -> Vec<i64> {
        self.marks.lock().unwrap().clone()
    }
}

#[async_trait]
impl RouterRepository for MemoryRouterRepository {
    async fn list_routers(&self) -> Result<Vec<Router>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::Internal("router listing unavailable".to_string()));
        }
        Ok(self.routers.lock().unwrap().values().cloned().collect())
    }

    async fn get_router(&self, id: i64) -> Result<Option<Router>> {
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_lookups.lock().unwrap().contains(&id) {
            return Err(Error::Internal(format!("lookup of router {} failed", id)));
        }
        Ok(self.routers.lock().unwrap().get(&id).cloned())
    }

    async fn mark_unreachable(&self, id: i64, _at: DateTime<Utc>) -> Result<()> {
        self.marks.lock().unwrap().push(id);
        if let Some(r) = self.routers.lock().unwrap().get_mut(&id) {
            if r.status != RouterStatus::Maintenance {
                r.status = RouterStatus::Offline;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryNetwatchRepository {
    count: AtomicU64,
    fail_count: AtomicBool,
    targets: Mutex<Vec<NetwatchTarget>>,
}

impl MemoryNetwatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_count(&self, count: u64) {
        self.count.store(count, Ordering::SeqCst);
        self.fail_count.store(false, Ordering::SeqCst);
    }

    pub fn fail_count(&self) {
        self.fail_count.store(true, Ordering::SeqCst);
    }

    pub fn put(&self, target: NetwatchTarget) {
        self.targets.lock().unwrap().push(target);
    }
}

#[async_trait]
impl NetwatchRepository for MemoryNetwatchRepository {
    async fn count_targets(&self) -> Result<u64> {
        if self.fail_count.load(Ordering::SeqCst) {
            return Err(Error::Internal("count unavailable".to_string()));
        }
        Ok(self.count.load(Ordering::SeqCst))
    }

    async fn get_target(&self, router_id: i64, host: &str) -> Result<Option<NetwatchTarget>> {
        Ok(self
            .targets
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.router_id == router_id && t.host == host)
            .cloned())
    }
}

// ========================================
// Sessions
// ========================================

pub struct MemorySessionRepository {
    sessions: Mutex<Vec<TrackedSession>>,
    next_id: AtomicI64,
}

impl Default for MemorySessionRepository {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemorySessionRepository {
    pub fn find(&self, router_id: i64, name: &str) -> Option<TrackedSession> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.router_id == router_id && s.name == name)
            .cloned()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn list_for_router(&self, router_id: i64) -> Result<Vec<TrackedSession>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.router_id == router_id)
            .cloned()
            .collect())
    }

    async fn insert(
        &self,
        router_id: i64,
        session: &ObservedSession,
        connected_at: DateTime<Utc>,
        seen_at: DateTime<Utc>,
    ) -> Result<TrackedSession> {
        let record = TrackedSession {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            router_id,
            name: session.name.clone(),
            address: session.address.clone(),
            uptime_secs: session.uptime_secs,
            connected_at,
            last_seen: seen_at,
        };
        self.sessions.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn touch(&self, id: i64, session: &ObservedSession, seen_at: DateTime<Utc>) -> Result<()> {
        if let Some(s) = self.sessions.lock().unwrap().iter_mut().find(|s| s.id == id) {
            s.address = session.address.clone();
            s.uptime_secs = session.uptime_secs;
            s.last_seen = seen_at;
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.sessions.lock().unwrap().retain(|s| s.id != id);
        Ok(())
    }
}

// ========================================
// Notifier
// ========================================

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AlertNotice>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<AlertNotice> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait (bounded) until at least `n` notices were attempted
    pub async fn wait_for(&self, n: usize) {
        wait_until(|| self.sent.lock().unwrap().len() >= n).await;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notice: &AlertNotice) -> Result<()> {
        self.sent.lock().unwrap().push(notice.clone());
        if self.fail {
            return Err(Error::Notification("webhook unreachable".to_string()));
        }
        Ok(())
    }
}

// ========================================
// Device client
// ========================================

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Online router, no netwatch, no session list
    Ok,
    Delay(Duration),
    Fail,
    /// Never answers on its own
    Hang,
    Report { sessions: Option<Vec<ObservedSession>> },
    Uptime(i64),
}

#[derive(Default)]
pub struct ScriptedRouterClient {
    behaviors: Mutex<HashMap<i64, Behavior>>,
    calls: Mutex<Vec<(i64, bool)>>,
    events: Mutex<Vec<(bool, i64)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Records the end of a call even when the future is dropped by a timeout
struct InFlight<'a> {
    client: &'a ScriptedRouterClient,
    id: i64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.client.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.client.events.lock().unwrap().push((false, self.id));
    }
}

impl ScriptedRouterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, id: i64, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(id, behavior);
    }

    /// (router id, full_sync) per call, in call order
    pub fn calls(&self) -> Vec<(i64, bool)> {
        self.calls.lock().unwrap().clone()
    }

    /// (is_start, router id) in the order they happened
    pub fn events(&self) -> Vec<(bool, i64)> {
        self.events.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, n: usize) {
        wait_until(|| self.calls.lock().unwrap().len() >= n).await;
    }
}

#[async_trait]
impl RouterClient for ScriptedRouterClient {
    async fn refresh_router(&self, id: i64, options: RefreshOptions) -> Result<RefreshReport> {
        self.calls.lock().unwrap().push((id, options.full_sync));
        self.events.lock().unwrap().push((true, id));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight { client: self, id };

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or(Behavior::Ok);

        let mut report = RefreshReport {
            router: router(id),
            netwatch: Vec::new(),
            sessions: None,
        };

        match behavior {
            Behavior::Ok => {}
            Behavior::Delay(d) => tokio::time::sleep(d).await,
            Behavior::Fail => return Err(Error::Device(format!("router {} refused", id))),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Behavior::Report { sessions } => report.sessions = sessions,
            Behavior::Uptime(secs) => report.router.metrics.uptime_secs = Some(secs),
        }

        Ok(report)
    }
}

// ========================================
// Wiring
// ========================================

/// AlertEngine wired to in-memory collaborators
pub struct Fixture {
    pub engine: Arc<AlertEngine>,
    pub alerts: Arc<MemoryAlertRepository>,
    pub routers: Arc<MemoryRouterRepository>,
    pub netwatch: Arc<MemoryNetwatchRepository>,
    pub sessions: Arc<MemorySessionRepository>,
    pub settings: Arc<MemorySettings>,
    pub access: Arc<MemoryAccessDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub realtime: Arc<RealtimeHub>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(RecordingNotifier::new())
    }

    pub fn with_failing_notifier() -> Self {
        Self::build(RecordingNotifier::failing())
    }

    fn build(notifier: RecordingNotifier) -> Self {
        let access = Arc::new(MemoryAccessDirectory::default());
        let alerts = Arc::new(MemoryAlertRepository::new(access.clone()));
        let routers = Arc::new(MemoryRouterRepository::default());
        let netwatch = Arc::new(MemoryNetwatchRepository::new());
        let sessions = Arc::new(MemorySessionRepository::default());
        let settings = Arc::new(MemorySettings::new());
        let notifier = Arc::new(notifier);
        let realtime = Arc::new(RealtimeHub::new());

        let engine = Arc::new(AlertEngine::new(
            alerts.clone(),
            routers.clone(),
            settings.clone(),
            access.clone(),
            notifier.clone(),
            realtime.clone(),
        ));

        Self {
            engine,
            alerts,
            routers,
            netwatch,
            sessions,
            settings,
            access,
            notifier,
            realtime,
        }
    }
}
