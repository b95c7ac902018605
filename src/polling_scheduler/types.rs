//! PollingScheduler data types

use super::interval_controller::PollingPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrigger {
    Timer,
    /// `poll_now`; runs a full sync
    Manual,
}

/// Result of refreshing one router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOutcome {
    Success,
    Failed,
    TimedOut,
}

/// Per-cycle statistics, logged and pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub trigger: CycleTrigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub routers: usize,
    pub skipped_maintenance: usize,
    pub batch_size: usize,
    pub batches: usize,
    pub success: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl CycleSummary {
    pub(crate) fn new(trigger: CycleTrigger, started_at: DateTime<Utc>, batch_size: usize) -> Self {
        Self {
            trigger,
            started_at,
            duration_ms: 0,
            routers: 0,
            skipped_maintenance: 0,
            batch_size,
            batches: 0,
            success: 0,
            failed: 0,
            timed_out: 0,
        }
    }

    pub(crate) fn record(&mut self, outcome: DeviceOutcome) {
        match outcome {
            DeviceOutcome::Success => self.success += 1,
            DeviceOutcome::Failed => self.failed += 1,
            DeviceOutcome::TimedOut => self.timed_out += 1,
        }
    }
}

/// How a trigger ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle was still running
    Skipped,
    Completed(CycleSummary),
    /// Setup failed (e.g. router list unavailable); nothing was polled
    Failed { error: String },
}

/// Snapshot for the control API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub cycle_in_progress: bool,
    pub cycle_started_at: Option<DateTime<Utc>>,
    pub plan: Option<PollingPlan>,
    pub last_cycle: Option<CycleSummary>,
}
