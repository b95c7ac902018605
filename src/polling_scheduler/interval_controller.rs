//! Adaptive polling cadence
//!
//! Picks interval and batch size from the number of monitored netwatch
//! targets. Larger fleets are polled less often and with less parallelism.

use crate::config_store::{keys, parse_interval_override, SettingsSource};
use crate::router_registry::NetwatchRepository;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scaling tier. `max_targets: None` is the unbounded last tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingTier {
    pub max_targets: Option<u64>,
    pub interval: Duration,
    pub batch_size: usize,
    pub label: &'static str,
}

/// Tiers in ascending order of `max_targets` (inclusive bound)
pub static POLLING_TIERS: [PollingTier; 4] = [
    PollingTier {
        max_targets: Some(50),
        interval: Duration::from_secs(30),
        batch_size: 10,
        label: "Full check",
    },
    PollingTier {
        max_targets: Some(200),
        interval: Duration::from_secs(60),
        batch_size: 5,
        label: "Batching",
    },
    PollingTier {
        max_targets: Some(500),
        interval: Duration::from_secs(120),
        batch_size: 3,
        label: "Priority + Batching",
    },
    PollingTier {
        max_targets: None,
        interval: Duration::from_secs(300),
        batch_size: 2,
        label: "Sampling + Alert only",
    },
];

/// Interval used when the target count cannot be read
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(120);

/// Batch size before any tier has been computed
pub const INITIAL_BATCH_SIZE: usize = 10;

/// Override minutes as milliseconds, saturating for absurd values
fn override_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(60_000)
}

/// First tier whose bound is >= `count`
pub fn tier_for(count: u64) -> &'static PollingTier {
    POLLING_TIERS
        .iter()
        .find(|t| t.max_targets.map_or(true, |max| count <= max))
        .unwrap_or(&POLLING_TIERS[POLLING_TIERS.len() - 1])
}

/// Where the plan came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PlanSource {
    Adaptive { tier: String, target_count: u64 },
    Override { minutes: u64, target_count: u64 },
    /// Target count unavailable
    Fallback,
}

/// Cadence for the next cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingPlan {
    pub interval_ms: u64,
    pub batch_size: usize,
    #[serde(flatten)]
    pub source: PlanSource,
}

impl PollingPlan {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Computes a [`PollingPlan`] on every call; nothing is cached except the last batch size
pub struct IntervalController {
    netwatch: Arc<dyn NetwatchRepository>,
    settings: Arc<dyn SettingsSource>,
    last_batch_size: AtomicUsize,
}

impl IntervalController {
    pub fn new(netwatch: Arc<dyn NetwatchRepository>, settings: Arc<dyn SettingsSource>) -> Self {
        Self {
            netwatch,
            settings,
            last_batch_size: AtomicUsize::new(INITIAL_BATCH_SIZE),
        }
    }

    pub async fn plan(&self) -> PollingPlan {
        let override_minutes = self.override_minutes().await;

        match self.netwatch.count_targets().await {
            Ok(count) => {
                // batch size always follows the current fleet, even under an override
                let tier = tier_for(count);
                self.last_batch_size.store(tier.batch_size, Ordering::Relaxed);

                match override_minutes {
                    Some(minutes) => PollingPlan {
                        interval_ms: override_ms(minutes),
                        batch_size: tier.batch_size,
                        source: PlanSource::Override {
                            minutes,
                            target_count: count,
                        },
                    },
                    None => PollingPlan {
                        interval_ms: tier.interval.as_millis() as u64,
                        batch_size: tier.batch_size,
                        source: PlanSource::Adaptive {
                            tier: tier.label.to_string(),
                            target_count: count,
                        },
                    },
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to count netwatch targets, using fallback interval");
                let interval_ms = override_minutes
                    .map(override_ms)
                    .unwrap_or(FALLBACK_INTERVAL.as_millis() as u64);
                PollingPlan {
                    interval_ms,
                    batch_size: self.last_batch_size.load(Ordering::Relaxed),
                    source: PlanSource::Fallback,
                }
            }
        }
    }

    async fn override_minutes(&self) -> Option<u64> {
        match self.settings.get_value(keys::POLLING_INTERVAL_MINUTES).await {
            Ok(Some(value)) => {
                let parsed = parse_interval_override(&value);
                if parsed.is_none() {
                    tracing::debug!(value = %value, "Ignoring invalid polling interval override");
                }
                parsed
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read polling interval override");
                None
            }
        }
    }
}
