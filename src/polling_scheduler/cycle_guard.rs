//! Cycle re-entrancy guard with stuck-cycle watchdog
//!
//! One atomic holds the start time (epoch millis) of the running cycle, 0
//! when idle. The watchdog check and the begin are one compare-and-swap, so a
//! manual trigger racing the timer can never start two cycles.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// A cycle older than this is considered stuck and may be replaced
pub const WATCHDOG_TIMEOUT_MS: i64 = 10 * 60 * 1000;

const IDLE: i64 = 0;

#[derive(Debug, Default)]
pub struct CycleGuard {
    started_at_ms: AtomicI64,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a cycle now, or `None` if a live cycle is running
    pub fn try_begin(&self) -> Option<CycleToken<'_>> {
        self.try_begin_at(Utc::now().timestamp_millis())
    }

    pub fn try_begin_at(&self, now_ms: i64) -> Option<CycleToken<'_>> {
        let stamp = now_ms.max(1);
        let mut current = self.started_at_ms.load(Ordering::Acquire);

        loop {
            if current != IDLE {
                let elapsed = now_ms - current;
                if elapsed <= WATCHDOG_TIMEOUT_MS {
                    return None;
                }
                tracing::warn!(
                    elapsed_secs = elapsed / 1000,
                    "Poll cycle stuck past watchdog timeout, forcing reset"
                );
            }

            match self.started_at_ms.compare_exchange(
                current,
                stamp,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(CycleToken {
                        guard: self,
                        started_at_ms: stamp,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn in_progress(&self) -> bool {
        self.started_at_ms.load(Ordering::Acquire) != IDLE
    }

    /// Start time of the running cycle
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.started_at_ms.load(Ordering::Acquire) {
            IDLE => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

/// Held for the duration of one cycle; dropping it ends the cycle
#[derive(Debug)]
pub struct CycleToken<'a> {
    guard: &'a CycleGuard,
    started_at_ms: i64,
}

impl CycleToken<'_> {
    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }
}

impl Drop for CycleToken<'_> {
    fn drop(&mut self) {
        // a watchdog may have handed the slot to a newer cycle; leave that one alone
        let _ = self.guard.started_at_ms.compare_exchange(
            self.started_at_ms,
            IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60 * 1000;

    #[test]
    fn test_overlapping_trigger_is_noop() {
        let guard = CycleGuard::new();
        let _running = guard.try_begin_at(T0).unwrap();

        assert!(guard.try_begin_at(T0 + 9 * MINUTE).is_none());
        assert!(guard.in_progress());
    }

    #[test]
    fn test_watchdog_replaces_stuck_cycle() {
        let guard = CycleGuard::new();
        let stuck = guard.try_begin_at(T0).unwrap();

        let fresh = guard.try_begin_at(T0 + 11 * MINUTE).unwrap();
        assert_eq!(fresh.started_at_ms(), T0 + 11 * MINUTE);

        // the stuck cycle finishing late must not release the new one
        drop(stuck);
        assert!(guard.in_progress());
        assert!(guard.try_begin_at(T0 + 12 * MINUTE).is_none());

        drop(fresh);
        assert!(!guard.in_progress());
    }

    #[test]
    fn test_drop_releases() {
        let guard = CycleGuard::new();
        {
            let _token = guard.try_begin_at(T0).unwrap();
        }
        assert!(!guard.in_progress());
        assert!(guard.started_at().is_none());
        assert!(guard.try_begin_at(T0 + 1).is_some());
    }

    #[test]
    fn test_racing_triggers_start_one_cycle() {
        let guard = std::sync::Arc::new(CycleGuard::new());
        let winners = std::sync::Arc::new(AtomicI64::new(0));
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let winners = winners.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    if let Some(token) = guard.try_begin_at(T0) {
                        winners.fetch_add(1, Ordering::SeqCst);
                        std::mem::forget(token);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
