//! routerwatch Library
//!
//! Router polling and alert escalation core.
//!
//! ## Architecture
//!
//! 1. ConfigStore - Runtime settings (thresholds, switches, polling override)
//! 2. RouterRegistry - Router/netwatch persistence and the collector client
//! 3. TimeoutGuard - Hard deadline for remote calls
//! 4. PollingScheduler - Adaptive cadence, cycle guard, batched refresh
//! 5. AlertEngine - Alert creation, dedup, acknowledge/resolve, queries
//! 6. EscalationEngine - Time-driven escalation and auto-resolution
//! 7. SessionTracker - PPPoE connect/disconnect detection
//! 8. Notifier - Outbound alert notifications
//! 9. RealtimeHub - WebSocket distribution
//! 10. WebAPI - Control endpoints

pub mod alert_engine;
pub mod config_store;
pub mod error;
pub mod escalation_engine;
pub mod models;
pub mod notifier;
pub mod polling_scheduler;
pub mod realtime_hub;
pub mod router_registry;
pub mod session_tracker;
pub mod state;
pub mod timeout_guard;
pub mod web_api;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use state::AppState;
