//! SessionTracker - PPPoE Presence Detection
//!
//! ## Responsibilities
//!
//! - Diff observed sessions against stored ones
//! - Keep the `pppoe_sessions` table in step (insert / refresh / delete)
//! - Feed connect and disconnect events to the AlertEngine
//!
//! Disconnects are inferred from absence. Callers must only pass session
//! lists from a successful refresh; a failed poll never reaches `track`.

mod repository;
mod types;

pub use repository::SessionRepositoryImpl;
pub use types::*;

use crate::alert_engine::AlertEngine;
use crate::error::Result;
use crate::router_registry::{ObservedSession, Router};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Session persistence operations
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn list_for_router(&self, router_id: i64) -> Result<Vec<TrackedSession>>;

    async fn insert(
        &self,
        router_id: i64,
        session: &ObservedSession,
        connected_at: DateTime<Utc>,
        seen_at: DateTime<Utc>,
    ) -> Result<TrackedSession>;

    /// Refresh last-seen, uptime and address in place
    async fn touch(&self, id: i64, session: &ObservedSession, seen_at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SessionTracker instance
pub struct SessionTracker {
    repo: Arc<dyn SessionRepository>,
    alert_engine: Arc<AlertEngine>,
}

impl SessionTracker {
    /// Create new SessionTracker
    pub fn new(repo: Arc<dyn SessionRepository>, alert_engine: Arc<AlertEngine>) -> Self {
        Self { repo, alert_engine }
    }

    /// Apply the current session set of one router
    pub async fn track(&self, router: &Router, current: &[ObservedSession]) -> Result<SessionDiff> {
        self.track_at(router, current, Utc::now()).await
    }

    pub(crate) async fn track_at(
        &self,
        router: &Router,
        current: &[ObservedSession],
        now: DateTime<Utc>,
    ) -> Result<SessionDiff> {
        let previous = self.repo.list_for_router(router.id).await?;
        let delta = diff_sessions(&previous, current);
        let mut diff = SessionDiff::default();

        for session in &delta.connected {
            // the router knows how long the session has been up; trust it over our poll time
            let connected_at = session
                .uptime_secs
                .filter(|secs| *secs >= 0)
                .and_then(Duration::try_seconds)
                .and_then(|up| now.checked_sub_signed(up))
                .unwrap_or(now);

            self.repo.insert(router.id, session, connected_at, now).await?;
            diff.connected.push(session.name.clone());

            if let Err(e) = self.alert_engine.session_connected(router, session).await {
                tracing::warn!(router_id = router.id, session = %session.name, error = %e, "Connect alert failed");
            }
        }

        for record in &delta.disconnected {
            self.repo.delete(record.id).await?;
            diff.disconnected.push(record.name.clone());

            let duration = now - record.connected_at;
            if let Err(e) = self
                .alert_engine
                .session_disconnected(router, &record.name, duration)
                .await
            {
                tracing::warn!(router_id = router.id, session = %record.name, error = %e, "Disconnect alert failed");
            }
        }

        for (id, session) in &delta.retained {
            self.repo.touch(*id, session, now).await?;
            diff.refreshed.push(session.name.clone());
        }

        if !diff.is_quiet() {
            tracing::info!(
                router_id = router.id,
                connected = diff.connected.len(),
                disconnected = diff.disconnected.len(),
                "PPPoE sessions changed"
            );
        }

        Ok(diff)
    }
}
