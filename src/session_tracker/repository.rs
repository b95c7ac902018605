//! SessionTracker Repository
//!
//! Database access layer for tracked PPPoE sessions

use super::types::TrackedSession;
use super::SessionRepository;
use crate::error::{Error, Result};
use crate::router_registry::ObservedSession;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySqlPool};

#[derive(Debug, FromRow)]
struct SessionRow {
    id: i64,
    router_id: i64,
    name: String,
    address: Option<String>,
    uptime_secs: Option<i64>,
    connected_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl From<SessionRow> for TrackedSession {
    fn from(row: SessionRow) -> Self {
        TrackedSession {
            id: row.id,
            router_id: row.router_id,
            name: row.name,
            address: row.address,
            uptime_secs: row.uptime_secs,
            connected_at: row.connected_at,
            last_seen: row.last_seen,
        }
    }
}

/// Session repository backed by MySQL
#[derive(Clone)]
pub struct SessionRepositoryImpl {
    pool: MySqlPool,
}

impl SessionRepositoryImpl {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SessionRepositoryImpl {
    async fn list_for_router(&self, router_id: i64) -> Result<Vec<TrackedSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, router_id, name, address, uptime_secs, connected_at, last_seen
            FROM pppoe_sessions
            WHERE router_id = ?
            ORDER BY name
            "#,
        )
        .bind(router_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TrackedSession::from).collect())
    }

    async fn insert(
        &self,
        router_id: i64,
        session: &ObservedSession,
        connected_at: DateTime<Utc>,
        seen_at: DateTime<Utc>,
    ) -> Result<TrackedSession> {
        let result = sqlx::query(
            r#"
            INSERT INTO pppoe_sessions (router_id, name, address, uptime_secs, connected_at, last_seen)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(router_id)
        .bind(&session.name)
        .bind(&session.address)
        .bind(session.uptime_secs)
        .bind(connected_at)
        .bind(seen_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id() as i64;
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, router_id, name, address, uptime_secs, connected_at, last_seen
            FROM pppoe_sessions WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Session not found after insert".to_string()))?;

        Ok(row.into())
    }

    async fn touch(&self, id: i64, session: &ObservedSession, seen_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pppoe_sessions SET address = ?, uptime_secs = ?, last_seen = ?
            WHERE id = ?
            "#,
        )
        .bind(&session.address)
        .bind(session.uptime_secs)
        .bind(seen_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pppoe_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
