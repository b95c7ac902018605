//! RouterRegistry Repository
//!
//! Database access layer for routers and netwatch targets

use super::types::*;
use super::{NetwatchRepository, RouterRepository};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySqlPool};

/// Router row as stored
#[derive(Debug, FromRow)]
struct RouterRow {
    id: i64,
    name: String,
    host: String,
    status: String,
    last_seen: Option<DateTime<Utc>>,
    cpu_load: Option<f64>,
    memory_used: Option<i64>,
    memory_total: Option<i64>,
    disk_used: Option<i64>,
    disk_total: Option<i64>,
    uptime_secs: Option<i64>,
}

impl From<RouterRow> for Router {
    fn from(row: RouterRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e: String| {
            tracing::warn!(router_id = row.id, error = %e, "Unrecognised router status");
            RouterStatus::Unknown
        });

        Router {
            id: row.id,
            name: row.name,
            host: row.host,
            status,
            last_seen: row.last_seen,
            metrics: RouterMetrics {
                cpu_load: row.cpu_load,
                memory_used: row.memory_used,
                memory_total: row.memory_total,
                disk_used: row.disk_used,
                disk_total: row.disk_total,
                uptime_secs: row.uptime_secs,
            },
        }
    }
}

/// Router repository backed by MySQL
#[derive(Clone)]
pub struct RouterRepositoryImpl {
    pool: MySqlPool,
}

impl RouterRepositoryImpl {
    const ROUTER_COLUMNS: &'static str = r#"
        id, name, host, status, last_seen,
        cpu_load, memory_used, memory_total, disk_used, disk_total, uptime_secs
    "#;

    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RouterRepository for RouterRepositoryImpl {
    async fn list_routers(&self) -> Result<Vec<Router>> {
        let query = format!("SELECT {} FROM routers ORDER BY id", Self::ROUTER_COLUMNS);
        let rows = sqlx::query_as::<_, RouterRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Router::from).collect())
    }

    async fn get_router(&self, id: i64) -> Result<Option<Router>> {
        let query = format!("SELECT {} FROM routers WHERE id = ?", Self::ROUTER_COLUMNS);
        let row = sqlx::query_as::<_, RouterRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Router::from))
    }

    async fn mark_unreachable(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE routers SET status = 'offline', updated_at = ? WHERE id = ? AND status <> 'maintenance'",
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Netwatch row as stored
#[derive(Debug, FromRow)]
struct NetwatchRow {
    id: i64,
    router_id: i64,
    host: String,
    status: String,
    last_up: Option<DateTime<Utc>>,
    last_down: Option<DateTime<Utc>>,
}

impl From<NetwatchRow> for NetwatchTarget {
    fn from(row: NetwatchRow) -> Self {
        NetwatchTarget {
            id: row.id,
            router_id: row.router_id,
            host: row.host,
            status: row.status.parse().unwrap_or(NetwatchStatus::Unknown),
            last_up: row.last_up,
            last_down: row.last_down,
        }
    }
}

/// Netwatch repository backed by MySQL
#[derive(Clone)]
pub struct NetwatchRepositoryImpl {
    pool: MySqlPool,
}

impl NetwatchRepositoryImpl {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NetwatchRepository for NetwatchRepositoryImpl {
    async fn count_targets(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM netwatch_targets")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn get_target(&self, router_id: i64, host: &str) -> Result<Option<NetwatchTarget>> {
        let row = sqlx::query_as::<_, NetwatchRow>(
            r#"
            SELECT id, router_id, host, status, last_up, last_down
            FROM netwatch_targets
            WHERE router_id = ? AND host = ?
            "#,
        )
        .bind(router_id)
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(NetwatchTarget::from))
    }
}
