//! AlertEngine Repository
//!
//! Persistence collaborators for alerts and router access, plus their
//! MySQL implementations.

use super::types::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder};

/// Alert persistence operations
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, alert: &NewAlert, created_at: DateTime<Utc>) -> Result<Alert>;

    async fn get(&self, id: i64) -> Result<Option<Alert>>;

    /// Most recent unresolved alert for the condition (router + type + target)
    async fn find_latest_unresolved(
        &self,
        router_id: i64,
        alert_type: AlertType,
        target: Option<&str>,
    ) -> Result<Option<Alert>>;

    async fn list(&self, query: &AlertQuery, scope: &AlertScope) -> Result<Vec<Alert>>;

    async fn list_unresolved_of_types(&self, types: &[AlertType]) -> Result<Vec<Alert>>;

    /// Conditional update; false when the alert is already acknowledged or out of scope
    async fn acknowledge(
        &self,
        id: i64,
        by: &str,
        at: DateTime<Utc>,
        scope: &AlertScope,
    ) -> Result<bool>;

    /// Conditional update; false when the alert is already resolved or out of scope
    async fn resolve(&self, id: i64, at: DateTime<Utc>, scope: &AlertScope) -> Result<bool>;

    /// Resolve every unresolved alert for the condition, returning how many changed
    async fn resolve_matching(
        &self,
        router_id: i64,
        alert_type: AlertType,
        target: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Bump `from_level` to `from_level + 1`; false if the level moved or the alert resolved meanwhile
    async fn record_escalation(&self, id: i64, from_level: i32, at: DateTime<Utc>) -> Result<bool>;
}

/// Resolves who may see alerts for a router
#[async_trait]
pub trait AccessDirectory: Send + Sync {
    async fn users_for_router(&self, router_id: i64) -> Result<Vec<String>>;
}

/// Alert row as stored
#[derive(Debug, FromRow)]
struct AlertRow {
    id: i64,
    router_id: i64,
    alert_type: String,
    severity: String,
    title: String,
    message: String,
    target: Option<String>,
    acknowledged: bool,
    acknowledged_by: Option<String>,
    acknowledged_at: Option<DateTime<Utc>>,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    escalation_level: i32,
    last_escalated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = Error;

    fn try_from(row: AlertRow) -> Result<Self> {
        Ok(Alert {
            id: row.id,
            router_id: row.router_id,
            alert_type: row.alert_type.parse().map_err(Error::Internal)?,
            severity: row.severity.parse().map_err(Error::Internal)?,
            title: row.title,
            message: row.message,
            target: row.target,
            acknowledged: row.acknowledged,
            acknowledged_by: row.acknowledged_by,
            acknowledged_at: row.acknowledged_at,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
            escalation_level: row.escalation_level,
            last_escalated_at: row.last_escalated_at,
            created_at: row.created_at,
        })
    }
}

fn into_alerts(rows: Vec<AlertRow>) -> Result<Vec<Alert>> {
    rows.into_iter().map(Alert::try_from).collect()
}

/// Alert repository backed by MySQL
#[derive(Clone)]
pub struct AlertRepositoryImpl {
    pool: MySqlPool,
}

impl AlertRepositoryImpl {
    const ALERT_COLUMNS: &'static str = r#"
        id, router_id, alert_type, severity, title, message, target,
        acknowledged, acknowledged_by, acknowledged_at,
        resolved, resolved_at, escalation_level, last_escalated_at, created_at
    "#;

    const SCOPE_CLAUSE: &'static str =
        " AND router_id IN (SELECT router_id FROM user_routers WHERE user_id = ?)";

    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn push_scope(builder: &mut QueryBuilder<'_, MySql>, scope: &AlertScope) {
        if let AlertScope::AssignedTo(user_id) = scope {
            builder
                .push(" AND router_id IN (SELECT router_id FROM user_routers WHERE user_id = ")
                .push_bind(user_id.clone())
                .push(")");
        }
    }
}

#[async_trait]
impl AlertRepository for AlertRepositoryImpl {
    async fn insert(&self, alert: &NewAlert, created_at: DateTime<Utc>) -> Result<Alert> {
        let resolved_at = alert.resolved.then_some(created_at);

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (
                router_id, alert_type, severity, title, message, target,
                acknowledged, resolved, resolved_at, escalation_level, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, FALSE, ?, ?, 0, ?)
            "#,
        )
        .bind(alert.router_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(&alert.target)
        .bind(alert.resolved)
        .bind(resolved_at)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id() as i64;
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound("Alert not found after insert".to_string()))
    }

    async fn get(&self, id: i64) -> Result<Option<Alert>> {
        let query = format!("SELECT {} FROM alerts WHERE id = ?", Self::ALERT_COLUMNS);
        let row = sqlx::query_as::<_, AlertRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Alert::try_from).transpose()
    }

    async fn find_latest_unresolved(
        &self,
        router_id: i64,
        alert_type: AlertType,
        target: Option<&str>,
    ) -> Result<Option<Alert>> {
        let query = format!(
            r#"
            SELECT {} FROM alerts
            WHERE router_id = ? AND alert_type = ? AND target <=> ? AND resolved = FALSE
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            Self::ALERT_COLUMNS
        );
        let row = sqlx::query_as::<_, AlertRow>(&query)
            .bind(router_id)
            .bind(alert_type.as_str())
            .bind(target)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Alert::try_from).transpose()
    }

    async fn list(&self, query: &AlertQuery, scope: &AlertScope) -> Result<Vec<Alert>> {
        let mut builder = QueryBuilder::<MySql>::new(format!(
            "SELECT {} FROM alerts WHERE 1 = 1",
            Self::ALERT_COLUMNS
        ));

        if query.unresolved_only {
            builder.push(" AND resolved = FALSE");
        }
        if let Some(router_id) = query.router_id {
            builder.push(" AND router_id = ").push_bind(router_id);
        }
        if let Some(severity) = query.severity {
            builder.push(" AND severity = ").push_bind(severity.as_str());
        }
        Self::push_scope(&mut builder, scope);

        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(query.limit.unwrap_or(100).min(1000));

        let rows = builder
            .build_query_as::<AlertRow>()
            .fetch_all(&self.pool)
            .await?;

        into_alerts(rows)
    }

    async fn list_unresolved_of_types(&self, types: &[AlertType]) -> Result<Vec<Alert>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<MySql>::new(format!(
            "SELECT {} FROM alerts WHERE resolved = FALSE AND alert_type IN (",
            Self::ALERT_COLUMNS
        ));
        let mut separated = builder.separated(", ");
        for t in types {
            separated.push_bind(t.as_str());
        }
        builder.push(") ORDER BY created_at ASC");

        let rows = builder
            .build_query_as::<AlertRow>()
            .fetch_all(&self.pool)
            .await?;

        into_alerts(rows)
    }

    async fn acknowledge(
        &self,
        id: i64,
        by: &str,
        at: DateTime<Utc>,
        scope: &AlertScope,
    ) -> Result<bool> {
        let mut sql = String::from(
            "UPDATE alerts SET acknowledged = TRUE, acknowledged_by = ?, acknowledged_at = ? \
             WHERE id = ? AND acknowledged = FALSE",
        );
        if matches!(scope, AlertScope::AssignedTo(_)) {
            sql.push_str(Self::SCOPE_CLAUSE);
        }

        let mut q = sqlx::query(&sql).bind(by).bind(at).bind(id);
        if let AlertScope::AssignedTo(user_id) = scope {
            q = q.bind(user_id);
        }

        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn resolve(&self, id: i64, at: DateTime<Utc>, scope: &AlertScope) -> Result<bool> {
        let mut sql = String::from(
            "UPDATE alerts SET resolved = TRUE, resolved_at = ? WHERE id = ? AND resolved = FALSE",
        );
        if matches!(scope, AlertScope::AssignedTo(_)) {
            sql.push_str(Self::SCOPE_CLAUSE);
        }

        let mut q = sqlx::query(&sql).bind(at).bind(id);
        if let AlertScope::AssignedTo(user_id) = scope {
            q = q.bind(user_id);
        }

        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn resolve_matching(
        &self,
        router_id: i64,
        alert_type: AlertType,
        target: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE alerts SET resolved = TRUE, resolved_at = ?
            WHERE router_id = ? AND alert_type = ? AND target <=> ? AND resolved = FALSE
            "#,
        )
        .bind(at)
        .bind(router_id)
        .bind(alert_type.as_str())
        .bind(target)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn record_escalation(&self, id: i64, from_level: i32, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts SET escalation_level = ?, last_escalated_at = ?
            WHERE id = ? AND escalation_level = ? AND resolved = FALSE
            "#,
        )
        .bind(from_level + 1)
        .bind(at)
        .bind(id)
        .bind(from_level)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Access directory backed by the `user_routers` assignment table
#[derive(Clone)]
pub struct AccessDirectoryImpl {
    pool: MySqlPool,
}

impl AccessDirectoryImpl {
    /// Create new directory
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessDirectory for AccessDirectoryImpl {
    async fn users_for_router(&self, router_id: i64) -> Result<Vec<String>> {
        let users: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM user_routers WHERE router_id = ?
            UNION
            SELECT id FROM users WHERE role = 'admin'
            "#,
        )
        .bind(router_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}
