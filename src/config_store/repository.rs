//! ConfigStore Repository
//!
//! Database access layer for the `settings` table

use super::SettingsSource;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

/// Settings repository backed by MySQL
#[derive(Clone)]
pub struct SettingsRepository {
    pool: MySqlPool,
}

impl SettingsRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Set setting (upsert)
    pub async fn set_value(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO settings (setting_key, setting_json, updated_at)
            VALUES (?, ?, ?)
            ON DUPLICATE KEY UPDATE setting_json = ?, updated_at = ?
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(now)
        .bind(&value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SettingsSource for SettingsRepository {
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let value: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT setting_json FROM settings WHERE setting_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }
}
