//! ConfigStore - Runtime Settings
//!
//! ## Responsibilities
//!
//! - Key/value settings read by the scheduler and the alert engine
//! - Typed views over raw settings (alert thresholds, polling override)
//!
//! ## Design Principles
//!
//! - No caching: every check re-reads the keys it needs, so operators can
//!   retune thresholds without a restart

mod repository;
mod types;

pub use repository::SettingsRepository;
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;

/// Source of persisted settings, keyed by string name
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Raw value for `key`, `None` when the key has never been set
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>>;
}

/// Read a boolean flag, falling back to `default` when absent or malformed
pub async fn read_flag(source: &dyn SettingsSource, key: &str, default: bool) -> Result<bool> {
    let value = source.get_value(key).await?;
    Ok(match value {
        None => default,
        Some(v) => parse_flag(&v).unwrap_or_else(|| {
            tracing::warn!(key = %key, value = %v, "Unparsable flag setting, using default");
            default
        }),
    })
}

/// Read a numeric threshold, falling back to `default` when absent or malformed
pub async fn read_number(source: &dyn SettingsSource, key: &str, default: f64) -> Result<f64> {
    let value = source.get_value(key).await?;
    Ok(match value {
        None => default,
        Some(v) => parse_number(&v).unwrap_or_else(|| {
            tracing::warn!(key = %key, value = %v, "Unparsable numeric setting, using default");
            default
        }),
    })
}
