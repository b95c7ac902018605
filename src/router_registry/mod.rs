//! RouterRegistry - Router Inventory and Device Access
//!
//! ## Responsibilities
//!
//! - Router list and polling state (persistence collaborator)
//! - Netwatch target lookups (persistence collaborator)
//! - Device refresh through the management-protocol collector

mod client;
mod repository;
mod types;

pub use client::HttpRouterClient;
pub use repository::{NetwatchRepositoryImpl, RouterRepositoryImpl};
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Router persistence operations used by the poll cycle and the alert engines
#[async_trait]
pub trait RouterRepository: Send + Sync {
    async fn list_routers(&self) -> Result<Vec<Router>>;

    async fn get_router(&self, id: i64) -> Result<Option<Router>>;

    /// Record that a refresh could not reach the router
    async fn mark_unreachable(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// Netwatch persistence operations
#[async_trait]
pub trait NetwatchRepository: Send + Sync {
    /// Number of monitored netwatch targets (load proxy for the interval controller)
    async fn count_targets(&self) -> Result<u64>;

    async fn get_target(&self, router_id: i64, host: &str) -> Result<Option<NetwatchTarget>>;
}

/// Management-protocol client: refresh one router and its dependents
#[async_trait]
pub trait RouterClient: Send + Sync {
    async fn refresh_router(&self, id: i64, options: RefreshOptions) -> Result<RefreshReport>;
}
