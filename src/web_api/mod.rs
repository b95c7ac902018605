//! WebAPI - Control Endpoints
//!
//! ## Responsibilities
//!
//! - Scheduler / escalation control for the surrounding dashboard
//! - Alert list, acknowledge and resolve under the caller's scope
//! - WebSocket feed from the RealtimeHub
//!
//! Authentication happens upstream; the gateway forwards the caller as
//! `X-User-Id` / `X-User-Role` headers.

mod routes;

pub use routes::create_router;

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::Json;

use crate::alert_engine::{Actor, ActorRole};
use crate::error::Error;
use crate::models::HealthResponse;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Caller identity taken from gateway headers
#[derive(Debug, Clone)]
pub struct Caller(pub Actor);

impl Caller {
    /// Reject viewers from state-changing operations
    pub fn require_operator(&self) -> crate::Result<&Actor> {
        match self.0.role {
            ActorRole::Admin | ActorRole::Operator => Ok(&self.0),
            ActorRole::Viewer => Err(Error::Forbidden("read-only role".to_string())),
        }
    }

    pub fn require_admin(&self) -> crate::Result<&Actor> {
        match self.0.role {
            ActorRole::Admin => Ok(&self.0),
            _ => Err(Error::Forbidden("admin role required".to_string())),
        }
    }
}

/// Parse the role header; anything unknown is treated as viewer
pub fn parse_role(value: Option<&str>) -> ActorRole {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("admin") => ActorRole::Admin,
        Some("operator") => ActorRole::Operator,
        _ => ActorRole::Viewer,
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| Error::Forbidden("missing X-User-Id header".to_string()))?
            .to_string();
        let role = parse_role(header(USER_ROLE_HEADER));

        Ok(Caller(Actor { user_id, role }))
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let collector_ok = state.collector.health_check().await.unwrap_or(false);
    let db_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        collector_connected: collector_ok,
        db_connected: db_ok,
        ws_connections: state.realtime.connection_count(),
    };

    Json(response)
}
