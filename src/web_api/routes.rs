//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::task::JoinHandle;

use super::{Caller, USER_ID_HEADER};
use crate::alert_engine::AlertQuery;
use crate::config_store::SettingsSource;
use crate::error::{Error, Result};
use crate::models::{AlertActionResponse, ApiResponse, SettingValue};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Scheduler
        .route("/api/scheduler/status", get(scheduler_status))
        .route("/api/scheduler/start", post(scheduler_start))
        .route("/api/scheduler/stop", post(scheduler_stop))
        .route("/api/scheduler/restart", post(scheduler_restart))
        .route("/api/scheduler/poll-now", post(scheduler_poll_now))
        // Escalation
        .route("/api/escalation/check", post(escalation_check))
        // Alerts
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/api/alerts/:id/resolve", post(resolve_alert))
        // Settings
        .route("/api/settings/:key", get(get_setting).put(put_setting))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Scheduler Handlers
// ========================================

async fn scheduler_status(State(state): State<AppState>, _caller: Caller) -> impl IntoResponse {
    Json(ApiResponse::success(state.scheduler.status().await))
}

async fn scheduler_start(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse> {
    let actor = caller.require_admin()?;
    tracing::info!(user_id = %actor.user_id, "Scheduler start requested");

    state.scheduler.clone().start().await;
    Ok(Json(ApiResponse::success(state.scheduler.status().await)))
}

async fn scheduler_stop(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse> {
    let actor = caller.require_admin()?;
    tracing::info!(user_id = %actor.user_id, "Scheduler stop requested");

    state.scheduler.stop().await;
    Ok(Json(ApiResponse::success(state.scheduler.status().await)))
}

async fn scheduler_restart(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse> {
    let actor = caller.require_admin()?;
    tracing::info!(user_id = %actor.user_id, "Scheduler restart requested");

    state.scheduler.clone().restart().await;
    Ok(Json(ApiResponse::success(state.scheduler.status().await)))
}

async fn scheduler_poll_now(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse> {
    let actor = caller.require_operator()?;
    tracing::info!(user_id = %actor.user_id, "Manual poll requested");

    let outcome = state.scheduler.poll_now().await;
    Ok(Json(ApiResponse::success(outcome)))
}

// ========================================
// Escalation Handlers
// ========================================

async fn escalation_check(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse> {
    let actor = caller.require_operator()?;
    tracing::info!(user_id = %actor.user_id, "Manual escalation check requested");

    let report = state.escalation.check_now().await;
    Ok(Json(ApiResponse::success(report)))
}

// ========================================
// Alert Handlers
// ========================================

async fn list_alerts(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<AlertQuery>,
) -> Result<impl IntoResponse> {
    let alerts = state.alerts.list(&query, &caller.0).await?;
    Ok(Json(ApiResponse::success(alerts)))
}

async fn acknowledge_alert(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let actor = caller.require_operator()?;
    let changed = state.alerts.acknowledge(id, actor).await?;
    Ok(Json(ApiResponse::success(AlertActionResponse {
        alert_id: id,
        changed,
    })))
}

async fn resolve_alert(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let actor = caller.require_operator()?;
    let changed = state.alerts.resolve(id, actor).await?;
    Ok(Json(ApiResponse::success(AlertActionResponse {
        alert_id: id,
        changed,
    })))
}

// ========================================
// Settings Handlers
// ========================================

async fn get_setting(
    State(state): State<AppState>,
    _caller: Caller,
    Path(key): Path<String>,
) -> Result<impl IntoResponse> {
    let value = state.settings.get_value(&key).await?;
    Ok(Json(ApiResponse::success(SettingValue { key, value })))
}

async fn put_setting(
    State(state): State<AppState>,
    caller: Caller,
    Path(key): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let actor = caller.require_admin()?;
    if key.trim().is_empty() || key.len() > 64 {
        return Err(Error::Validation("invalid setting key".to_string()));
    }

    state.settings.set_value(&key, value.clone()).await?;
    tracing::info!(user_id = %actor.user_id, key = %key, "Setting updated");

    Ok(Json(ApiResponse::success(SettingValue {
        key,
        value: Some(value),
    })))
}

// ========================================
// WebSocket
// ========================================

#[derive(Debug, Deserialize)]
struct WsParams {
    /// Browsers cannot set headers on the upgrade request
    user_id: Option<String>,
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // The query fallback is unauthenticated; scoped delivery relies on the
    // upstream gateway rejecting upgrades whose user_id it did not issue.
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(params.user_id)
        .unwrap_or_else(|| format!("anonymous-{}", uuid::Uuid::new_v4()));

    ws.on_upgrade(move |socket| handle_websocket(socket, state, user_id))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut rx) = state.realtime.register(user_id.clone()).await;
    tracing::info!(connection_id = %conn_id, user_id = %user_id, "WebSocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    run_until_first(send_task, recv_task).await;
    state.realtime.unregister(&conn_id).await;
}

/// Wait for either socket half to finish, then abort the other
async fn run_until_first(mut send_task: JoinHandle<()>, mut recv_task: JoinHandle<()>) {
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}
