//! RealtimeHub - WebSocket Distribution
//!
//! ## Responsibilities
//!
//! - WebSocket connection management
//! - Alert lifecycle events (created / escalated / resolved)
//! - Poll cycle statistics and router status changes
//!
//! Alert events are scoped to the users with access to the owning router
//! when that audience is known; everything else goes to every client.

use crate::alert_engine::Alert;
use crate::polling_scheduler::CycleSummary;
use crate::router_registry::RouterStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    AlertCreated(Alert),
    AlertEscalated(AlertEscalatedMessage),
    AlertResolved(AlertResolvedMessage),
    /// Broadcast at the end of each poll cycle
    CycleStats(CycleSummary),
    RouterStatus(RouterStatusMessage),
}

impl HubMessage {
    fn kind(&self) -> &'static str {
        match self {
            HubMessage::AlertCreated(_) => "alert_created",
            HubMessage::AlertEscalated(_) => "alert_escalated",
            HubMessage::AlertResolved(_) => "alert_resolved",
            HubMessage::CycleStats(_) => "cycle_stats",
            HubMessage::RouterStatus(_) => "router_status",
        }
    }
}

/// Escalation notice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEscalatedMessage {
    pub alert_id: i64,
    pub router_id: i64,
    pub escalation_level: i32,
    /// Human-readable time since the alert was raised, e.g. "3h 5m"
    pub elapsed: String,
    pub title: String,
}

/// Resolution notice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResolvedMessage {
    pub alert_id: i64,
    pub router_id: i64,
    /// "auto" when the condition cleared, otherwise the resolving user
    pub resolved_by: String,
    pub resolved_at: String,
}

/// Router status transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterStatusMessage {
    pub router_id: i64,
    pub name: String,
    pub previous: RouterStatus,
    pub current: RouterStatus,
    pub timestamp: String,
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    user_id: String,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self, user_id: String) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let conn = ClientConnection { id, user_id, tx };

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, conn);
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        tracing::debug!(message_type = %message.kind(), "Broadcasting message to clients");

        let Some(json) = Self::encode(&message) else {
            return;
        };

        let connections = self.connections.read().await;
        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Send message to every connection owned by one of `user_ids`
    pub async fn send_to_users(&self, user_ids: &[String], message: HubMessage) {
        tracing::debug!(
            message_type = %message.kind(),
            audience = user_ids.len(),
            "Sending message to scoped audience"
        );

        let Some(json) = Self::encode(&message) else {
            return;
        };

        let connections = self.connections.read().await;
        for conn in connections.values() {
            if user_ids.iter().any(|u| *u == conn.user_id) {
                if let Err(e) = conn.tx.send(json.clone()) {
                    tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
                }
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    fn encode(message: &HubMessage) -> Option<String> {
        match serde_json::to_string(message) {
            Ok(j) => Some(j),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                None
            }
        }
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_message() -> HubMessage {
        HubMessage::RouterStatus(RouterStatusMessage {
            router_id: 1,
            name: "edge".to_string(),
            previous: RouterStatus::Online,
            current: RouterStatus::Offline,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        })
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_clients() {
        let hub = RealtimeHub::new();
        let (_, mut rx_a) = hub.register("alice".to_string()).await;
        let (_, mut rx_b) = hub.register("bob".to_string()).await;

        hub.broadcast(status_message()).await;

        let a = rx_a.try_recv().unwrap();
        assert!(a.contains("\"type\":\"router_status\""));
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_scoped_send_skips_other_users() {
        let hub = RealtimeHub::new();
        let (_, mut rx_a) = hub.register("alice".to_string()).await;
        let (_, mut rx_b) = hub.register("bob".to_string()).await;

        hub.send_to_users(&["bob".to_string()], status_message()).await;

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unregister_updates_count() {
        let hub = RealtimeHub::new();
        let (id, _rx) = hub.register("alice".to_string()).await;
        assert_eq!(hub.connection_count(), 1);
        hub.unregister(&id).await;
        hub.unregister(&id).await;
        assert_eq!(hub.connection_count(), 0);
    }
}
