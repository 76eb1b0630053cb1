//! Live-update broadcaster.
//!
//! Owns the in-memory map of `user_id -> live connections` and pushes a
//! frame to every connection of the affected user for each `task-updates`
//! message. The registry is replica-local: each broadcaster replica joins
//! the topic under its own consumer group and only delivers to connections
//! it holds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{EventEnvelope, Task};
use crate::domain::ports::EventConsumer;

/// Frame pushed to connected clients.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub task: Task,
    pub timestamp: DateTime<Utc>,
}

/// Per-connection outbound queue capacity.
const CONNECTION_QUEUE: usize = 64;
/// Budget for handing a frame to a connection's queue.
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle kept in the registry for one live connection.
struct ConnectionHandle {
    sender: mpsc::Sender<String>,
}

/// Replica-local connection registry.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, HashMap<Uuid, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user. Returns the connection id, a
    /// sender for server-initiated frames on the same queue (pong replies),
    /// and the receiving side drained by the socket write loop.
    pub async fn register(
        &self,
        user_id: &str,
    ) -> (Uuid, mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(CONNECTION_QUEUE);
        let conn_id = Uuid::new_v4();
        let mut connections = self.connections.write().await;
        connections
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id, ConnectionHandle { sender: tx.clone() });
        tracing::debug!(user_id, %conn_id, "live connection registered");
        (conn_id, tx, rx)
    }

    /// Remove a connection; the user entry disappears with its last
    /// connection.
    pub async fn deregister(&self, user_id: &str, conn_id: Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(user_conns) = connections.get_mut(user_id) {
            user_conns.remove(&conn_id);
            if user_conns.is_empty() {
                connections.remove(user_id);
            }
        }
        tracing::debug!(user_id, %conn_id, "live connection deregistered");
    }

    /// Push a frame to every connection of one user. Connections whose
    /// queue cannot accept the frame within the write budget are dropped.
    pub async fn push_to_user(&self, user_id: &str, frame: &str) {
        let senders: Vec<(Uuid, mpsc::Sender<String>)> = {
            let connections = self.connections.read().await;
            match connections.get(user_id) {
                Some(user_conns) => user_conns
                    .iter()
                    .map(|(id, handle)| (*id, handle.sender.clone()))
                    .collect(),
                None => return,
            }
        };

        let mut stale = Vec::new();
        for (conn_id, sender) in senders {
            if sender
                .send_timeout(frame.to_string(), CLIENT_WRITE_TIMEOUT)
                .await
                .is_err()
            {
                tracing::warn!(user_id, %conn_id, "dropping unresponsive live connection");
                stale.push(conn_id);
            }
        }
        for conn_id in stale {
            self.deregister(user_id, conn_id).await;
        }
    }

    pub async fn connection_count(&self, user_id: &str) -> usize {
        self.connections
            .read()
            .await
            .get(user_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub async fn total_connections(&self) -> usize {
        self.connections.read().await.values().map(|c| c.len()).sum()
    }

    /// Drop every connection; their queues close, which ends the write
    /// loops and lets the server send close frames while draining.
    pub async fn drain_all(&self) {
        let mut connections = self.connections.write().await;
        let dropped: usize = connections.values().map(|c| c.len()).sum();
        connections.clear();
        if dropped > 0 {
            tracing::info!(dropped, "drained live connections");
        }
    }
}

pub struct UpdateBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl UpdateBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Distinct consumer group per replica, so every replica sees every
    /// message and serves only its own connections.
    pub fn replica_group_id() -> String {
        format!("broadcaster-{}", Uuid::new_v4())
    }
}

#[async_trait]
impl EventConsumer for UpdateBroadcaster {
    async fn handle(&self, envelope: EventEnvelope) -> CoreResult<()> {
        if !envelope.schema_accepted() {
            tracing::error!(
                event_id = %envelope.event_id,
                schema_version = %envelope.schema_version,
                "rejecting envelope with incompatible schema major"
            );
            return Ok(());
        }

        let Some(task) = envelope.kind.task_snapshot() else {
            return Ok(());
        };

        let frame = UpdateFrame {
            kind: envelope.event_type().to_string(),
            task: task.clone(),
            timestamp: envelope.timestamp,
        };
        let json = serde_json::to_string(&frame)?;
        self.registry.push_to_user(&envelope.user_id, &json).await;
        Ok(())
    }
}
