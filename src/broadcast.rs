//! Snapshot fan-out from the registry to connected subscribers.

use crate::protocol::ServerMessage;
use crate::types::Assignment;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Full queue state after one mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Increases by one per published mutation
    pub seq: u64,
    /// Assignments in ascending slot order
    pub queue: Vec<Assignment>,
}

/// The registry's only view of its subscribers.
///
/// Delivery is best-effort: implementations must not block and must not
/// report failure back into the registry.
pub trait SnapshotPublisher: Send + Sync {
    fn publish(&self, snapshot: QueueSnapshot);
}

/// Publishes snapshots onto the shared server broadcast channel
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: broadcast::Sender<ServerMessage>,
}

impl ChannelPublisher {
    pub fn new(tx: broadcast::Sender<ServerMessage>) -> Self {
        Self { tx }
    }
}

impl SnapshotPublisher for ChannelPublisher {
    fn publish(&self, snapshot: QueueSnapshot) {
        let seq = snapshot.seq;
        let msg = ServerMessage::QueueUpdate {
            queue: snapshot.queue,
            seq,
        };

        // Ignore send errors (no receivers connected is fine)
        match self.tx.send(msg) {
            Ok(receivers) => tracing::debug!(seq, receivers, "Queue snapshot published"),
            Err(_) => tracing::trace!(seq, "Queue snapshot dropped, no subscribers"),
        }
    }
}
