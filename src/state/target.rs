use super::AppState;
use crate::protocol::ServerMessage;

impl AppState {
    /// Current chain target (ms since epoch), if an admin set one
    pub async fn get_target(&self) -> Option<i64> {
        *self.target.read().await
    }

    /// Set or clear the chain target and tell every subscriber
    pub async fn set_target(&self, timestamp: Option<i64>) -> Option<i64> {
        *self.target.write().await = timestamp;
        tracing::info!(target_ms = ?timestamp, "Chain target updated");

        let _ = self
            .broadcast
            .send(ServerMessage::TargetUpdate { target: timestamp });
        timestamp
    }
}
