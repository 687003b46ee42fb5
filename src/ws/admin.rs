//! Admin-only command handlers
//!
//! All handlers in this module require the Admin role.
//! Authorization is checked in the main dispatch layer before calling these.

use super::handlers::error_message;
use super::member::slot_reply;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{Identity, Slot};
use std::sync::Arc;

pub async fn handle_reassign(
    state: &Arc<AppState>,
    identity: String,
    slot: Slot,
) -> Option<ServerMessage> {
    tracing::info!("Admin reassigning {} to slot {}", identity, slot);
    match state.registry.reassign(&identity, slot).await {
        Ok(slot) => slot_reply(state, &identity, Some(slot)).await,
        Err(e) => error_message(e),
    }
}

pub async fn handle_remove(state: &Arc<AppState>, identity: String) -> Option<ServerMessage> {
    match state.registry.remove(&identity).await {
        Ok(released_slot) => Some(ServerMessage::Released {
            identity: Identity::parse(&identity).ok()?,
            released_slot,
        }),
        Err(e) => error_message(e),
    }
}

pub async fn handle_clear(state: &Arc<AppState>) -> Option<ServerMessage> {
    match state.registry.clear().await {
        Ok(removed) => Some(ServerMessage::Cleared { removed }),
        Err(e) => error_message(e),
    }
}

pub async fn handle_set_target(
    state: &Arc<AppState>,
    timestamp: Option<i64>,
) -> Option<ServerMessage> {
    if matches!(timestamp, Some(ts) if ts < 0) {
        return Some(ServerMessage::Error {
            code: "InvalidInput".to_string(),
            msg: "timestamp must not be negative".to_string(),
        });
    }
    let target = state.set_target(timestamp).await;
    Some(ServerMessage::TargetUpdate { target })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reassign_conflict_is_reported() {
        let state = Arc::new(AppState::in_memory());
        state.registry.join("alice").await.unwrap();
        state.registry.join("bob").await.unwrap();

        match handle_reassign(&state, "alice".to_string(), 2).await {
            Some(ServerMessage::Error { code, msg }) => {
                assert_eq!(code, "SlotConflict");
                assert!(msg.contains("bob"));
            }
            other => panic!("Expected Error, got {:?}", other),
        }

        assert!(matches!(
            handle_reassign(&state, "alice".to_string(), 7).await,
            Some(ServerMessage::Slot { slot: Some(7), position: Some(2), .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let state = Arc::new(AppState::in_memory());
        state.registry.join("a").await.unwrap();
        state.registry.join("b").await.unwrap();

        assert!(matches!(
            handle_remove(&state, "a".to_string()).await,
            Some(ServerMessage::Released { released_slot: Some(1), .. })
        ));
        assert_eq!(
            handle_clear(&state).await,
            Some(ServerMessage::Cleared { removed: 1 })
        );
    }

    #[tokio::test]
    async fn test_set_target_validates() {
        let state = Arc::new(AppState::in_memory());
        assert!(matches!(
            handle_set_target(&state, Some(-5)).await,
            Some(ServerMessage::Error { .. })
        ));
        assert_eq!(
            handle_set_target(&state, Some(42)).await,
            Some(ServerMessage::TargetUpdate { target: Some(42) })
        );
        assert_eq!(state.get_target().await, Some(42));
    }
}
