//! Participant command handlers
//!
//! Available to every connection regardless of role.

use super::handlers::error_message;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{Identity, Slot};
use std::sync::Arc;

/// Refuse the request if `identity` has used up its budget for `action`
pub(crate) async fn check_rate_limit(
    state: &Arc<AppState>,
    action: &str,
    identity: &str,
) -> Option<ServerMessage> {
    let limiter = state.rate_limiter.as_ref()?;
    if limiter.check_identity(action, identity).await {
        return None;
    }
    tracing::warn!(action, identity, "Rate limited");
    Some(ServerMessage::Error {
        code: "RATE_LIMITED".to_string(),
        msg: "Rate limit exceeded. Please slow down.".to_string(),
    })
}

/// Reply carrying `slot` plus the identity's current queue rank
pub(crate) async fn slot_reply(
    state: &Arc<AppState>,
    identity: &str,
    slot: Option<Slot>,
) -> Option<ServerMessage> {
    let parsed = match Identity::parse(identity) {
        Ok(parsed) => parsed,
        Err(e) => return error_message(e),
    };
    match state.registry.position(identity).await {
        Ok(position) => Some(ServerMessage::Slot {
            identity: parsed,
            slot,
            position: slot.and(position),
        }),
        Err(e) => error_message(e),
    }
}

pub async fn handle_join(state: &Arc<AppState>, identity: String) -> Option<ServerMessage> {
    if let Some(limited) = check_rate_limit(state, "join", &identity).await {
        return Some(limited);
    }

    match state.registry.join(&identity).await {
        Ok(slot) => slot_reply(state, &identity, Some(slot)).await,
        Err(e) => error_message(e),
    }
}

pub async fn handle_leave(state: &Arc<AppState>, identity: String) -> Option<ServerMessage> {
    if let Some(limited) = check_rate_limit(state, "leave", &identity).await {
        return Some(limited);
    }

    match state.registry.leave(&identity).await {
        Ok(released_slot) => Some(ServerMessage::Released {
            // leave() already validated the identity
            identity: Identity::parse(&identity).ok()?,
            released_slot,
        }),
        Err(e) => error_message(e),
    }
}

pub async fn handle_lookup(state: &Arc<AppState>, identity: String) -> Option<ServerMessage> {
    match state.registry.lookup_with_position(&identity).await {
        Ok((slot, position)) => Some(ServerMessage::Slot {
            identity: Identity::parse(&identity).ok()?,
            slot,
            position,
        }),
        Err(e) => error_message(e),
    }
}

pub async fn handle_list(state: &Arc<AppState>) -> Option<ServerMessage> {
    Some(ServerMessage::Queue {
        queue: state.registry.list().await,
    })
}

pub async fn handle_stats(state: &Arc<AppState>) -> Option<ServerMessage> {
    Some(ServerMessage::Stats {
        stats: state.registry.stats().await,
    })
}
