//! WebSocket message dispatch
//!
//! This module provides the main entry point for handling client messages.
//! Authorization is checked here, then dispatched to role-specific handler modules.

use crate::error::RegistryError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::{admin, member};

/// Macro to check admin authorization and return early if unauthorized
macro_rules! check_admin {
    ($role:expr, $action:expr) => {
        if *$role != Role::Admin {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only admins can {}", $action),
            });
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    role: &Role,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        // Member messages
        ClientMessage::Join { identity } => member::handle_join(state, identity).await,

        ClientMessage::Leave { identity } => member::handle_leave(state, identity).await,

        ClientMessage::Lookup { identity } => member::handle_lookup(state, identity).await,

        ClientMessage::List => member::handle_list(state).await,

        ClientMessage::Stats => member::handle_stats(state).await,

        // Admin-only commands (authorization checked before dispatch)
        ClientMessage::Reassign { identity, slot } => {
            check_admin!(role, "reassign slots");
            admin::handle_reassign(state, identity, slot).await
        }

        ClientMessage::Remove { identity } => {
            check_admin!(role, "remove participants");
            admin::handle_remove(state, identity).await
        }

        ClientMessage::Clear => {
            check_admin!(role, "clear the queue");
            admin::handle_clear(state).await
        }

        ClientMessage::SetTarget { timestamp } => {
            check_admin!(role, "set the chain target");
            admin::handle_set_target(state, timestamp).await
        }
    }
}

/// Render a registry failure as a socket error message
pub(crate) fn error_message(err: RegistryError) -> Option<ServerMessage> {
    if let RegistryError::Persistence(ref e) = err {
        tracing::error!(error = %e, "Registry write failed");
    }
    Some(ServerMessage::Error {
        code: err.kind().to_string(),
        msg: err.to_string(),
    })
}
