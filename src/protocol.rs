use crate::types::*;
use serde::{Deserialize, Serialize};

/// Protocol version announced in the welcome message
pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request a slot (idempotent)
    Join {
        identity: String,
    },
    /// Give up a slot (idempotent)
    Leave {
        identity: String,
    },
    Lookup {
        identity: String,
    },
    List,
    Stats,
    // Admin-only messages
    /// Force an identity onto an explicit slot
    Reassign {
        identity: String,
        slot: Slot,
    },
    /// Kick an identity from the queue
    Remove {
        identity: String,
    },
    /// Drop every assignment
    Clear,
    /// Set or clear the next chain hit time (ms since epoch)
    SetTarget {
        timestamp: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        queue: Vec<Assignment>,
        seq: u64,
        target: Option<i64>,
        server_now: String,
    },
    /// Pushed to every subscriber after each registry mutation
    QueueUpdate {
        queue: Vec<Assignment>,
        seq: u64,
    },
    TargetUpdate {
        target: Option<i64>,
    },
    Slot {
        identity: Identity,
        slot: Option<Slot>,
        /// 1-based rank in the queue view
        position: Option<usize>,
    },
    Released {
        identity: Identity,
        released_slot: Option<Slot>,
    },
    Queue {
        queue: Vec<Assignment>,
    },
    Stats {
        stats: QueueStats,
    },
    Cleared {
        removed: usize,
    },
    Error {
        code: String,
        msg: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_tagging() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"reassign","identity":"Alice","slot":4}"#).unwrap();
        match msg {
            ClientMessage::Reassign { identity, slot } => {
                assert_eq!(identity, "Alice");
                assert_eq!(slot, 4);
            }
            other => panic!("Unexpected message: {:?}", other),
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"t":"list"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::List));
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::Released {
            identity: Identity::parse("bob").unwrap(),
            released_slot: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "released");
        assert_eq!(json["identity"], "bob");
        assert!(json["released_slot"].is_null());
    }
}
