//! Chat-bot command adapter.
//!
//! Maps `!joinchain`-style chat messages onto registry calls and renders
//! the reply text. The bot process itself only forwards messages here.

use crate::error::RegistryError;
use crate::state::SlotRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    JoinChain,
    LeaveChain,
    Me,
    Chain,
    Position,
}

impl ChatCommand {
    /// Recognize a command message. Anything else is not for us.
    pub fn parse(content: &str) -> Option<Self> {
        let word = content.split_whitespace().next()?;
        match word.to_lowercase().as_str() {
            "!joinchain" => Some(Self::JoinChain),
            "!leavechain" => Some(Self::LeaveChain),
            "!me" => Some(Self::Me),
            "!chain" => Some(Self::Chain),
            "!position" => Some(Self::Position),
            _ => None,
        }
    }
}

/// Run `command` for chat user `user` and return the reply text
pub async fn execute(
    registry: &SlotRegistry,
    user: &str,
    command: ChatCommand,
) -> Result<String, RegistryError> {
    let reply = match command {
        ChatCommand::JoinChain => {
            let outcome = registry.join_with_outcome(user).await?;
            if outcome.already_held {
                format!("You already have chain #{}", outcome.slot)
            } else {
                format!("You've been assigned chain #{}", outcome.slot)
            }
        }
        ChatCommand::LeaveChain => match registry.leave(user).await? {
            Some(slot) => format!("You left chain #{}", slot),
            None => "You have no chain assigned.".to_string(),
        },
        ChatCommand::Me => match registry.lookup(user).await? {
            Some(slot) => format!("Your chain number is #{}", slot),
            None => "You don't have one yet. Use !joinchain".to_string(),
        },
        ChatCommand::Chain => {
            let queue = registry.list().await;
            if queue.is_empty() {
                "Current chain assignments:\nNo assignments yet.".to_string()
            } else {
                let lines: Vec<String> = queue
                    .iter()
                    .map(|a| format!("{}: #{}", a.identity, a.slot))
                    .collect();
                format!("Current chain assignments:\n{}", lines.join("\n"))
            }
        }
        ChatCommand::Position => match registry.lookup_with_position(user).await? {
            (Some(slot), Some(position)) => {
                format!("You are #{} in the queue (chain #{})", position, slot)
            }
            _ => "You are not in the queue. Use !joinchain".to_string(),
        },
    };
    Ok(reply)
}

/// Handle one chat message. `None` means the message gets no reply.
pub async fn handle_chat_message(
    registry: &SlotRegistry,
    user: &str,
    content: &str,
) -> Option<String> {
    let command = ChatCommand::parse(content)?;
    tracing::debug!(user, ?command, "Chat command received");

    match execute(registry, user, command).await {
        Ok(reply) => Some(reply),
        Err(e) => {
            tracing::warn!(user, ?command, error = %e, "Chat command failed");
            Some(error_reply(&e))
        }
    }
}

fn error_reply(err: &RegistryError) -> String {
    match err {
        RegistryError::CapacityExceeded { .. } => "The chain queue is full.".to_string(),
        RegistryError::InvalidInput(reason) => format!("Can't do that: {}", reason),
        RegistryError::Persistence(_) => {
            "Couldn't save the queue right now, please try again shortly.".to_string()
        }
        other => other.to_string(),
    }
}
