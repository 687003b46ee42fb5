use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RegistryError;

/// Slot number handed out by the registry. Always strictly positive.
pub type Slot = u32;

/// Longest identity accepted after normalization
pub const MAX_IDENTITY_CHARS: usize = 64;

/// Case-insensitive participant key (chat handle or player name).
///
/// Always stored trimmed and lower-cased, so two handles differing only in
/// case compare equal and hash to the same map entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Normalize and validate a raw handle
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(RegistryError::InvalidInput(
                "identity must not be empty".to_string(),
            ));
        }
        if normalized.chars().count() > MAX_IDENTITY_CHARS {
            return Err(RegistryError::InvalidInput(format!(
                "identity exceeds {} characters",
                MAX_IDENTITY_CHARS
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Identity::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One entry of the queue view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub identity: Identity,
    pub slot: Slot,
}

/// Aggregate numbers for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queue_length: usize,
    pub capacity: usize,
    /// Slot the next new participant would receive
    pub next_slot: Slot,
}

/// Connection role on the real-time channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_case_insensitive() {
        let a = Identity::parse("Alice").unwrap();
        let b = Identity::parse("  aLiCe ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "alice");
    }

    #[test]
    fn test_identity_rejects_blank() {
        assert!(matches!(
            Identity::parse("   "),
            Err(RegistryError::InvalidInput(_))
        ));
        assert!(Identity::parse(&"x".repeat(MAX_IDENTITY_CHARS + 1)).is_err());
        assert!(Identity::parse(&"x".repeat(MAX_IDENTITY_CHARS)).is_ok());
    }

    #[test]
    fn test_identity_deserialize_normalizes() {
        let id: Identity = serde_json::from_str("\"Bob#1234\"").unwrap();
        assert_eq!(id.as_str(), "bob#1234");
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }
}
