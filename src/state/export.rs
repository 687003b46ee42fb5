//! Serializable queue snapshot.
//!
//! This is both the on-disk layout written by the file store and the body
//! of `GET /api/state/export`.

use crate::types::{Identity, Slot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Schema version for the persisted format
/// Version 1: versioned envelope around the identity -> slot map
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueExport {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    /// Identity (normalized) -> slot. Sorted by identity for stable diffs.
    pub assignments: BTreeMap<Identity, Slot>,
}

impl QueueExport {
    /// Create a new export with current timestamp
    pub fn new(assignments: &HashMap<Identity, Slot>) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            assignments: assignments
                .iter()
                .map(|(identity, slot)| (identity.clone(), *slot))
                .collect(),
        }
    }

    /// Wrap a bare identity -> slot map as written by older deployments
    pub fn from_legacy(assignments: BTreeMap<Identity, Slot>) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            assignments,
        }
    }

    pub fn into_map(self) -> HashMap<Identity, Slot> {
        self.assignments.into_iter().collect()
    }

    /// Validate the snapshot before it becomes registry state
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        let mut seen = HashSet::new();
        for (identity, slot) in &self.assignments {
            if *slot == 0 {
                return Err(format!("Identity '{}' holds non-positive slot 0", identity));
            }
            if !seen.insert(*slot) {
                return Err(format!(
                    "Slot {} is held by more than one identity (at '{}')",
                    slot, identity
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    #[test]
    fn test_export_contains_all_assignments() {
        let mut map = HashMap::new();
        map.insert(id("alice"), 1);
        map.insert(id("bob"), 2);

        let export = QueueExport::new(&map);
        assert_eq!(export.schema_version, EXPORT_SCHEMA_VERSION);
        assert!(export.validate().is_ok());
        assert_eq!(export.into_map(), map);
    }

    #[test]
    fn test_validation_duplicate_slot() {
        let mut assignments = BTreeMap::new();
        assignments.insert(id("alice"), 3);
        assignments.insert(id("bob"), 3);

        let result = QueueExport::from_legacy(assignments).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("more than one identity"));
    }

    #[test]
    fn test_validation_zero_slot() {
        let mut assignments = BTreeMap::new();
        assignments.insert(id("alice"), 0);

        let result = QueueExport::from_legacy(assignments).validate();
        assert!(result.unwrap_err().contains("non-positive"));
    }

    #[test]
    fn test_validation_future_schema() {
        let export = QueueExport {
            schema_version: EXPORT_SCHEMA_VERSION + 1,
            exported_at: chrono::Utc::now().to_rfc3339(),
            assignments: BTreeMap::new(),
        };

        let result = export.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("newer than supported"));
    }
}
