use super::{first_free_slot, sorted_queue, SlotRegistry};
use crate::broadcast::QueueSnapshot;
use crate::error::RegistryError;
use crate::state::export::QueueExport;
use crate::types::*;

impl SlotRegistry {
    /// Current slot of `identity`, if any
    pub async fn lookup(&self, identity: &str) -> Result<Option<Slot>, RegistryError> {
        let identity = Identity::parse(identity)?;
        Ok(self.inner.read().await.assignments.get(&identity).copied())
    }

    /// Like [`lookup`](Self::lookup) but a missing slot is an error
    pub async fn lookup_required(&self, identity: &str) -> Result<Slot, RegistryError> {
        let parsed = Identity::parse(identity)?;
        self.lookup(identity)
            .await?
            .ok_or(RegistryError::NotFound(parsed))
    }

    /// All assignments, ascending by slot
    pub async fn list(&self) -> Vec<Assignment> {
        sorted_queue(&self.inner.read().await.assignments)
    }

    /// 1-based rank of `identity` in [`list`](Self::list) order
    pub async fn position(&self, identity: &str) -> Result<Option<usize>, RegistryError> {
        let identity = Identity::parse(identity)?;
        Ok(self
            .list()
            .await
            .iter()
            .position(|a| a.identity == identity)
            .map(|idx| idx + 1))
    }

    /// Slot and queue rank read from the same state
    pub async fn lookup_with_position(
        &self,
        identity: &str,
    ) -> Result<(Option<Slot>, Option<usize>), RegistryError> {
        let identity = Identity::parse(identity)?;
        let inner = self.inner.read().await;
        let slot = inner.assignments.get(&identity).copied();
        let position = slot.map(|slot| {
            inner
                .assignments
                .values()
                .filter(|held| **held < slot)
                .count()
                + 1
        });
        Ok((slot, position))
    }

    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.read().await;
        QueueStats {
            queue_length: inner.assignments.len(),
            capacity: self.config.max_participants,
            next_slot: first_free_slot(&inner.assignments),
        }
    }

    /// Queue and sequence number as of the last completed mutation
    pub async fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.read().await;
        QueueSnapshot {
            seq: inner.seq,
            queue: sorted_queue(&inner.assignments),
        }
    }

    /// Read-only copy in the persisted layout, for diagnostics
    pub async fn export(&self) -> QueueExport {
        QueueExport::new(&self.inner.read().await.assignments)
    }
}
