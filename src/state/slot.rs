use super::{first_free_slot, sorted_queue, RegistryInner, SlotRegistry};
use crate::broadcast::QueueSnapshot;
use crate::error::RegistryError;
use crate::state::export::QueueExport;
use crate::types::*;
use std::collections::HashMap;
use tokio::sync::MutexGuard;

/// Result of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub slot: Slot,
    /// True when the identity already held `slot` before this call
    pub already_held: bool,
}

impl SlotRegistry {
    /// Give `identity` the lowest free slot, or return the one it already holds
    pub async fn join(&self, identity: &str) -> Result<Slot, RegistryError> {
        Ok(self.join_with_outcome(identity).await?.slot)
    }

    /// [`join`](Self::join), also reporting whether the slot was already held
    pub async fn join_with_outcome(&self, identity: &str) -> Result<JoinOutcome, RegistryError> {
        let identity = Identity::parse(identity)?;
        let guard = self.mutation.lock().await;

        let mut next = {
            let inner = self.inner.read().await;
            if let Some(slot) = inner.assignments.get(&identity) {
                return Ok(JoinOutcome {
                    slot: *slot,
                    already_held: true,
                });
            }
            if inner.assignments.len() >= self.config.max_participants {
                return Err(RegistryError::CapacityExceeded {
                    capacity: self.config.max_participants,
                });
            }
            inner.assignments.clone()
        };

        let slot = first_free_slot(&next);
        next.insert(identity.clone(), slot);
        self.commit(&guard, next).await?;

        tracing::info!(%identity, slot, "Slot assigned");
        Ok(JoinOutcome {
            slot,
            already_held: false,
        })
    }

    /// Release `identity`'s slot. Leaving without a slot is a no-op.
    pub async fn leave(&self, identity: &str) -> Result<Option<Slot>, RegistryError> {
        let identity = Identity::parse(identity)?;
        let released = self.release(&identity).await?;
        if let Some(slot) = released {
            tracing::info!(%identity, slot, "Slot released");
        }
        Ok(released)
    }

    /// Like [`leave`](Self::leave) but an identity without a slot is an error
    pub async fn leave_required(&self, identity: &str) -> Result<Slot, RegistryError> {
        let parsed = Identity::parse(identity)?;
        self.leave(identity)
            .await?
            .ok_or(RegistryError::NotFound(parsed))
    }

    /// Admin kick. Same effect as the participant leaving.
    pub async fn remove(&self, identity: &str) -> Result<Option<Slot>, RegistryError> {
        let identity = Identity::parse(identity)?;
        let released = self.release(&identity).await?;
        tracing::info!(%identity, released = ?released, "Admin removed participant");
        Ok(released)
    }

    /// Force `identity` onto `slot`.
    ///
    /// A slot held by a different identity is never taken over: the call
    /// fails with `SlotConflict` and nothing changes.
    pub async fn reassign(&self, identity: &str, slot: Slot) -> Result<Slot, RegistryError> {
        let identity = Identity::parse(identity)?;
        if slot == 0 {
            return Err(RegistryError::InvalidInput(
                "slot must be a positive integer".to_string(),
            ));
        }
        if slot > self.config.max_slot {
            return Err(RegistryError::InvalidInput(format!(
                "slot {} exceeds maximum {}",
                slot, self.config.max_slot
            )));
        }

        let guard = self.mutation.lock().await;

        let mut next = {
            let inner = self.inner.read().await;
            if let Some((holder, _)) = inner
                .assignments
                .iter()
                .find(|(holder, held)| **held == slot && **holder != identity)
            {
                return Err(RegistryError::SlotConflict {
                    slot,
                    holder: holder.clone(),
                });
            }
            if !inner.assignments.contains_key(&identity)
                && inner.assignments.len() >= self.config.max_participants
            {
                return Err(RegistryError::CapacityExceeded {
                    capacity: self.config.max_participants,
                });
            }
            inner.assignments.clone()
        };

        let previous = next.insert(identity.clone(), slot);
        self.commit(&guard, next).await?;

        tracing::info!(%identity, slot, previous = ?previous, "Slot reassigned by admin");
        Ok(slot)
    }

    /// Drop every assignment. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, RegistryError> {
        let guard = self.mutation.lock().await;

        let removed = self.inner.read().await.assignments.len();
        if removed == 0 {
            return Ok(0);
        }

        self.commit(&guard, HashMap::new()).await?;
        tracing::info!(removed, "Queue cleared by admin");
        Ok(removed)
    }

    async fn release(&self, identity: &Identity) -> Result<Option<Slot>, RegistryError> {
        let guard = self.mutation.lock().await;

        let mut next = {
            let inner = self.inner.read().await;
            if !inner.assignments.contains_key(identity) {
                return Ok(None);
            }
            inner.assignments.clone()
        };

        let released = next.remove(identity);
        self.commit(&guard, next).await?;
        Ok(released)
    }

    /// Persist `next`, swap it in, then publish it.
    ///
    /// Callers must hold the mutation lock; taking the guard by reference
    /// makes that explicit. If the store write fails nothing else happens.
    async fn commit(
        &self,
        _guard: &MutexGuard<'_, ()>,
        next: HashMap<Identity, Slot>,
    ) -> Result<(), RegistryError> {
        self.store.save(&QueueExport::new(&next)).await?;

        let queue = sorted_queue(&next);
        let seq = {
            let mut inner = self.inner.write().await;
            let seq = inner.seq + 1;
            *inner = RegistryInner {
                assignments: next,
                seq,
            };
            seq
        };

        self.publisher.publish(QueueSnapshot { seq, queue });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RegistryConfig;
    use crate::error::RegistryError;
    use crate::state::tests::{registry, registry_with};
    use crate::state::SlotRegistry;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_join_assigns_sequential_slots() {
        let (registry, _, _) = registry();
        assert_eq!(registry.join("a").await.unwrap(), 1);
        assert_eq!(registry.join("b").await.unwrap(), 2);
        assert_eq!(registry.join("c").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_join_fills_first_gap() {
        let (registry, _, _) = registry();
        registry.reassign("a", 1).await.unwrap();
        registry.reassign("b", 2).await.unwrap();
        registry.reassign("d", 4).await.unwrap();

        assert_eq!(registry.join("newcomer").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let (registry, store, publisher) = registry();
        registry.join("bob").await.unwrap();
        let first = registry.join("alice").await.unwrap();
        let saves = store.save_count();
        let published = publisher.count();

        let second = registry.join("alice").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.lookup("bob").await.unwrap(), Some(1));
        // A repeat join is not a mutation
        assert_eq!(store.save_count(), saves);
        assert_eq!(publisher.count(), published);
    }

    #[tokio::test]
    async fn test_join_rejects_empty_identity() {
        let (registry, _, publisher) = registry();
        let result = registry.join("   ").await;
        assert!(matches!(result, Err(RegistryError::InvalidInput(_))));
        assert_eq!(publisher.count(), 0);
    }

    #[tokio::test]
    async fn test_join_respects_capacity() {
        let config = RegistryConfig {
            max_participants: 2,
            ..RegistryConfig::default()
        };
        let (registry, _, _) = registry_with(config);
        registry.join("a").await.unwrap();
        registry.join("b").await.unwrap();

        let result = registry.join("c").await;
        assert!(matches!(
            result,
            Err(RegistryError::CapacityExceeded { capacity: 2 })
        ));
        // Existing holders still get their slot back
        assert_eq!(registry.join("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let (registry, store, publisher) = registry();
        registry.join("alice").await.unwrap();
        let saves = store.save_count();

        assert_eq!(registry.leave("bob").await.unwrap(), None);
        assert_eq!(store.save_count(), saves);
        assert_eq!(publisher.count(), 1);
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_leave_required_reports_not_found() {
        let (registry, _, _) = registry();
        assert!(matches!(
            registry.leave_required("ghost").await,
            Err(RegistryError::NotFound(_))
        ));

        registry.join("ghost").await.unwrap();
        assert_eq!(registry.leave_required("GHOST").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_released_slot_is_reused() {
        let (registry, _, _) = registry();
        assert_eq!(registry.join("a").await.unwrap(), 1);
        assert_eq!(registry.join("b").await.unwrap(), 2);
        assert_eq!(registry.leave("a").await.unwrap(), Some(1));
        assert_eq!(registry.join("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reassign_rejects_conflict() {
        let (registry, store, publisher) = registry();
        registry.join("alice").await.unwrap();
        registry.join("bob").await.unwrap();
        let saves = store.save_count();

        match registry.reassign("alice", 2).await {
            Err(RegistryError::SlotConflict { slot, holder }) => {
                assert_eq!(slot, 2);
                assert_eq!(holder.as_str(), "bob");
            }
            other => panic!("Expected SlotConflict, got {:?}", other),
        }
        assert_eq!(registry.lookup("alice").await.unwrap(), Some(1));
        assert_eq!(store.save_count(), saves);
        assert_eq!(publisher.count(), 2);
    }

    #[tokio::test]
    async fn test_reassign_moves_identity() {
        let (registry, _, publisher) = registry();
        registry.join("alice").await.unwrap();

        assert_eq!(registry.reassign("Alice", 10).await.unwrap(), 10);
        assert_eq!(registry.lookup("alice").await.unwrap(), Some(10));
        // Slot 1 is free again
        assert_eq!(registry.join("bob").await.unwrap(), 1);
        assert_eq!(publisher.count(), 3);
    }

    #[tokio::test]
    async fn test_reassign_same_slot_publishes() {
        let (registry, _, publisher) = registry();
        registry.join("alice").await.unwrap();
        registry.reassign("alice", 1).await.unwrap();
        assert_eq!(publisher.count(), 2);
    }

    #[tokio::test]
    async fn test_reassign_validates_slot() {
        let (registry, _, _) = registry();
        assert!(matches!(
            registry.reassign("alice", 0).await,
            Err(RegistryError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.reassign("alice", 100_001).await,
            Err(RegistryError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (registry, _, publisher) = registry();
        registry.join("a").await.unwrap();
        registry.join("b").await.unwrap();

        assert_eq!(registry.remove("a").await.unwrap(), Some(1));
        assert_eq!(registry.remove("a").await.unwrap(), None);
        assert_eq!(registry.clear().await.unwrap(), 1);
        assert_eq!(registry.clear().await.unwrap(), 0);
        assert!(registry.list().await.is_empty());
        // join, join, remove, clear
        assert_eq!(publisher.count(), 4);
    }

    #[tokio::test]
    async fn test_persistence_failure_changes_nothing() {
        let (registry, store, publisher) = registry();
        registry.join("alice").await.unwrap();
        store.set_available(false);

        assert!(matches!(
            registry.join("bob").await,
            Err(RegistryError::Persistence(_))
        ));
        assert!(matches!(
            registry.leave("alice").await,
            Err(RegistryError::Persistence(_))
        ));
        assert!(matches!(
            registry.reassign("alice", 5).await,
            Err(RegistryError::Persistence(_))
        ));

        assert_eq!(registry.lookup("bob").await.unwrap(), None);
        assert_eq!(registry.lookup("alice").await.unwrap(), Some(1));
        assert_eq!(publisher.count(), 1);

        store.set_available(true);
        assert_eq!(registry.join("bob").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_each_mutation_publishes_post_state() {
        let (registry, store, publisher) = registry();
        registry.join("a").await.unwrap();
        registry.join("b").await.unwrap();
        registry.leave("a").await.unwrap();

        assert_eq!(publisher.count(), 3);
        let last = publisher.last().unwrap();
        assert_eq!(last.seq, 3);
        assert_eq!(last.queue.len(), 1);
        assert_eq!(last.queue[0].identity.as_str(), "b");

        let stored = store.stored().await.unwrap();
        assert_eq!(stored.assignments.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_never_collide() {
        let (registry, _, publisher) = registry();
        let registry: Arc<SlotRegistry> = Arc::new(registry);
        let n = 64;

        let handles: Vec<_> = (0..n)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.join(&format!("user{}", i)).await.unwrap() })
            })
            .collect();

        let mut slots = HashSet::new();
        for handle in handles {
            assert!(slots.insert(handle.await.unwrap()));
        }

        let expected: HashSet<u32> = (1..=n).collect();
        assert_eq!(slots, expected);
        assert_eq!(publisher.count(), n as usize);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_mutations_keep_slots_unique() {
        let (registry, _, _) = registry();
        let registry: Arc<SlotRegistry> = Arc::new(registry);

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let name = format!("user{}", i % 10);
                    match i % 4 {
                        0 | 1 => {
                            registry.join(&name).await.unwrap();
                        }
                        2 => {
                            registry.leave(&name).await.unwrap();
                        }
                        _ => {
                            let _ = registry.reassign(&name, (i % 7) + 1).await;
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let queue = registry.list().await;
        let unique: HashSet<_> = queue.iter().map(|a| a.slot).collect();
        assert_eq!(unique.len(), queue.len());
    }
}
