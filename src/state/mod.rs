pub mod export;
mod query;
mod slot;
mod target;

pub use slot::JoinOutcome;

use crate::auth::AuthConfig;
use crate::abuse::RateLimiter;
use crate::broadcast::{ChannelPublisher, SnapshotPublisher};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, StoreError};
use crate::protocol::ServerMessage;
use crate::store::{MemoryStore, SlotStore};
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Registry contents guarded together so readers never see a map without
/// its matching sequence number.
#[derive(Debug, Default, Clone)]
struct RegistryInner {
    assignments: HashMap<Identity, Slot>,
    seq: u64,
}

/// Authoritative identity -> slot map.
///
/// Mutations are serialized through `mutation`; each one persists the
/// full next state before swapping it in and publishing a snapshot, so a
/// failed write leaves both memory and subscribers untouched. Reads only
/// take the `inner` read lock and may proceed while a write is in flight.
pub struct SlotRegistry {
    inner: RwLock<RegistryInner>,
    mutation: Mutex<()>,
    store: Arc<dyn SlotStore>,
    publisher: Arc<dyn SnapshotPublisher>,
    config: RegistryConfig,
}

impl SlotRegistry {
    /// Empty registry. Nothing is read from `store` until the first write.
    pub fn new(
        store: Arc<dyn SlotStore>,
        publisher: Arc<dyn SnapshotPublisher>,
        config: RegistryConfig,
    ) -> Self {
        Self::with_assignments(HashMap::new(), store, publisher, config)
    }

    /// Registry seeded from whatever `store` currently holds
    pub async fn load(
        store: Arc<dyn SlotStore>,
        publisher: Arc<dyn SnapshotPublisher>,
        config: RegistryConfig,
    ) -> Result<Self, RegistryError> {
        let export = store.load().await?;
        export.validate().map_err(StoreError::Malformed)?;

        let assignments = export.into_map();
        if assignments.len() > config.max_participants {
            tracing::warn!(
                loaded = assignments.len(),
                capacity = config.max_participants,
                "Persisted queue is larger than configured capacity, new joins will be refused"
            );
        }
        tracing::info!(assignments = assignments.len(), "Registry loaded");

        Ok(Self::with_assignments(assignments, store, publisher, config))
    }

    fn with_assignments(
        assignments: HashMap<Identity, Slot>,
        store: Arc<dyn SlotStore>,
        publisher: Arc<dyn SnapshotPublisher>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                assignments,
                seq: 0,
            }),
            mutation: Mutex::new(()),
            store,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

/// Lowest positive integer not held by anyone
pub(crate) fn first_free_slot(assignments: &HashMap<Identity, Slot>) -> Slot {
    let taken: HashSet<Slot> = assignments.values().copied().collect();
    let mut next = 1;
    while taken.contains(&next) {
        next += 1;
    }
    next
}

/// Ascending by slot; ties (which the uniqueness invariant rules out) by identity
pub(crate) fn sorted_queue(assignments: &HashMap<Identity, Slot>) -> Vec<Assignment> {
    let mut queue: Vec<Assignment> = assignments
        .iter()
        .map(|(identity, slot)| Assignment {
            identity: identity.clone(),
            slot: *slot,
        })
        .collect();
    queue.sort_by(|a, b| a.slot.cmp(&b.slot).then_with(|| a.identity.cmp(&b.identity)));
    queue
}

/// Shared application state handed to every transport
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SlotRegistry>,
    /// Admin-set time of the next chain hit (ms since epoch)
    pub target: Arc<RwLock<Option<i64>>>,
    /// Broadcast channel for sending messages to all connected clients
    pub broadcast: broadcast::Sender<ServerMessage>,
    pub auth: Arc<AuthConfig>,
    /// Per-identity limiter for mutating requests (None = disabled)
    pub rate_limiter: Option<RateLimiter>,
}

impl AppState {
    /// Load the registry from `store` and wire it to the broadcast channel
    pub async fn load(
        config: RegistryConfig,
        store: Arc<dyn SlotStore>,
    ) -> Result<Self, RegistryError> {
        let (tx, _rx) = broadcast::channel(config.broadcast_capacity);
        let publisher = Arc::new(ChannelPublisher::new(tx.clone()));
        let registry = SlotRegistry::load(store, publisher, config).await?;
        Ok(Self::from_parts(Arc::new(registry), tx))
    }

    /// Empty registry over a fresh memory store, no auth, no rate limiting
    pub fn in_memory() -> Self {
        Self::with_store(RegistryConfig::default(), Arc::new(MemoryStore::new()))
    }

    /// Empty registry over the given store, without loading from it
    pub fn with_store(config: RegistryConfig, store: Arc<dyn SlotStore>) -> Self {
        let (tx, _rx) = broadcast::channel(config.broadcast_capacity);
        let publisher = Arc::new(ChannelPublisher::new(tx.clone()));
        let registry = SlotRegistry::new(store, publisher, config);
        Self::from_parts(Arc::new(registry), tx)
    }

    fn from_parts(registry: Arc<SlotRegistry>, broadcast: broadcast::Sender<ServerMessage>) -> Self {
        Self {
            registry,
            target: Arc::new(RwLock::new(None)),
            broadcast,
            auth: Arc::new(AuthConfig::disabled()),
            rate_limiter: None,
        }
    }

    pub fn with_auth(mut self, auth: Arc<AuthConfig>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Option<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}
