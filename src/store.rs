//! Durable backing store for the registry.
//!
//! The registry keeps the authoritative map in memory; a store is only
//! loaded once at startup and written after every successful mutation.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::{RegistryConfig, StoreKind};
use crate::error::StoreError;
use crate::state::export::QueueExport;
use crate::types::{Identity, Slot};

#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Read the full persisted snapshot. A store that has never been
    /// written returns an empty snapshot.
    async fn load(&self) -> Result<QueueExport, StoreError>;

    /// Replace the persisted snapshot
    async fn save(&self, snapshot: &QueueExport) -> Result<(), StoreError>;
}

/// Build the store selected by configuration
pub fn from_config(config: &RegistryConfig) -> Arc<dyn SlotStore> {
    match config.store {
        StoreKind::File => Arc::new(JsonFileStore::new(
            config.assign_file.clone(),
            config.persist_timeout,
        )),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    }
}

/// Whole-document JSON file, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    timeout: Duration,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl SlotStore for JsonFileStore {
    async fn load(&self) -> Result<QueueExport, StoreError> {
        let read = tokio::fs::read_to_string(&self.path);
        let contents = match tokio::time::timeout(self.timeout, read).await {
            Err(_) => return Err(StoreError::Timeout(self.timeout)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No assignment file yet, starting empty");
                return Ok(QueueExport::from_legacy(BTreeMap::new()));
            }
            Ok(Err(e)) => return Err(self.io_error(e)),
            Ok(Ok(contents)) => contents,
        };

        parse_document(&contents)
    }

    async fn save(&self, snapshot: &QueueExport) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let tmp = temp_path(&self.path);
        replace_atomic(&self.path, tmp.clone(), self.timeout, write_temp(tmp, json)).await?;

        tracing::debug!(
            path = %self.path.display(),
            assignments = snapshot.assignments.len(),
            "Assignments persisted"
        );
        Ok(())
    }
}

/// Accept both the versioned envelope and a bare `{ identity: slot }` map
fn parse_document(contents: &str) -> Result<QueueExport, StoreError> {
    if contents.trim().is_empty() {
        return Ok(QueueExport::from_legacy(BTreeMap::new()));
    }

    match serde_json::from_str::<QueueExport>(contents) {
        Ok(export) => Ok(export),
        Err(envelope_err) => match serde_json::from_str::<BTreeMap<Identity, Slot>>(contents) {
            Ok(legacy) => {
                tracing::warn!(
                    assignments = legacy.len(),
                    "Loaded legacy flat assignment map, it will be rewritten on next save"
                );
                Ok(QueueExport::from_legacy(legacy))
            }
            Err(_) => Err(StoreError::Malformed(envelope_err.to_string())),
        },
    }
}

/// Hidden sibling of `path`, unique per write
fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "assignments.json".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, ulid::Ulid::new()))
}

/// Create `tmp`, write `bytes` and fsync
async fn write_temp(tmp: PathBuf, bytes: Vec<u8>) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await
}

/// Run `stage` (which fills `tmp`) under `timeout`, then rename `tmp` over `path`.
///
/// Only staging is timed. Blocking fs work outlives a dropped future, so
/// staging runs in its own task; on timeout that task is left to finish and
/// the temp file is removed after it, and the rename is never issued. Once
/// the rename is issued its outcome is the result.
async fn replace_atomic<F>(
    path: &Path,
    tmp: PathBuf,
    timeout: Duration,
    stage: F,
) -> Result<(), StoreError>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let io_error = |source: std::io::Error| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut staging = tokio::spawn(stage);
    let staged = match tokio::time::timeout(timeout, &mut staging).await {
        Err(_) => {
            tracing::warn!(
                path = %path.display(),
                ?timeout,
                "Assignment write timed out, discarding staged file"
            );
            tokio::spawn(async move {
                let _ = staging.await;
                let _ = tokio::fs::remove_file(&tmp).await;
            });
            return Err(StoreError::Timeout(timeout));
        }
        Ok(Err(join_err)) => Err(std::io::Error::other(join_err)),
        Ok(Ok(result)) => result,
    };

    let result = match staged {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error(e));
    }
    Ok(())
}

/// In-process store. Can be switched unavailable to simulate outages.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<QueueExport>>,
    unavailable: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot
    pub fn seeded(snapshot: QueueExport) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Option<QueueExport> {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn load(&self) -> Result<QueueExport, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(self
            .snapshot
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| QueueExport::from_legacy(BTreeMap::new())))
    }

    async fn save(&self, snapshot: &QueueExport) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        *self.snapshot.lock().await = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
