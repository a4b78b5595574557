pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Which scope of the key-value store a read or write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    /// Replicated across the user's devices.
    Sync,
    /// Device-local, survives restarts.
    Local,
    /// Cleared when the host restarts.
    Session,
}

impl StorageArea {
    pub fn name(self) -> &'static str {
        match self {
            StorageArea::Sync => "sync",
            StorageArea::Local => "local",
            StorageArea::Session => "session",
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt {area} storage: {source}")]
    Corrupt {
        area: &'static str,
        source: serde_json::Error,
    },
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Asynchronous key-value store shared by every context.
///
/// There is no multi-key transaction: a read followed by a write can lose an
/// update made by another context in between.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the subset of `keys` present in `area`. Missing keys are absent
    /// from the map, not `null`.
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<Map<String, Value>, StorageError>;

    async fn set(&self, area: StorageArea, items: Map<String, Value>) -> Result<(), StorageError>;

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError>;
}

/// Reads a single key, returning `None` when it is absent.
pub async fn get_one(
    store: &dyn KvStore,
    area: StorageArea,
    key: &str,
) -> Result<Option<Value>, StorageError> {
    let mut values = store.get(area, &[key]).await?;
    Ok(values.remove(key))
}

/// Writes a single key.
pub async fn set_one(
    store: &dyn KvStore,
    area: StorageArea,
    key: &str,
    value: Value,
) -> Result<(), StorageError> {
    let mut items = Map::new();
    items.insert(key.to_string(), value);
    store.set(area, items).await
}
