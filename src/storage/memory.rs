use super::{KvStore, StorageArea, StorageError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process store holding all three areas in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    areas: RwLock<HashMap<StorageArea, Map<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything in the session area, as a host restart would.
    pub async fn clear_session(&self) {
        self.areas.write().await.remove(&StorageArea::Session);
    }

    /// Snapshot of one area, mostly useful for assertions.
    pub async fn dump(&self, area: StorageArea) -> Map<String, Value> {
        self.areas
            .read()
            .await
            .get(&area)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        let areas = self.areas.read().await;
        let mut out = Map::new();
        if let Some(values) = areas.get(&area) {
            for key in keys {
                if let Some(value) = values.get(*key) {
                    out.insert(key.to_string(), value.clone());
                }
            }
        }
        Ok(out)
    }

    async fn set(&self, area: StorageArea, items: Map<String, Value>) -> Result<(), StorageError> {
        let mut areas = self.areas.write().await;
        let values = areas.entry(area).or_default();
        for (key, value) in items {
            values.insert(key, value);
        }
        Ok(())
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        let mut areas = self.areas.write().await;
        if let Some(values) = areas.get_mut(&area) {
            for key in keys {
                values.remove(*key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_areas_are_isolated() {
        let store = MemoryStore::new();
        let mut items = Map::new();
        items.insert("k".to_string(), json!(1));
        store.set(StorageArea::Local, items).await.unwrap();

        let local = store.get(StorageArea::Local, &["k", "missing"]).await.unwrap();
        assert_eq!(local.get("k"), Some(&json!(1)));
        assert!(!local.contains_key("missing"));

        let sync = store.get(StorageArea::Sync, &["k"]).await.unwrap();
        assert!(sync.is_empty());
    }

    #[tokio::test]
    async fn test_clear_session_keeps_local() {
        let store = MemoryStore::new();
        let mut items = Map::new();
        items.insert("sidepanel_view".to_string(), json!(true));
        store.set(StorageArea::Session, items.clone()).await.unwrap();
        store.set(StorageArea::Local, items).await.unwrap();

        store.clear_session().await;

        assert!(store.dump(StorageArea::Session).await.is_empty());
        assert_eq!(store.dump(StorageArea::Local).await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();
        let mut items = Map::new();
        items.insert("a".to_string(), json!("x"));
        items.insert("b".to_string(), json!("y"));
        store.set(StorageArea::Sync, items).await.unwrap();
        store.remove(StorageArea::Sync, &["a"]).await.unwrap();

        let left = store.dump(StorageArea::Sync).await;
        assert!(!left.contains_key("a"));
        assert!(left.contains_key("b"));
    }
}
