use super::scorer::RelevanceScorer;
use crate::storage::{get_one, set_one, KvStore, StorageArea, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Local-scope key holding the selection counts.
pub const USER_BEHAVIOR_KEY: &str = "userSearchBehavior";
pub const MAX_BEHAVIOR_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEntry {
    pub count: u64,
    /// Milliseconds since the epoch.
    pub last_used: i64,
}

/// How often, and how recently, the user picked each suggestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserBehaviorRecord {
    entries: HashMap<String, BehaviorEntry>,
}

impl UserBehaviorRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&BehaviorEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts one selection of `key` at `now`, evicting the least recently
    /// used entries once the record outgrows its bound.
    pub fn record(&mut self, key: &str, now: i64) {
        let entry = self.entries.entry(key.to_string()).or_insert(BehaviorEntry {
            count: 0,
            last_used: now,
        });
        entry.count += 1;
        entry.last_used = now;

        while self.entries.len() > MAX_BEHAVIOR_ENTRIES {
            let oldest = self
                .entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Multiplier applied to a suggestion's base relevance; 1.0 for keys never
    /// selected.
    pub fn factor(&self, key: &str, now: i64, scorer: &RelevanceScorer) -> f64 {
        match self.entries.get(key) {
            Some(entry) => scorer.behavior_factor(entry.count, entry.last_used, now),
            None => 1.0,
        }
    }
}

/// Loads and saves the record in the local storage area.
#[derive(Clone)]
pub struct UserBehaviorStore {
    store: Arc<dyn KvStore>,
}

impl UserBehaviorStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Missing or unreadable data yields an empty record.
    pub async fn load(&self) -> UserBehaviorRecord {
        match get_one(self.store.as_ref(), StorageArea::Local, USER_BEHAVIOR_KEY).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed {}: {}", USER_BEHAVIOR_KEY, e);
                UserBehaviorRecord::default()
            }),
            Ok(None) => UserBehaviorRecord::default(),
            Err(e) => {
                log::warn!("Failed to read {}: {}", USER_BEHAVIOR_KEY, e);
                UserBehaviorRecord::default()
            }
        }
    }

    pub async fn save(&self, record: &UserBehaviorRecord) -> Result<(), StorageError> {
        let value = serde_json::to_value(record)?;
        set_one(self.store.as_ref(), StorageArea::Local, USER_BEHAVIOR_KEY, value).await
    }

    /// Read-modify-write of a single selection.
    pub async fn record_selection(&self, key: &str, now: i64) -> Result<UserBehaviorRecord, StorageError> {
        let mut record = self.load().await;
        record.record(key, now);
        self.save(&record).await?;
        log::debug!("Recorded selection of {}", key);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_record_counts_and_refreshes() {
        let mut record = UserBehaviorRecord::new();
        record.record("https://a.test/", 10);
        record.record("https://a.test/", 20);
        let entry = record.get("https://a.test/").unwrap();
        assert_eq!(entry.count, 2);
        assert_eq!(entry.last_used, 20);
    }

    #[test]
    fn test_eviction_drops_oldest_last_used() {
        let mut record = UserBehaviorRecord::new();
        // Oldest entry sits in the middle of the insertion order.
        for i in 0..MAX_BEHAVIOR_ENTRIES as i64 {
            let last_used = if i == 500 { 1 } else { 1000 + i };
            record.record(&format!("key-{}", i), last_used);
        }
        assert_eq!(record.len(), MAX_BEHAVIOR_ENTRIES);

        record.record("fresh", 5000);

        assert_eq!(record.len(), MAX_BEHAVIOR_ENTRIES);
        assert!(record.get("key-500").is_none());
        assert!(record.get("key-0").is_some());
        assert!(record.get("fresh").is_some());
    }

    #[test]
    fn test_factor_defaults_to_one() {
        let scorer = RelevanceScorer::default();
        let mut record = UserBehaviorRecord::new();
        assert_eq!(record.factor("unknown", 0, &scorer), 1.0);
        record.record("k", 0);
        assert!(record.factor("k", 0, &scorer) > 1.0);
    }

    #[tokio::test]
    async fn test_store_round_trip_uses_wire_shape() {
        let kv = Arc::new(MemoryStore::new());
        let store = UserBehaviorStore::new(kv.clone());
        store.record_selection("https://a.test/", 42).await.unwrap();

        let raw = kv.dump(StorageArea::Local).await;
        assert_eq!(
            raw.get(USER_BEHAVIOR_KEY),
            Some(&json!({"https://a.test/": {"count": 1, "lastUsed": 42}}))
        );
        assert_eq!(store.load().await.get("https://a.test/").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_malformed_record_loads_empty() {
        let kv = Arc::new(MemoryStore::new());
        set_one(kv.as_ref(), StorageArea::Local, USER_BEHAVIOR_KEY, json!("nonsense"))
            .await
            .unwrap();
        let store = UserBehaviorStore::new(kv);
        assert!(store.load().await.is_empty());
    }
}
