use crate::storage::{KvStore, StorageArea, StorageError};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Local-scope key holding the ordered list of visited locations.
pub const HISTORY_KEY: &str = "sidePanelHistory";
/// Local-scope key holding the position inside [`HISTORY_KEY`].
pub const CURRENT_INDEX_KEY: &str = "sidePanelCurrentIndex";
/// The side panel's own start page.
pub const DEFAULT_HOME: &str = "src/sidepanel.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Back,
    Forward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Back => f.write_str("back"),
            Direction::Forward => f.write_str("forward"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// Stepping past the start or end of the history.
    #[error("Cannot navigate {0}: no history in that direction")]
    NoHistory(Direction),
}

/// Side-panel navigation history: visited locations plus a cursor.
///
/// Once anything has been recorded, `entries` is non-empty and
/// `current_index < entries.len()`. Two adjacent entries are never equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationHistory {
    entries: Vec<String>,
    current_index: usize,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A history containing only the home location.
    pub fn seeded(home: &str) -> Self {
        Self {
            entries: vec![home.to_string()],
            current_index: 0,
        }
    }

    /// Rebuilds a history from persisted parts. Returns `None` for an empty
    /// entry list; an out-of-range index is clamped to the last entry.
    pub fn from_parts(entries: Vec<String>, current_index: usize) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        let last = entries.len() - 1;
        Some(Self {
            entries,
            current_index: current_index.min(last),
        })
    }

    /// Folds a navigation to `location` into the history, discarding any
    /// forward entries. An empty history is seeded with `home` first.
    pub fn record(&mut self, home: &str, location: &str) {
        if self.entries.is_empty() {
            self.entries.push(home.to_string());
            self.current_index = 0;
        }

        self.entries.truncate(self.current_index + 1);

        // Landing on the entry we are already at adds nothing.
        if self.entries.last().map(String::as_str) == Some(location) {
            self.current_index = self.entries.len() - 1;
            return;
        }

        self.entries.push(location.to_string());
        self.current_index = self.entries.len() - 1;
    }

    pub fn step_back(&mut self) -> Result<&str, HistoryError> {
        if !self.can_go_back() {
            return Err(HistoryError::NoHistory(Direction::Back));
        }
        self.current_index -= 1;
        Ok(&self.entries[self.current_index])
    }

    pub fn step_forward(&mut self) -> Result<&str, HistoryError> {
        if !self.can_go_forward() {
            return Err(HistoryError::NoHistory(Direction::Forward));
        }
        self.current_index += 1;
        Ok(&self.entries[self.current_index])
    }

    pub fn step(&mut self, direction: Direction) -> Result<&str, HistoryError> {
        match direction {
            Direction::Back => self.step_back(),
            Direction::Forward => self.step_forward(),
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.current_index).map(String::as_str)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn can_go_back(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        !self.entries.is_empty() && self.current_index < self.entries.len() - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a loaded history came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOrigin {
    Stored,
    /// Nothing has been recorded yet.
    Absent,
    /// Stored state exists but cannot be decoded.
    Malformed,
    /// The read failed; whatever is stored is still there and must not be
    /// written over.
    Unreadable(String),
}

/// Result of [`NavigationHistoryStore::load`].
#[derive(Debug, Clone)]
pub struct LoadedHistory {
    pub history: NavigationHistory,
    pub origin: HistoryOrigin,
}

impl LoadedHistory {
    /// True when `history` is the home seed rather than stored state.
    pub fn is_seeded(&self) -> bool {
        self.origin != HistoryOrigin::Stored
    }

    pub fn read_error(&self) -> Option<&str> {
        match &self.origin {
            HistoryOrigin::Unreadable(e) => Some(e.as_str()),
            _ => None,
        }
    }
}

/// Reads and writes the navigation history in the local storage area.
/// One history stream is shared by every side-panel instance.
#[derive(Clone)]
pub struct NavigationHistoryStore {
    store: Arc<dyn KvStore>,
    home: String,
}

impl NavigationHistoryStore {
    pub fn new(store: Arc<dyn KvStore>, home: impl Into<String>) -> Self {
        Self {
            store,
            home: home.into(),
        }
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    /// Loads the stored history. Never fails: missing, malformed or
    /// unreadable state yields the home seed, tagged with its origin.
    pub async fn load(&self) -> LoadedHistory {
        let values = match self
            .store
            .get(StorageArea::Local, &[HISTORY_KEY, CURRENT_INDEX_KEY])
            .await
        {
            Ok(values) => values,
            Err(e) => {
                log::warn!("Failed to read navigation history: {}", e);
                return self.seed(HistoryOrigin::Unreadable(e.to_string()));
            }
        };

        let entries = match values.get(HISTORY_KEY) {
            Some(value) => match serde_json::from_value::<Vec<String>>(value.clone()) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Stored navigation history is malformed: {}", e);
                    return self.seed(HistoryOrigin::Malformed);
                }
            },
            None => return self.seed(HistoryOrigin::Absent),
        };

        let Some(index) = values.get(CURRENT_INDEX_KEY).and_then(Value::as_u64) else {
            log::warn!("Stored navigation history has no usable index");
            return self.seed(HistoryOrigin::Malformed);
        };

        match NavigationHistory::from_parts(entries, index as usize) {
            Some(history) => {
                if history.current_index() != index as usize {
                    log::warn!(
                        "Stored history index {} out of range, clamped to {}",
                        index,
                        history.current_index()
                    );
                }
                LoadedHistory {
                    history,
                    origin: HistoryOrigin::Stored,
                }
            }
            None => self.seed(HistoryOrigin::Absent),
        }
    }

    fn seed(&self, origin: HistoryOrigin) -> LoadedHistory {
        LoadedHistory {
            history: NavigationHistory::seeded(&self.home),
            origin,
        }
    }

    /// Writes entries and cursor.
    pub async fn persist(&self, history: &NavigationHistory) -> Result<(), StorageError> {
        let mut items = Map::new();
        items.insert(HISTORY_KEY.to_string(), json!(history.entries()));
        items.insert(CURRENT_INDEX_KEY.to_string(), json!(history.current_index()));
        self.store.set(StorageArea::Local, items).await?;
        log::debug!(
            "Persisted navigation history: {} entries, index {}",
            history.len(),
            history.current_index()
        );
        Ok(())
    }

    /// Writes only the cursor, for back/forward steps that leave entries alone.
    pub async fn persist_position(&self, history: &NavigationHistory) -> Result<(), StorageError> {
        let mut items = Map::new();
        items.insert(CURRENT_INDEX_KEY.to_string(), json!(history.current_index()));
        self.store.set(StorageArea::Local, items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    const HOME: &str = "home";

    fn history_of(entries: &[&str], index: usize) -> NavigationHistory {
        NavigationHistory::from_parts(entries.iter().map(|e| e.to_string()).collect(), index).unwrap()
    }

    #[test]
    fn test_history_navigation() {
        let mut history = NavigationHistory::new();

        history.record(HOME, "https://example.com");
        history.record(HOME, "https://example.com/page1");
        history.record(HOME, "https://example.com/page2");

        assert_eq!(history.entries()[0], HOME);
        assert_eq!(history.current(), Some("https://example.com/page2"));
        assert!(history.can_go_back());
        assert!(!history.can_go_forward());

        history.step_back().unwrap();
        assert_eq!(history.current(), Some("https://example.com/page1"));

        history.step_back().unwrap();
        history.step_back().unwrap();
        assert_eq!(history.current(), Some(HOME));
        assert!(!history.can_go_back());
        assert!(history.can_go_forward());

        history.step_forward().unwrap();
        assert_eq!(history.current(), Some("https://example.com"));
    }

    #[test]
    fn test_record_lands_on_new_location() {
        let mut history = history_of(&[HOME, "/a", "/b"], 1);
        history.record(HOME, "/x");
        assert_eq!(history.current(), Some("/x"));
        assert!(!history.can_go_forward());
    }

    #[test]
    fn test_record_truncates_forward_entries() {
        let mut history = history_of(&["A", "B", "C", "D"], 1);
        history.record("A", "X");
        assert_eq!(history.entries(), &["A", "B", "X"]);
        assert_eq!(history.current_index(), 2);
    }

    #[test]
    fn test_home_seed_is_idempotent() {
        let mut history = NavigationHistory::new();
        history.record(HOME, HOME);
        assert_eq!(history.entries(), &[HOME]);
        assert_eq!(history.current_index(), 0);

        history.record(HOME, HOME);
        assert_eq!(history.entries(), &[HOME]);
        assert_eq!(history.current_index(), 0);
    }

    #[test]
    fn test_no_adjacent_home_duplicate_after_truncation() {
        let mut history = history_of(&[HOME, "/a", HOME, "/b"], 2);
        history.record(HOME, HOME);
        assert_eq!(history.entries(), &[HOME, "/a", HOME]);
        assert_eq!(history.current_index(), 2);
    }

    #[test]
    fn test_back_then_forward_restores_position() {
        let mut history = history_of(&[HOME, "/a", "/b"], 2);
        let before = history.clone();
        history.step_back().unwrap();
        history.step_forward().unwrap();
        assert_eq!(history, before);
    }

    #[test]
    fn test_step_rejections_leave_history_untouched() {
        let mut history = history_of(&[HOME, "/a"], 0);
        let before = history.clone();
        assert_eq!(
            history.step_back(),
            Err(HistoryError::NoHistory(Direction::Back))
        );
        assert_eq!(history, before);

        let mut history = history_of(&[HOME, "/a"], 1);
        let before = history.clone();
        assert_eq!(
            history.step_forward(),
            Err(HistoryError::NoHistory(Direction::Forward))
        );
        assert_eq!(history, before);
    }

    #[test]
    fn test_from_parts_clamps_index() {
        let history = history_of(&[HOME, "/a"], 9);
        assert_eq!(history.current_index(), 1);
        assert!(NavigationHistory::from_parts(Vec::new(), 0).is_none());
    }

    #[tokio::test]
    async fn test_load_seeds_when_absent() {
        let store = NavigationHistoryStore::new(Arc::new(MemoryStore::new()), HOME);
        let loaded = store.load().await;
        assert_eq!(loaded.origin, HistoryOrigin::Absent);
        assert!(loaded.is_seeded());
        assert_eq!(loaded.history.entries(), &[HOME]);
        assert_eq!(loaded.history.current_index(), 0);
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let store = NavigationHistoryStore::new(Arc::new(MemoryStore::new()), HOME);
        let history = history_of(&[HOME, "/a", "/b"], 1);
        store.persist(&history).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.origin, HistoryOrigin::Stored);
        assert_eq!(loaded.history, history);
    }

    #[tokio::test]
    async fn test_load_seeds_on_malformed_entries() {
        let kv = Arc::new(MemoryStore::new());
        let mut items = Map::new();
        items.insert(HISTORY_KEY.to_string(), json!("not a list"));
        items.insert(CURRENT_INDEX_KEY.to_string(), json!(0));
        kv.set(StorageArea::Local, items).await.unwrap();

        let loaded = NavigationHistoryStore::new(kv, HOME).load().await;
        assert_eq!(loaded.origin, HistoryOrigin::Malformed);
        assert_eq!(loaded.history.entries(), &[HOME]);
        assert_eq!(loaded.read_error(), None);
    }

    struct UnreadableStore;

    #[async_trait]
    impl KvStore for UnreadableStore {
        async fn get(&self, _: StorageArea, _: &[&str]) -> Result<Map<String, Value>, StorageError> {
            Err(StorageError::Unavailable("locked".into()))
        }
        async fn set(&self, _: StorageArea, _: Map<String, Value>) -> Result<(), StorageError> {
            Ok(())
        }
        async fn remove(&self, _: StorageArea, _: &[&str]) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_load_reports_unreadable_store() {
        let loaded = NavigationHistoryStore::new(Arc::new(UnreadableStore), HOME).load().await;
        assert!(loaded.is_seeded());
        assert!(loaded.read_error().unwrap().contains("locked"));
    }
}
