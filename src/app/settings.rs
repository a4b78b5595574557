use crate::storage::{KvStore, StorageArea, StorageError};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const SHOW_HISTORY_SUGGESTIONS: &str = "showHistorySuggestions";
pub const SHOW_BOOKMARK_SUGGESTIONS: &str = "showBookmarkSuggestions";
pub const OPEN_SEARCH_IN_NEW_TAB: &str = "openSearchInNewTab";
pub const OPEN_IN_NEW_TAB: &str = "openInNewTab";
pub const SIDEPANEL_OPEN_IN_NEW_TAB: &str = "sidepanelOpenInNewTab";
pub const SIDEPANEL_OPEN_IN_SIDEPANEL: &str = "sidepanelOpenInSidepanel";
/// Local-scope key for the folder shown when the dashboard opens.
pub const DEFAULT_BOOKMARK_ID: &str = "defaultBookmarkId";

const KEYS: [&str; 6] = [
    SHOW_HISTORY_SUGGESTIONS,
    SHOW_BOOKMARK_SUGGESTIONS,
    OPEN_SEARCH_IN_NEW_TAB,
    OPEN_IN_NEW_TAB,
    SIDEPANEL_OPEN_IN_NEW_TAB,
    SIDEPANEL_OPEN_IN_SIDEPANEL,
];

/// User toggles stored in the sync area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub show_history_suggestions: bool,
    pub show_bookmark_suggestions: bool,
    pub open_search_in_new_tab: bool,
    pub open_in_new_tab: bool,
    pub sidepanel_open_in_new_tab: bool,
    pub sidepanel_open_in_sidepanel: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_history_suggestions: true,
            show_bookmark_suggestions: true,
            open_search_in_new_tab: true,
            open_in_new_tab: true,
            sidepanel_open_in_new_tab: true,
            sidepanel_open_in_sidepanel: false,
        }
    }
}

/// Where links clicked inside the side panel open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidePanelOpenMode {
    NewTab,
    SidePanel,
    CurrentTab,
}

fn flag(values: &Map<String, Value>, key: &str, default: bool) -> bool {
    values.get(key).and_then(Value::as_bool).unwrap_or(default)
}

impl Settings {
    /// Reads settings from the sync area. Unreadable storage yields defaults.
    pub async fn load(store: &dyn KvStore) -> Self {
        let defaults = Self::default();
        let values = match store.get(StorageArea::Sync, &KEYS).await {
            Ok(values) => values,
            Err(e) => {
                log::warn!("Failed to read settings, using defaults: {}", e);
                return defaults;
            }
        };

        Self {
            show_history_suggestions: flag(&values, SHOW_HISTORY_SUGGESTIONS, defaults.show_history_suggestions),
            show_bookmark_suggestions: flag(&values, SHOW_BOOKMARK_SUGGESTIONS, defaults.show_bookmark_suggestions),
            open_search_in_new_tab: flag(&values, OPEN_SEARCH_IN_NEW_TAB, defaults.open_search_in_new_tab),
            open_in_new_tab: flag(&values, OPEN_IN_NEW_TAB, defaults.open_in_new_tab),
            sidepanel_open_in_new_tab: flag(&values, SIDEPANEL_OPEN_IN_NEW_TAB, defaults.sidepanel_open_in_new_tab),
            sidepanel_open_in_sidepanel: flag(
                &values,
                SIDEPANEL_OPEN_IN_SIDEPANEL,
                defaults.sidepanel_open_in_sidepanel,
            ),
        }
    }

    pub fn side_panel_open_mode(&self) -> SidePanelOpenMode {
        if self.sidepanel_open_in_sidepanel {
            SidePanelOpenMode::SidePanel
        } else if self.sidepanel_open_in_new_tab {
            SidePanelOpenMode::NewTab
        } else {
            SidePanelOpenMode::CurrentTab
        }
    }
}

/// Writes one boolean toggle to the sync area.
pub async fn set_flag(store: &dyn KvStore, key: &str, enabled: bool) -> Result<(), StorageError> {
    let mut items = Map::new();
    items.insert(key.to_string(), json!(enabled));
    store.set(StorageArea::Sync, items).await
}

/// Opening side-panel links in a new tab and inside the panel exclude each
/// other; choosing one clears the other.
pub async fn set_side_panel_open_mode(
    store: &dyn KvStore,
    mode: SidePanelOpenMode,
) -> Result<(), StorageError> {
    let (new_tab, side_panel) = match mode {
        SidePanelOpenMode::NewTab => (true, false),
        SidePanelOpenMode::SidePanel => (false, true),
        SidePanelOpenMode::CurrentTab => (false, false),
    };
    let mut items = Map::new();
    items.insert(SIDEPANEL_OPEN_IN_NEW_TAB.to_string(), json!(new_tab));
    items.insert(SIDEPANEL_OPEN_IN_SIDEPANEL.to_string(), json!(side_panel));
    store.set(StorageArea::Sync, items).await
}

/// Seeds the stores on first install.
pub async fn apply_install_defaults(store: &dyn KvStore) -> Result<(), StorageError> {
    let mut local = Map::new();
    local.insert(DEFAULT_BOOKMARK_ID.to_string(), Value::Null);
    store.set(StorageArea::Local, local).await?;

    let mut sync = Map::new();
    sync.insert(OPEN_IN_NEW_TAB.to_string(), json!(true));
    sync.insert(SIDEPANEL_OPEN_IN_NEW_TAB.to_string(), json!(true));
    sync.insert(SIDEPANEL_OPEN_IN_SIDEPANEL.to_string(), json!(false));
    store.set(StorageArea::Sync, sync).await?;

    log::info!("Applied install defaults");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let store = MemoryStore::new();
        let settings = Settings::load(&store).await;
        assert_eq!(settings, Settings::default());
        assert!(settings.show_history_suggestions);
        assert!(settings.open_search_in_new_tab);
        assert_eq!(settings.side_panel_open_mode(), SidePanelOpenMode::NewTab);
    }

    #[tokio::test]
    async fn test_stored_flags_override_defaults() {
        let store = MemoryStore::new();
        set_flag(&store, SHOW_HISTORY_SUGGESTIONS, false).await.unwrap();
        let settings = Settings::load(&store).await;
        assert!(!settings.show_history_suggestions);
        assert!(settings.show_bookmark_suggestions);
    }

    #[tokio::test]
    async fn test_open_modes_are_exclusive() {
        let store = MemoryStore::new();
        set_side_panel_open_mode(&store, SidePanelOpenMode::SidePanel).await.unwrap();
        let settings = Settings::load(&store).await;
        assert!(settings.sidepanel_open_in_sidepanel);
        assert!(!settings.sidepanel_open_in_new_tab);

        set_side_panel_open_mode(&store, SidePanelOpenMode::NewTab).await.unwrap();
        let settings = Settings::load(&store).await;
        assert!(!settings.sidepanel_open_in_sidepanel);
        assert!(settings.sidepanel_open_in_new_tab);
    }

    #[tokio::test]
    async fn test_install_defaults() {
        let store = MemoryStore::new();
        apply_install_defaults(&store).await.unwrap();
        let local = store.dump(StorageArea::Local).await;
        assert_eq!(local.get(DEFAULT_BOOKMARK_ID), Some(&Value::Null));
        let sync = store.dump(StorageArea::Sync).await;
        assert_eq!(sync.get(SIDEPANEL_OPEN_IN_SIDEPANEL), Some(&json!(false)));
    }
}
