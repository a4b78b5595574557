use super::aggregator::SuggestionAggregator;
use super::item::SuggestionItem;
use super::scorer::now_ms;
use crate::app::settings::Settings;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter bumped on every keystroke so late results can be recognised.
#[derive(Clone, Default)]
pub struct QueryGeneration {
    current: Arc<AtomicU64>,
}

impl QueryGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new query, superseding every earlier ticket.
    pub fn next(&self) -> QueryTicket {
        let id = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        QueryTicket {
            id,
            current: self.current.clone(),
        }
    }
}

pub struct QueryTicket {
    id: u64,
    current: Arc<AtomicU64>,
}

impl QueryTicket {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.id
    }
}

/// What the page should do after a suggestion is picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAction {
    pub url: String,
    pub new_tab: bool,
}

/// State behind one search box.
pub struct SearchSession {
    aggregator: Arc<SuggestionAggregator>,
    generation: QueryGeneration,
}

impl SearchSession {
    pub fn new(aggregator: Arc<SuggestionAggregator>) -> Self {
        Self {
            aggregator,
            generation: QueryGeneration::new(),
        }
    }

    /// Suggestions for the current input, or `None` if newer input arrived
    /// while they were being computed.
    pub async fn on_input(&self, input: &str) -> Option<Vec<SuggestionItem>> {
        let ticket = self.generation.next();
        let items = self.aggregator.suggest(input).await;
        if ticket.is_current() {
            Some(items)
        } else {
            log::debug!("Discarding stale suggestions for {:?}", input);
            None
        }
    }

    /// Records the pick and resolves where it leads.
    pub async fn select(&self, item: &SuggestionItem) -> OpenAction {
        let settings = Settings::load(self.aggregator.store().as_ref()).await;
        let url = match &item.url {
            Some(url) => url.clone(),
            None => self.aggregator.engines().default_search_url(&item.text),
        };

        if let Err(e) = self.aggregator.behavior().record_selection(item.key(), now_ms()).await {
            log::warn!("Failed to record selection of {}: {}", item.key(), e);
        }

        OpenAction {
            url,
            new_tab: settings.open_search_in_new_tab,
        }
    }

    /// Plain search for `query` on `engine` (or the default engine).
    pub async fn submit(&self, query: &str, engine: Option<&str>) -> Option<OpenAction> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        let engines = self.aggregator.engines();
        let url = match engine {
            Some(name) => engines.search_url(name, query),
            None => engines.default_search_url(query),
        };
        let settings = Settings::load(self.aggregator.store().as_ref()).await;
        Some(OpenAction {
            url,
            new_tab: settings.open_search_in_new_tab,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::settings::OPEN_SEARCH_IN_NEW_TAB;
    use crate::storage::{set_one, MemoryStore, StorageArea};
    use crate::suggest::item::SourceType;
    use crate::suggest::sources::{HistoryEntry, HistoryQuery, HistorySource, SourceError};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    #[test]
    fn test_newer_ticket_supersedes_older() {
        let generation = QueryGeneration::new();
        let first = generation.next();
        assert!(first.is_current());
        let second = generation.next();
        assert!(!first.is_current());
        assert!(second.is_current());
    }

    /// Holds back the "ru" lookup until released.
    struct GatedHistory {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl HistorySource for GatedHistory {
        async fn search(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>, SourceError> {
            if query.text == "ru" {
                self.gate.notified().await;
            }
            Ok(vec![HistoryEntry {
                url: "https://www.rust-lang.org/".into(),
                title: "Rust".into(),
                last_visit_time: now_ms(),
            }])
        }
    }

    #[tokio::test]
    async fn test_stale_results_are_discarded() {
        let gate = Arc::new(Notify::new());
        let aggregator = SuggestionAggregator::new(Arc::new(MemoryStore::new()))
            .with_history(Arc::new(GatedHistory { gate: gate.clone() }));
        let session = SearchSession::new(Arc::new(aggregator));

        let (slow, fast) = tokio::join!(session.on_input("ru"), async {
            let items = session.on_input("rust").await;
            gate.notify_one();
            items
        });

        assert!(slow.is_none());
        let fast = fast.unwrap();
        assert_eq!(fast[0].text, "rust");
        assert_eq!(fast[1].source_type, SourceType::History);
    }

    #[tokio::test]
    async fn test_select_literal_searches_and_records() {
        let aggregator = Arc::new(SuggestionAggregator::new(Arc::new(MemoryStore::new())));
        let session = SearchSession::new(aggregator.clone());

        let action = session.select(&SuggestionItem::literal("rust lang")).await;
        assert_eq!(
            action,
            OpenAction {
                url: "https://www.google.com/search?q=rust%20lang".into(),
                new_tab: true,
            }
        );
        let record = aggregator.behavior().load().await;
        assert_eq!(record.get("rust lang").map(|e| e.count), Some(1));
    }

    #[tokio::test]
    async fn test_select_honours_new_tab_setting() {
        let store = Arc::new(MemoryStore::new());
        set_one(store.as_ref(), StorageArea::Sync, OPEN_SEARCH_IN_NEW_TAB, json!(false))
            .await
            .unwrap();
        let session = SearchSession::new(Arc::new(SuggestionAggregator::new(store)));

        let item = SuggestionItem::new("Docs", Some("https://docs.rs/".into()), SourceType::Bookmark, 1.0);
        let action = session.select(&item).await;
        assert_eq!(action.url, "https://docs.rs/");
        assert!(!action.new_tab);
    }

    #[tokio::test]
    async fn test_submit_uses_named_engine() {
        let session = SearchSession::new(Arc::new(SuggestionAggregator::new(Arc::new(MemoryStore::new()))));
        let action = session.submit("tokio", Some("ddg")).await.unwrap();
        assert_eq!(action.url, "https://duckduckgo.com/?q=tokio");
        assert!(session.submit("  ", None).await.is_none());
    }
}
