//! Fans a query out to the suggestion sources and merges what comes back
//! into one ranked, bounded list.

use super::behavior::UserBehaviorStore;
use super::item::{SourceType, SuggestionItem};
use super::scorer::{now_ms, RelevanceScorer, MS_PER_DAY};
use super::sources::{BookmarkNode, BookmarkSource, HistoryEntry, HistoryQuery, HistorySource, OnlineSource, SourceError};
use crate::app::settings::Settings;
use crate::search::SearchEngines;
use crate::storage::KvStore;
use futures_util::future::join3;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorConfig {
    pub max_history_candidates: usize,
    pub max_bookmark_candidates: usize,
    /// Size of the final list, literal entry included.
    pub max_results: usize,
    pub max_per_domain: usize,
    /// Typed queries only search history this recent.
    pub history_window_days: f64,
    /// History entries offered for an empty query.
    pub default_history_limit: usize,
    /// Bookmarks offered for an empty query.
    pub default_bookmark_limit: usize,
    /// Ask the online source for typed queries too, not just the default list.
    pub online_in_query_mode: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_history_candidates: 200,
            max_bookmark_candidates: 50,
            max_results: 50,
            max_per_domain: 5,
            history_window_days: 30.0,
            default_history_limit: 20,
            default_bookmark_limit: 10,
            online_in_query_mode: false,
        }
    }
}

pub struct SuggestionAggregator {
    store: Arc<dyn KvStore>,
    behavior: UserBehaviorStore,
    scorer: RelevanceScorer,
    engines: SearchEngines,
    history: Option<Arc<dyn HistorySource>>,
    bookmarks: Option<Arc<dyn BookmarkSource>>,
    online: Option<Arc<dyn OnlineSource>>,
    config: AggregatorConfig,
}

impl SuggestionAggregator {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            behavior: UserBehaviorStore::new(store.clone()),
            store,
            scorer: RelevanceScorer::default(),
            engines: SearchEngines::default(),
            history: None,
            bookmarks: None,
            online: None,
            config: AggregatorConfig::default(),
        }
    }

    pub fn with_history(mut self, source: Arc<dyn HistorySource>) -> Self {
        self.history = Some(source);
        self
    }

    pub fn with_bookmarks(mut self, source: Arc<dyn BookmarkSource>) -> Self {
        self.bookmarks = Some(source);
        self
    }

    pub fn with_online(mut self, source: Arc<dyn OnlineSource>) -> Self {
        self.online = Some(source);
        self
    }

    pub fn with_engines(mut self, engines: SearchEngines) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn engines(&self) -> &SearchEngines {
        &self.engines
    }

    pub fn behavior(&self) -> &UserBehaviorStore {
        &self.behavior
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub async fn suggest(&self, query: &str) -> Vec<SuggestionItem> {
        self.suggest_at(query, now_ms()).await
    }

    /// Ranked suggestions for `query` as of `now`. An empty query yields the
    /// default list of recent history and bookmarks. Never fails; a failing
    /// source contributes nothing.
    pub async fn suggest_at(&self, query: &str, now: i64) -> Vec<SuggestionItem> {
        let query = query.trim();
        let settings = Settings::load(self.store.as_ref()).await;
        let default_mode = query.is_empty();

        if default_mode && !settings.show_history_suggestions {
            log::debug!("History suggestions disabled, no default list");
            return Vec::new();
        }

        let ask_online = default_mode || self.config.online_in_query_mode;
        let (history, bookmarks, online) = join3(
            async {
                match &self.history {
                    Some(source) if settings.show_history_suggestions => {
                        degrade("history", self.fetch_history(source.as_ref(), query, now).await)
                    }
                    _ => Vec::new(),
                }
            },
            async {
                match &self.bookmarks {
                    Some(source) if settings.show_bookmark_suggestions => {
                        degrade("bookmarks", self.fetch_bookmarks(source.as_ref(), query).await)
                    }
                    _ => Vec::new(),
                }
            },
            async {
                match &self.online {
                    Some(source) if ask_online => degrade("online", source.suggest(query).await),
                    _ => Vec::new(),
                }
            },
        )
        .await;

        let mut candidates = Vec::with_capacity(history.len() + bookmarks.len() + online.len());
        candidates.extend(self.score_history(query, history, now));
        candidates.extend(self.score_bookmarks(query, bookmarks));
        candidates.extend(self.score_online(query, online));

        let candidates = dedup_by_url(candidates);
        let literal = (!default_mode).then(|| SuggestionItem::literal(query));
        let mut results = balance(literal, candidates, self.config.max_results);

        let record = self.behavior.load().await;
        for item in &mut results {
            item.user_relevance = item.base_relevance * record.factor(item.key(), now, &self.scorer);
        }
        results.sort_by(|a, b| b.user_relevance.total_cmp(&a.user_relevance));
        results.truncate(self.config.max_results);

        log::debug!("{} suggestions for {:?}", results.len(), query);
        results
    }

    async fn fetch_history(
        &self,
        source: &dyn HistorySource,
        query: &str,
        now: i64,
    ) -> Result<Vec<HistoryEntry>, SourceError> {
        let request = if query.is_empty() {
            HistoryQuery {
                text: String::new(),
                start_time: None,
                max_results: self.config.default_history_limit * 20,
            }
        } else {
            HistoryQuery {
                text: query.to_string(),
                start_time: Some(now - (self.config.history_window_days * MS_PER_DAY) as i64),
                max_results: self.config.max_history_candidates,
            }
        };
        let mut entries = source.search(&request).await?;
        entries.sort_by(|a, b| b.last_visit_time.cmp(&a.last_visit_time));
        Ok(limit_per_domain(entries, self.config.max_per_domain))
    }

    async fn fetch_bookmarks(&self, source: &dyn BookmarkSource, query: &str) -> Result<Vec<BookmarkNode>, SourceError> {
        let mut nodes = if query.is_empty() {
            source.recent(self.config.default_bookmark_limit).await?
        } else {
            source.search(query).await?
        };
        nodes.retain(|n| !n.is_folder());
        nodes.truncate(self.config.max_bookmark_candidates);
        Ok(nodes)
    }

    fn score_history(&self, query: &str, entries: Vec<HistoryEntry>, now: i64) -> Vec<SuggestionItem> {
        let mut items: Vec<SuggestionItem> = entries
            .into_iter()
            .map(|entry| {
                let base = if query.is_empty() {
                    self.scorer.decay(1.0, entry.last_visit_time, now)
                } else {
                    self.scorer
                        .score_at(query, &entry.title, &entry.url, Some(entry.last_visit_time), now)
                };
                let text = if entry.title.is_empty() { entry.url.clone() } else { entry.title };
                SuggestionItem::new(text, Some(entry.url), SourceType::History, base).with_timestamp(entry.last_visit_time)
            })
            .collect();

        if query.is_empty() {
            items.sort_by(|a, b| b.base_relevance.total_cmp(&a.base_relevance));
            items.truncate(self.config.default_history_limit);
        }
        items
    }

    fn score_bookmarks(&self, query: &str, nodes: Vec<BookmarkNode>) -> Vec<SuggestionItem> {
        nodes
            .into_iter()
            .map(|node| {
                let url = node.url.unwrap_or_default();
                let base = if query.is_empty() {
                    self.scorer.bookmark_boost()
                } else {
                    self.scorer.score_bookmark(query, &node.title, &url)
                };
                SuggestionItem::new(node.title, Some(url), SourceType::Bookmark, base)
            })
            .collect()
    }

    fn score_online(&self, query: &str, texts: Vec<String>) -> Vec<SuggestionItem> {
        texts
            .into_iter()
            .map(|text| {
                let base = self.scorer.match_score(query, &text, "").max(1.0);
                let url = self.engines.default_search_url(&text);
                SuggestionItem::new(text, Some(url), SourceType::OnlineSuggestion, base)
            })
            .collect()
    }
}

fn degrade<T>(source: &str, result: Result<Vec<T>, SourceError>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        log::warn!("Suggestion source {} failed: {}", source, e);
        Vec::new()
    })
}

fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Drops repeated `(url, title)` pairs and keeps at most `max_per_domain`
/// entries per host, in input order.
fn limit_per_domain(entries: Vec<HistoryEntry>, max_per_domain: usize) -> Vec<HistoryEntry> {
    let mut seen = HashSet::new();
    let mut per_domain: HashMap<String, usize> = HashMap::new();
    entries
        .into_iter()
        .filter(|entry| {
            if !seen.insert((entry.url.clone(), entry.title.clone())) {
                return false;
            }
            let count = per_domain.entry(domain_of(&entry.url)).or_insert(0);
            *count += 1;
            *count <= max_per_domain
        })
        .collect()
}

fn by_relevance(a: &SuggestionItem, b: &SuggestionItem) -> Ordering {
    b.base_relevance
        .total_cmp(&a.base_relevance)
        .then_with(|| a.source_type.priority().cmp(&b.source_type.priority()))
}

/// One item per url, keeping the best-scored; ties go to the higher-priority
/// source. Items without a url are all kept.
fn dedup_by_url(mut items: Vec<SuggestionItem>) -> Vec<SuggestionItem> {
    items.sort_by(by_relevance);
    let mut seen = HashSet::new();
    items.retain(|item| match &item.url {
        Some(url) => seen.insert(url.clone()),
        None => true,
    });
    items
}

const SLOTS: [SourceType; 4] = [
    SourceType::History,
    SourceType::Bookmark,
    SourceType::OnlineSuggestion,
    SourceType::History,
];

/// Interleaves the sources so no single one floods the list, then fills the
/// remaining room with the best leftovers. `candidates` must be sorted by
/// descending relevance.
fn balance(literal: Option<SuggestionItem>, candidates: Vec<SuggestionItem>, cap: usize) -> Vec<SuggestionItem> {
    let mut queues: HashMap<SourceType, VecDeque<SuggestionItem>> = HashMap::new();
    for item in candidates {
        queues.entry(item.source_type).or_default().push_back(item);
    }
    let mut pop = |source: SourceType| queues.get_mut(&source).and_then(VecDeque::pop_front);

    let mut results: Vec<SuggestionItem> = literal.into_iter().collect();
    let quota = cap.saturating_sub(1) / 4;
    for slot in SLOTS.iter().cycle().take(quota * 4) {
        if let Some(item) = pop(*slot).or_else(|| pop(SourceType::History)) {
            results.push(item);
        }
    }

    while results.len() < cap {
        let best = queues
            .values()
            .filter_map(VecDeque::front)
            .min_by(|a, b| by_relevance(a, b))
            .map(|item| item.source_type);
        match best.and_then(|source| queues.get_mut(&source).and_then(VecDeque::pop_front)) {
            Some(item) => results.push(item),
            None => break,
        }
    }
    results
}
