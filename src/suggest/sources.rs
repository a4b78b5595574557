use crate::net::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// One page in the browser's visit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub last_visit_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Matched against title and url; empty matches everything.
    pub text: String,
    /// Only visits at or after this time (ms since epoch).
    pub start_time: Option<i64>,
    pub max_results: usize,
}

/// A node of the bookmark tree. Folders have no url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub date_added: Option<i64>,
    #[serde(default)]
    pub children: Vec<BookmarkNode>,
}

impl BookmarkNode {
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Visits matching `query`, most recent first.
    async fn search(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>, SourceError>;
}

#[async_trait]
pub trait BookmarkSource: Send + Sync {
    /// Bookmarks and folders whose title or url contains `query`.
    async fn search(&self, query: &str) -> Result<Vec<BookmarkNode>, SourceError>;

    /// The `count` most recently added bookmarks.
    async fn recent(&self, count: usize) -> Result<Vec<BookmarkNode>, SourceError>;
}

#[async_trait]
pub trait OnlineSource: Send + Sync {
    async fn suggest(&self, query: &str) -> Result<Vec<String>, SourceError>;
}

/// History held in memory, e.g. loaded from an export.
#[derive(Debug, Clone, Default)]
pub struct StaticHistory {
    entries: Vec<HistoryEntry>,
}

impl StaticHistory {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }
}

fn matches_text(needle: &str, fields: &[&str]) -> bool {
    needle.is_empty() || fields.iter().any(|f| f.to_lowercase().contains(needle))
}

#[async_trait]
impl HistorySource for StaticHistory {
    async fn search(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>, SourceError> {
        let needle = query.text.trim().to_lowercase();
        let mut hits: Vec<HistoryEntry> = self
            .entries
            .iter()
            .filter(|e| query.start_time.map_or(true, |start| e.last_visit_time >= start))
            .filter(|e| matches_text(&needle, &[e.title.as_str(), e.url.as_str()]))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.last_visit_time.cmp(&a.last_visit_time));
        hits.truncate(query.max_results);
        Ok(hits)
    }
}

/// Bookmark tree held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticBookmarks {
    roots: Vec<BookmarkNode>,
}

impl StaticBookmarks {
    pub fn new(roots: Vec<BookmarkNode>) -> Self {
        Self { roots }
    }

    fn walk<'a>(nodes: &'a [BookmarkNode], out: &mut Vec<&'a BookmarkNode>) {
        for node in nodes {
            out.push(node);
            Self::walk(&node.children, out);
        }
    }

    fn flatten(&self) -> Vec<&BookmarkNode> {
        let mut out = Vec::new();
        Self::walk(&self.roots, &mut out);
        out
    }
}

/// Copy of a node without its subtree, as search results are returned.
fn shallow(node: &BookmarkNode) -> BookmarkNode {
    BookmarkNode {
        children: Vec::new(),
        ..node.clone()
    }
}

#[async_trait]
impl BookmarkSource for StaticBookmarks {
    async fn search(&self, query: &str) -> Result<Vec<BookmarkNode>, SourceError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .flatten()
            .into_iter()
            .filter(|n| matches_text(&needle, &[n.title.as_str(), n.url.as_deref().unwrap_or("")]))
            .map(shallow)
            .collect())
    }

    async fn recent(&self, count: usize) -> Result<Vec<BookmarkNode>, SourceError> {
        let mut bookmarks: Vec<&BookmarkNode> = self.flatten().into_iter().filter(|n| !n.is_folder()).collect();
        bookmarks.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        Ok(bookmarks.into_iter().take(count).map(shallow).collect())
    }
}
