use serde::{Deserialize, Serialize};

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// The typed query itself, offered as "search for ...".
    SearchLiteral,
    History,
    Bookmark,
    OnlineSuggestion,
}

impl SourceType {
    /// Tie-break order when two candidates score the same; lower wins.
    pub fn priority(self) -> u8 {
        match self {
            SourceType::SearchLiteral => 0,
            SourceType::Bookmark => 1,
            SourceType::History => 2,
            SourceType::OnlineSuggestion => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionItem {
    pub text: String,
    pub url: Option<String>,
    pub source_type: SourceType,
    pub base_relevance: f64,
    /// Last visit in milliseconds since the epoch; history items only.
    pub timestamp: Option<i64>,
    /// `base_relevance` adjusted by how often the user picked this item.
    /// Only meaningful after final ranking.
    pub user_relevance: f64,
}

impl SuggestionItem {
    pub fn new(text: impl Into<String>, url: Option<String>, source_type: SourceType, base_relevance: f64) -> Self {
        Self {
            text: text.into(),
            url,
            source_type,
            base_relevance,
            timestamp: None,
            user_relevance: base_relevance,
        }
    }

    /// The "search for `query`" entry, always ranked first.
    pub fn literal(query: &str) -> Self {
        Self::new(query, None, SourceType::SearchLiteral, f64::INFINITY)
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Key used for user-behavior tracking: the url, or the text when there
    /// is none.
    pub fn key(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.text)
    }

    pub fn is_literal(&self) -> bool {
        self.source_type == SourceType::SearchLiteral
    }
}
