//! Relevance scoring for search suggestions.
//!
//! Scores are additive over match tiers (exact, prefix, substring, per-word,
//! fuzzy), divided by a length penalty, then adjusted for recency (history)
//! or curation (bookmarks).

use std::time::{SystemTime, UNIX_EPOCH};

pub const MS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Per-tier weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub exact_title: f64,
    pub exact_url: f64,
    pub title_prefix: f64,
    pub url_prefix: f64,
    pub title_contains: f64,
    pub url_contains: f64,
    pub word_match: f64,
    /// Fraction of `word_match` added when the text starts with the word.
    pub word_start_bonus: f64,
    /// Fraction of `word_match` added when the url contains the word.
    pub url_word_factor: f64,
    pub partial_word_match: f64,
    pub fuzzy_match: f64,
    /// Minimum similarity before fuzzy matching contributes.
    pub fuzzy_threshold: f64,
}

pub const WEIGHTS: Weights = Weights {
    exact_title: 200.0,
    exact_url: 150.0,
    title_prefix: 180.0,
    url_prefix: 150.0,
    title_contains: 100.0,
    url_contains: 80.0,
    word_match: 70.0,
    word_start_bonus: 0.3,
    url_word_factor: 0.6,
    partial_word_match: 40.0,
    fuzzy_match: 30.0,
    fuzzy_threshold: 0.85,
};

/// Recency and curation adjustments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceConfig {
    /// Time constant of the history decay, in days.
    pub decay_days: f64,
    /// History visited within this many days gets `recent_boost`.
    pub recent_days: f64,
    pub recent_boost: f64,
    pub bookmark_boost: f64,
    /// Time constant of the user-behavior recency factor, in days.
    pub behavior_decay_days: f64,
    /// Weight of one decayed selection in the user-behavior factor.
    pub behavior_weight: f64,
}

pub const RELEVANCE: RelevanceConfig = RelevanceConfig {
    decay_days: 60.0,
    recent_days: 7.0,
    recent_boost: 1.5,
    bookmark_boost: 1.2,
    behavior_decay_days: 30.0,
    behavior_weight: 0.1,
};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn days_between(earlier_ms: i64, now_ms: i64) -> f64 {
    ((now_ms - earlier_ms) as f64 / MS_PER_DAY).max(0.0)
}

#[derive(Debug, Clone, Copy)]
pub struct RelevanceScorer {
    weights: Weights,
    config: RelevanceConfig,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(WEIGHTS, RELEVANCE)
    }
}

impl RelevanceScorer {
    pub fn new(weights: Weights, config: RelevanceConfig) -> Self {
        Self { weights, config }
    }

    /// Scores a candidate against `query` as of now.
    pub fn score(&self, query: &str, text: &str, url: &str, timestamp: Option<i64>) -> f64 {
        self.score_at(query, text, url, timestamp, now_ms())
    }

    pub fn score_at(&self, query: &str, text: &str, url: &str, timestamp: Option<i64>, now: i64) -> f64 {
        let score = self.match_score(query, text, url);
        match timestamp {
            Some(ts) => self.decay(score, ts, now),
            None => score,
        }
    }

    /// Bookmarks are boosted over an equally matching history item.
    pub fn score_bookmark(&self, query: &str, text: &str, url: &str) -> f64 {
        self.match_score(query, text, url) * self.config.bookmark_boost
    }

    pub fn bookmark_boost(&self) -> f64 {
        self.config.bookmark_boost
    }

    /// Applies the recent-visit boost, then exponential decay by age.
    pub fn decay(&self, score: f64, timestamp: i64, now: i64) -> f64 {
        let days = days_between(timestamp, now);
        let mut score = score;
        if days < self.config.recent_days {
            score *= self.config.recent_boost;
        }
        score * (-days / self.config.decay_days).exp()
    }

    /// Multiplier from how often and how recently the user picked an item.
    pub fn behavior_factor(&self, count: u64, last_used: i64, now: i64) -> f64 {
        let days = days_between(last_used, now);
        let recency = (-days / self.config.behavior_decay_days).exp();
        1.0 + count as f64 * recency * self.config.behavior_weight
    }

    /// Text-match score with the length penalty, before any time adjustment.
    pub fn match_score(&self, query: &str, text: &str, url: &str) -> f64 {
        let w = &self.weights;
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return 0.0;
        }
        let text = text.trim().to_lowercase();
        let url = url.trim().to_lowercase();

        let mut score = 0.0;

        if text == query {
            score += w.exact_title;
        }
        if url == query {
            score += w.exact_url;
        }

        if text.starts_with(&query) {
            score += w.title_prefix;
        }
        if url.starts_with(&query) {
            score += w.url_prefix;
        }

        if text.contains(&query) {
            score += w.title_contains;
        }
        if url.contains(&query) {
            score += w.url_contains;
        }

        for word in query.split_whitespace().filter(|word| word.chars().count() >= 2) {
            if text.contains(word) {
                score += w.word_match;
                if text.starts_with(word) {
                    score += w.word_match * w.word_start_bonus;
                }
            }
            if url.contains(word) {
                score += w.word_match * w.url_word_factor;
            }
            let partial = partial_matches(word, &text);
            if partial > 0 {
                score += w.partial_word_match * partial as f64 * 0.5;
            }
        }

        if !text.is_empty() {
            let similarity = similarity(&query, &text);
            if similarity > w.fuzzy_threshold {
                score += w.fuzzy_match * similarity.powi(2);
            }
        }

        let ratio = text.chars().count() as f64 / query.chars().count() as f64;
        score / ratio.log2().max(1.0)
    }
}

/// Counts occurrences in `text` of the first ~70% of `word`.
fn partial_matches(word: &str, text: &str) -> usize {
    let len = word.chars().count();
    let take = ((len as f64) * 0.7).ceil() as usize;
    let prefix: String = word.chars().take(take).collect();
    if prefix.is_empty() {
        return 0;
    }

    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = text[start..].find(&prefix) {
        count += 1;
        let at = start + pos;
        // Step one character forward so overlapping matches count.
        start = at + text[at..].chars().next().map(char::len_utf8).unwrap_or(1);
        if start >= text.len() {
            break;
        }
    }
    count
}

/// Normalized edit-distance similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count()) as f64;
    (max_len - levenshtein(a, b) as f64) / max_len
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            row[j + 1] = substitution.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}
