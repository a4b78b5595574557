use super::cache::Cache;
use crate::suggest::sources::{OnlineSource, SourceError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

pub const DEFAULT_SUGGEST_ENDPOINT: &str = "https://api.bing.com/osjson.aspx";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unexpected response: {0}")]
    Malformed(String),
}

/// Client for an OpenSearch suggestion endpoint (`[query, [s1, s2, ...]]`).
pub struct SuggestClient {
    client: Client,
    endpoint: Url,
    cache: Mutex<Cache<Vec<String>>>,
}

impl SuggestClient {
    const USER_AGENT: &'static str = concat!("newtab-dashboard/", env!("CARGO_PKG_VERSION"));

    pub fn new(endpoint: &str) -> Result<Self, FetchError> {
        let endpoint = Url::parse(endpoint)?;
        let client = Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to configure HTTP client, using defaults: {}", e);
                Client::new()
            });

        Ok(Self {
            client,
            endpoint,
            cache: Mutex::new(Cache::new()),
        })
    }

    fn request_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("query", query);
        url
    }

    pub async fn fetch(&self, query: &str) -> Result<Vec<String>, FetchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(cached) = self.cache.lock().await.get(query) {
            log::debug!("Suggestion cache hit for {:?}", query);
            return Ok(cached);
        }

        let url = self.request_url(query);
        log::info!("Fetching suggestions from: {}", url);
        let body: Value = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let suggestions = parse_open_search(&body)?;
        self.cache.lock().await.insert(query.to_string(), suggestions.clone());
        Ok(suggestions)
    }
}

#[async_trait]
impl OnlineSource for SuggestClient {
    async fn suggest(&self, query: &str) -> Result<Vec<String>, SourceError> {
        Ok(self.fetch(query).await?)
    }
}

/// Extracts the suggestion strings from an OpenSearch response.
pub fn parse_open_search(body: &Value) -> Result<Vec<String>, FetchError> {
    let list = body
        .get(1)
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Malformed("expected [query, [suggestions]]".to_string()))?;
    Ok(list
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}
