pub mod cache;
pub mod http;

pub use cache::Cache;
pub use http::{FetchError, SuggestClient, DEFAULT_SUGGEST_ENDPOINT};
