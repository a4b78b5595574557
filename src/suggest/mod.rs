pub mod aggregator;
pub mod behavior;
pub mod item;
pub mod scorer;
pub mod session;
pub mod sources;

pub use aggregator::{AggregatorConfig, SuggestionAggregator};
pub use behavior::{UserBehaviorRecord, UserBehaviorStore};
pub use item::{SourceType, SuggestionItem};
pub use scorer::RelevanceScorer;
pub use session::{OpenAction, SearchSession};
pub use sources::{BookmarkNode, BookmarkSource, HistoryEntry, HistorySource, OnlineSource, StaticBookmarks, StaticHistory};
