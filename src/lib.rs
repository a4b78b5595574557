pub mod app;
pub mod nav;
pub mod net;
pub mod search;
pub mod storage;
pub mod suggest;

pub use nav::NavigationController;
pub use suggest::SuggestionAggregator;
