pub mod engines;

pub use engines::{SearchEngine, SearchEngines};
