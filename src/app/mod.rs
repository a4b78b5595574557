pub mod history;
pub mod settings;

pub use history::{Direction, HistoryError, HistoryOrigin, NavigationHistory, NavigationHistoryStore};
pub use settings::{Settings, SidePanelOpenMode};
