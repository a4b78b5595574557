pub mod command;
pub mod controller;
pub mod host;
pub mod viewer;

pub use command::{NavCommand, NavResponse, PushMessage};
pub use controller::NavigationController;
pub use host::{ContextId, HostError, RecordingHost, SidePanelHost};
pub use viewer::{ControllerLink, LocalLink, NavState, NavigationViewer};
