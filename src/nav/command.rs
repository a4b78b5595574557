use crate::app::history::NavigationHistory;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

/// A request sent to the navigation controller. On the wire this is a JSON
/// object whose `action` field names the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NavCommand {
    NavigateHome,
    NavigateBack,
    NavigateForward,
    GetNavigationState {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    RecordAndNavigate {
        url: String,
    },
    OpenUrlInSidePanel {
        url: String,
        /// `false` when replaying a transition that is already in history.
        #[serde(default = "default_true")]
        update_history: bool,
        /// Suppresses the pre-navigation marker to the active page.
        #[serde(default)]
        is_navigating: bool,
    },
    UpdateSidePanelHistory {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    GetDefaultBookmarkId,
    SetDefaultBookmarkId {
        #[serde(default)]
        default_bookmark_id: Option<String>,
    },
}

impl NavCommand {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn action(&self) -> &'static str {
        match self {
            NavCommand::NavigateHome => "navigateHome",
            NavCommand::NavigateBack => "navigateBack",
            NavCommand::NavigateForward => "navigateForward",
            NavCommand::GetNavigationState { .. } => "getNavigationState",
            NavCommand::RecordAndNavigate { .. } => "recordAndNavigate",
            NavCommand::OpenUrlInSidePanel { .. } => "openUrlInSidePanel",
            NavCommand::UpdateSidePanelHistory { .. } => "updateSidePanelHistory",
            NavCommand::GetDefaultBookmarkId => "getDefaultBookmarkId",
            NavCommand::SetDefaultBookmarkId { .. } => "setDefaultBookmarkId",
        }
    }
}

/// Reply to a [`NavCommand`]. Which optional fields are present depends on
/// the action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_go_back: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_go_forward: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_bookmark_id: Option<String>,
}

impl NavResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    /// Adds `canGoBack` / `canGoForward`.
    pub fn with_flags(mut self, history: &NavigationHistory) -> Self {
        self.can_go_back = Some(history.can_go_back());
        self.can_go_forward = Some(history.can_go_forward());
        self
    }

    /// Adds the flags plus `currentIndex` and `historyLength`.
    pub fn with_position(self, history: &NavigationHistory) -> Self {
        let mut response = self.with_flags(history);
        response.current_index = Some(history.current_index());
        response.history_length = Some(history.len());
        response
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationPhase {
    BeforeNavigation,
    AfterNavigation,
}

/// Fire-and-forget message from the controller to a page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PushMessage {
    UpdateNavigationState {
        can_go_back: bool,
        can_go_forward: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_index: Option<usize>,
    },
    SidepanelNavigation {
        is_side_panel: bool,
        url: String,
        phase: NavigationPhase,
    },
}

impl PushMessage {
    /// Full navigation-state push for `history`, reporting `url` as the
    /// displayed location.
    pub fn state(history: &NavigationHistory, url: impl Into<String>) -> Self {
        PushMessage::UpdateNavigationState {
            can_go_back: history.can_go_back(),
            can_go_forward: history.can_go_forward(),
            url: Some(url.into()),
            history_length: Some(history.len()),
            current_index: Some(history.current_index()),
        }
    }
}
