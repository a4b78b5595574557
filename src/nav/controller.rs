use super::command::{NavCommand, NavResponse, NavigationPhase, PushMessage};
use super::host::{ContextId, SidePanelHost};
use crate::app::history::{Direction, NavigationHistory, NavigationHistoryStore};
use crate::app::settings::DEFAULT_BOOKMARK_ID;
use crate::storage::{self, KvStore, StorageArea};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

pub const SESSION_VIEW_KEY: &str = "sidepanel_view";
pub const SESSION_LAST_URL_KEY: &str = "sidepanel_last_url";
pub const SESSION_TIMESTAMP_KEY: &str = "sidepanel_timestamp";
const VIEW_MARKER: &str = "sidepanel_view=";

/// Whether the controller is currently working on a command for a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    Navigating,
}

type Lane = Option<ContextId>;

/// Owns the side-panel history and turns navigation commands into history
/// updates, side-panel location changes and state pushes.
///
/// Commands from one context run one at a time; different contexts run
/// independently and share the stored history last-write-wins.
pub struct NavigationController {
    history: NavigationHistoryStore,
    store: Arc<dyn KvStore>,
    host: Arc<dyn SidePanelHost>,
    lanes: Mutex<HashMap<Lane, Arc<tokio::sync::Mutex<()>>>>,
    phases: Mutex<HashMap<Lane, ControllerPhase>>,
}

/// Clears a context's bookkeeping once its command is done.
struct TurnGuard<'a> {
    controller: &'a NavigationController,
    key: Lane,
    lane: &'a Arc<tokio::sync::Mutex<()>>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.controller.release(self.key, self.lane);
    }
}

impl NavigationController {
    pub fn new(store: Arc<dyn KvStore>, host: Arc<dyn SidePanelHost>, home: impl Into<String>) -> Self {
        Self {
            history: NavigationHistoryStore::new(store.clone(), home),
            store,
            host,
            lanes: Mutex::new(HashMap::new()),
            phases: Mutex::new(HashMap::new()),
        }
    }

    pub fn home(&self) -> &str {
        self.history.home()
    }

    pub fn phase(&self, context: Option<ContextId>) -> ControllerPhase {
        self.phases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&context)
            .copied()
            .unwrap_or(ControllerPhase::Idle)
    }

    fn set_phase(&self, lane: Lane, phase: ControllerPhase) {
        self.phases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(lane, phase);
    }

    fn lane(&self, lane: Lane) -> Arc<tokio::sync::Mutex<()>> {
        self.lanes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(lane)
            .or_default()
            .clone()
    }

    /// Forgets the phase and, unless another command from the same context
    /// is queued on it, the lane itself. Only the map and the finishing
    /// command hold an idle lane.
    fn release(&self, key: Lane, lane: &Arc<tokio::sync::Mutex<()>>) {
        self.phases.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);

        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(lane) == 2 {
            lanes.remove(&key);
        }
    }

    /// Entry point for raw `{action, ...}` messages.
    pub async fn handle_message(&self, sender: Option<ContextId>, message: Value) -> NavResponse {
        match NavCommand::from_value(message) {
            Ok(command) => self.handle(sender, command).await,
            Err(e) => {
                log::warn!("Rejected navigation message: {}", e);
                NavResponse::failure("Unknown action")
            }
        }
    }

    /// Runs one command to completion. Never panics on storage or host
    /// errors; they come back as `success: false`.
    pub async fn handle(&self, sender: Option<ContextId>, command: NavCommand) -> NavResponse {
        let lane = self.lane(sender);
        let _turn = lane.lock().await;
        self.set_phase(sender, ControllerPhase::Navigating);
        let _release = TurnGuard {
            controller: self,
            key: sender,
            lane: &lane,
        };

        log::debug!("Handling {} from {:?}", command.action(), sender);

        match command {
            NavCommand::NavigateHome => self.navigate_home(sender).await,
            NavCommand::NavigateBack => self.step(sender, Direction::Back).await,
            NavCommand::NavigateForward => self.step(sender, Direction::Forward).await,
            NavCommand::GetNavigationState { url } => self.navigation_state(sender, url).await,
            NavCommand::RecordAndNavigate { url } => self.record_and_navigate(sender, &url).await,
            NavCommand::OpenUrlInSidePanel {
                url,
                update_history,
                is_navigating,
            } => self.open_url(sender, &url, update_history, is_navigating).await,
            NavCommand::UpdateSidePanelHistory { url, source } => {
                self.update_side_panel_history(sender, &url, source.as_deref()).await
            }
            NavCommand::GetDefaultBookmarkId => self.default_bookmark_id().await,
            NavCommand::SetDefaultBookmarkId { default_bookmark_id } => {
                self.set_default_bookmark_id(default_bookmark_id).await
            }
        }
    }

    async fn navigate_home(&self, sender: Option<ContextId>) -> NavResponse {
        let home = self.home().to_string();
        let history = match self.record(&home).await {
            Ok(history) => history,
            Err(response) => return response,
        };

        if let Err(e) = self.host.set_panel_path(&home).await {
            log::error!("Error navigating to side panel home: {}", e);
            return NavResponse::failure(e);
        }

        self.notify(sender, PushMessage::state(&history, home)).await;
        NavResponse::ok().with_flags(&history)
    }

    async fn step(&self, sender: Option<ContextId>, direction: Direction) -> NavResponse {
        let loaded = self.history.load().await;
        if let Some(e) = loaded.read_error() {
            return NavResponse::failure(e);
        }
        let mut history = loaded.history;

        let stepped = history.step(direction).map(str::to_string);
        let target = match stepped {
            Ok(target) => target,
            Err(e) => {
                log::info!("{}", e);
                return NavResponse::failure(e).with_position(&history);
            }
        };

        log::info!(
            "Navigating {} to {} (index {})",
            direction,
            target,
            history.current_index()
        );

        if let Err(e) = self.history.persist_position(&history).await {
            log::warn!("Failed to persist history position: {}", e);
            return NavResponse::failure(e);
        }

        if let Err(e) = self.host.set_panel_path(&target).await {
            log::error!("Error navigating {}: {}", direction, e);
            return NavResponse::failure(e);
        }

        self.notify(sender, PushMessage::state(&history, target.clone())).await;
        NavResponse::ok().with_position(&history).with_url(target)
    }

    async fn navigation_state(&self, sender: Option<ContextId>, url: Option<String>) -> NavResponse {
        let loaded = self.history.load().await;
        let history = &loaded.history;

        if loaded.is_seeded() {
            if let Some(e) = loaded.read_error() {
                log::warn!("Reporting home without touching stored history: {}", e);
            } else {
                log::info!("No navigation history yet, initializing with home");
                if let Err(e) = self.history.persist(history).await {
                    log::warn!("Failed to persist initial history: {}", e);
                }
            }
            let mut response = NavResponse::ok()
                .with_position(history)
                .with_url(self.home());
            response.initialized = Some(true);
            return response;
        }

        let url = url
            .or_else(|| history.current().map(str::to_string))
            .unwrap_or_default();
        self.notify(sender, PushMessage::state(history, url.clone())).await;
        NavResponse::ok().with_position(history).with_url(url)
    }

    async fn record_and_navigate(&self, sender: Option<ContextId>, url: &str) -> NavResponse {
        let history = match self.record_and_display(url).await {
            Ok(history) => history,
            Err(response) => return response,
        };
        self.notify(sender, PushMessage::state(&history, url)).await;
        NavResponse::ok().with_position(&history)
    }

    async fn update_side_panel_history(
        &self,
        sender: Option<ContextId>,
        url: &str,
        source: Option<&str>,
    ) -> NavResponse {
        log::debug!("In-page navigation to {} (source: {:?})", url, source);
        let history = match self.record_and_display(url).await {
            Ok(history) => history,
            Err(response) => return response,
        };
        let target = self.host.active_context().await.or(sender);
        self.notify(target, PushMessage::state(&history, url)).await;
        NavResponse::ok().with_flags(&history)
    }

    async fn open_url(
        &self,
        sender: Option<ContextId>,
        url: &str,
        update_history: bool,
        is_navigating: bool,
    ) -> NavResponse {
        let recorded = if update_history {
            match self.record(url).await {
                Ok(history) => Some(history),
                Err(response) => return response,
            }
        } else {
            None
        };

        if !is_navigating {
            if let Some(active) = self.host.active_context().await {
                let marker = PushMessage::SidepanelNavigation {
                    is_side_panel: true,
                    url: url.to_string(),
                    phase: NavigationPhase::BeforeNavigation,
                };
                self.notify(Some(active), marker).await;
            }
        }

        let display_url = self.mark_side_panel_url(url);
        self.remember_session(&display_url).await;

        if let Err(e) = self.host.set_panel_path(&display_url).await {
            log::error!("Error opening URL in side panel: {}", e);
            return NavResponse::failure(e);
        }

        let history = match recorded {
            Some(history) => Some(history),
            None => {
                let loaded = self.history.load().await;
                (!loaded.is_seeded()).then_some(loaded.history)
            }
        };
        if let Some(history) = history {
            self.notify(sender, PushMessage::state(&history, display_url)).await;
        }
        NavResponse::ok()
    }

    async fn default_bookmark_id(&self) -> NavResponse {
        match storage::get_one(self.store.as_ref(), StorageArea::Local, DEFAULT_BOOKMARK_ID).await {
            Ok(value) => {
                let mut response = NavResponse::ok();
                response.default_bookmark_id = value.and_then(|v| v.as_str().map(str::to_string));
                response
            }
            Err(e) => {
                log::warn!("Failed to read default bookmark folder: {}", e);
                NavResponse::failure(e)
            }
        }
    }

    async fn set_default_bookmark_id(&self, id: Option<String>) -> NavResponse {
        let value = id.map(Value::String).unwrap_or(Value::Null);
        match storage::set_one(self.store.as_ref(), StorageArea::Local, DEFAULT_BOOKMARK_ID, value).await {
            Ok(()) => NavResponse::ok(),
            Err(e) => NavResponse::failure(e),
        }
    }

    /// Loads, records `location` and persists. History is written before any
    /// display change is attempted, and never over state that could not be read.
    async fn record(&self, location: &str) -> Result<NavigationHistory, NavResponse> {
        let loaded = self.history.load().await;
        if let Some(e) = loaded.read_error() {
            log::warn!("Not recording {}: {}", location, e);
            return Err(NavResponse::failure(e));
        }
        let mut history = loaded.history;
        history.record(self.home(), location);
        match self.history.persist(&history).await {
            Ok(()) => Ok(history),
            Err(e) => {
                log::warn!("Failed to persist navigation to {}: {}", location, e);
                Err(NavResponse::failure(e))
            }
        }
    }

    async fn record_and_display(&self, url: &str) -> Result<NavigationHistory, NavResponse> {
        let history = self.record(url).await?;
        if let Err(e) = self.host.set_panel_path(url).await {
            log::error!("Error navigating to {}: {}", url, e);
            return Err(NavResponse::failure(e));
        }
        Ok(history)
    }

    /// Pages other than home are tagged so they know they are rendered in
    /// the side panel.
    fn mark_side_panel_url(&self, url: &str) -> String {
        if url.contains(self.home()) || url.contains(VIEW_MARKER) {
            return url.to_string();
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}true", url, separator, VIEW_MARKER)
    }

    async fn remember_session(&self, url: &str) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let mut items = Map::new();
        items.insert(SESSION_VIEW_KEY.to_string(), json!(true));
        items.insert(SESSION_LAST_URL_KEY.to_string(), json!(url));
        items.insert(SESSION_TIMESTAMP_KEY.to_string(), json!(timestamp));
        if let Err(e) = self.store.set(StorageArea::Session, items).await {
            log::warn!("Failed to save side panel session state: {}", e);
        }
    }

    #[cfg(test)]
    fn tracked_contexts(&self) -> (usize, usize) {
        let lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner()).len();
        let phases = self.phases.lock().unwrap_or_else(|e| e.into_inner()).len();
        (lanes, phases)
    }

    /// Best-effort push; delivery failures are logged and dropped.
    async fn notify(&self, target: Option<ContextId>, message: PushMessage) {
        let Some(context) = target else {
            log::debug!("No context to notify");
            return;
        };
        if let Err(e) = self.host.send_to_context(context, &message).await {
            log::warn!("Navigation state push dropped: {}", e);
        }
    }
}
