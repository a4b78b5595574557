use super::command::{NavCommand, NavResponse, PushMessage};
use super::controller::NavigationController;
use super::host::ContextId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use url::Url;

/// How a page reaches the navigation controller.
#[async_trait]
pub trait ControllerLink: Send + Sync {
    async fn send(&self, command: NavCommand) -> NavResponse;
}

/// Link to a controller living in the same process.
pub struct LocalLink {
    controller: Arc<NavigationController>,
    context: ContextId,
}

impl LocalLink {
    pub fn new(controller: Arc<NavigationController>, context: ContextId) -> Self {
        Self { controller, context }
    }
}

#[async_trait]
impl ControllerLink for LocalLink {
    async fn send(&self, command: NavCommand) -> NavResponse {
        self.controller.handle(Some(self.context), command).await
    }
}

/// Read-only projection of the history that a page renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavState {
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub current_url: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewerError {
    #[error("A navigation request is already in flight")]
    Busy,
    #[error("Navigation failed: {0}")]
    Rejected(String),
}

/// Whether an intercepted link stays on the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    /// Same document, only query or fragment differ; re-render in place.
    SameView,
    /// A different extension page replaces the current one.
    CrossView,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Not an extension page; let the default navigation happen.
    NotIntercepted,
    Navigated { url: String, change: ViewChange },
    Failed(ViewerError),
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-page back/forward affordances and link interception.
pub struct NavigationViewer<L: ControllerLink> {
    link: L,
    /// Root of the extension's own pages, e.g. `chrome-extension://<id>/`.
    base: Url,
    page: Mutex<Url>,
    in_flight: AtomicBool,
    in_side_panel: AtomicBool,
    state: watch::Sender<NavState>,
}

impl<L: ControllerLink> NavigationViewer<L> {
    pub fn new(link: L, base: Url, page: Url) -> Self {
        let (state, _) = watch::channel(NavState::default());
        Self {
            link,
            base,
            page: Mutex::new(page),
            in_flight: AtomicBool::new(false),
            in_side_panel: AtomicBool::new(false),
            state,
        }
    }

    pub fn state(&self) -> NavState {
        self.state.borrow().clone()
    }

    /// Receiver that sees every state change, for whatever renders the buttons.
    pub fn subscribe(&self) -> watch::Receiver<NavState> {
        self.state.subscribe()
    }

    pub fn page(&self) -> Url {
        self.page.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn in_side_panel(&self) -> bool {
        self.in_side_panel.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<InFlight<'_>, ViewerError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ViewerError::Busy)?;
        Ok(InFlight(&self.in_flight))
    }

    async fn send(&self, command: NavCommand) -> Result<NavResponse, ViewerError> {
        let _guard = self.begin()?;
        let response = self.link.send(command).await;
        if !response.success {
            let error = response.error.clone().unwrap_or_else(|| "unknown error".to_string());
            // Rejected steps still report where we are.
            if let (Some(back), Some(forward)) = (response.can_go_back, response.can_go_forward) {
                self.update(back, forward, None);
            }
            return Err(ViewerError::Rejected(error));
        }
        Ok(response)
    }

    fn update(&self, can_go_back: bool, can_go_forward: bool, url: Option<String>) {
        self.state.send_modify(|state| {
            state.can_go_back = can_go_back;
            state.can_go_forward = can_go_forward;
            if url.is_some() {
                state.current_url = url;
            }
        });
    }

    fn apply_response(&self, response: &NavResponse, url: Option<String>) -> NavState {
        let current = self.state();
        self.update(
            response.can_go_back.unwrap_or(current.can_go_back),
            response.can_go_forward.unwrap_or(current.can_go_forward),
            response.url.clone().or(url),
        );
        self.state()
    }

    /// Asks the controller for the current flags, typically on page load.
    pub async fn request_state(&self) -> Result<NavState, ViewerError> {
        let response = self.send(NavCommand::GetNavigationState { url: None }).await?;
        Ok(self.apply_response(&response, None))
    }

    pub async fn go_back(&self) -> Result<NavState, ViewerError> {
        let response = self.send(NavCommand::NavigateBack).await?;
        Ok(self.apply_response(&response, None))
    }

    pub async fn go_forward(&self) -> Result<NavState, ViewerError> {
        let response = self.send(NavCommand::NavigateForward).await?;
        Ok(self.apply_response(&response, None))
    }

    pub async fn go_home(&self) -> Result<NavState, ViewerError> {
        let response = self.send(NavCommand::NavigateHome).await?;
        Ok(self.apply_response(&response, None))
    }

    /// Routes a click on `href` through the controller when it points at one
    /// of the extension's own pages.
    pub async fn intercept_click(&self, href: &str) -> ClickOutcome {
        let page = self.page();
        let Ok(target) = page.join(href) else {
            return ClickOutcome::NotIntercepted;
        };
        if !self.is_internal(&target) {
            return ClickOutcome::NotIntercepted;
        }

        let change = if target.path() == page.path() {
            ViewChange::SameView
        } else {
            ViewChange::CrossView
        };
        let location = self.location_of(&target);

        match self
            .send(NavCommand::RecordAndNavigate {
                url: location.clone(),
            })
            .await
        {
            Ok(response) => {
                self.apply_response(&response, Some(location.clone()));
                *self.page.lock().unwrap_or_else(|e| e.into_inner()) = target;
                log::debug!("Intercepted {:?} navigation to {}", change, location);
                ClickOutcome::Navigated {
                    url: location,
                    change,
                }
            }
            Err(e) => ClickOutcome::Failed(e),
        }
    }

    /// Applies a controller push. Never touches history.
    pub fn apply_pushed_state(&self, message: &PushMessage) {
        match message {
            PushMessage::UpdateNavigationState {
                can_go_back,
                can_go_forward,
                url,
                ..
            } => self.update(*can_go_back, *can_go_forward, url.clone()),
            PushMessage::SidepanelNavigation { is_side_panel, .. } => {
                self.in_side_panel.store(*is_side_panel, Ordering::SeqCst);
            }
        }
    }

    fn is_internal(&self, url: &Url) -> bool {
        url.scheme() == self.base.scheme()
            && url.host_str() == self.base.host_str()
            && url.path().starts_with(self.base.path())
    }

    /// Location string relative to the extension root, as the history stores it.
    fn location_of(&self, url: &Url) -> String {
        let path = url.path().strip_prefix(self.base.path()).unwrap_or(url.path());
        let mut location = path.trim_start_matches('/').to_string();
        if let Some(query) = url.query() {
            location.push('?');
            location.push_str(query);
        }
        if let Some(fragment) = url.fragment() {
            location.push('#');
            location.push_str(fragment);
        }
        location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::host::RecordingHost;
    use crate::storage::MemoryStore;
    use tokio::sync::Notify;

    const HOME: &str = "src/sidepanel.html";
    const TAB: ContextId = ContextId(11);

    fn base() -> Url {
        Url::parse("chrome-extension://abcdef/").unwrap()
    }

    fn page(path: &str) -> Url {
        base().join(path).unwrap()
    }

    fn setup() -> (Arc<RecordingHost>, NavigationViewer<LocalLink>) {
        let host = Arc::new(RecordingHost::new());
        let controller = Arc::new(NavigationController::new(
            Arc::new(MemoryStore::new()),
            host.clone(),
            HOME,
        ));
        let viewer = NavigationViewer::new(LocalLink::new(controller, TAB), base(), page(HOME));
        (host, viewer)
    }

    #[tokio::test]
    async fn test_request_state_on_load() {
        let (_, viewer) = setup();
        let state = viewer.request_state().await.unwrap();
        assert!(!state.can_go_back);
        assert!(!state.can_go_forward);
        assert_eq!(state.current_url.as_deref(), Some(HOME));
    }

    #[tokio::test]
    async fn test_cross_view_click_is_recorded() {
        let (host, viewer) = setup();
        let outcome = viewer.intercept_click("settings.html?tab=2").await;

        assert_eq!(
            outcome,
            ClickOutcome::Navigated {
                url: "src/settings.html?tab=2".into(),
                change: ViewChange::CrossView,
            }
        );
        assert_eq!(host.displayed().as_deref(), Some("src/settings.html?tab=2"));
        assert!(viewer.state().can_go_back);
        assert_eq!(viewer.page().path(), "/src/settings.html");
    }

    #[tokio::test]
    async fn test_same_view_click() {
        let (_, viewer) = setup();
        let outcome = viewer.intercept_click("#folder-12").await;
        assert!(matches!(
            outcome,
            ClickOutcome::Navigated {
                change: ViewChange::SameView,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_external_links_pass_through() {
        let (host, viewer) = setup();
        let outcome = viewer.intercept_click("https://github.com/").await;
        assert_eq!(outcome, ClickOutcome::NotIntercepted);
        assert_eq!(host.displayed(), None);
    }

    #[tokio::test]
    async fn test_back_and_forward_buttons() {
        let (_, viewer) = setup();
        viewer.intercept_click("a.html").await;
        viewer.intercept_click("b.html").await;

        let state = viewer.go_back().await.unwrap();
        assert!(state.can_go_back);
        assert!(state.can_go_forward);
        assert_eq!(state.current_url.as_deref(), Some("src/a.html"));

        let state = viewer.go_forward().await.unwrap();
        assert!(!state.can_go_forward);

        let err = viewer.go_forward().await.unwrap_err();
        assert!(matches!(err, ViewerError::Rejected(_)));
        assert!(!viewer.state().can_go_forward);
    }

    #[tokio::test]
    async fn test_pushed_state_updates_subscribers() {
        let (host, viewer) = setup();
        let mut rx = viewer.subscribe();

        viewer.intercept_click("a.html").await;
        for (context, message) in host.take_sent() {
            assert_eq!(context, TAB);
            viewer.apply_pushed_state(&message);
        }

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert!(state.can_go_back);
        assert_eq!(state.current_url.as_deref(), Some("src/a.html"));
    }

    struct GatedLink {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ControllerLink for GatedLink {
        async fn send(&self, _command: NavCommand) -> NavResponse {
            self.gate.notified().await;
            NavResponse::ok()
        }
    }

    #[tokio::test]
    async fn test_second_request_while_in_flight_is_refused() {
        let gate = Arc::new(Notify::new());
        let viewer = NavigationViewer::new(GatedLink { gate: gate.clone() }, base(), page(HOME));

        let (first, second) = tokio::join!(viewer.intercept_click("a.html"), async {
            let outcome = viewer.intercept_click("b.html").await;
            gate.notify_one();
            outcome
        });

        assert!(matches!(first, ClickOutcome::Navigated { .. }));
        assert_eq!(second, ClickOutcome::Failed(ViewerError::Busy));
    }
}
