use super::command::PushMessage;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Identifies a page context (a tab or side-panel document) that can send
/// commands and receive pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Failed to set side panel location: {0}")]
    Display(String),
    #[error("Could not deliver message to context {0:?}: {1}")]
    Delivery(ContextId, String),
}

/// The browser surface the controller drives.
#[async_trait]
pub trait SidePanelHost: Send + Sync {
    /// Changes the location shown in the side panel.
    async fn set_panel_path(&self, path: &str) -> Result<(), HostError>;

    /// Delivers a push message to one context. Fails when the context is
    /// gone or not yet listening.
    async fn send_to_context(&self, context: ContextId, message: &PushMessage) -> Result<(), HostError>;

    /// The context in the focused tab of the current window, if any.
    async fn active_context(&self) -> Option<ContextId>;
}

/// Host that records what it was asked to do. Used by the CLI and tests.
#[derive(Default)]
pub struct RecordingHost {
    displayed: Mutex<Option<String>>,
    sent: Mutex<Vec<(ContextId, PushMessage)>>,
    active: Mutex<Option<ContextId>>,
    unreachable: Mutex<HashSet<ContextId>>,
    fail_display: AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active_context(self, context: ContextId) -> Self {
        self.set_active_context(Some(context));
        self
    }

    pub fn set_active_context(&self, context: Option<ContextId>) {
        if let Ok(mut active) = self.active.lock() {
            *active = context;
        }
    }

    /// Makes every subsequent `set_panel_path` fail (or succeed again).
    pub fn set_fail_display(&self, fail: bool) {
        self.fail_display.store(fail, Ordering::SeqCst);
    }

    /// Marks a context as not accepting messages.
    pub fn set_unreachable(&self, context: ContextId) {
        if let Ok(mut unreachable) = self.unreachable.lock() {
            unreachable.insert(context);
        }
    }

    pub fn displayed(&self) -> Option<String> {
        self.displayed.lock().ok().and_then(|d| d.clone())
    }

    pub fn sent(&self) -> Vec<(ContextId, PushMessage)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Removes and returns everything sent so far.
    pub fn take_sent(&self) -> Vec<(ContextId, PushMessage)> {
        self.sent
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }
}

#[async_trait]
impl SidePanelHost for RecordingHost {
    async fn set_panel_path(&self, path: &str) -> Result<(), HostError> {
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(HostError::Display(format!("side panel rejected {}", path)));
        }
        let mut displayed = self
            .displayed
            .lock()
            .map_err(|e| HostError::Display(e.to_string()))?;
        *displayed = Some(path.to_string());
        Ok(())
    }

    async fn send_to_context(&self, context: ContextId, message: &PushMessage) -> Result<(), HostError> {
        let unreachable = self
            .unreachable
            .lock()
            .map(|u| u.contains(&context))
            .unwrap_or(false);
        if unreachable {
            return Err(HostError::Delivery(
                context,
                "Receiving end does not exist".to_string(),
            ));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| HostError::Delivery(context, e.to_string()))?;
        sent.push((context, message.clone()));
        Ok(())
    }

    async fn active_context(&self) -> Option<ContextId> {
        self.active.lock().ok().and_then(|a| *a)
    }
}
