//! UI side-effect collaborators
//!
//! The session triggers user-visible effects through this trait so the
//! state machine stays independent of how (or whether) they render.

use tracing::{info, warn};

/// Visual flavor of a toast notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

/// Side effects the session may trigger
pub trait UiEffects: Send + Sync {
    /// Show a transient notification
    fn show_toast(&self, text: &str, kind: ToastKind);

    /// Leave the current plan view
    fn navigate_home(&self);

    /// Keep the newest log entry visible
    fn scroll_to_latest(&self);
}

/// Tracing-backed effects for headless use
pub struct LogEffects;

impl UiEffects for LogEffects {
    fn show_toast(&self, text: &str, kind: ToastKind) {
        match kind {
            ToastKind::Error => warn!(%text, "toast"),
            _ => info!(%text, "toast"),
        }
    }

    fn navigate_home(&self) {
        info!("navigate: home");
    }

    fn scroll_to_latest(&self) {}
}
