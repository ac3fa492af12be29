//! Toast notifications
//!
//! Fire-and-forget. Silent mode suppresses success and info toasts; warnings
//! and errors still reach the user, since they report that an action did not
//! happen.

use crate::types::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Info,
    Warning,
    Error,
}

impl ToastKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Host toast UI.
pub trait Notifier {
    fn show(&self, message: &str, kind: ToastKind);
}

/// Show a toast unless silent mode suppresses it. Returns whether it was shown.
pub fn notify(notifier: &dyn Notifier, settings: &Settings, message: &str, kind: ToastKind) -> bool {
    if settings.silent_mode && matches!(kind, ToastKind::Success | ToastKind::Info) {
        return false;
    }
    notifier.show(message, kind);
    true
}
