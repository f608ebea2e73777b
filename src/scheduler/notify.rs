use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Which channel a reminder notification went out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    /// Transient in-app message; used while the app has focus
    Toast,
    /// Platform notification; used while the app is in the background
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderNotification {
    pub reminder_id: i64,
    pub note_id: i64,
    pub title: String,
    pub body: String,
    /// Deep link back to the owning note
    pub link: String,
}

impl ReminderNotification {
    pub fn new(reminder_id: i64, note_id: i64, note_title: &str, reminder_text: &str) -> Self {
        Self {
            reminder_id,
            note_id,
            title: format!("리마인더: {}", note_title),
            body: reminder_text.to_string(),
            link: format!("notia://notes/{}", note_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FocusError {
    #[error("focus reporting is not supported here")]
    Unsupported,
    #[error("focus query failed: {0}")]
    Query(String),
}

/// Receives reminder notifications. Implementations should not retry; a
/// failed delivery is logged by the scheduler and never attempted again.
pub trait NotificationSink: Send + Sync {
    fn toast(&self, notification: &ReminderNotification) -> Result<(), NotifyError>;
    fn system(&self, notification: &ReminderNotification) -> Result<(), NotifyError>;
}

/// Answers whether the application currently has input focus.
pub trait FocusProbe: Send + Sync {
    fn is_focused(&self) -> Result<bool, FocusError>;
}

/// Focus flag shared between an event reader and the scheduler.
#[derive(Debug, Clone)]
pub struct SharedFocus {
    focused: Arc<AtomicBool>,
    supported: Arc<AtomicBool>,
}

impl SharedFocus {
    pub fn new(initially_focused: bool) -> Self {
        Self {
            focused: Arc::new(AtomicBool::new(initially_focused)),
            supported: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_focused(&self, focused: bool) {
        self.focused.store(focused, Ordering::Relaxed);
    }

    /// Mark focus reporting as unavailable; queries then fail
    pub fn set_unsupported(&self) {
        self.supported.store(false, Ordering::Relaxed);
    }
}

impl Default for SharedFocus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FocusProbe for SharedFocus {
    fn is_focused(&self) -> Result<bool, FocusError> {
        if !self.supported.load(Ordering::Relaxed) {
            return Err(FocusError::Unsupported);
        }
        Ok(self.focused.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_payload() {
        let n = ReminderNotification::new(5, 2, "장보기", "우유 사기");
        assert_eq!(n.title, "리마인더: 장보기");
        assert_eq!(n.body, "우유 사기");
        assert_eq!(n.link, "notia://notes/2");
    }

    #[test]
    fn test_shared_focus() {
        let focus = SharedFocus::default();
        let reader = focus.clone();
        assert!(reader.is_focused().unwrap());
        focus.set_focused(false);
        assert!(!reader.is_focused().unwrap());
        focus.set_unsupported();
        assert!(matches!(reader.is_focused(), Err(FocusError::Unsupported)));
    }
}
