use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, queue};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{Database, DatabaseError};
use crate::scheduler::{
    DatabaseSource, FocusError, FocusProbe, NotificationSink, NotifyError, ReminderNotification,
    ReminderScheduler, SharedFocus,
};

/// How long the event reader blocks before checking for shutdown
const EVENT_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
    #[error("Event reader failed: {0}")]
    EventLoop(String),
}

/// Restores the terminal on drop, including on panic.
struct TerminalGuard {
    raw_mode_enabled: bool,
    focus_reporting: bool,
}

impl TerminalGuard {
    fn new() -> Result<Self, TerminalError> {
        enable_raw_mode()?;
        let mut guard = Self {
            raw_mode_enabled: true,
            focus_reporting: false,
        };
        // Not every terminal supports focus reporting; the scheduler then
        // treats the app as focused
        if execute!(io::stdout(), EnableFocusChange).is_ok() {
            guard.focus_reporting = true;
        }
        Ok(guard)
    }

    fn restore(&mut self) -> Result<(), TerminalError> {
        if self.focus_reporting {
            execute!(io::stdout(), DisableFocusChange)?;
            self.focus_reporting = false;
        }
        if self.raw_mode_enabled {
            disable_raw_mode()?;
            self.raw_mode_enabled = false;
        }
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.focus_reporting {
            let _ = execute!(io::stdout(), DisableFocusChange);
        }
        if self.raw_mode_enabled {
            let _ = disable_raw_mode();
        }
    }
}

/// Focus probe fed by the terminal's focus-change events.
#[derive(Debug, Clone, Default)]
pub struct TerminalFocus {
    shared: SharedFocus,
}

impl TerminalFocus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update focus from a terminal event. Returns true if the event was a
    /// focus change.
    pub fn apply(&self, event: &Event) -> bool {
        match event {
            Event::FocusGained => self.shared.set_focused(true),
            Event::FocusLost => self.shared.set_focused(false),
            _ => return false,
        }
        true
    }

    pub fn mark_unsupported(&self) {
        self.shared.set_unsupported();
    }
}

impl FocusProbe for TerminalFocus {
    fn is_focused(&self) -> Result<bool, FocusError> {
        self.shared.is_focused()
    }
}

/// Writes reminder notifications to a terminal.
///
/// A toast is a coloured line in the terminal itself. A system notification
/// is sent as an OSC 9 escape, which terminals that support it forward to the
/// desktop, followed by a bell.
pub struct TerminalNotifier<W: Write + Send> {
    out: Mutex<W>,
}

impl TerminalNotifier<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|p| p.into_inner())
    }

    fn with_out<F>(&self, write: F) -> Result<(), NotifyError>
    where
        F: FnOnce(&mut W) -> io::Result<()>,
    {
        let mut out = self
            .out
            .lock()
            .map_err(|_| NotifyError::Unavailable("terminal writer poisoned".to_string()))?;
        write(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

/// Strip control characters so note text cannot end the escape sequence early
fn escape_safe(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

impl<W: Write + Send> NotificationSink for TerminalNotifier<W> {
    fn toast(&self, notification: &ReminderNotification) -> Result<(), NotifyError> {
        self.with_out(|out| {
            queue!(
                out,
                SetForegroundColor(Color::Yellow),
                SetAttribute(Attribute::Bold),
                Print(&notification.title),
                SetAttribute(Attribute::Reset),
                ResetColor,
                Print(format!("  {}\r\n", notification.body)),
            )
        })
    }

    fn system(&self, notification: &ReminderNotification) -> Result<(), NotifyError> {
        let message = format!(
            "{} - {}",
            escape_safe(&notification.title),
            escape_safe(&notification.body)
        );
        self.with_out(|out| write!(out, "\x1b]9;{}\x07\x07", message))
    }
}

/// Whether a key press ends watch mode
fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Block reading terminal events until the user quits.
fn read_events(focus: TerminalFocus) -> Result<(), TerminalError> {
    loop {
        if !event::poll(EVENT_POLL)? {
            continue;
        }
        let ev = event::read()?;
        if focus.apply(&ev) {
            debug!(focused = matches!(ev, Event::FocusGained), "focus changed");
            continue;
        }
        if let Event::Key(key) = ev {
            if is_quit_key(&key) {
                return Ok(());
            }
        }
    }
}

/// Run the reminder scheduler in the foreground until `q`, `Esc` or `Ctrl+C`.
pub async fn run_watch(config: &Config, db: Database) -> Result<(), TerminalError> {
    let pending = db
        .get_all_reminders()?
        .iter()
        .filter(|r| r.enabled && !r.completed)
        .count();

    let mut guard = TerminalGuard::new()?;
    let focus = TerminalFocus::new();
    if !guard.focus_reporting {
        focus.mark_unsupported();
    }

    let mut stdout = io::stdout();
    execute!(
        stdout,
        SetAttribute(Attribute::Bold),
        Print("notia"),
        SetAttribute(Attribute::Reset),
        Print(format!(
            "  watching {} pending reminder(s), press q to quit\r\n",
            pending
        )),
    )?;

    let scheduler = ReminderScheduler::new(
        Arc::new(DatabaseSource::new(db)),
        Arc::new(focus.clone()),
        Arc::new(TerminalNotifier::stdout()),
        &config.scheduler,
    );
    let handle = scheduler.start();

    let reader = tokio::task::spawn_blocking(move || read_events(focus));
    let result = match reader.await {
        Ok(result) => result,
        Err(e) => Err(TerminalError::EventLoop(e.to_string())),
    };

    if let Some(stopped) = handle.stop().await {
        info!(notified = stopped.notified().len(), "watch finished");
    }
    guard.restore()?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn notification() -> ReminderNotification {
        ReminderNotification::new(3, 7, "회의", "자료 준비")
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_toast_is_a_terminal_line() {
        let notifier = TerminalNotifier::new(Vec::new());
        notifier.toast(&notification()).unwrap();
        let out = String::from_utf8(notifier.into_inner()).unwrap();
        assert!(out.contains("리마인더: 회의"));
        assert!(out.ends_with("  자료 준비\r\n"));
        assert!(!out.contains("\x1b]9;"));
    }

    #[test]
    fn test_system_uses_osc9() {
        let notifier = TerminalNotifier::new(Vec::new());
        notifier.system(&notification()).unwrap();
        let out = String::from_utf8(notifier.into_inner()).unwrap();
        assert_eq!(out, "\x1b]9;리마인더: 회의 - 자료 준비\x07\x07");
    }

    #[test]
    fn test_system_strips_control_chars() {
        let notifier = TerminalNotifier::new(Vec::new());
        let n = ReminderNotification::new(1, 1, "a\x07b", "c\x1bd");
        notifier.system(&n).unwrap();
        let out = String::from_utf8(notifier.into_inner()).unwrap();
        assert_eq!(out, "\x1b]9;리마인더: ab - cd\x07\x07");
    }

    #[test]
    fn test_focus_events_update_probe() {
        let focus = TerminalFocus::new();
        assert!(focus.is_focused().unwrap());
        assert!(focus.apply(&Event::FocusLost));
        assert!(!focus.is_focused().unwrap());
        assert!(focus.apply(&Event::FocusGained));
        assert!(focus.is_focused().unwrap());
        assert!(!focus.apply(&Event::Resize(80, 24)));
    }

    #[test]
    fn test_unsupported_focus_reports_error() {
        let focus = TerminalFocus::new();
        focus.mark_unsupported();
        assert!(focus.is_focused().is_err());
    }

    #[test]
    fn test_quit_keys() {
        assert!(is_quit_key(&key(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(is_quit_key(&key(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(is_quit_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(!is_quit_key(&key(KeyCode::Char('c'), KeyModifiers::NONE)));
        assert!(!is_quit_key(&key(KeyCode::Enter, KeyModifiers::NONE)));
    }
}
