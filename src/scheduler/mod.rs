//! Reminder scheduler.
//!
//! A background loop that polls every reminder, finds the ones that just
//! became due and notifies each exactly once per scheduler session. A
//! reminder is due while `0 <= now - reminder_time < detection_window`;
//! anything older is treated as missed and skipped without a notification.
//!
//! While the app has focus a due reminder becomes a toast, otherwise a system
//! notification. Never both.

pub mod clock;
pub mod notify;
pub mod source;

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::database::DatabaseError;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notify::{
    Channel, FocusError, FocusProbe, NotificationSink, NotifyError, ReminderNotification,
    SharedFocus,
};
pub use source::{DatabaseSource, InMemoryReminders, ReminderSource};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("reminder store lock poisoned")]
    SourcePoisoned,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub notified: Vec<(i64, Channel)>,
    pub failed: Vec<i64>,
}

pub struct ReminderScheduler {
    source: Arc<dyn ReminderSource>,
    focus: Arc<dyn FocusProbe>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    detection_window: TimeDelta,
    /// Reminder ids already notified this session
    notified: HashSet<i64>,
    /// Reminder ids whose stored time could not be read, warned about once
    unreadable: HashSet<i64>,
}

impl ReminderScheduler {
    pub fn new(
        source: Arc<dyn ReminderSource>,
        focus: Arc<dyn FocusProbe>,
        sink: Arc<dyn NotificationSink>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            source,
            focus,
            sink,
            clock: Arc::new(SystemClock),
            poll_interval: config.poll_interval(),
            detection_window: TimeDelta::from_std(config.detection_window())
                .unwrap_or(TimeDelta::seconds(60)),
            notified: HashSet::new(),
            unreadable: HashSet::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notified(&self) -> &HashSet<i64> {
        &self.notified
    }

    /// Run one check against the scheduler's clock.
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        self.check_at(now)
    }

    /// Run one check as if the current time were `now`.
    pub fn check_at(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let notes = match self.source.snapshot() {
            Ok(notes) => notes,
            Err(e) => {
                warn!("cannot read reminders, skipping tick: {e}");
                return report;
            }
        };

        for note in &notes {
            for reminder in &note.reminders {
                if reminder.completed || !reminder.enabled {
                    continue;
                }
                let Some(id) = reminder.id else { continue };
                if self.notified.contains(&id) {
                    continue;
                }

                let due = match reminder.due_at() {
                    Ok(due) => due.with_timezone(&Utc),
                    Err(e) => {
                        if self.unreadable.insert(id) {
                            warn!(
                                reminder_id = id,
                                "unreadable reminder time {:?}: {e}",
                                reminder.reminder_time
                            );
                        }
                        continue;
                    }
                };

                let elapsed = now.signed_duration_since(due);
                if elapsed < TimeDelta::zero() || elapsed >= self.detection_window {
                    continue;
                }

                debug!(reminder_id = id, elapsed_ms = elapsed.num_milliseconds(), "reminder due");
                let notification = ReminderNotification::new(
                    id,
                    note.note_id,
                    &note.title,
                    &reminder.reminder_text,
                );
                let channel = self.pick_channel();
                let delivered = match channel {
                    Channel::Toast => self.sink.toast(&notification),
                    Channel::System => self.sink.system(&notification),
                };

                // marked either way: a failed delivery is not retried
                self.notified.insert(id);
                match delivered {
                    Ok(()) => {
                        info!(reminder_id = id, ?channel, "reminder notified");
                        report.notified.push((id, channel));
                    }
                    Err(e) => {
                        warn!(reminder_id = id, ?channel, "reminder notification failed: {e}");
                        report.failed.push(id);
                    }
                }
            }
        }

        report
    }

    fn pick_channel(&self) -> Channel {
        match self.focus.is_focused() {
            Ok(true) => Channel::Toast,
            Ok(false) => Channel::System,
            Err(e) => {
                warn!("focus check failed, assuming focused: {e}");
                Channel::Toast
            }
        }
    }

    /// Start polling in a background task. The first check runs immediately.
    pub fn start(mut self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let join = tokio::spawn(async move {
            info!(
                interval_ms = self.poll_interval.as_millis() as u64,
                window_secs = self.detection_window.num_seconds(),
                "reminder scheduler started"
            );
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {
                        self.tick();
                    }
                }
            }

            info!(notified = self.notified.len(), "reminder scheduler stopped");
            self
        });

        SchedulerHandle {
            cancel,
            join: Some(join),
        }
    }
}

/// Handle to a running scheduler. Dropping it cancels the polling task.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<ReminderScheduler>>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Cancel the polling task and wait for it, returning the scheduler.
    pub async fn stop(mut self) -> Option<ReminderScheduler> {
        self.cancel.cancel();
        let join = self.join.take()?;
        match join.await {
            Ok(scheduler) => Some(scheduler),
            Err(e) => {
                warn!("reminder scheduler task ended abnormally: {e}");
                None
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoteReminders, Reminder};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(Channel, ReminderNotification)>>,
        fail: bool,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(Channel, ReminderNotification)> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, channel: Channel, n: &ReminderNotification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((channel, n.clone()));
            if self.fail {
                Err(NotifyError::PermissionDenied)
            } else {
                Ok(())
            }
        }
    }

    impl NotificationSink for RecordingSink {
        fn toast(&self, n: &ReminderNotification) -> Result<(), NotifyError> {
            self.record(Channel::Toast, n)
        }
        fn system(&self, n: &ReminderNotification) -> Result<(), NotifyError> {
            self.record(Channel::System, n)
        }
    }

    /// Fails the first `failures_left` reads, then serves `inner`
    struct FlakySource {
        inner: InMemoryReminders,
        failures_left: Mutex<u32>,
    }

    impl ReminderSource for FlakySource {
        fn snapshot(&self) -> Result<Vec<NoteReminders>, SchedulerError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(SchedulerError::SourcePoisoned);
            }
            self.inner.snapshot()
        }
    }

    struct BrokenFocus;

    impl FocusProbe for BrokenFocus {
        fn is_focused(&self) -> Result<bool, FocusError> {
            Err(FocusError::Query("no window".into()))
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-25T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn reminder(id: i64, offset_secs: i64) -> Reminder {
        let time = now() + TimeDelta::seconds(offset_secs);
        let mut r = Reminder::new(
            1,
            format!("할 일 {}", id),
            time.to_rfc3339(),
            format!("@{}.", id),
        );
        r.id = Some(id);
        r
    }

    fn store(reminders: Vec<Reminder>) -> InMemoryReminders {
        InMemoryReminders::new(vec![NoteReminders {
            note_id: 1,
            title: "메모".into(),
            reminders,
        }])
    }

    fn scheduler(
        source: InMemoryReminders,
        focus: Arc<dyn FocusProbe>,
        sink: Arc<RecordingSink>,
    ) -> ReminderScheduler {
        ReminderScheduler::new(Arc::new(source), focus, sink, &SchedulerConfig::default())
            .with_clock(Arc::new(ManualClock::new(now())))
    }

    #[test]
    fn test_due_reminder_notifies_once() {
        let sink = Arc::new(RecordingSink::default());
        let mut s = scheduler(
            store(vec![reminder(1, -10)]),
            Arc::new(SharedFocus::new(true)),
            sink.clone(),
        );

        let first = s.tick();
        assert_eq!(first.notified, vec![(1, Channel::Toast)]);
        assert!(s.tick().notified.is_empty());
        assert!(s.check_at(now() + TimeDelta::seconds(2)).notified.is_empty());

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.title, "리마인더: 메모");
        assert_eq!(sent[0].1.body, "할 일 1");
    }

    #[test]
    fn test_exclusions() {
        let mut completed = reminder(1, -10);
        completed.completed = true;
        let mut disabled = reminder(2, -10);
        disabled.enabled = false;
        let future = reminder(3, 200);
        let missed = reminder(4, -61);

        let sink = Arc::new(RecordingSink::default());
        let mut s = scheduler(
            store(vec![completed, disabled, future, missed]),
            Arc::new(SharedFocus::new(true)),
            sink.clone(),
        );
        assert_eq!(s.tick(), TickReport::default());
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_window_edges() {
        let sink = Arc::new(RecordingSink::default());
        let mut s = scheduler(
            store(vec![reminder(1, 0), reminder(2, -60), reminder(3, -59)]),
            Arc::new(SharedFocus::new(true)),
            sink.clone(),
        );
        let ids: Vec<i64> = s.tick().notified.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_future_reminder_fires_when_reached() {
        let clock = ManualClock::new(now());
        let sink = Arc::new(RecordingSink::default());
        let mut s = scheduler(
            store(vec![reminder(1, 5)]),
            Arc::new(SharedFocus::new(true)),
            sink.clone(),
        )
        .with_clock(Arc::new(clock.clone()));

        assert!(s.tick().notified.is_empty());
        clock.set(now() + TimeDelta::seconds(6));
        assert_eq!(s.tick().notified, vec![(1, Channel::Toast)]);
    }

    #[test]
    fn test_source_error_skips_only_that_tick() {
        let sink = Arc::new(RecordingSink::default());
        let source = FlakySource {
            inner: store(vec![reminder(1, -1)]),
            failures_left: Mutex::new(1),
        };
        let mut s = ReminderScheduler::new(
            Arc::new(source),
            Arc::new(SharedFocus::new(true)),
            sink.clone(),
            &SchedulerConfig::default(),
        )
        .with_clock(Arc::new(ManualClock::new(now())));

        assert_eq!(s.tick(), TickReport::default());
        assert!(s.notified().is_empty());
        assert_eq!(s.tick().notified, vec![(1, Channel::Toast)]);
        assert_eq!(sink.sent().len(), 1);
    }

    #[test]
    fn test_focus_selects_channel() {
        let focus = SharedFocus::new(true);
        let sink = Arc::new(RecordingSink::default());
        let mut s = scheduler(
            store(vec![reminder(1, -1), reminder(2, -1)]),
            Arc::new(focus.clone()),
            sink.clone(),
        );
        s.tick();

        let sink_bg = Arc::new(RecordingSink::default());
        let focus_bg = SharedFocus::new(false);
        let mut bg = scheduler(store(vec![reminder(1, -1)]), Arc::new(focus_bg), sink_bg.clone());
        bg.tick();

        assert!(sink.sent().iter().all(|(c, _)| *c == Channel::Toast));
        assert_eq!(sink_bg.sent().len(), 1);
        assert_eq!(sink_bg.sent()[0].0, Channel::System);
    }

    #[test]
    fn test_focus_failure_falls_back_to_toast() {
        let sink = Arc::new(RecordingSink::default());
        let mut s = scheduler(store(vec![reminder(1, -1)]), Arc::new(BrokenFocus), sink.clone());
        assert_eq!(s.tick().notified, vec![(1, Channel::Toast)]);
    }

    #[test]
    fn test_failed_delivery_is_not_retried() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let mut s = scheduler(
            store(vec![reminder(1, -1)]),
            Arc::new(SharedFocus::new(false)),
            sink.clone(),
        );
        assert_eq!(s.tick().failed, vec![1]);
        assert!(s.tick().failed.is_empty());
        assert_eq!(sink.sent().len(), 1);
        assert!(s.notified().contains(&1));
    }

    #[test]
    fn test_unreadable_time_does_not_block_others() {
        let mut broken = reminder(1, -1);
        broken.reminder_time = "not a time".into();
        let sink = Arc::new(RecordingSink::default());
        let mut s = scheduler(
            store(vec![broken, reminder(2, -1)]),
            Arc::new(SharedFocus::new(true)),
            sink.clone(),
        );
        assert_eq!(s.tick().notified, vec![(2, Channel::Toast)]);
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let source = store(vec![reminder(1, -1)]);
        let sink_a = Arc::new(RecordingSink::default());
        let sink_b = Arc::new(RecordingSink::default());
        let mut a = scheduler(source.clone(), Arc::new(SharedFocus::new(true)), sink_a.clone());
        let mut b = scheduler(source, Arc::new(SharedFocus::new(true)), sink_b.clone());
        a.tick();
        b.tick();
        assert_eq!(sink_a.sent().len(), 1);
        assert_eq!(sink_b.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_scheduler_notifies_once_across_ticks() {
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(
            store(vec![reminder(1, -10)]),
            Arc::new(SharedFocus::new(true)),
            sink.clone(),
        );

        let handle = s.start();
        assert!(handle.is_running());
        tokio::time::sleep(Duration::from_secs(7)).await;

        let stopped = handle.stop().await.expect("scheduler returned");
        assert_eq!(sink.sent().len(), 1);
        assert!(stopped.notified().contains(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reminders_added_later_are_picked_up() {
        let source = store(Vec::new());
        let clock = ManualClock::new(now());
        let sink = Arc::new(RecordingSink::default());
        let s = ReminderScheduler::new(
            Arc::new(source.clone()),
            Arc::new(SharedFocus::new(false)),
            sink.clone(),
            &SchedulerConfig::default(),
        )
        .with_clock(Arc::new(clock.clone()));

        let handle = s.start();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(sink.sent().is_empty());

        source.update(|notes| notes[0].reminders.push(reminder(9, 1)));
        clock.advance(TimeDelta::seconds(3));
        tokio::time::sleep(Duration::from_secs(3)).await;

        handle.stop().await;
        assert_eq!(sink.sent().len(), 1);
        assert_eq!(sink.sent()[0].0, Channel::System);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let source = store(Vec::new());
        let clock = ManualClock::new(now());
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(source.clone(), Arc::new(SharedFocus::new(true)), sink.clone())
            .with_clock(Arc::new(clock.clone()));

        drop(s.start());
        tokio::time::sleep(Duration::from_secs(1)).await;

        source.update(|notes| notes[0].reminders.push(reminder(1, -1)));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(sink.sent().is_empty());
    }
}
