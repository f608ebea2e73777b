use chrono::{TimeDelta, Utc};
use notia::config::SchedulerConfig;
use notia::database::Database;
use notia::scheduler::{
    Channel, DatabaseSource, ManualClock, NotificationSink, NotifyError, ReminderNotification,
    ReminderScheduler, SharedFocus,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Collected {
    sent: Mutex<Vec<(Channel, ReminderNotification)>>,
}

impl NotificationSink for Collected {
    fn toast(&self, n: &ReminderNotification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((Channel::Toast, n.clone()));
        Ok(())
    }

    fn system(&self, n: &ReminderNotification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((Channel::System, n.clone()));
        Ok(())
    }
}

fn file_database(dir: &tempfile::TempDir) -> Database {
    let path = dir.path().join("notia.db");
    Database::new(path.to_str().unwrap()).unwrap()
}

#[test]
fn saved_note_reminder_reaches_the_sink() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_database(&dir);
    let (note_id, plan) = db.create_note("약", "#건강 @30분 알약 먹기.").unwrap();
    assert_eq!(plan.create.len(), 1);

    let due = db.get_reminders_for_note(note_id).unwrap()[0]
        .due_at()
        .unwrap()
        .with_timezone(&Utc);

    let clock = ManualClock::new(due - TimeDelta::seconds(10));
    let sink = Arc::new(Collected::default());
    let focus = SharedFocus::new(false);
    let mut scheduler = ReminderScheduler::new(
        Arc::new(DatabaseSource::new(file_database(&dir))),
        Arc::new(focus),
        sink.clone(),
        &SchedulerConfig::default(),
    )
    .with_clock(Arc::new(clock.clone()));

    assert!(scheduler.tick().notified.is_empty());
    clock.advance(TimeDelta::seconds(12));
    assert_eq!(scheduler.tick().notified.len(), 1);
    clock.advance(TimeDelta::seconds(2));
    assert!(scheduler.tick().notified.is_empty());

    let sent = sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Channel::System);
    assert_eq!(sent[0].1.title, "리마인더: 약");
    assert_eq!(sent[0].1.body, "알약 먹기");
    assert_eq!(sent[0].1.note_id, note_id);
}

#[test]
fn completing_a_reminder_silences_it() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_database(&dir);
    let (note_id, _) = db.create_note("회의", "@1시간 자료 준비.").unwrap();
    let reminder = db.get_reminders_for_note(note_id).unwrap().remove(0);
    db.set_reminder_completed(reminder.id.unwrap(), true).unwrap();

    let due = reminder.due_at().unwrap().with_timezone(&Utc);
    let sink = Arc::new(Collected::default());
    let mut scheduler = ReminderScheduler::new(
        Arc::new(DatabaseSource::new(db)),
        Arc::new(SharedFocus::default()),
        sink.clone(),
        &SchedulerConfig::default(),
    );

    assert!(scheduler.check_at(due + TimeDelta::seconds(1)).notified.is_empty());
    assert!(sink.sent.lock().unwrap().is_empty());
}

#[test]
fn editing_a_note_keeps_anchored_reminders() {
    let db = Database::open_in_memory().unwrap();
    let (note_id, _) = db.create_note("할 일", "@2시간 빨래 걷기.").unwrap();
    let before = db.get_reminders_for_note(note_id).unwrap();

    let plan = db
        .save_note_content(note_id, None, "@2시간 빨래 걷기.\n@2030-1-1 9시 새해 인사.")
        .unwrap();
    assert_eq!(plan.create.len(), 1);
    assert!(plan.delete.is_empty());

    let after = db.get_reminders_for_note(note_id).unwrap();
    assert_eq!(after.len(), 2);
    let kept = after.iter().find(|r| r.id == before[0].id).unwrap();
    assert_eq!(kept.reminder_time, before[0].reminder_time);

    db.save_note_content(note_id, None, "").unwrap();
    assert!(db.get_reminders_for_note(note_id).unwrap().is_empty());
}
