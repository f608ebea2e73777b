use std::sync::{Arc, Mutex, RwLock};

use crate::database::Database;
use crate::models::NoteReminders;
use crate::scheduler::SchedulerError;

/// Where the scheduler reads reminders from on every tick.
pub trait ReminderSource: Send + Sync {
    fn snapshot(&self) -> Result<Vec<NoteReminders>, SchedulerError>;
}

/// Shared in-memory reminder collection.
///
/// Writers replace the whole collection; the scheduler only ever reads it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReminders {
    notes: Arc<RwLock<Vec<NoteReminders>>>,
}

impl InMemoryReminders {
    pub fn new(notes: Vec<NoteReminders>) -> Self {
        Self {
            notes: Arc::new(RwLock::new(notes)),
        }
    }

    pub fn replace(&self, notes: Vec<NoteReminders>) {
        match self.notes.write() {
            Ok(mut guard) => *guard = notes,
            Err(poisoned) => *poisoned.into_inner() = notes,
        }
    }

    /// Apply `edit` to the stored collection in place
    pub fn update<F: FnOnce(&mut Vec<NoteReminders>)>(&self, edit: F) {
        match self.notes.write() {
            Ok(mut guard) => edit(&mut guard),
            Err(poisoned) => edit(&mut poisoned.into_inner()),
        }
    }
}

impl ReminderSource for InMemoryReminders {
    fn snapshot(&self) -> Result<Vec<NoteReminders>, SchedulerError> {
        self.notes
            .read()
            .map(|notes| notes.clone())
            .map_err(|_| SchedulerError::SourcePoisoned)
    }
}

/// Reads fresh rows from SQLite on every tick, so edits made by other
/// `notia` processes are picked up while the scheduler runs.
pub struct DatabaseSource {
    db: Mutex<Database>,
}

impl DatabaseSource {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

impl ReminderSource for DatabaseSource {
    fn snapshot(&self) -> Result<Vec<NoteReminders>, SchedulerError> {
        let db = self.db.lock().map_err(|_| SchedulerError::SourcePoisoned)?;
        Ok(db.notes_with_reminders()?)
    }
}
