use rusqlite::{Connection, OptionalExtension};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Note, NoteReminders, Reminder, row_timestamp_now};
use crate::reminder_sync::{SyncPlan, plan_reminder_sync};
use crate::utils::local_now;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Note not found: {0}")]
    NoteNotFound(i64),
    #[error("Reminder not found: {0}")]
    ReminderNotFound(i64),
    #[error("Row has no id")]
    MissingId,
}

const NOTE_COLUMNS: &str = "id, title, content, tags, archived, created_at, updated_at";
const REMINDER_COLUMNS: &str = "id, note_id, reminder_text, reminder_time, completed, enabled, original_text, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database connection and initialize the schema
    pub fn new(path: &str) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        let db = Database { conn };
        db.initialize_schema()?;

        debug!(path = %db_path.display(), "database opened");
        Ok(db)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let db = Database {
            conn: Connection::open_in_memory()?,
        };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize the database schema (tables and indexes)
    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.conn.pragma_update(None, "foreign_keys", true)?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS notes (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                content         TEXT,
                tags            TEXT,
                archived        INTEGER DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS reminders (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                note_id         INTEGER NOT NULL,
                reminder_text   TEXT NOT NULL,
                reminder_time   TEXT NOT NULL,
                completed       INTEGER DEFAULT 0,
                enabled         INTEGER DEFAULT 1,
                original_text   TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                FOREIGN KEY(note_id) REFERENCES notes(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notes_title ON notes(title)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reminders_note_id ON reminders(note_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reminders_time ON reminders(reminder_time)",
            [],
        )?;

        Ok(())
    }

    /// Insert a note into the database and return its ID
    pub fn insert_note(&self, note: &Note) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO notes (title, content, tags, archived, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                note.title,
                note.content,
                note.tags,
                note.archived,
                note.created_at,
                note.updated_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Helper function to map a row to a Note
    fn row_to_note(row: &rusqlite::Row) -> Result<Note, rusqlite::Error> {
        Ok(Note {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            content: row.get(2)?,
            tags: row.get(3)?,
            archived: row.get::<_, i64>(4)? != 0,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    /// Get all non-archived notes, newest first
    pub fn get_all_notes(&self) -> Result<Vec<Note>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE archived = 0 ORDER BY updated_at DESC, id DESC"
        ))?;
        let notes = stmt
            .query_map([], Self::row_to_note)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Get a single note by ID
    pub fn get_note(&self, id: i64) -> Result<Note, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"))?;
        stmt.query_row(rusqlite::params![id], Self::row_to_note)
            .optional()?
            .ok_or(DatabaseError::NoteNotFound(id))
    }

    /// Update an existing note
    pub fn update_note(&self, note: &Note) -> Result<(), DatabaseError> {
        let id = note.id.ok_or(DatabaseError::MissingId)?;

        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE notes SET title = ?1, content = ?2, tags = ?3, archived = ?4, updated_at = ?5 WHERE id = ?6",
            rusqlite::params![
                note.title,
                note.content,
                note.tags,
                note.archived,
                note.updated_at,
                id
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NoteNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a note by ID; its reminders go with it
    pub fn delete_note(&self, id: i64) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM notes WHERE id = ?1", rusqlite::params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Archive a note by ID
    pub fn archive_note(&self, id: i64) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE notes SET archived = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![row_timestamp_now(), id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Insert a reminder into the database and return its ID
    pub fn insert_reminder(&self, reminder: &Reminder) -> Result<i64, DatabaseError> {
        Self::insert_reminder_on(&self.conn, reminder)
    }

    fn insert_reminder_on(conn: &Connection, reminder: &Reminder) -> Result<i64, DatabaseError> {
        conn.execute(
            "INSERT INTO reminders (note_id, reminder_text, reminder_time, completed, enabled, original_text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                reminder.note_id,
                reminder.reminder_text,
                reminder.reminder_time,
                reminder.completed,
                reminder.enabled,
                reminder.original_text,
                reminder.created_at,
                reminder.updated_at
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Helper function to map a row to a Reminder
    fn row_to_reminder(row: &rusqlite::Row) -> Result<Reminder, rusqlite::Error> {
        Ok(Reminder {
            id: Some(row.get(0)?),
            note_id: row.get(1)?,
            reminder_text: row.get(2)?,
            reminder_time: row.get(3)?,
            completed: row.get::<_, i64>(4)? != 0,
            enabled: row.get::<_, i64>(5)? != 0,
            original_text: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Get a single reminder by ID
    pub fn get_reminder(&self, id: i64) -> Result<Reminder, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"
        ))?;
        stmt.query_row(rusqlite::params![id], Self::row_to_reminder)
            .optional()?
            .ok_or(DatabaseError::ReminderNotFound(id))
    }

    /// Get the reminders of one note ordered by due time
    pub fn get_reminders_for_note(&self, note_id: i64) -> Result<Vec<Reminder>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE note_id = ?1 ORDER BY reminder_time ASC, id ASC"
        ))?;
        let reminders = stmt
            .query_map(rusqlite::params![note_id], Self::row_to_reminder)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reminders)
    }

    /// Get every reminder ordered by due time
    pub fn get_all_reminders(&self) -> Result<Vec<Reminder>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders ORDER BY reminder_time ASC, id ASC"
        ))?;
        let reminders = stmt
            .query_map([], Self::row_to_reminder)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reminders)
    }

    /// Update an existing reminder
    pub fn update_reminder(&self, reminder: &Reminder) -> Result<(), DatabaseError> {
        let id = reminder.id.ok_or(DatabaseError::MissingId)?;

        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE reminders SET reminder_text = ?1, reminder_time = ?2, completed = ?3, enabled = ?4,
             original_text = ?5, updated_at = ?6 WHERE id = ?7",
            rusqlite::params![
                reminder.reminder_text,
                reminder.reminder_time,
                reminder.completed,
                reminder.enabled,
                reminder.original_text,
                reminder.updated_at,
                id
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::ReminderNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a reminder by ID
    pub fn delete_reminder(&self, id: i64) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM reminders WHERE id = ?1", rusqlite::params![id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_reminder_completed(&self, id: i64, completed: bool) -> Result<(), DatabaseError> {
        self.set_reminder_flag(id, "completed", completed)
    }

    pub fn set_reminder_enabled(&self, id: i64, enabled: bool) -> Result<(), DatabaseError> {
        self.set_reminder_flag(id, "enabled", enabled)
    }

    fn set_reminder_flag(&self, id: i64, column: &str, value: bool) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            &format!("UPDATE reminders SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
            rusqlite::params![value, row_timestamp_now(), id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::ReminderNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    /// Every non-archived note that has reminders, with those reminders
    pub fn notes_with_reminders(&self) -> Result<Vec<NoteReminders>, DatabaseError> {
        let mut grouped: Vec<NoteReminders> = Vec::new();
        for note in self.get_all_notes()? {
            let Some(note_id) = note.id else { continue };
            let reminders = self.get_reminders_for_note(note_id)?;
            if reminders.is_empty() {
                continue;
            }
            grouped.push(NoteReminders {
                note_id,
                title: note.title,
                reminders,
            });
        }
        Ok(grouped)
    }

    /// Save new content for a note and bring its tags and reminders in line
    /// with the content. Times are resolved against the current local time.
    pub fn save_note_content(
        &self,
        note_id: i64,
        title: Option<&str>,
        content: &str,
    ) -> Result<SyncPlan, DatabaseError> {
        let mut note = self.get_note(note_id)?;
        let persisted = self.get_reminders_for_note(note_id)?;
        let plan = plan_reminder_sync(note_id, content, &persisted, local_now());

        if let Some(title) = title {
            note.title = title.to_string();
        }
        note.content = Some(content.to_string());
        note.tags = if plan.tags.is_empty() {
            None
        } else {
            Some(plan.tags.join(","))
        };
        note.updated_at = row_timestamp_now();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE notes SET title = ?1, content = ?2, tags = ?3, updated_at = ?4 WHERE id = ?5",
            rusqlite::params![note.title, note.content, note.tags, note.updated_at, note_id],
        )?;
        for id in &plan.delete {
            tx.execute("DELETE FROM reminders WHERE id = ?1", rusqlite::params![id])?;
        }
        for reminder in &plan.create {
            Self::insert_reminder_on(&tx, reminder)?;
        }
        tx.commit()?;

        info!(
            note_id,
            created = plan.create.len(),
            deleted = plan.delete.len(),
            "note saved"
        );
        Ok(plan)
    }

    /// Insert a new note and sync its reminders from `content`
    pub fn create_note(
        &self,
        title: &str,
        content: &str,
    ) -> Result<(i64, SyncPlan), DatabaseError> {
        let id = self.insert_note(&Note::new(title.to_string()))?;
        let plan = self.save_note_content(id, None, content)?;
        Ok((id, plan))
    }
}
