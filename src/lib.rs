pub mod cli;
pub mod config;
pub mod database;
pub mod models;
pub mod parser;
pub mod reminder_sync;
pub mod scheduler;
pub mod terminal;
pub mod utils;

pub use config::Config;
pub use database::Database;
pub use models::{Note, NoteReminders, Reminder};
pub use parser::{ParsedNote, ParsedReminder, parse_note_content, parse_reminder};
pub use scheduler::{ReminderScheduler, SchedulerHandle};
pub use utils::Profile;
