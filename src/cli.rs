use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fmt::Write as _;
use thiserror::Error;

use crate::config::Config;
use crate::database::{Database, DatabaseError};
use crate::models::{Note, Reminder};
use crate::parser::{ParsedNote, parse_note_content};
use crate::reminder_sync::SyncPlan;
use crate::terminal::{self, TerminalError};
use crate::utils::{format_reminder_time, local_now, parse_base_date};

#[derive(Parser)]
#[command(name = "notia")]
#[command(about = "Notes with inline #tags and @time reminders")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch for due reminders (default if no subcommand)
    Watch,
    /// Show the tags and reminders found in a piece of text
    Parse {
        /// Note text, e.g. "회의 준비 #업무 @내일 오후 3시 자료 출력."
        text: String,
        /// Resolve times against this date instead of now (YYYY-MM-DD HH:MM)
        #[arg(long)]
        base: Option<String>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Create a note; reminders in its content are scheduled
    AddNote {
        /// Note title
        title: String,
        /// Note content
        #[arg(long)]
        content: Option<String>,
    },
    /// Replace a note's content and resync its reminders
    EditNote {
        /// Note ID
        id: i64,
        /// New note content
        #[arg(long)]
        content: String,
        /// New note title
        #[arg(long)]
        title: Option<String>,
    },
    /// List notes
    Notes,
    /// List reminders
    Reminders {
        /// Only reminders of this note
        #[arg(long)]
        note: Option<i64>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Mark a reminder as done
    Complete {
        /// Reminder ID
        id: i64,
        /// Mark as not done instead
        #[arg(long)]
        undo: bool,
    },
    /// Turn a reminder's notifications on
    Enable {
        /// Reminder ID
        id: i64,
    },
    /// Turn a reminder's notifications off
    Disable {
        /// Reminder ID
        id: i64,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("Failed to encode JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Terminal error: {0}")]
    TerminalError(#[from] TerminalError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Handle the parse command
pub fn handle_parse(text: String, base: Option<String>, json: bool) -> Result<(), CliError> {
    let base = match base {
        Some(raw) => parse_base_date(&raw)
            .map_err(|e| CliError::DateParseError(format!("Invalid base date '{}': {}", raw, e)))?,
        None => local_now(),
    };

    let parsed = parse_note_content(&text, base, &[]);
    if json {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
    } else {
        print!("{}", render_parsed(&parsed));
    }
    Ok(())
}

/// Handle the add-note command
pub fn handle_add_note(
    title: String,
    content: Option<String>,
    db: &Database,
) -> Result<(), CliError> {
    let (id, plan) = db.create_note(&title, content.as_deref().unwrap_or_default())?;
    println!("Note created successfully (ID: {})", id);
    print!("{}", render_sync(&plan));
    Ok(())
}

/// Handle the edit-note command
pub fn handle_edit_note(
    id: i64,
    content: String,
    title: Option<String>,
    db: &Database,
) -> Result<(), CliError> {
    let plan = db.save_note_content(id, title.as_deref(), &content)?;
    println!("Note {} saved", id);
    print!("{}", render_sync(&plan));
    Ok(())
}

/// Handle the notes command
pub fn handle_notes(db: &Database) -> Result<(), CliError> {
    let notes = db.get_all_notes()?;
    if notes.is_empty() {
        println!("No notes yet");
    }
    for note in &notes {
        println!("{}", render_note_line(note));
    }
    Ok(())
}

/// Handle the reminders command
pub fn handle_reminders(note: Option<i64>, json: bool, db: &Database) -> Result<(), CliError> {
    let reminders = match note {
        Some(note_id) => {
            // surfaces NoteNotFound instead of an empty list
            db.get_note(note_id)?;
            db.get_reminders_for_note(note_id)?
        }
        None => db.get_all_reminders()?,
    };

    if json {
        let rows: Vec<ReminderRow> = reminders.iter().map(ReminderRow::from).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if reminders.is_empty() {
        println!("No reminders");
    }
    for reminder in &reminders {
        println!("{}", render_reminder_line(reminder));
    }
    Ok(())
}

/// Handle the complete command
pub fn handle_complete(id: i64, undo: bool, db: &Database) -> Result<(), CliError> {
    db.set_reminder_completed(id, !undo)?;
    if undo {
        println!("Reminder {} reopened", id);
    } else {
        println!("Reminder {} completed", id);
    }
    Ok(())
}

/// Handle the enable and disable commands
pub fn handle_set_enabled(id: i64, enabled: bool, db: &Database) -> Result<(), CliError> {
    db.set_reminder_enabled(id, enabled)?;
    println!(
        "Reminder {} {}",
        id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Handle the watch command. Blocks until the user quits.
pub fn handle_watch(config: &Config, db: Database) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(terminal::run_watch(config, db))?;
    Ok(())
}

/// Reminder as printed by `reminders --json`
#[derive(Debug, Serialize)]
struct ReminderRow<'a> {
    id: Option<i64>,
    note_id: i64,
    text: &'a str,
    time: &'a str,
    completed: bool,
    enabled: bool,
}

impl<'a> From<&'a Reminder> for ReminderRow<'a> {
    fn from(r: &'a Reminder) -> Self {
        Self {
            id: r.id,
            note_id: r.note_id,
            text: &r.reminder_text,
            time: &r.reminder_time,
            completed: r.completed,
            enabled: r.enabled,
        }
    }
}

fn render_parsed(parsed: &ParsedNote) -> String {
    let mut out = String::new();
    let tags = parsed.tag_texts();
    if tags.is_empty() {
        out.push_str("tags: (none)\n");
    } else {
        let _ = writeln!(out, "tags: {}", tags.join(", "));
    }
    if parsed.reminders.is_empty() {
        out.push_str("reminders: (none)\n");
    }
    for r in &parsed.reminders {
        let when = r
            .parsed_date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| format!("? ({})", r.text));
        let _ = writeln!(
            out,
            "reminder: {}  {}",
            when,
            r.reminder_text.as_deref().unwrap_or_default()
        );
    }
    out
}

fn render_sync(plan: &SyncPlan) -> String {
    let mut out = String::new();
    for r in &plan.create {
        let _ = writeln!(
            out,
            "  + {}  {}",
            format_reminder_time(&r.reminder_time),
            r.reminder_text
        );
    }
    if !plan.delete.is_empty() {
        let _ = writeln!(out, "  - {} reminder(s) removed", plan.delete.len());
    }
    out
}

fn render_note_line(note: &Note) -> String {
    let tags = note.tag_list();
    let mut line = format!("{:>4}  {}", note.id.unwrap_or_default(), note.title);
    if !tags.is_empty() {
        let hashed: Vec<String> = tags.iter().map(|t| format!("#{}", t)).collect();
        let _ = write!(line, "  {}", hashed.join(" "));
    }
    line
}

fn render_reminder_line(r: &Reminder) -> String {
    let mark = if r.completed {
        "[x]"
    } else if !r.enabled {
        "[-]"
    } else {
        "[ ]"
    };
    format!(
        "{:>4} {} {}  {}  (note {})",
        r.id.unwrap_or_default(),
        mark,
        format_reminder_time(&r.reminder_time),
        r.reminder_text,
        r.note_id
    )
}
