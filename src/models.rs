use serde::{Deserialize, Serialize};

/// Timestamp format used for `created_at`/`updated_at` columns
pub const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn row_timestamp_now() -> String {
    chrono::Utc::now().format(ROW_TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Option<i64>,
    pub title: String,
    pub content: Option<String>,
    pub tags: Option<String>, // comma-separated tag bodies, no '#'
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Note {
    pub fn new(title: String) -> Self {
        let now = row_timestamp_now();
        Self {
            id: None,
            title,
            content: None,
            tags: None,
            archived: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Tag bodies split out of the stored comma-separated list
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Option<i64>,
    pub note_id: i64,
    pub reminder_text: String,
    pub reminder_time: String, // RFC 3339
    pub completed: bool,
    pub enabled: bool,
    pub original_text: String, // the full `@...` span this reminder came from
    pub created_at: String,
    pub updated_at: String,
}

impl Reminder {
    pub fn new(
        note_id: i64,
        reminder_text: String,
        reminder_time: String,
        original_text: String,
    ) -> Self {
        let now = row_timestamp_now();
        Self {
            id: None,
            note_id,
            reminder_text,
            reminder_time,
            completed: false,
            enabled: true,
            original_text,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Parse the stored reminder time
    pub fn due_at(&self) -> Result<chrono::DateTime<chrono::FixedOffset>, chrono::ParseError> {
        chrono::DateTime::parse_from_rfc3339(&self.reminder_time)
    }
}

/// A note together with its reminders, as read by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteReminders {
    pub note_id: i64,
    pub title: String,
    pub reminders: Vec<Reminder>,
}
