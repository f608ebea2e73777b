//! Inline note syntax.
//!
//! Notes carry two kinds of inline markup:
//!
//! * `#tag` attaches a label to the note.
//! * `@<time> <label>.` attaches a reminder. The span runs from `@` to the
//!   first `.`, newline or end of text, and starts with a Korean time
//!   expression such as `내일 오후 3시` or `30분`.
//!
//! Parsing is pure and never fails: anything that does not fit the grammar is
//! skipped.

pub mod tags;
pub mod time_expr;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

pub use tags::{ParsedTag, extract_tags};
pub use time_expr::{TimeForm, parse_time_expression, split_time_prefix};

static REMINDER_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@([^@#\n]+?)(?:\.|\n|$)").expect("reminder span pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReminder {
    /// The time expression, e.g. `내일 3시`
    pub text: String,
    /// The span from `@` through the label, plus the `.` when one ends it.
    /// A newline or end of text is not part of it.
    pub original_text: String,
    pub parsed_date: Option<NaiveDateTime>,
    pub reminder_text: Option<String>,
}

/// A reminder resolved by an earlier parse, keyed by its span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingReminder {
    pub original_text: String,
    pub date: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedNote {
    pub tags: Vec<ParsedTag>,
    pub reminders: Vec<ParsedReminder>,
}

impl ParsedNote {
    /// Tag bodies, in first-seen order
    pub fn tag_texts(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.text.clone()).collect()
    }
}

/// Key a span so it does not change when text after a newline-ended span
/// is added or removed.
fn span_key(whole: &str, body: &str) -> String {
    let dot = if whole.ends_with('.') { "." } else { "" };
    format!("@{}{}", body.trim_end(), dot)
}

/// Parse tags and reminders out of note content.
///
/// Time expressions are resolved against `base`. A reminder whose span is
/// found in `existing` keeps the date recorded there instead of being
/// resolved again, so re-parsing a note never moves an anchored reminder.
pub fn parse_note_content(
    content: &str,
    base: NaiveDateTime,
    existing: &[ExistingReminder],
) -> ParsedNote {
    let anchored: HashMap<&str, NaiveDateTime> = existing
        .iter()
        .map(|r| (r.original_text.as_str(), r.date))
        .collect();

    let tags = extract_tags(content);

    let mut reminders = Vec::new();
    for cap in REMINDER_SPAN.captures_iter(content) {
        let (Some(whole), Some(body)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let Some(prefix) = split_time_prefix(body.as_str().trim()) else {
            continue;
        };
        if prefix.time_text.is_empty() || prefix.rest.is_empty() {
            continue;
        }

        let original_text = span_key(whole.as_str(), body.as_str());
        let parsed_date = match anchored.get(original_text.as_str()) {
            Some(date) => Some(*date),
            None => parse_time_expression(prefix.time_text, base),
        };

        tracing::trace!(span = %original_text, date = ?parsed_date, "reminder span");
        reminders.push(ParsedReminder {
            text: prefix.time_text.to_string(),
            original_text,
            parsed_date,
            reminder_text: Some(prefix.rest.to_string()),
        });
    }

    ParsedNote { tags, reminders }
}

/// Parse a single reminder written without the surrounding `@` and `.`.
pub fn parse_reminder(text: &str, base: NaiveDateTime) -> Option<ParsedReminder> {
    parse_note_content(&format!("@{}.", text), base, &[])
        .reminders
        .into_iter()
        .next()
}
