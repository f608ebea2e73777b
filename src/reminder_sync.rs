//! Keeps persisted reminders in step with a note's `@...` spans.
//!
//! A persisted reminder is identified by its `original_text`. Saving a note
//! re-parses its content with the persisted reminders as anchors, then:
//!
//! * spans with no persisted reminder become new reminders,
//! * persisted reminders whose span is gone are deleted,
//! * everything else is left alone, so completion and enabled flags survive.
//!
//! The label is part of the span, so editing a label replaces the reminder.

use chrono::NaiveDateTime;
use std::collections::HashSet;
use tracing::warn;

use crate::models::Reminder;
use crate::parser::{ExistingReminder, parse_note_content};
use crate::utils::{local_to_rfc3339, rfc3339_to_local};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub create: Vec<Reminder>,
    pub delete: Vec<i64>,
    /// Tag bodies found in the content, first-seen order
    pub tags: Vec<String>,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

/// Anchors for re-parse, built from persisted reminders
pub fn existing_anchors(persisted: &[Reminder]) -> Vec<ExistingReminder> {
    persisted
        .iter()
        .filter_map(|r| match rfc3339_to_local(&r.reminder_time) {
            Ok(date) => Some(ExistingReminder {
                original_text: r.original_text.clone(),
                date,
            }),
            Err(e) => {
                warn!(reminder_id = ?r.id, "stored reminder time is unreadable: {}", e);
                None
            }
        })
        .collect()
}

/// Work out the reminder writes needed after `content` is saved for `note_id`.
pub fn plan_reminder_sync(
    note_id: i64,
    content: &str,
    persisted: &[Reminder],
    base: NaiveDateTime,
) -> SyncPlan {
    let parsed = parse_note_content(content, base, &existing_anchors(persisted));
    let mut plan = SyncPlan {
        tags: parsed.tag_texts(),
        ..SyncPlan::default()
    };

    let mut live: HashSet<&str> = HashSet::new();
    for candidate in &parsed.reminders {
        let (Some(date), Some(label)) = (candidate.parsed_date, candidate.reminder_text.as_deref())
        else {
            continue;
        };
        if !live.insert(candidate.original_text.as_str()) {
            continue;
        }

        if persisted
            .iter()
            .any(|r| r.original_text == candidate.original_text)
        {
            continue;
        }
        match local_to_rfc3339(date) {
            Some(stamp) => plan.create.push(Reminder::new(
                note_id,
                label.to_string(),
                stamp,
                candidate.original_text.clone(),
            )),
            None => warn!(
                span = %candidate.original_text,
                "reminder time falls in a DST gap, skipped"
            ),
        }
    }

    plan.delete = persisted
        .iter()
        .filter(|r| !live.contains(r.original_text.as_str()))
        .filter_map(|r| r.id)
        .collect();

    plan
}
