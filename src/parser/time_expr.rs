//! Korean time-expression grammar.
//!
//! The grammar is an ordered table of rules. Each rule owns a pattern and a
//! resolver; when splitting a reminder span, the first rule whose pattern
//! matches a prefix of the span wins. Reordering the table changes which
//! expressions read as absolute and which as relative, so the order is part
//! of the contract:
//!
//! 1. absolute date `YYYY-M-D [오전|오후] [H시 [M분]]`
//! 2. day word `오늘|금일|내일|명일|모레|글피 [오전|오후] [H시 [M분]]`
//! 3. qualified clock time `오전|오후 H시 [M분]`
//! 4. offset `N시간` / `N분`
//! 5. bare clock time `H시 [M분]`
//! 6. short date `M-D`
//!
//! Dates are never validated. Out-of-range components roll over the way
//! calendar arithmetic does, so `2025-2-30` lands on 2025-03-02.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Hour used when an expression names a day but no time.
pub const DEFAULT_HOUR: i64 = 9;

const CLOCK: &str = r"(?:\s*(?P<ampm>오전|오후)?\s*(?P<hour>[0-9]{1,2})\s*시(?:\s*(?P<minute>[0-9]{1,2})\s*분)?)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeForm {
    Absolute,
    DayWord,
    QualifiedClock,
    Offset,
    BareClock,
    ShortDate,
}

type Resolver = fn(&Captures<'_>, NaiveDateTime) -> Option<NaiveDateTime>;

struct TimeRule {
    form: TimeForm,
    prefix: Regex,
    exact: Regex,
    resolve: Resolver,
}

impl TimeRule {
    fn new(form: TimeForm, body: &str, resolve: Resolver) -> Self {
        Self {
            form,
            prefix: Regex::new(&format!("^(?:{})", body)).expect("time rule pattern is valid"),
            exact: Regex::new(&format!("^(?:{})$", body)).expect("time rule pattern is valid"),
            resolve,
        }
    }
}

static GRAMMAR: LazyLock<Vec<TimeRule>> = LazyLock::new(|| {
    vec![
        TimeRule::new(
            TimeForm::Absolute,
            &format!(
                r"(?P<year>[0-9]{{4}})-(?P<month>[0-9]{{1,2}})-(?P<day>[0-9]{{1,2}}){}?",
                CLOCK
            ),
            resolve_absolute,
        ),
        TimeRule::new(
            TimeForm::DayWord,
            &format!(r"(?P<word>오늘|금일|내일|명일|모레|글피){}?", CLOCK),
            resolve_day_word,
        ),
        TimeRule::new(
            TimeForm::QualifiedClock,
            r"(?P<ampm>오전|오후)\s*(?P<hour>[0-9]{1,2})\s*시(?:\s*(?P<minute>[0-9]{1,2})\s*분)?",
            resolve_clock,
        ),
        TimeRule::new(
            TimeForm::Offset,
            r"(?P<amount>[0-9]+)\s*(?P<unit>시간|분)",
            resolve_offset,
        ),
        TimeRule::new(
            TimeForm::BareClock,
            r"(?P<hour>[0-9]{1,2})\s*시(?:\s*(?P<minute>[0-9]{1,2})\s*분)?",
            resolve_clock,
        ),
        TimeRule::new(
            TimeForm::ShortDate,
            r"(?P<month>[0-9]{1,2})-(?P<day>[0-9]{1,2})",
            resolve_short_date,
        ),
    ]
});

/// A time expression found at the start of a reminder span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimePrefix<'a> {
    pub form: TimeForm,
    /// The matched expression, trimmed
    pub time_text: &'a str,
    /// Everything after the expression, trimmed
    pub rest: &'a str,
}

/// Find the highest-priority time expression at the start of `span`.
pub fn split_time_prefix(span: &str) -> Option<TimePrefix<'_>> {
    GRAMMAR.iter().find_map(|rule| {
        let m = rule.prefix.find(span)?;
        Some(TimePrefix {
            form: rule.form,
            time_text: m.as_str().trim(),
            rest: span[m.end()..].trim(),
        })
    })
}

/// Resolve a complete time expression against `base`.
///
/// Returns `None` when the text is not exactly one expression of the grammar,
/// or when the arithmetic leaves chrono's representable range.
pub fn parse_time_expression(time_text: &str, base: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = time_text.trim().to_lowercase();
    GRAMMAR.iter().find_map(|rule| {
        let caps = rule.exact.captures(&text)?;
        (rule.resolve)(&caps, base)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

/// How to read an hour written without 오전/오후.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BareHour {
    AsWritten,
    /// 1..=11 are read as afternoon hours; 0 and 12.. are left alone.
    Afternoon,
}

fn meridiem(caps: &Captures<'_>) -> Option<Meridiem> {
    match caps.name("ampm")?.as_str() {
        "오전" => Some(Meridiem::Am),
        "오후" => Some(Meridiem::Pm),
        _ => None,
    }
}

fn number(caps: &Captures<'_>, name: &str) -> Option<i64> {
    caps.name(name)?.as_str().parse().ok()
}

fn clock_hour(meridiem: Option<Meridiem>, hour: i64, bare: BareHour) -> i64 {
    match (meridiem, bare) {
        (Some(Meridiem::Am), _) if hour == 12 => 0,
        (Some(Meridiem::Pm), _) if hour < 12 => hour + 12,
        (Some(_), _) => hour,
        (None, BareHour::Afternoon) if (1..12).contains(&hour) => hour + 12,
        (None, _) => hour,
    }
}

/// `date` at midnight plus `hour` hours and `minute` minutes, overflowing
/// into following days the way a calendar setter does.
fn at_clock(date: NaiveDate, hour: i64, minute: i64) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(TimeDelta::try_hours(hour)?)?
        .checked_add_signed(TimeDelta::try_minutes(minute)?)
}

/// Build a local date-time from possibly out-of-range parts. Month 13 is
/// January of the next year, day 0 is the last day of the previous month.
fn compose(year: i64, month: i64, day: i64, hour: i64, minute: i64) -> Option<NaiveDateTime> {
    let month0 = month - 1;
    let year = i32::try_from(year + month0.div_euclid(12)).ok()?;
    let month = u32::try_from(month0.rem_euclid(12) + 1).ok()?;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    at_clock(first, hour, minute)?.checked_add_signed(TimeDelta::try_days(day - 1)?)
}

/// Push a time that is not strictly after `base` to the next day.
fn roll_past(result: NaiveDateTime, base: NaiveDateTime) -> Option<NaiveDateTime> {
    if result <= base {
        result.checked_add_signed(TimeDelta::days(1))
    } else {
        Some(result)
    }
}

fn resolve_absolute(caps: &Captures<'_>, _base: NaiveDateTime) -> Option<NaiveDateTime> {
    let hour = number(caps, "hour")
        .map(|h| clock_hour(meridiem(caps), h, BareHour::AsWritten))
        .unwrap_or(DEFAULT_HOUR);
    let minute = number(caps, "minute").unwrap_or(0);
    compose(
        number(caps, "year")?,
        number(caps, "month")?,
        number(caps, "day")?,
        hour,
        minute,
    )
}

fn resolve_day_word(caps: &Captures<'_>, base: NaiveDateTime) -> Option<NaiveDateTime> {
    let word = caps.name("word")?.as_str();
    let offset = match word {
        "오늘" | "금일" => 0,
        "내일" | "명일" => 1,
        "모레" => 2,
        "글피" => 3,
        _ => return None,
    };
    let date = base.date().checked_add_signed(TimeDelta::days(offset))?;

    let hour = number(caps, "hour")
        .map(|h| clock_hour(meridiem(caps), h, BareHour::Afternoon))
        .unwrap_or(DEFAULT_HOUR);
    let minute = number(caps, "minute").unwrap_or(0);
    let result = at_clock(date, hour, minute)?;

    if offset == 0 {
        roll_past(result, base)
    } else {
        Some(result)
    }
}

fn resolve_clock(caps: &Captures<'_>, base: NaiveDateTime) -> Option<NaiveDateTime> {
    let hour = clock_hour(meridiem(caps), number(caps, "hour")?, BareHour::Afternoon);
    let minute = number(caps, "minute").unwrap_or(0);
    roll_past(at_clock(base.date(), hour, minute)?, base)
}

fn resolve_offset(caps: &Captures<'_>, base: NaiveDateTime) -> Option<NaiveDateTime> {
    let amount = number(caps, "amount")?;
    let delta = match caps.name("unit")?.as_str() {
        "시간" => TimeDelta::try_hours(amount)?,
        "분" => TimeDelta::try_minutes(amount)?,
        _ => return None,
    };
    base.checked_add_signed(delta)
}

fn resolve_short_date(caps: &Captures<'_>, base: NaiveDateTime) -> Option<NaiveDateTime> {
    compose(
        i64::from(base.year()),
        number(caps, "month")?,
        number(caps, "day")?,
        DEFAULT_HOUR,
        0,
    )
}
