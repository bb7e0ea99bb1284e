//! Resolution of an alarm's `when` into its next fire time.
//!
//! A `when` is one of three things, tried in this order:
//! 1. a number of seconds from now (`300`, `"2.5"`)
//! 2. a cron expression (`"0 7 * * 1-5"`)
//! 3. an iso 8601 timestamp (`"2024-01-01T07:00:00"`, `"2024-01-01T07:00:00+01:00"`)
//!
//! Numeric strings always resolve as seconds, even when they would also be a valid timestamp.

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone};
use cron::Schedule;
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone)]
pub enum When {
    /// seconds after the first time the alarm is resolved
    Relative(f64),
    Cron {
        expression: String,
        /// more than one when day of month and day of week are both restricted,
        /// the earliest match of any of them wins
        schedules: Vec<Schedule>,
    },
    Absolute(At),
}

/// a single point in time, either with an explicit offset or in the local time of whoever asks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum At {
    Fixed(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl At {
    fn in_timezone<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        match self {
            Self::Fixed(at) => Some(at.with_timezone(tz)),
            Self::Naive(at) => tz.from_local_datetime(at).earliest(),
        }
    }
}

impl When {
    /// # Errors
    /// if `text` is neither seconds, a cron expression nor an iso timestamp
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(seconds) = text.parse::<f64>().ok().filter(|s| s.is_finite()) {
            return Ok(Self::Relative(seconds));
        }
        if let Some(schedules) = parse_cron(text) {
            return Ok(Self::Cron {
                expression: text.to_string(),
                schedules,
            });
        }
        parse_iso(text)
            .map(Self::Absolute)
            .ok_or_else(|| Error::InvalidWhen(text.to_string()))
    }

    /// # Errors
    /// if `seconds` is not a finite number
    pub fn seconds(seconds: f64) -> Result<Self> {
        if seconds.is_finite() {
            Ok(Self::Relative(seconds))
        } else {
            Err(Error::InvalidWhen(seconds.to_string()))
        }
    }

    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        matches!(self, Self::Cron { .. })
    }

    /// Next fire time at or after `now`, or `None` if there is none.
    ///
    /// A relative `when` is pinned to `now + seconds` the first time it is resolved,
    /// so later calls keep returning that same instant instead of drifting.
    pub fn resolve<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        if let Self::Relative(seconds) = *self {
            let target = now.clone() + seconds_to_duration(seconds);
            let offset = target.offset().fix();
            *self = Self::Absolute(At::Fixed(target.with_timezone(&offset)));
        }
        self.peek(now)
    }

    /// Same as [`When::resolve`] but leaves a relative `when` unpinned.
    #[must_use]
    pub fn peek<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let next = match self {
            Self::Relative(seconds) => now.clone() + seconds_to_duration(*seconds),
            Self::Cron { schedules, .. } => schedules
                .iter()
                .filter_map(|schedule| schedule.after(now).next())
                .min()?,
            Self::Absolute(at) => at.in_timezone(&now.timezone())?,
        };
        (next >= *now).then_some(next)
    }
}

impl FromStr for When {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relative(seconds) => write!(f, "{seconds}"),
            Self::Cron { expression, .. } => write!(f, "{expression}"),
            Self::Absolute(At::Fixed(at)) => write!(f, "{}", at.to_rfc3339()),
            Self::Absolute(At::Naive(at)) => write!(f, "{}", at.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl Serialize for When {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn seconds_to_duration(seconds: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((seconds * 1000.0).round() as i64)
}

/// Accepts the usual five field cron (minute hour day month weekday)
/// as well as the cron crate's own six/seven field form which starts with seconds.
///
/// In the five field form a restricted day of month and a restricted day of week
/// match on either one, the cron crate wants both, so those become two schedules.
fn parse_cron(text: &str) -> Option<Vec<Schedule>> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let expressions = match fields.as_slice() {
        [minute, hour, day, month, weekday] => {
            let translated = translate_day_of_week(weekday)?;
            if is_unrestricted(day) || is_unrestricted(weekday) {
                vec![format!("0 {minute} {hour} {day} {month} {translated}")]
            } else {
                vec![
                    format!("0 {minute} {hour} {day} {month} *"),
                    format!("0 {minute} {hour} * {month} {translated}"),
                ]
            }
        }
        [_, _, _, _, _, _] | [_, _, _, _, _, _, _] => vec![text.to_string()],
        _ => return None,
    };
    expressions
        .iter()
        .map(|expression| Schedule::from_str(expression).ok())
        .collect()
}

fn is_unrestricted(field: &str) -> bool {
    field.starts_with('*') || field == "?"
}

/// standard cron counts weekdays from 0 (sunday, also 7) while the cron crate counts from 1 (sunday),
/// so numeric weekdays get expanded and shifted, names are left alone
fn translate_day_of_week(field: &str) -> Option<String> {
    if !field.bytes().any(|b| b.is_ascii_digit()) {
        return Some(field.to_string());
    }
    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
            None => (item, 1),
        };
        let (start, end): (u32, u32) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((start, end)) => (start.parse().ok()?, end.parse().ok()?),
            None if step > 1 => (range.parse().ok()?, 6),
            None => {
                let day = range.parse().ok()?;
                (day, day)
            }
        };
        if start > end || end > 7 {
            return None;
        }
        days.extend((start..=end).step_by(step).map(|day| day % 7 + 1));
    }
    Some(
        days.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn parse_iso(text: &str) -> Option<At> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(At::Fixed(at));
    }
    if let Ok(at) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(At::Fixed(at));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(At::Naive)
}
