//! Time domain module
//!
//! Calendar periods and the interval algebra behind time conditions. A
//! `Period` is a calendar predicate ("minute 30 of every hour", "Fridays",
//! "October") that can locate its occurrences around any instant through
//! `rollforward` and `rollback`. Periods compose with `&` (intersection) and
//! `|` (union), which is how cron expressions are resolved.

pub mod cron;
pub mod interval;

pub use cron::Crontab;
pub use interval::{Closed, Interval};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr};
use thiserror::Error;

/// Errors from period construction and interval validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("interval left {left} is after right {right}")]
    InvalidInterval {
        left: NaiveDateTime,
        right: NaiveDateTime,
    },
    #[error("value {value} is out of range for {what}")]
    OutOfRange { what: &'static str, value: String },
    #[error("cannot parse {value:?} as {what}")]
    Unparsable { what: &'static str, value: String },
}

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_DAY: i64 = 86_400;
const SECS_PER_WEEK: i64 = 604_800;

/// How many unit anchors a span period scans before giving up. Only
/// day-of-month spans can skip units (day 31 in a 30-day month), and those
/// never skip more than a handful in a row; the cap is a runaway guard.
const SCAN_LIMIT: usize = 600;

/// Fixed-point iteration budget for composed periods. An intersection that
/// fails to converge within this many steps (e.g. day 30 of February) has no
/// occurrence worth waiting for.
const COMPOSE_LIMIT: usize = 500;

/// A calendar predicate over instants
///
/// Span variants describe a sub-range of a recurring calendar unit in that
/// unit's own granularity: seconds within a minute, hour, day, or week, and
/// whole days or months for the irregular units. `Delta` is a sliding window
/// anchored on the instant under evaluation. Composite variants intersect or
/// unite their parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Every instant; rollback/rollforward windows are unbounded
    Always,
    /// Seconds `[start, end)` of every minute
    OfMinute { start: i64, end: i64 },
    /// Seconds `[start, end)` of every hour
    OfHour { start: i64, end: i64 },
    /// Seconds `[start, end)` of every day
    OfDay { start: i64, end: i64 },
    /// Seconds `[start, end)` of every week; weeks start Monday 00:00
    OfWeek { start: i64, end: i64 },
    /// Days `start..=end` (1-based) of every month, clamped to month length
    OfMonth { start_day: u32, end_day: u32 },
    /// Months `start..=end` (1-based) of every year
    OfYear { start_month: u32, end_month: u32 },
    /// A sliding window of the given length ending (or starting) at the
    /// instant under evaluation
    Delta { millis: i64 },
    /// Intersection of all parts
    All(Vec<Period>),
    /// Union of all parts
    Any(Vec<Period>),
}

/// The universal period
///
/// # Returns
///
/// A period containing every instant
pub fn always() -> Period {
    Period::Always
}

impl Period {
    /// Every full minute, the base grain of cron expressions
    ///
    /// # Returns
    ///
    /// A period whose occurrences tile the timeline minute by minute
    pub fn every_minute() -> Period {
        Period::OfMinute {
            start: 0,
            end: SECS_PER_MINUTE,
        }
    }

    /// A sliding window of the given length
    ///
    /// # Arguments
    ///
    /// * `length` - The window length
    ///
    /// # Returns
    ///
    /// A period whose rollback/rollforward windows end or start at the
    /// instant under evaluation
    pub fn delta(length: std::time::Duration) -> Period {
        Period::Delta {
            millis: length.as_millis() as i64,
        }
    }

    /// Builds the intersection of parts, flattening nested intersections
    ///
    /// # Arguments
    ///
    /// * `parts` - The periods to intersect
    ///
    /// # Returns
    ///
    /// The composed period; a single part is returned unwrapped
    pub fn all(parts: Vec<Period>) -> Period {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Period::All(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            1 => flat.remove(0),
            _ => Period::All(flat),
        }
    }

    /// Builds the union of parts, flattening nested unions
    ///
    /// # Arguments
    ///
    /// * `parts` - The periods to unite
    ///
    /// # Returns
    ///
    /// The composed period; a single part is returned unwrapped
    pub fn any(parts: Vec<Period>) -> Period {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Period::Any(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            1 => flat.remove(0),
            _ => Period::Any(flat),
        }
    }

    /// Locates the occurrence covering `t`, or the next full one after it
    ///
    /// When `t` lies inside an occurrence the returned interval is clipped to
    /// start at `t`; otherwise its left boundary is strictly after `t`.
    ///
    /// # Arguments
    ///
    /// * `t` - The instant to roll forward from
    ///
    /// # Returns
    ///
    /// The occurrence interval; `None` means no occurrence could be located
    /// (impossible period)
    pub fn rollforward(&self, t: NaiveDateTime) -> Option<Interval> {
        match self {
            Period::Always => Some(Interval::span(t, NaiveDateTime::MAX, Closed::Left)),
            Period::Delta { millis } => {
                let right = t.checked_add_signed(Duration::milliseconds(*millis))?;
                Some(Interval::span(t, right, Closed::Both))
            }
            Period::All(parts) => rollforward_all(parts, t),
            Period::Any(parts) => rollforward_any(parts, t),
            _ => self.rollforward_span(t),
        }
    }

    /// Locates the occurrence covering `t`, or the previous full one
    ///
    /// When `t` lies strictly inside an occurrence the returned interval is
    /// clipped to end at `t`; at or before an occurrence start the previous
    /// full occurrence is returned.
    ///
    /// # Arguments
    ///
    /// * `t` - The instant to roll back from
    ///
    /// # Returns
    ///
    /// The occurrence interval; `None` means no occurrence could be located
    /// (impossible period)
    pub fn rollback(&self, t: NaiveDateTime) -> Option<Interval> {
        match self {
            Period::Always => Some(Interval::span(NaiveDateTime::MIN, t, Closed::Right)),
            Period::Delta { millis } => {
                let left = t.checked_sub_signed(Duration::milliseconds(*millis))?;
                Some(Interval::span(left, t, Closed::Both))
            }
            Period::All(parts) => rollback_all(parts, t),
            Period::Any(parts) => rollback_any(parts, t),
            _ => self.rollback_span(t),
        }
    }

    /// Checks whether an instant lies inside an occurrence of the period
    ///
    /// # Arguments
    ///
    /// * `t` - The instant to test
    ///
    /// # Returns
    ///
    /// `true` if `t` lies inside an occurrence
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.rollforward(t).is_some_and(|iv| iv.left() == t)
    }

    fn rollforward_span(&self, t: NaiveDateTime) -> Option<Interval> {
        let mut anchor = self.floor_anchor(t)?;
        for _ in 0..SCAN_LIMIT {
            if let Some((left, right)) = self.occurrence(anchor) {
                if t < left {
                    return Some(Interval::span(left, right, Closed::Left));
                }
                if t < right {
                    return Some(Interval::span(t, right, Closed::Left));
                }
            }
            anchor = self.next_anchor(anchor)?;
        }
        None
    }

    fn rollback_span(&self, t: NaiveDateTime) -> Option<Interval> {
        let mut anchor = self.floor_anchor(t)?;
        for _ in 0..SCAN_LIMIT {
            if let Some((left, right)) = self.occurrence(anchor) {
                if t > right {
                    return Some(Interval::span(left, right, Closed::Left));
                }
                if t > left {
                    return Some(Interval::span(left, t, Closed::Left));
                }
            }
            anchor = self.prev_anchor(anchor)?;
        }
        None
    }

    /// Start of the recurring unit containing `t`
    fn floor_anchor(&self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        let midnight = t.date().and_time(NaiveTime::MIN);
        match self {
            Period::OfMinute { .. } => midnight.checked_add_signed(Duration::seconds(
                i64::from(t.time().num_seconds_from_midnight()) / SECS_PER_MINUTE * SECS_PER_MINUTE,
            )),
            Period::OfHour { .. } => midnight.checked_add_signed(Duration::seconds(
                i64::from(t.time().num_seconds_from_midnight()) / SECS_PER_HOUR * SECS_PER_HOUR,
            )),
            Period::OfDay { .. } => Some(midnight),
            Period::OfWeek { .. } => midnight.checked_sub_signed(Duration::days(i64::from(
                t.weekday().num_days_from_monday(),
            ))),
            Period::OfMonth { .. } => {
                Some(NaiveDate::from_ymd_opt(t.year(), t.month(), 1)?.and_time(NaiveTime::MIN))
            }
            Period::OfYear { .. } => {
                Some(NaiveDate::from_ymd_opt(t.year(), 1, 1)?.and_time(NaiveTime::MIN))
            }
            _ => None,
        }
    }

    /// The occurrence within the unit starting at `anchor`, if the unit has
    /// one (a month may lack the requested days)
    fn occurrence(&self, anchor: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match self {
            Period::OfMinute { start, end }
            | Period::OfHour { start, end }
            | Period::OfDay { start, end }
            | Period::OfWeek { start, end } => {
                let left = anchor.checked_add_signed(Duration::seconds(*start))?;
                let right = anchor.checked_add_signed(Duration::seconds(*end))?;
                Some((left, right))
            }
            Period::OfMonth { start_day, end_day } => {
                let days = days_in_month(anchor.year(), anchor.month())?;
                if *start_day > days {
                    return None;
                }
                let left = anchor.checked_add_signed(Duration::days(i64::from(start_day - 1)))?;
                let right =
                    anchor.checked_add_signed(Duration::days(i64::from((*end_day).min(days))))?;
                Some((left, right))
            }
            Period::OfYear {
                start_month,
                end_month,
            } => {
                let year = anchor.year();
                let left = NaiveDate::from_ymd_opt(year, *start_month, 1)?.and_time(NaiveTime::MIN);
                let right = if *end_month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(year, end_month + 1, 1)?
                }
                .and_time(NaiveTime::MIN);
                Some((left, right))
            }
            _ => None,
        }
    }

    fn next_anchor(&self, anchor: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Period::OfMinute { .. } => anchor.checked_add_signed(Duration::seconds(SECS_PER_MINUTE)),
            Period::OfHour { .. } => anchor.checked_add_signed(Duration::seconds(SECS_PER_HOUR)),
            Period::OfDay { .. } => anchor.checked_add_signed(Duration::days(1)),
            Period::OfWeek { .. } => anchor.checked_add_signed(Duration::weeks(1)),
            Period::OfMonth { .. } => {
                let (year, month) = if anchor.month() == 12 {
                    (anchor.year() + 1, 1)
                } else {
                    (anchor.year(), anchor.month() + 1)
                };
                Some(NaiveDate::from_ymd_opt(year, month, 1)?.and_time(NaiveTime::MIN))
            }
            Period::OfYear { .. } => {
                Some(NaiveDate::from_ymd_opt(anchor.year() + 1, 1, 1)?.and_time(NaiveTime::MIN))
            }
            _ => None,
        }
    }

    fn prev_anchor(&self, anchor: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Period::OfMinute { .. } => anchor.checked_sub_signed(Duration::seconds(SECS_PER_MINUTE)),
            Period::OfHour { .. } => anchor.checked_sub_signed(Duration::seconds(SECS_PER_HOUR)),
            Period::OfDay { .. } => anchor.checked_sub_signed(Duration::days(1)),
            Period::OfWeek { .. } => anchor.checked_sub_signed(Duration::weeks(1)),
            Period::OfMonth { .. } => {
                let (year, month) = if anchor.month() == 1 {
                    (anchor.year() - 1, 12)
                } else {
                    (anchor.year(), anchor.month() - 1)
                };
                Some(NaiveDate::from_ymd_opt(year, month, 1)?.and_time(NaiveTime::MIN))
            }
            Period::OfYear { .. } => {
                Some(NaiveDate::from_ymd_opt(anchor.year() - 1, 1, 1)?.and_time(NaiveTime::MIN))
            }
            _ => None,
        }
    }
}

impl BitAnd for Period {
    type Output = Period;

    fn bitand(self, rhs: Period) -> Period {
        Period::all(vec![self, rhs])
    }
}

impl BitOr for Period {
    type Output = Period;

    fn bitor(self, rhs: Period) -> Period {
        Period::any(vec![self, rhs])
    }
}

fn rollforward_all(parts: &[Period], t: NaiveDateTime) -> Option<Interval> {
    let mut t = t;
    for _ in 0..COMPOSE_LIMIT {
        let mut intervals = Vec::with_capacity(parts.len());
        for part in parts {
            intervals.push(part.rollforward(t)?);
        }
        let left = intervals.iter().map(Interval::left).max()?;
        if intervals.iter().all(|iv| left < iv.right()) {
            let right = intervals.iter().map(Interval::right).min()?;
            return Some(Interval::span(left, right, Closed::Left));
        }
        t = left;
    }
    None
}

fn rollback_all(parts: &[Period], t: NaiveDateTime) -> Option<Interval> {
    let mut t = t;
    for _ in 0..COMPOSE_LIMIT {
        let mut intervals = Vec::with_capacity(parts.len());
        for part in parts {
            intervals.push(part.rollback(t)?);
        }
        let right = intervals.iter().map(Interval::right).min()?;
        if intervals.iter().all(|iv| iv.left() < right) {
            let left = intervals.iter().map(Interval::left).max()?;
            return Some(Interval::span(left, right, Closed::Left));
        }
        t = right;
    }
    None
}

fn rollforward_any(parts: &[Period], t: NaiveDateTime) -> Option<Interval> {
    let mut intervals: Vec<Interval> = parts.iter().filter_map(|p| p.rollforward(t)).collect();
    if intervals.is_empty() {
        return None;
    }
    intervals.sort_by_key(Interval::left);
    let mut merged = intervals[0];
    for iv in &intervals[1..] {
        if iv.left() <= merged.right() {
            merged = Interval::span(
                merged.left(),
                merged.right().max(iv.right()),
                merged.closed(),
            );
        } else {
            break;
        }
    }
    Some(merged)
}

fn rollback_any(parts: &[Period], t: NaiveDateTime) -> Option<Interval> {
    let mut intervals: Vec<Interval> = parts.iter().filter_map(|p| p.rollback(t)).collect();
    if intervals.is_empty() {
        return None;
    }
    intervals.sort_by_key(Interval::right);
    intervals.reverse();
    let mut merged = intervals[0];
    for iv in &intervals[1..] {
        if iv.right() >= merged.left() {
            merged = Interval::span(merged.left().min(iv.left()), merged.right(), merged.closed());
        } else {
            break;
        }
    }
    Some(merged)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

/// Spans of seconds within each minute
pub struct TimeOfMinute;

impl TimeOfMinute {
    /// The single second `second` of every minute
    ///
    /// # Arguments
    ///
    /// * `second` - The second of the minute, 0 to 59
    ///
    /// # Returns
    ///
    /// The period, or an error when the second is out of range
    pub fn at(second: u32) -> Result<Period, TimeError> {
        Self::between(second, second)
    }

    /// Seconds `start..=end` of every minute
    ///
    /// # Arguments
    ///
    /// * `start` - First second of the span, 0 to 59
    /// * `end` - Last second of the span, 0 to 59
    ///
    /// # Returns
    ///
    /// The period, or an error when the span is out of range or reversed
    pub fn between(start: u32, end: u32) -> Result<Period, TimeError> {
        let (start, end) = inclusive_span("second of minute", start, end, 60)?;
        Ok(Period::OfMinute { start, end })
    }
}

/// Spans of minutes within each hour
pub struct TimeOfHour;

impl TimeOfHour {
    /// The single minute `minute` of every hour
    ///
    /// # Arguments
    ///
    /// * `minute` - The minute of the hour, 0 to 59
    ///
    /// # Returns
    ///
    /// The period, or an error when the minute is out of range
    pub fn at(minute: u32) -> Result<Period, TimeError> {
        Self::between(minute, minute)
    }

    /// Minutes `start..=end` of every hour
    ///
    /// # Arguments
    ///
    /// * `start` - First minute of the span, 0 to 59
    /// * `end` - Last minute of the span, 0 to 59
    ///
    /// # Returns
    ///
    /// The period, or an error when the span is out of range or reversed
    pub fn between(start: u32, end: u32) -> Result<Period, TimeError> {
        let (start, end) = inclusive_span("minute of hour", start, end, 60)?;
        Ok(Period::OfHour {
            start: start * SECS_PER_MINUTE,
            end: end * SECS_PER_MINUTE,
        })
    }
}

/// Spans of time within each day
pub struct TimeOfDay;

impl TimeOfDay {
    /// The single hour `hour` of every day
    ///
    /// # Arguments
    ///
    /// * `hour` - The hour of the day, 0 to 23
    ///
    /// # Returns
    ///
    /// The period, or an error when the hour is out of range
    pub fn at(hour: u32) -> Result<Period, TimeError> {
        Self::between_hours(hour, hour)
    }

    /// Hours `start..=end` of every day
    ///
    /// # Arguments
    ///
    /// * `start` - First hour of the span, 0 to 23
    /// * `end` - Last hour of the span, 0 to 23
    ///
    /// # Returns
    ///
    /// The period, or an error when the span is out of range or reversed
    pub fn between_hours(start: u32, end: u32) -> Result<Period, TimeError> {
        let (start, end) = inclusive_span("hour of day", start, end, 24)?;
        Ok(Period::OfDay {
            start: start * SECS_PER_HOUR,
            end: end * SECS_PER_HOUR,
        })
    }

    /// The exact clock span `[start, end)`, e.g. `"10:00"` to `"13:30"`
    ///
    /// A span crossing midnight splits into the union of its two halves.
    ///
    /// # Arguments
    ///
    /// * `start` - Start of the span as `"HH:MM"` or `"HH:MM:SS"`
    /// * `end` - End of the span, exclusive, in the same form
    ///
    /// # Returns
    ///
    /// The period, or an error when a clock time cannot be parsed
    pub fn between(start: &str, end: &str) -> Result<Period, TimeError> {
        let start = parse_clock(start)?;
        let end = parse_clock(end)?;
        if start < end {
            Ok(Period::OfDay { start, end })
        } else {
            Ok(Period::any(vec![
                Period::OfDay {
                    start,
                    end: SECS_PER_DAY,
                },
                Period::OfDay { start: 0, end },
            ]))
        }
    }
}

/// Spans of days within each week; weeks start Monday
pub struct TimeOfWeek;

impl TimeOfWeek {
    /// One whole weekday of every week, by name (`"Mon"`, `"sunday"`, ...)
    ///
    /// # Arguments
    ///
    /// * `day` - The weekday name, case-insensitive
    ///
    /// # Returns
    ///
    /// The period, or an error when the name is unknown
    pub fn at(day: &str) -> Result<Period, TimeError> {
        Self::between(day, day)
    }

    /// Whole weekdays `start..=end` of every week
    ///
    /// # Arguments
    ///
    /// * `start` - Name of the first weekday of the span
    /// * `end` - Name of the last weekday of the span
    ///
    /// # Returns
    ///
    /// The period, or an error when a name is unknown or the span reversed
    pub fn between(start: &str, end: &str) -> Result<Period, TimeError> {
        let start = parse_weekday(start)?;
        let end = parse_weekday(end)?;
        Self::between_days(start, end)
    }

    /// Whole weekdays by Monday-based index `start..=end`
    ///
    /// # Arguments
    ///
    /// * `start` - First weekday index, 0 (Monday) to 6 (Sunday)
    /// * `end` - Last weekday index, 0 to 6
    ///
    /// # Returns
    ///
    /// The period, or an error when the span is out of range or reversed
    pub fn between_days(start: u32, end: u32) -> Result<Period, TimeError> {
        let (start, end) = inclusive_span("day of week", start, end, 7)?;
        Ok(Period::OfWeek {
            start: start * SECS_PER_DAY,
            end: end * SECS_PER_DAY,
        })
    }
}

/// Spans of days within each month
pub struct TimeOfMonth;

impl TimeOfMonth {
    /// The single day `day` (1-based) of every month
    ///
    /// # Arguments
    ///
    /// * `day` - The day of the month, 1 to 31
    ///
    /// # Returns
    ///
    /// The period, or an error when the day is out of range
    pub fn at(day: u32) -> Result<Period, TimeError> {
        Self::between(day, day)
    }

    /// Days `start..=end` (1-based) of every month
    ///
    /// # Arguments
    ///
    /// * `start` - First day of the span, 1 to 31
    /// * `end` - Last day of the span, 1 to 31
    ///
    /// # Returns
    ///
    /// The period, or an error when the span is out of range or reversed
    pub fn between(start: u32, end: u32) -> Result<Period, TimeError> {
        if start == 0 || start > 31 || end > 31 || start > end {
            return Err(TimeError::OutOfRange {
                what: "day of month",
                value: format!("{start}-{end}"),
            });
        }
        Ok(Period::OfMonth {
            start_day: start,
            end_day: end,
        })
    }
}

/// Spans of months within each year
pub struct TimeOfYear;

impl TimeOfYear {
    /// One whole month of every year, by name (`"JUN"`, `"June"`, ...)
    ///
    /// # Arguments
    ///
    /// * `month` - The month name, case-insensitive
    ///
    /// # Returns
    ///
    /// The period, or an error when the name is unknown
    pub fn at(month: &str) -> Result<Period, TimeError> {
        Self::between(month, month)
    }

    /// Whole months `start..=end`, by name
    ///
    /// # Arguments
    ///
    /// * `start` - Name of the first month of the span
    /// * `end` - Name of the last month of the span
    ///
    /// # Returns
    ///
    /// The period, or an error when a name is unknown or the span reversed
    pub fn between(start: &str, end: &str) -> Result<Period, TimeError> {
        Self::between_months(parse_month(start)?, parse_month(end)?)
    }

    /// The single month `month` (1-based) of every year
    ///
    /// # Arguments
    ///
    /// * `month` - The month number, 1 to 12
    ///
    /// # Returns
    ///
    /// The period, or an error when the month is out of range
    pub fn at_month(month: u32) -> Result<Period, TimeError> {
        Self::between_months(month, month)
    }

    /// Months `start..=end` (1-based) of every year
    ///
    /// # Arguments
    ///
    /// * `start` - First month of the span, 1 to 12
    /// * `end` - Last month of the span, 1 to 12
    ///
    /// # Returns
    ///
    /// The period, or an error when the span is out of range or reversed
    pub fn between_months(start: u32, end: u32) -> Result<Period, TimeError> {
        if start == 0 || start > 12 || end == 0 || end > 12 || start > end {
            return Err(TimeError::OutOfRange {
                what: "month of year",
                value: format!("{start}-{end}"),
            });
        }
        Ok(Period::OfYear {
            start_month: start,
            end_month: end,
        })
    }
}

fn inclusive_span(
    what: &'static str,
    start: u32,
    end: u32,
    units: u32,
) -> Result<(i64, i64), TimeError> {
    if start >= units || end >= units || start > end {
        return Err(TimeError::OutOfRange {
            what,
            value: format!("{start}-{end}"),
        });
    }
    Ok((i64::from(start), i64::from(end) + 1))
}

/// Parses `"HH:MM"` or `"HH:MM:SS"` to seconds of day; `"24:00"` is the end
/// of the day
pub(crate) fn parse_clock(text: &str) -> Result<i64, TimeError> {
    let err = || TimeError::Unparsable {
        what: "time of day",
        value: text.to_string(),
    };
    let mut fields = text.split(':');
    let hour: i64 = fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let minute: i64 = fields.next().ok_or_else(err)?.parse().map_err(|_| err())?;
    let second: i64 = match fields.next() {
        Some(s) => s.parse().map_err(|_| err())?,
        None => 0,
    };
    if fields.next().is_some() || hour > 24 || minute > 59 || second > 59 {
        return Err(err());
    }
    let total = hour * SECS_PER_HOUR + minute * SECS_PER_MINUTE + second;
    if total > SECS_PER_DAY {
        return Err(err());
    }
    Ok(total)
}

/// Parses a weekday name to its Monday-based index; accepts full names and
/// three-letter abbreviations, case-insensitive
pub(crate) fn parse_weekday(text: &str) -> Result<u32, TimeError> {
    const DAYS: [&str; 7] = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];
    let lowered = text.to_ascii_lowercase();
    DAYS.iter()
        .position(|day| *day == lowered.as_str() || day[..3] == *lowered.as_str())
        .map(|idx| idx as u32)
        .ok_or_else(|| TimeError::Unparsable {
            what: "day of week",
            value: text.to_string(),
        })
}

/// Parses a month name to its 1-based number; accepts full names and
/// three-letter abbreviations, case-insensitive
pub(crate) fn parse_month(text: &str) -> Result<u32, TimeError> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let lowered = text.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| *month == lowered.as_str() || month[..3] == *lowered.as_str())
        .map(|idx| idx as u32 + 1)
        .ok_or_else(|| TimeError::Unparsable {
            what: "month",
            value: text.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_minute_of_hour_rollforward() {
        let period = TimeOfHour::at(30).unwrap();

        // Before the occurrence: the next full occurrence
        let iv = period.rollforward(dt(2022, 8, 7, 12, 29, 59)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 31, 0));

        // Inside the occurrence: clipped to start at t
        let iv = period.rollforward(dt(2022, 8, 7, 12, 30, 30)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 30, 30));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 31, 0));

        // At the right edge (excluded): the next hour's occurrence
        let iv = period.rollforward(dt(2022, 8, 7, 12, 31, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 13, 30, 0));
    }

    #[test]
    fn test_minute_of_hour_rollback() {
        let period = TimeOfHour::at(30).unwrap();

        // Strictly inside: clipped to end at t
        let iv = period.rollback(dt(2022, 8, 7, 12, 30, 30)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 30, 30));
        assert_eq!(iv.closed(), Closed::Left);

        // At the occurrence start: the previous full occurrence
        let iv = period.rollback(dt(2022, 8, 7, 12, 30, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 11, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 11, 31, 0));

        // After the occurrence: the full occurrence
        let iv = period.rollback(dt(2022, 8, 7, 12, 45, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 31, 0));
    }

    #[test]
    fn test_time_of_day_between_exact() {
        let period = TimeOfDay::between("10:00", "13:00").unwrap();

        let iv = period.rollforward(dt(2022, 8, 7, 9, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 10, 0, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 13, 0, 0));

        // 13:00 itself is excluded
        assert!(period.contains(dt(2022, 8, 7, 12, 59, 59)));
        assert!(!period.contains(dt(2022, 8, 7, 13, 0, 0)));
    }

    #[test]
    fn test_time_of_day_hours_are_inclusive() {
        // Hour span 10-13 covers up to 14:00
        let period = TimeOfDay::between_hours(10, 13).unwrap();
        assert!(period.contains(dt(2022, 8, 7, 13, 59, 59)));
        assert!(!period.contains(dt(2022, 8, 7, 14, 0, 0)));
    }

    #[test]
    fn test_time_of_day_wraps_midnight() {
        let period = TimeOfDay::between("22:00", "02:00").unwrap();
        assert!(period.contains(dt(2022, 8, 7, 23, 30, 0)));
        assert!(period.contains(dt(2022, 8, 7, 1, 30, 0)));
        assert!(!period.contains(dt(2022, 8, 7, 12, 0, 0)));
    }

    #[test]
    fn test_time_of_week() {
        // 2022-08-07 is a Sunday, 2022-08-01 a Monday
        let period = TimeOfWeek::between("Fri", "Sun").unwrap();
        assert!(period.contains(dt(2022, 8, 7, 12, 0, 0)));
        assert!(period.contains(dt(2022, 8, 5, 0, 0, 0)));
        assert!(!period.contains(dt(2022, 8, 4, 23, 59, 59)));

        let iv = period.rollforward(dt(2022, 8, 1, 0, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 5, 0, 0, 0));
        assert_eq!(iv.right(), dt(2022, 8, 8, 0, 0, 0));
    }

    #[test]
    fn test_time_of_month_clamps_to_month_end() {
        let period = TimeOfMonth::between(28, 30).unwrap();
        let iv = period.rollforward(dt(2022, 2, 1, 0, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 2, 28, 0, 0, 0));
        assert_eq!(iv.right(), dt(2022, 3, 1, 0, 0, 0));
    }

    #[test]
    fn test_time_of_month_skips_short_months() {
        let period = TimeOfMonth::at(31).unwrap();
        let iv = period.rollforward(dt(2022, 2, 1, 0, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 3, 31, 0, 0, 0));

        let iv = period.rollback(dt(2022, 3, 1, 0, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 1, 31, 0, 0, 0));
    }

    #[test]
    fn test_time_of_year() {
        let period = TimeOfYear::between("FEB", "MAR").unwrap();
        let iv = period.rollforward(dt(2022, 8, 7, 0, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2023, 2, 1, 0, 0, 0));
        assert_eq!(iv.right(), dt(2023, 4, 1, 0, 0, 0));
        assert!(period.contains(dt(2022, 3, 31, 23, 0, 0)));
        assert!(!period.contains(dt(2022, 4, 1, 0, 0, 0)));
    }

    #[test]
    fn test_delta_windows() {
        let period = Period::delta(std::time::Duration::from_secs(3600));
        let iv = period.rollback(dt(2022, 8, 7, 12, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 11, 0, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 0, 0));
        assert_eq!(iv.closed(), Closed::Both);

        let iv = period.rollforward(dt(2022, 8, 7, 12, 0, 0)).unwrap();
        assert_eq!(iv.right(), dt(2022, 8, 7, 13, 0, 0));
    }

    #[test]
    fn test_intersection_converges() {
        // Minute 30 of hours 18-22
        let period = TimeOfHour::at(30).unwrap() & TimeOfDay::between_hours(18, 22).unwrap();
        let iv = period.rollforward(dt(2022, 8, 7, 12, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 18, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 18, 31, 0));
    }

    #[test]
    fn test_union_picks_nearest() {
        let period = TimeOfHour::at(15).unwrap() | TimeOfHour::at(45).unwrap();
        let iv = period.rollforward(dt(2022, 8, 7, 12, 20, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 45, 0));

        let iv = period.rollback(dt(2022, 8, 7, 12, 20, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 15, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 16, 0));
    }

    #[test]
    fn test_impossible_intersection_gives_up() {
        // Day 30 of February never happens
        let period = TimeOfMonth::at(30).unwrap() & TimeOfYear::at("FEB").unwrap();
        assert!(period.rollforward(dt(2022, 8, 7, 0, 0, 0)).is_none());
    }

    #[test]
    fn test_span_validation() {
        assert!(TimeOfHour::between(50, 10).is_err());
        assert!(TimeOfHour::at(60).is_err());
        assert!(TimeOfMonth::at(0).is_err());
        assert!(TimeOfYear::between_months(3, 1).is_err());
        assert!(TimeOfDay::between("25:00", "26:00").is_err());
        assert!(TimeOfWeek::at("Funday").is_err());
    }

    #[test]
    fn test_parse_clock_forms() {
        assert_eq!(parse_clock("00:00").unwrap(), 0);
        assert_eq!(parse_clock("10:30").unwrap(), 10 * 3600 + 30 * 60);
        assert_eq!(parse_clock("10:30:15").unwrap(), 10 * 3600 + 30 * 60 + 15);
        assert_eq!(parse_clock("24:00").unwrap(), SECS_PER_DAY);
        assert!(parse_clock("noon").is_err());
    }
}
