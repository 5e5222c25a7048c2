//! Crontab period module
//!
//! Parses five-field cron expressions (`min hour dom month dow`) and resolves
//! them into composed calendar periods. Symbolic month and weekday names are
//! accepted case-insensitively, and the classic cron quirk is preserved: when
//! both day-of-month and day-of-week are restricted, the two are OR-ed so the
//! expression fires on whichever matches sooner.

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{
    parse_month, parse_weekday, Interval, Period, TimeOfDay, TimeOfHour, TimeOfMonth, TimeOfWeek,
    TimeOfYear,
};

/// Errors from cron expression parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronParseError {
    #[error("expected 5 whitespace-separated fields, got {0}")]
    FieldCount(usize),
    #[error("invalid {field} field value {value:?}")]
    Field { field: &'static str, value: String },
}

/// A five-field cron expression resolved to a calendar period
///
/// ```
/// use taskweaver::time::Crontab;
///
/// let every_half_hour: Crontab = "30 * * * *".parse().unwrap();
/// assert!(every_half_hour.to_string().contains("30"));
/// ```
#[derive(Debug, Clone)]
pub struct Crontab {
    /// The five fields as written, preserved for display
    fields: [String; 5],
    /// The calendar period the expression resolves to
    period: Period,
}

impl Crontab {
    /// Builds a crontab from its five fields
    ///
    /// # Arguments
    ///
    /// * `minute` - Minutes field, 0 to 59
    /// * `hour` - Hours field, 0 to 23
    /// * `day_of_month` - Day-of-month field, 1 to 31
    /// * `month` - Month field, 1 to 12 or month names
    /// * `day_of_week` - Day-of-week field, 0 (Sunday) to 6 or day names
    ///
    /// # Returns
    ///
    /// A new Crontab resolved to its calendar period
    ///
    /// # Errors
    ///
    /// Returns `CronParseError` when a field is outside its numeric domain,
    /// uses an unknown symbol, or has a reversed range.
    pub fn new(
        minute: &str,
        hour: &str,
        day_of_month: &str,
        month: &str,
        day_of_week: &str,
    ) -> Result<Self, CronParseError> {
        let minute_part = parse_field(minute, "minute", 0, 59, |a, b| {
            TimeOfHour::between(a, b).ok()
        })?;
        let hour_part = parse_field(hour, "hour", 0, 23, |a, b| {
            TimeOfDay::between_hours(a, b).ok()
        })?;
        let dom_part = parse_field(day_of_month, "day-of-month", 1, 31, |a, b| {
            TimeOfMonth::between(a, b).ok()
        })?;
        let month_part = parse_month_field(month)?;
        let dow_part = parse_dow_field(day_of_week)?;

        let mut parts = vec![Period::every_minute()];
        parts.extend(minute_part);
        parts.extend(hour_part);
        parts.extend(month_part);
        match (dom_part, dow_part) {
            (Some(dom), Some(dow)) => parts.push(dom | dow),
            (Some(dom), None) => parts.push(dom),
            (None, Some(dow)) => parts.push(dow),
            (None, None) => {}
        }

        Ok(Self {
            fields: [
                minute.to_string(),
                hour.to_string(),
                day_of_month.to_string(),
                month.to_string(),
                day_of_week.to_string(),
            ],
            period: Period::all(parts),
        })
    }

    /// Returns the composed calendar period the expression resolves to
    ///
    /// # Returns
    ///
    /// The resolved period
    pub fn subperiod(&self) -> &Period {
        &self.period
    }

    /// Locates the occurrence covering `t`, or the next full one after it
    ///
    /// # Arguments
    ///
    /// * `t` - The instant to roll forward from
    ///
    /// # Returns
    ///
    /// The occurrence interval, or `None` when the expression never occurs
    pub fn rollforward(&self, t: NaiveDateTime) -> Option<Interval> {
        self.period.rollforward(t)
    }

    /// Locates the occurrence covering `t`, or the previous full one
    ///
    /// # Arguments
    ///
    /// * `t` - The instant to roll back from
    ///
    /// # Returns
    ///
    /// The occurrence interval, or `None` when the expression never occurs
    pub fn rollback(&self, t: NaiveDateTime) -> Option<Interval> {
        self.period.rollback(t)
    }

    /// Checks whether an instant lies inside an occurrence of the expression
    ///
    /// # Arguments
    ///
    /// * `t` - The instant to test
    ///
    /// # Returns
    ///
    /// `true` if `t` lies inside an occurrence
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.period.contains(t)
    }
}

impl Default for Crontab {
    /// Every minute (`* * * * *`)
    fn default() -> Self {
        Self::new("*", "*", "*", "*", "*").expect("wildcard crontab is valid")
    }
}

impl FromStr for Crontab {
    type Err = CronParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount(fields.len()));
        }
        Self::new(fields[0], fields[1], fields[2], fields[3], fields[4])
    }
}

impl fmt::Display for Crontab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fields.join(" "))
    }
}

impl PartialEq for Crontab {
    /// Two crontabs are equal when they resolve to the same period,
    /// regardless of spelling (`"JUN"` vs `"6"`)
    fn eq(&self, other: &Self) -> bool {
        self.period == other.period
    }
}

/// Parses a purely numeric field into a union of value segments
fn parse_field(
    text: &str,
    field: &'static str,
    min: u32,
    max: u32,
    build: impl Fn(u32, u32) -> Option<Period>,
) -> Result<Option<Period>, CronParseError> {
    if text == "*" {
        return Ok(None);
    }
    let err = || CronParseError::Field {
        field,
        value: text.to_string(),
    };
    let mut segments = Vec::new();
    for item in text.split(',') {
        let (a, b) = match item.split_once('-') {
            Some((a, b)) => (
                parse_number(a, min, max).ok_or_else(err)?,
                parse_number(b, min, max).ok_or_else(err)?,
            ),
            None => {
                let v = parse_number(item, min, max).ok_or_else(err)?;
                (v, v)
            }
        };
        segments.push(build(a, b).ok_or_else(err)?);
    }
    Ok(Some(Period::any(segments)))
}

/// Parses the month field, accepting numbers and month names
fn parse_month_field(text: &str) -> Result<Option<Period>, CronParseError> {
    if text == "*" {
        return Ok(None);
    }
    let err = || CronParseError::Field {
        field: "month",
        value: text.to_string(),
    };
    let mut segments = Vec::new();
    for item in text.split(',') {
        let (a, b) = match item.split_once('-') {
            Some((a, b)) => (month_value(a).ok_or_else(err)?, month_value(b).ok_or_else(err)?),
            None => {
                let v = month_value(item).ok_or_else(err)?;
                (v, v)
            }
        };
        segments.push(TimeOfYear::between_months(a, b).map_err(|_| err())?);
    }
    Ok(Some(Period::any(segments)))
}

/// Parses the day-of-week field, accepting numbers (0 = Sunday) and day
/// names. Numeric ranges may wrap (`5-0` is Friday through Sunday).
fn parse_dow_field(text: &str) -> Result<Option<Period>, CronParseError> {
    if text == "*" {
        return Ok(None);
    }
    let err = || CronParseError::Field {
        field: "day-of-week",
        value: text.to_string(),
    };
    // Collect the selected days as Monday-based indices
    let mut days = [false; 7];
    for item in text.split(',') {
        let (a, b) = match item.split_once('-') {
            Some((a, b)) => (dow_value(a).ok_or_else(err)?, dow_value(b).ok_or_else(err)?),
            None => {
                let v = dow_value(item).ok_or_else(err)?;
                (v, v)
            }
        };
        // Walk the cron numbering with wrap-around, marking ISO days
        let mut cron_day = a;
        loop {
            days[((cron_day + 6) % 7) as usize] = true;
            if cron_day == b {
                break;
            }
            cron_day = (cron_day + 1) % 7;
        }
    }
    // Compress the marked days into contiguous week spans
    let mut segments = Vec::new();
    let mut run: Option<(u32, u32)> = None;
    for (day, marked) in days.iter().copied().enumerate() {
        let day = day as u32;
        match (run, marked) {
            (None, true) => run = Some((day, day)),
            (Some((start, _)), true) => run = Some((start, day)),
            (Some((start, end)), false) => {
                segments.push(TimeOfWeek::between_days(start, end).map_err(|_| err())?);
                run = None;
            }
            (None, false) => {}
        }
    }
    if let Some((start, end)) = run {
        segments.push(TimeOfWeek::between_days(start, end).map_err(|_| err())?);
    }
    Ok(Some(Period::any(segments)))
}

fn parse_number(text: &str, min: u32, max: u32) -> Option<u32> {
    let value: u32 = text.trim().parse().ok()?;
    (value >= min && value <= max).then_some(value)
}

fn month_value(text: &str) -> Option<u32> {
    parse_number(text, 1, 12).or_else(|| parse_month(text.trim()).ok())
}

/// Day-of-week value in cron numbering (0 = Sunday)
fn dow_value(text: &str) -> Option<u32> {
    parse_number(text, 0, 6)
        .or_else(|| parse_weekday(text.trim()).ok().map(|iso| (iso + 1) % 7))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn cron(text: &str) -> Crontab {
        text.parse().unwrap()
    }

    #[test]
    fn test_subperiod_composition() {
        let tab = cron("30 * * * *");
        let expected = Period::every_minute() & TimeOfHour::at(30).unwrap();
        assert_eq!(*tab.subperiod(), expected);

        let tab = cron("* 12 * * *");
        let expected = Period::every_minute() & TimeOfDay::at(12).unwrap();
        assert_eq!(*tab.subperiod(), expected);

        let tab = cron("* * 28 * *");
        let expected = Period::every_minute() & TimeOfMonth::at(28).unwrap();
        assert_eq!(*tab.subperiod(), expected);
    }

    #[test]
    fn test_symbol_synonyms() {
        assert_eq!(cron("* * * JUN *"), cron("* * * 6 *"));
        assert_eq!(cron("* * * june *"), cron("* * * 6 *"));
        assert_eq!(cron("* * * * SUN"), cron("* * * * 0"));
        assert_eq!(cron("* * * FEB-MAR *"), cron("* * * 2-3 *"));
        assert_eq!(cron("* * * * FRI-SUN"), cron("* * * * 5-0"));
    }

    #[test]
    fn test_in_period() {
        let tab = cron("30 * * * *");
        assert!(!tab.contains(dt(2022, 8, 7, 12, 29, 59)));
        assert!(tab.contains(dt(2022, 8, 7, 12, 30, 0)));
        assert!(tab.contains(dt(2022, 8, 7, 12, 30, 59)));
        assert!(!tab.contains(dt(2022, 8, 7, 12, 31, 0)));
    }

    #[test]
    fn test_roll_forward_simple() {
        let tab = cron("30 * * * *");

        // Roll tiny amount
        let iv = tab.rollforward(dt(2022, 8, 7, 12, 29, 59)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 31, 0));

        // No roll (at left)
        let iv = tab.rollforward(dt(2022, 8, 7, 12, 30, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 31, 0));

        // No roll (at center)
        let iv = tab.rollforward(dt(2022, 8, 7, 12, 30, 30)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 30, 30));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 31, 0));

        // No roll (at right, still inside)
        let just_inside = NaiveDate::from_ymd_opt(2022, 8, 7)
            .unwrap()
            .and_hms_micro_opt(12, 30, 59, 999_999)
            .unwrap();
        let iv = tab.rollforward(just_inside).unwrap();
        assert_eq!(iv.left(), just_inside);
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 31, 0));

        // Roll (at right)
        let iv = tab.rollforward(dt(2022, 8, 7, 12, 31, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 13, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 13, 31, 0));
    }

    #[test]
    fn test_roll_back_simple() {
        let tab = cron("30 * * * *");

        // Roll tiny amount
        let iv = tab.rollback(dt(2022, 8, 7, 12, 31, 1)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 31, 0));
        assert_eq!(iv.closed(), crate::time::Closed::Left);

        // At the occurrence start (single point): the previous occurrence
        let iv = tab.rollback(dt(2022, 8, 7, 12, 30, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 11, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 11, 31, 0));

        // No roll (at center)
        let iv = tab.rollback(dt(2022, 8, 7, 12, 30, 30)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 30, 30));

        // Roll (at right)
        let iv = tab.rollback(dt(2022, 8, 7, 14, 15, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 13, 30, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 13, 31, 0));
    }

    #[test]
    fn test_roll_minute_range() {
        let tab = cron("30-45 * * * *");

        let iv = tab.rollforward(dt(2022, 8, 7, 12, 33, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 33, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 34, 0));

        let iv = tab.rollback(dt(2022, 8, 7, 12, 32, 59)).unwrap();
        assert_eq!(iv.left(), dt(2022, 8, 7, 12, 32, 0));
        assert_eq!(iv.right(), dt(2022, 8, 7, 12, 32, 59));
    }

    #[test]
    fn test_roll_complex() {
        let tab = cron("15,30 18-22 20 OCT *");

        let iv = tab.rollforward(dt(2022, 8, 7, 10, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 10, 20, 18, 15, 0));
        assert_eq!(iv.right(), dt(2022, 10, 20, 18, 16, 0));

        let iv = tab.rollback(dt(2022, 12, 7, 10, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 10, 20, 22, 30, 0));
        assert_eq!(iv.right(), dt(2022, 10, 20, 22, 31, 0));
    }

    #[test]
    fn test_roll_conflict_day_of_week_first() {
        // Both day fields restricted: fire on whichever matches sooner
        let tab = cron("15 18-22 20 OCT MON");

        let iv = tab.rollforward(dt(2022, 8, 7, 10, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 10, 3, 18, 15, 0));
        assert_eq!(iv.right(), dt(2022, 10, 3, 18, 16, 0));

        let iv = tab.rollback(dt(2022, 12, 7, 10, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 10, 31, 22, 15, 0));
        assert_eq!(iv.right(), dt(2022, 10, 31, 22, 16, 0));
    }

    #[test]
    fn test_roll_conflict_day_of_month_first() {
        let tab = cron("15 18-22 3 OCT FRI");
        let iv = tab.rollforward(dt(2022, 8, 7, 10, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 10, 3, 18, 15, 0));
        assert_eq!(iv.right(), dt(2022, 10, 3, 18, 16, 0));

        let tab = cron("15 18-22 29 OCT FRI");
        let iv = tab.rollback(dt(2022, 12, 7, 10, 0, 0)).unwrap();
        assert_eq!(iv.left(), dt(2022, 10, 29, 22, 15, 0));
        assert_eq!(iv.right(), dt(2022, 10, 29, 22, 16, 0));
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "30 * * * *",
            "0,15,30,45 * * * *",
            "45-59 10-13 28-30 FEB-MAR FRI-SUN",
            "15 18-22 20 OCT MON",
        ] {
            let tab = cron(text);
            let reparsed: Crontab = tab.to_string().parse().unwrap();
            assert_eq!(tab, reparsed, "round trip failed for {text}");
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!("61 * * * *".parse::<Crontab>().is_err());
        assert!("* 24 * * *".parse::<Crontab>().is_err());
        assert!("* * 0 * *".parse::<Crontab>().is_err());
        assert!("* * * FOO *".parse::<Crontab>().is_err());
        assert!("* * * * 7".parse::<Crontab>().is_err());
        assert!("30-10 * * * *".parse::<Crontab>().is_err());
        assert_eq!(
            "* * * *".parse::<Crontab>().unwrap_err(),
            CronParseError::FieldCount(4)
        );
    }

    proptest! {
        #[test]
        fn prop_rollforward_invariants(
            secs in 1_577_836_800i64..1_893_456_000i64, // 2020..2030
            expr in prop::sample::select(vec![
                "30 * * * *",
                "0,15,30,45 * * * *",
                "* 10-13 * * *",
                "15 18-22 20 OCT MON",
                "45-59 * 28-30 FEB-MAR *",
            ]),
        ) {
            let t = chrono::DateTime::from_timestamp(secs, 0).unwrap().naive_utc();
            let tab: Crontab = expr.parse().unwrap();

            if let Some(iv) = tab.rollforward(t) {
                // Ordered boundaries, and either covering t or strictly ahead
                prop_assert!(iv.left() <= iv.right());
                prop_assert!(iv.left() >= t);
                prop_assert_eq!(tab.contains(t), iv.left() == t);

                // The previous occurrence ends at or before this one starts
                if let Some(back) = tab.rollback(iv.left()) {
                    prop_assert!(back.right() <= iv.left());
                }
            }
        }
    }
}
