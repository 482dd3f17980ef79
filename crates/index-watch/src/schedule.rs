//! Cron Schedule
//!
//! Five-field cron expressions (`minute hour day-of-month month day-of-week`)
//! evaluated in UTC. Fields accept `*`, numbers, lists, ranges and `/step`.
//! Day-of-week 0 and 7 are both Sunday. When both day fields are restricted
//! a day matches if either does, as in classic cron.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::{Result, WatchError};

/// Parsed cron expression
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronSchedule {
    expr: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(WatchError::Config(format!(
                "cron expression '{expr}' must have 5 fields, found {}",
                fields.len()
            )));
        };

        let mut days_of_week = parse_field(dow, 0, 7, "day-of-week")?;
        // 7 is an alias for Sunday
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expr: fields.join(" "),
            minutes: parse_field(minute, 0, 59, "minute")?,
            hours: parse_field(hour, 0, 23, "hour")?,
            days_of_month: parse_field(dom, 1, 31, "day-of-month")?,
            months: parse_field(month, 1, 12, "month")?,
            days_of_week,
            // a field starting with `*` (including `*/n`) does not widen the day match
            dom_restricted: !dom.starts_with('*'),
            dow_restricted: !dow.starts_with('*'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// First matching minute strictly after `after`, `None` if nothing
    /// matches within five years (e.g. `0 0 30 2 *`)
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let limit = start + Duration::days(5 * 366);
        let mut t = start;

        while t <= limit {
            if !has(self.months, t.month()) {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = (t.date() + Duration::days(1)).and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !has(self.hours, t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !has(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t.and_utc());
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = has(self.days_of_month, date.day());
        let dow = has(self.days_of_week, date.weekday().num_days_from_sunday());

        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

const fn has(bits: u64, value: u32) -> bool {
    bits & (1 << value) != 0
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

/// Parse one field into a bitmask of allowed values
fn parse_field(field: &str, min: u32, max: u32, name: &str) -> Result<u64> {
    let invalid = |why: &str| WatchError::Config(format!("cron {name} field '{field}': {why}"));
    let number = |s: &str| -> Result<u32> {
        let value: u32 = s.parse().map_err(|_| invalid("not a number"))?;
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(invalid(&format!("{value} outside {min}-{max}")))
        }
    };

    let mut bits = 0u64;
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid("bad step"))?;
                if step == 0 {
                    return Err(invalid("step must be positive"));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (number(lo)?, number(hi)?)
        } else {
            let value = number(range)?;
            // `5/15` means every 15 starting at 5
            (value, if step.is_some() { max } else { value })
        };

        if lo > hi {
            return Err(invalid("range start after end"));
        }

        for value in (lo..=hi).step_by(step.unwrap_or(1) as usize) {
            bits |= 1 << value;
        }
    }
    Ok(bits)
}
