//! Calendar arithmetic for month-bucketed billing.
//!
//! Every month shift is computed from the first day of a month, so a date such
//! as Jan 31 never spills into March when a month is added. All functions are
//! pure and operate on UTC calendar dates.

use crate::error::BillingError;
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Month bucket rendered as `"<month>_<year>"` without zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the bucketed month.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn parse(s: &str) -> Result<Self, BillingError> {
        let (month, year) = s
            .split_once('_')
            .ok_or_else(|| BillingError::InvalidMonthKey(s.to_string()))?;

        let month: u32 = month
            .parse()
            .map_err(|_| BillingError::InvalidMonthKey(s.to_string()))?;
        let year: i32 = year
            .parse()
            .map_err(|_| BillingError::InvalidMonthKey(s.to_string()))?;

        if !(1..=12).contains(&month) {
            return Err(BillingError::InvalidMonthKey(s.to_string()));
        }

        Ok(Self { year, month })
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.month, self.year)
    }
}

impl FromStr for MonthKey {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MonthKey::parse(s)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MonthKey::parse(&value)
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

/// Shift `date` by a signed number of months, clamping the day to the end of
/// the target month. Saturates at the representable date range.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    if months >= 0 {
        date.checked_add_months(Months::new(months.unsigned_abs()))
            .unwrap_or(NaiveDate::MAX)
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
            .unwrap_or(NaiveDate::MIN)
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

pub fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Last day of the month `offset_months` away from `date`'s month: first of
/// the following month, shifted, minus one day.
fn target_month_end(date: NaiveDate, offset_months: i32) -> NaiveDate {
    let anchor = add_months(first_of_month(date), 1);
    let shifted = add_months(anchor, offset_months);
    shifted.pred_opt().unwrap_or(shifted)
}

pub fn month_key(date: NaiveDate, offset_months: i32) -> MonthKey {
    let end = target_month_end(date, offset_months);
    MonthKey {
        year: end.year(),
        month: end.month(),
    }
}

pub fn days_in_month(date: NaiveDate, offset_months: i32) -> f64 {
    f64::from(target_month_end(date, offset_months).day())
}

/// Number of days in `date`'s own month.
pub fn month_length(date: NaiveDate) -> u32 {
    target_month_end(date, 0).day()
}

fn is_month_end(date: NaiveDate) -> bool {
    date.day() == month_length(date)
}

/// `count` consecutive month keys ending at `date`'s month, most recent first.
pub fn applicable_months(date: NaiveDate, count: usize) -> Vec<MonthKey> {
    (0..count)
        .map(|i| month_key(date, -(i as i32)))
        .collect()
}

/// Signed whole months from `a` to `b`.
///
/// A trailing partial month counts only once the day of month of the later
/// date reaches the earlier one; the last day of a shorter month counts as
/// reaching it.
pub fn months_between(a: NaiveDate, b: NaiveDate) -> i32 {
    let mut months =
        (b.year() - a.year()) * 12 + (b.month() as i32 - a.month() as i32);

    if months > 0 && b.day() < a.day() && !is_month_end(b) {
        months -= 1;
    } else if months < 0 && a.day() < b.day() && !is_month_end(a) {
        months += 1;
    }

    months
}

/// Nil-safe minimum; `None` is "no preference", not a bound.
pub fn earliest<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Month buckets and day counts used by monthly savings and spend summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeParams {
    pub now: DateTime<Utc>,
    pub applicable_months: Vec<MonthKey>,
    pub current_month: MonthKey,
    pub previous_month: MonthKey,
    pub days_in_current_month: f64,
    pub days_in_next_month: f64,
}

impl TimeParams {
    pub fn new(now: DateTime<Utc>, history_months: usize) -> Self {
        let today = now.date_naive();

        Self {
            now,
            applicable_months: applicable_months(today, history_months),
            current_month: month_key(today, 0),
            previous_month: month_key(today, -1),
            days_in_current_month: days_in_month(today, 0),
            days_in_next_month: days_in_month(today, 1),
        }
    }
}
