//! Resolution of a billing table update request into the days to rebuild.

use crate::error::BillingError;
use crate::models::UpdateTableInterval;
use chrono::NaiveDate;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(value: &str) -> Result<NaiveDate, BillingError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| BillingError::InvalidDate(format!("{}: {}", value, e)))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn check_date(date: Option<NaiveDate>, today: NaiveDate) -> Result<NaiveDate, BillingError> {
    match date {
        None => Ok(today),
        Some(date) if date > today => Err(BillingError::InvalidInterval(format!(
            "date {} is after today",
            date.format(DATE_FORMAT)
        ))),
        Some(date) => Ok(date),
    }
}

/// Inclusive list of days covered by `request`. Missing bounds default to
/// `today`; an end date requires a start date and neither may be in the
/// future.
pub fn resolve_interval(
    request: &UpdateTableInterval,
    today: NaiveDate,
) -> Result<Vec<NaiveDate>, BillingError> {
    let start = non_empty(&request.start_date).map(parse_date).transpose()?;

    let end = match non_empty(&request.end_date) {
        Some(end) if start.is_none() => {
            return Err(BillingError::InvalidInterval(format!(
                "end date {} is set, but start date is not",
                end
            )));
        }
        Some(end) => Some(parse_date(end)?),
        None => None,
    };

    let start = check_date(start, today)?;
    let end = check_date(end, today)?;

    if start > end {
        return Err(BillingError::InvalidInterval(format!(
            "start date {} is after end date {}",
            start.format(DATE_FORMAT),
            end.format(DATE_FORMAT)
        )));
    }

    Ok(start.iter_days().take_while(|day| *day <= end).collect())
}
