//! Billing eligibility and proration for contract SKUs.
//!
//! A SKU runs from its start date for `months` months and is invoiced every
//! `frequency` months. Monthly SKUs (`frequency == 1`) bill every calendar month
//! they overlap; multi-month SKUs bill only in the months where
//! `start + k * frequency` lands, and the final cycle is truncated when
//! `months` is not a multiple of `frequency`.

use crate::calendar::{add_months, first_of_month, month_length, months_between, same_month};
use crate::error::BillingError;
use crate::models::{ContractProperties, ContractSku};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

pub const MONTHLY_INVOICING_FREQUENCY: i32 = 1;
pub const HOURS_PER_DAY: u32 = 24;

/// Validated billing schedule of a single SKU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingTerms {
    pub start: NaiveDate,
    pub months: i32,
    pub frequency: i32,
}

impl BillingTerms {
    pub fn new(start: NaiveDate, months: i32, frequency: i32) -> Result<Self, BillingError> {
        if months <= 0 {
            return Err(BillingError::InvalidSku(format!(
                "duration must be a positive number of months, got {}",
                months
            )));
        }
        if frequency <= 0 {
            return Err(BillingError::InvalidSku(format!(
                "invoice frequency must be a positive number of months, got {}",
                frequency
            )));
        }

        Ok(Self {
            start,
            months,
            frequency,
        })
    }

    pub fn for_sku(
        sku: &ContractSku,
        properties: &ContractProperties,
    ) -> Result<Self, BillingError> {
        Self::new(
            sku.start_date.date_naive(),
            sku.months,
            properties.invoice_frequency,
        )
    }

    pub fn is_monthly(&self) -> bool {
        self.frequency == MONTHLY_INVOICING_FREQUENCY
    }

    /// Last billable day: `start + months - 1 day`.
    pub fn end_date(&self) -> NaiveDate {
        let end = add_months(self.start, self.months);
        end.pred_opt().unwrap_or(end)
    }

    /// Invoice date of the `cycle`-th billing cycle.
    fn billing_date(&self, cycle: i32) -> NaiveDate {
        add_months(self.start, cycle.saturating_mul(self.frequency))
    }
}

/// Target of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingPeriod {
    /// Compared at year+month granularity.
    Month(NaiveDate),
    /// Compared at day granularity.
    Day(NaiveDate),
}

pub fn is_billable(
    sku: &ContractSku,
    properties: &ContractProperties,
    period: BillingPeriod,
) -> Result<bool, BillingError> {
    let terms = BillingTerms::for_sku(sku, properties)?;

    Ok(match period {
        BillingPeriod::Month(month) => is_month_billable(&terms, month),
        BillingPeriod::Day(day) => is_day_billable(&terms, day),
    })
}

pub fn is_month_billable(terms: &BillingTerms, target: NaiveDate) -> bool {
    if terms.is_monthly() {
        let target_month = first_of_month(target);
        return first_of_month(terms.start) <= target_month
            && target_month <= first_of_month(terms.end_date());
    }

    cycle_billing_date(terms, target).is_some()
}

/// Invoice date of the cycle that lands in `target`'s month, if any.
pub fn cycle_billing_date(terms: &BillingTerms, target: NaiveDate) -> Option<NaiveDate> {
    let end = terms.end_date();
    let target_month = first_of_month(target);

    let mut cycle = 0;
    loop {
        let billing_date = terms.billing_date(cycle);

        if same_month(billing_date, target) && billing_date <= end {
            return Some(billing_date);
        }
        if first_of_month(billing_date) > target_month || billing_date > end {
            return None;
        }

        cycle += 1;
    }
}

/// Day-granular variant: within a matched billing month only days on or after
/// the billing day of month are billable.
pub fn is_day_billable(terms: &BillingTerms, day: NaiveDate) -> bool {
    let end = terms.end_date();

    if terms.is_monthly() {
        return terms.start <= day && day <= end;
    }

    let mut cycle = 0;
    loop {
        let billing_date = terms.billing_date(cycle);

        if same_month(billing_date, day) && day.day() >= billing_date.day() && billing_date <= end
        {
            return true;
        }
        if billing_date > day || billing_date > end {
            return false;
        }

        cycle += 1;
    }
}

/// Months covered by the cycle that was invoiced on or before `target`: the
/// full frequency, or the remainder for a truncated final cycle. `target` must
/// not precede the cycle's billing date in its month.
pub fn remaining_months_in_period(terms: &BillingTerms, target: NaiveDate) -> i32 {
    let remainder = terms.months % terms.frequency;

    if remainder != 0 {
        let elapsed = months_between(terms.start, target);
        if terms.months - elapsed < terms.frequency {
            return remainder;
        }
    }

    terms.frequency
}

/// Days of `target`'s month covered by the SKU. Leading days are removed in
/// the start month, otherwise trailing days in the end month.
pub fn billable_days_in_month(terms: &BillingTerms, target: NaiveDate) -> u32 {
    let total = month_length(target);
    let end = terms.end_date();

    if same_month(terms.start, target) {
        total - (terms.start.day() - 1)
    } else if same_month(end, target) {
        end.day()
    } else {
        total
    }
}

/// Charge for one invoice month before multiplying by the months billed.
pub fn adjusted_charge(
    terms: &BillingTerms,
    monthly_sales_price: Decimal,
    invoice_month: NaiveDate,
) -> Decimal {
    if !terms.is_monthly() {
        return monthly_sales_price;
    }

    let total = Decimal::from(month_length(invoice_month));
    let billable = Decimal::from(billable_days_in_month(terms, invoice_month));

    monthly_sales_price * billable / total
}

/// Cost of a single usage hour on `day`.
pub fn hourly_cost(
    terms: &BillingTerms,
    quantity: i64,
    monthly_price: Decimal,
    day: NaiveDate,
) -> Decimal {
    let hours = Decimal::from(HOURS_PER_DAY);
    let quantity = Decimal::from(quantity);

    if terms.is_monthly() {
        let total = Decimal::from(month_length(day));
        return monthly_price * quantity / total / hours;
    }

    let billable = billable_days_in_month(terms, day);
    if billable == 0 {
        return Decimal::ZERO;
    }

    let months = Decimal::from(remaining_months_in_period(terms, day));
    monthly_price * months * quantity / Decimal::from(billable) / hours
}

/// Fraction of the price kept after a percentage discount.
pub fn discount_proportion(discount: Decimal) -> Decimal {
    Decimal::ONE - discount / Decimal::ONE_HUNDRED
}
