//! Billing rules: SKU eligibility and proration, row materialization and
//! request interval resolution.

pub mod eligibility;
pub mod interval;
pub mod materializer;

pub use eligibility::{
    adjusted_charge, billable_days_in_month, cycle_billing_date, discount_proportion,
    hourly_cost, is_billable, is_day_billable, is_month_billable, remaining_months_in_period,
    BillingPeriod, BillingTerms, HOURS_PER_DAY, MONTHLY_INVOICING_FREQUENCY,
};
pub use interval::resolve_interval;
pub use materializer::{extract_invoice_rows, ProductProfile, RowMaterializer};
