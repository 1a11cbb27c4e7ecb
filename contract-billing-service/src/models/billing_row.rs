//! Warehouse billing row model.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One materialized warehouse record: an hourly usage slice of a contract
/// charge. Produced fresh on every run and never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRow {
    pub customer: String,
    pub billing_account_id: String,
    pub project_id: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    pub currency: String,
    pub currency_conversion_rate: f64,
    pub cost_type: String,
    pub sku_id: Option<String>,
    pub sku_description: Option<String>,
    pub service_id: Option<String>,
    pub service_description: Option<String>,
    pub cloud_provider: String,
    pub usage: Usage,
    pub invoice: Invoice,
    /// Wall-clock hour in the reference timezone.
    pub usage_date_time: NaiveDateTime,
    pub usage_start_time: DateTime<Utc>,
    pub usage_end_time: DateTime<Utc>,
    /// Partition column: the usage day at UTC midnight.
    pub export_time: DateTime<Utc>,
    pub report: Vec<Report>,
    pub system_labels: Vec<Label>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub amount: f64,
    pub amount_in_pricing_units: f64,
    pub unit: Option<String>,
    pub pricing_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// `YYYYMM`
    pub month: String,
}

/// Reporting sub-row carrying the discounted cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    pub usage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}
