//! Monthly invoice row model.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Range over which a multi-month charge is recognized. `end_date` is
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredRevenuePeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// One invoice line for a billable contract SKU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRow {
    pub contract_id: String,
    pub description: String,
    pub details: String,
    pub sku: String,
    pub quantity: i64,
    /// Price per unit for the whole billed period.
    pub ppu: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub rank: i32,
    #[serde(rename = "type")]
    pub product_type: String,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub entity_id: Option<String>,
    pub deferred_revenue_period: Option<DeferredRevenuePeriod>,
}

/// Invoice rows for one product, plus per-contract errors that did not abort
/// the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInvoiceRows {
    #[serde(rename = "type")]
    pub product_type: String,
    pub rows: Vec<InvoiceRow>,
    pub errors: Vec<String>,
}
