//! Task endpoints triggered by the scheduler.

use crate::calendar::TimeParams;
use crate::models::{ProductInvoiceRows, UpdateTableInterval};
use crate::services::LoadSummary;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct InvoiceRowsParams {
    /// `YYYY-MM`
    #[validate(length(equal = 7, message = "month must be formatted as YYYY-MM"))]
    pub month: String,
}

impl InvoiceRowsParams {
    fn invoice_month(&self) -> Result<NaiveDate, AppError> {
        NaiveDate::parse_from_str(&format!("{}-01", self.month), "%Y-%m-%d").map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Invalid month {}: {}", self.month, e))
        })
    }
}

pub async fn update_billing_table(
    State(state): State<AppState>,
    Json(request): Json<UpdateTableInterval>,
) -> Result<Json<LoadSummary>, AppError> {
    tracing::info!(
        start_date = ?request.start_date,
        end_date = ?request.end_date,
        "Billing table update requested"
    );

    let summary = state.billing.load_contracts_to_warehouse(&request).await?;
    Ok(Json(summary))
}

pub async fn invoice_rows(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Query(params): Query<InvoiceRowsParams>,
) -> Result<Json<ProductInvoiceRows>, AppError> {
    params.validate()?;
    let invoice_month = params.invoice_month()?;

    let rows = state.billing.invoice_rows(&customer_id, invoice_month).await?;
    Ok(Json(rows))
}

pub async fn time_params(State(state): State<AppState>) -> Json<TimeParams> {
    Json(state.billing.time_params())
}
