//! Contract document store boundary.

use crate::models::Contract;
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;

/// Read access to contracts. Implemented by [`super::Database`] and by test
/// doubles.
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Active contracts of a product across all customers.
    async fn active_contracts_for_product(
        &self,
        product_type: &str,
    ) -> Result<Vec<Contract>, AppError>;

    /// Active contracts of one customer and product that overlap the month
    /// starting at `month_start`.
    async fn active_customer_contracts_for_month(
        &self,
        customer_id: &str,
        month_start: NaiveDate,
        product_type: &str,
    ) -> Result<Vec<Contract>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}
