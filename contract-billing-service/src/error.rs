//! Domain errors for contract billing.

use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Invalid contract properties: {0}")]
    InvalidProperties(String),

    #[error("Invalid SKU terms: {0}")]
    InvalidSku(String),

    #[error("Contract {0} is not attached to any assets")]
    MissingBillingAccount(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Unknown timezone: {0}")]
    Timezone(String),

    #[error("Invalid month key: {0}")]
    InvalidMonthKey(String),
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidProperties(_)
            | BillingError::InvalidSku(_)
            | BillingError::MissingBillingAccount(_)
            | BillingError::InvalidDate(_)
            | BillingError::InvalidInterval(_) => AppError::BadRequest(anyhow::Error::new(err)),
            BillingError::Timezone(_) | BillingError::InvalidMonthKey(_) => {
                AppError::InternalError(anyhow::Error::new(err))
            }
        }
    }
}
