pub mod health;
pub mod tasks;

pub use health::{health_check, metrics_handler, readiness_check};
pub use tasks::{invoice_rows, time_params, update_billing_table};
