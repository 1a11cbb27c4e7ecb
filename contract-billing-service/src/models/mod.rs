//! Domain models for contract-billing-service.

mod billing_row;
mod contract;
mod interval;
mod invoice_row;

pub use billing_row::{BillingRow, Invoice, Label, Report, Usage};
pub use contract::{Contract, ContractProperties, ContractSku, SkuName};
pub use interval::UpdateTableInterval;
pub use invoice_row::{DeferredRevenuePeriod, InvoiceRow, ProductInvoiceRows};
