//! Services module for contract-billing-service.

pub mod billing;
pub mod clock;
pub mod database;
pub mod metrics;
pub mod object_store;
pub mod store;
pub mod warehouse;

pub use billing::{BillingOptions, ContractBillingService, LoadSettings, LoadSummary};
pub use clock::{Clock, FixedClock, SystemClock};
pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use object_store::{decode_ndjson_gzip, encode_ndjson_gzip, LocalObjectStore, ObjectStore};
pub use store::ContractStore;
pub use warehouse::{LoadJob, LoadStats, PgWarehouse, TableRef, Warehouse};
