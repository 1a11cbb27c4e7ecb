//! Test helpers for contract-billing-service integration tests.
//!
//! In-memory doubles for the contract store and the warehouse, plus contract
//! fixtures. The warehouse double reads staged files from the same object
//! store the service writes to.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use contract_billing_service::billing::ProductProfile;
use contract_billing_service::models::{BillingRow, Contract};
use contract_billing_service::services::{
    decode_ndjson_gzip, init_metrics, BillingOptions, ContractBillingService, ContractStore,
    FixedClock, LoadJob, LoadSettings, LoadStats, LocalObjectStore, ObjectStore, TableRef,
    Warehouse,
};
use contract_billing_service::startup::{router, AppState};
use rust_decimal::Decimal;
use serde_json::json;
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const CUSTOMER_ID: &str = "customer1";
pub const ASSET_ID: &str = "assets/google-cloud-000000-000000-000000";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at_noon(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
}

/// Contract with a single SKU priced 100 sales / 2000 list.
pub fn looker_contract(id: &str, frequency: i32, months: i32, start: NaiveDate) -> Contract {
    let start = at_midnight(start);
    Contract {
        contract_id: id.to_string(),
        customer_id: CUSTOMER_ID.to_string(),
        product_type: "looker".to_string(),
        entity_id: Some("entities/0000".to_string()),
        assets: vec![ASSET_ID.to_string()],
        discount: Decimal::ZERO,
        active: true,
        start_date: Some(start),
        end_date: None,
        properties: json!({
            "contractDuration": months,
            "invoiceFrequency": frequency,
            "salesProcess": "Existing Renewal",
            "skus": [{
                "monthlySalesPrice": 100,
                "months": months,
                "quantity": 1,
                "skuName": {
                    "googleSku": "14EB-3C03-C96B",
                    "label": "Add-On Instance - Customer Hosted",
                    "monthlyListPrice": 2000
                },
                "startDate": start
            }]
        }),
        created_utc: start,
        updated_utc: start,
    }
}

pub fn legacy_contract(id: &str) -> Contract {
    let mut contract = looker_contract(id, 1, 12, date(2023, 1, 1));
    contract.properties = json!({ "invoiceFrequency": 1, "contractDuration": 12 });
    contract
}

fn at_midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap())
}

#[derive(Default)]
pub struct InMemoryContractStore {
    pub contracts: Mutex<Vec<Contract>>,
    pub unhealthy: Mutex<bool>,
}

impl InMemoryContractStore {
    pub fn with(contracts: Vec<Contract>) -> Self {
        Self {
            contracts: Mutex::new(contracts),
            unhealthy: Mutex::new(false),
        }
    }
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn active_contracts_for_product(
        &self,
        product_type: &str,
    ) -> Result<Vec<Contract>, AppError> {
        Ok(self
            .contracts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.active && c.product_type == product_type)
            .cloned()
            .collect())
    }

    async fn active_customer_contracts_for_month(
        &self,
        customer_id: &str,
        _month_start: NaiveDate,
        product_type: &str,
    ) -> Result<Vec<Contract>, AppError> {
        Ok(self
            .contracts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.active && c.product_type == product_type && c.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        if *self.unhealthy.lock().unwrap() {
            return Err(AppError::ServiceUnavailable);
        }
        Ok(())
    }
}

/// Partitioned table kept in memory, keyed by partition date.
pub struct InMemoryWarehouse {
    objects: Arc<dyn ObjectStore>,
    pub table_exists: Mutex<bool>,
    pub partitions: Mutex<BTreeMap<NaiveDate, Vec<BillingRow>>>,
    pub jobs: Mutex<Vec<LoadJob>>,
    /// Errors returned by the next load calls, in order.
    pub failures: Mutex<VecDeque<AppError>>,
}

impl InMemoryWarehouse {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            objects,
            table_exists: Mutex::new(false),
            partitions: Mutex::new(BTreeMap::new()),
            jobs: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn fail_next(&self, error: AppError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn row_count(&self) -> usize {
        self.partitions.lock().unwrap().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn table_exists(&self, _table: &TableRef) -> Result<bool, AppError> {
        Ok(*self.table_exists.lock().unwrap())
    }

    async fn load(&self, job: &LoadJob) -> Result<LoadStats, AppError> {
        self.jobs.lock().unwrap().push(job.clone());
        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let data = self.objects.download(&job.source_object).await?;
        let rows: Vec<BillingRow> = decode_ndjson_gzip(&data)?;
        let rows_loaded = rows.len();

        let mut partitions = self.partitions.lock().unwrap();
        match job.partition {
            Some(partition) => {
                partitions.remove(&partition);
            }
            None => partitions.clear(),
        }
        for row in rows {
            partitions
                .entry(row.export_time.date_naive())
                .or_default()
                .push(row);
        }
        *self.table_exists.lock().unwrap() = true;

        Ok(LoadStats { rows_loaded })
    }
}

pub struct TestApp {
    pub store: Arc<InMemoryContractStore>,
    pub warehouse: Arc<InMemoryWarehouse>,
    pub objects: Arc<LocalObjectStore>,
    pub service: Arc<ContractBillingService>,
    pub staging: TempDir,
}

impl TestApp {
    pub async fn new(contracts: Vec<Contract>, now: DateTime<Utc>) -> Self {
        init_metrics();

        let staging = tempfile::tempdir().expect("Failed to create staging dir");
        let objects = Arc::new(
            LocalObjectStore::new(staging.path())
                .await
                .expect("Failed to create object store"),
        );
        let store = Arc::new(InMemoryContractStore::with(contracts));
        let warehouse = Arc::new(InMemoryWarehouse::new(objects.clone()));

        let options = BillingOptions {
            profile: ProductProfile::looker(),
            timezone: "America/Los_Angeles".to_string(),
            history_months: 12,
            load: LoadSettings {
                table: TableRef::new("custom_billing", "looker"),
                partition_field: "export_time".to_string(),
                clustering: vec!["customer".to_string(), "cloud_provider".to_string()],
                require_partition_filter: true,
                retry: RetryConfig::fixed(2, Duration::from_millis(1)),
            },
        };

        let service = ContractBillingService::new(
            store.clone(),
            warehouse.clone(),
            objects.clone(),
            Arc::new(FixedClock(now)),
            options,
        )
        .expect("Failed to build billing service");

        Self {
            store,
            warehouse,
            objects,
            service: Arc::new(service),
            staging,
        }
    }

    pub fn router(&self) -> axum::Router {
        router(AppState {
            billing: self.service.clone(),
        })
    }

    /// Files left in the staging directory.
    pub fn staged_files(&self) -> usize {
        fn count(path: &std::path::Path) -> usize {
            std::fs::read_dir(path)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .map(|e| {
                            let p = e.path();
                            if p.is_dir() { count(&p) } else { 1 }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        count(self.staging.path())
    }
}
