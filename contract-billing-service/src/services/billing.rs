//! Contract billing orchestration: billing table loads and invoice rows.

use crate::billing::{resolve_interval, ProductProfile, RowMaterializer};
use crate::calendar::{first_of_month, TimeParams};
use crate::models::{BillingRow, ProductInvoiceRows, UpdateTableInterval};
use crate::services::clock::Clock;
use crate::services::metrics::{
    record_error, record_invoice_rows, record_rows_loaded, record_table_run,
};
use crate::services::object_store::{encode_ndjson_gzip, ObjectStore};
use crate::services::store::ContractStore;
use crate::services::warehouse::{LoadJob, TableRef, Warehouse};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// How partitions are written to the billing table.
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub table: TableRef,
    pub partition_field: String,
    pub clustering: Vec<String>,
    pub require_partition_filter: bool,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct BillingOptions {
    pub profile: ProductProfile,
    pub timezone: String,
    pub history_months: usize,
    pub load: LoadSettings,
}

/// Outcome of a billing table run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub days: usize,
    pub partitions: usize,
    pub rows: usize,
}

pub struct ContractBillingService {
    store: Arc<dyn ContractStore>,
    warehouse: Arc<dyn Warehouse>,
    objects: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    materializer: RowMaterializer,
    history_months: usize,
    load: LoadSettings,
}

impl ContractBillingService {
    pub fn new(
        store: Arc<dyn ContractStore>,
        warehouse: Arc<dyn Warehouse>,
        objects: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        options: BillingOptions,
    ) -> Result<Self, AppError> {
        let materializer = RowMaterializer::new(options.profile, &options.timezone)?;

        Ok(Self {
            store,
            warehouse,
            objects,
            clock,
            materializer,
            history_months: options.history_months,
            load: options.load,
        })
    }

    pub fn product_type(&self) -> &str {
        &self.materializer.profile().product_type
    }

    /// Rebuild the billing table partitions for the requested days.
    #[instrument(skip(self, request), fields(product_type = %self.product_type()))]
    pub async fn load_contracts_to_warehouse(
        &self,
        request: &UpdateTableInterval,
    ) -> Result<LoadSummary, AppError> {
        let product_type = self.product_type().to_string();

        let result = self.run_table_load(request).await;
        match &result {
            Ok(summary) => {
                record_table_run(&product_type, "success");
                record_rows_loaded(&product_type, summary.rows);
                info!(
                    days = summary.days,
                    partitions = summary.partitions,
                    rows = summary.rows,
                    "Billing table updated"
                );
            }
            Err(e) => {
                record_table_run(&product_type, "failed");
                record_error("table_load", "load_contracts_to_warehouse");
                error!(error = %e, "Billing table update failed");
            }
        }

        result
    }

    async fn run_table_load(&self, request: &UpdateTableInterval) -> Result<LoadSummary, AppError> {
        let now = self.clock.now();
        let days = resolve_interval(request, now.date_naive())?;

        let contracts = self
            .store
            .active_contracts_for_product(self.product_type())
            .await?;

        let partitions = self.materializer.create_hourly_rows(&contracts, &days)?;

        let mut summary = LoadSummary {
            days: days.len(),
            partitions: 0,
            rows: 0,
        };
        let mut table_exists = false;

        // BTreeMap iteration keeps partitions in ascending date order
        for (partition, rows) in &partitions {
            if !table_exists {
                table_exists = self.warehouse.table_exists(&self.load.table).await?;
            }

            if let Err(e) = self
                .load_partition(*partition, rows, table_exists, now)
                .await
            {
                error!(
                    partition = %partition.format("%Y%m%d"),
                    table = %self.load.table,
                    error = %e,
                    "Failed to load partition"
                );
                return Err(e);
            }

            table_exists = true;
            summary.partitions += 1;
            summary.rows += rows.len();
        }

        Ok(summary)
    }

    async fn load_partition(
        &self,
        partition: NaiveDate,
        rows: &[BillingRow],
        table_exists: bool,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let object_key = format!(
            "{}/{}/{}.json.gz",
            self.load.table.table,
            partition.format("%Y%m%d"),
            now.format("%Y%m%dT%H%M%S%.9fZ")
        );
        self.objects
            .upload(&object_key, encode_ndjson_gzip(rows)?)
            .await?;

        let job = LoadJob {
            job_id: format!("{}_{}", self.load.table.table, Uuid::new_v4().simple()),
            destination: self.load.table.clone(),
            partition: (self.load.require_partition_filter && table_exists).then_some(partition),
            partition_field: self.load.partition_field.clone(),
            clustering: self.load.clustering.clone(),
            require_partition_filter: self.load.require_partition_filter,
            source_object: object_key.clone(),
        };

        let result = retry_with_backoff(&self.load.retry, "warehouse_load", || {
            self.warehouse.load(&job)
        })
        .await;

        // Staged files are keyed by run time and never reused.
        if let Err(e) = self.objects.delete(&object_key).await {
            warn!(object = %object_key, error = %e, "Failed to delete staged load file");
        }

        let stats = result?;
        info!(
            job_id = %job.job_id,
            target = %job.target(),
            rows = stats.rows_loaded,
            "Partition loaded"
        );

        Ok(())
    }

    /// Invoice rows for a customer's contracts in the month of `invoice_month`.
    #[instrument(skip(self), fields(product_type = %self.product_type()))]
    pub async fn invoice_rows(
        &self,
        customer_id: &str,
        invoice_month: NaiveDate,
    ) -> Result<ProductInvoiceRows, AppError> {
        let contracts = self
            .store
            .active_customer_contracts_for_month(
                customer_id,
                first_of_month(invoice_month),
                self.product_type(),
            )
            .await?;

        let rows = self
            .materializer
            .create_invoice_rows(&contracts, invoice_month);

        record_invoice_rows(self.product_type(), rows.rows.len());
        if !rows.errors.is_empty() {
            warn!(
                customer_id = customer_id,
                errors = rows.errors.len(),
                "Some contracts could not be invoiced"
            );
        }

        Ok(rows)
    }

    pub fn time_params(&self) -> TimeParams {
        TimeParams::new(self.clock.now(), self.history_months)
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.store.health_check().await
    }
}
