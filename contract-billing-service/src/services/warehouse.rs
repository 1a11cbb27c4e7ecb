//! Warehouse load boundary and its Postgres implementation.
//!
//! Rows are never streamed straight into the warehouse. Each partition is
//! staged as a gzip NDJSON object first and the load job reads it back.

use crate::models::BillingRow;
use crate::services::metrics::WAREHOUSE_LOAD_DURATION;
use crate::services::object_store::{decode_ndjson_gzip, ObjectStore};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

const INSERT_CHUNK_SIZE: usize = 1000;

/// Destination table, `dataset.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Partition decorator form, `table$YYYYMMDD`.
    pub fn decorated(&self, partition: NaiveDate) -> String {
        format!("{}${}", self.table, partition.format("%Y%m%d"))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// Load that replaces its target: the partition when one is set, otherwise
/// the whole table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    pub job_id: String,
    pub destination: TableRef,
    /// Set only when loading into a single existing partition.
    pub partition: Option<NaiveDate>,
    pub partition_field: String,
    pub clustering: Vec<String>,
    pub require_partition_filter: bool,
    /// Staged gzip NDJSON object holding the rows.
    pub source_object: String,
}

impl LoadJob {
    /// Human-readable target, including the partition decorator if any.
    pub fn target(&self) -> String {
        match self.partition {
            Some(partition) => format!(
                "{}.{}",
                self.destination.dataset,
                self.destination.decorated(partition)
            ),
            None => self.destination.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_loaded: usize,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn table_exists(&self, table: &TableRef) -> Result<bool, AppError>;

    /// Run a load job reading the rows from `job.source_object`.
    async fn load(&self, job: &LoadJob) -> Result<LoadStats, AppError>;
}

/// Warehouse emulated with Postgres: dataset maps to a schema and the partition
/// field is a `TIMESTAMPTZ` column covering one UTC day per partition.
pub struct PgWarehouse {
    pool: PgPool,
    objects: Arc<dyn ObjectStore>,
}

fn warehouse_error(context: &str, e: impl fmt::Display) -> AppError {
    AppError::WarehouseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Only plain identifiers are accepted because names are spliced into DDL.
fn identifier(name: &str) -> Result<&str, AppError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid warehouse identifier: {:?}",
            name
        )));
    }
    Ok(name)
}

impl PgWarehouse {
    pub fn new(pool: PgPool, objects: Arc<dyn ObjectStore>) -> Self {
        Self { pool, objects }
    }

    fn qualified(table: &TableRef) -> Result<String, AppError> {
        Ok(format!(
            "\"{}\".\"{}\"",
            identifier(&table.dataset)?,
            identifier(&table.table)?
        ))
    }

    fn create_table_sql(job: &LoadJob) -> Result<Vec<String>, AppError> {
        let table = Self::qualified(&job.destination)?;
        let schema = identifier(&job.destination.dataset)?;
        let partition_field = identifier(&job.partition_field)?;

        let mut statements = vec![
            format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", schema),
            format!(
                r#"CREATE TABLE IF NOT EXISTS {} (
                    customer TEXT NOT NULL,
                    billing_account_id TEXT NOT NULL,
                    project_id TEXT,
                    cost NUMERIC NOT NULL,
                    currency TEXT NOT NULL,
                    currency_conversion_rate DOUBLE PRECISION NOT NULL,
                    cost_type TEXT NOT NULL,
                    sku_id TEXT,
                    sku_description TEXT,
                    service_id TEXT,
                    service_description TEXT,
                    cloud_provider TEXT NOT NULL,
                    usage JSONB NOT NULL,
                    invoice JSONB NOT NULL,
                    usage_date_time TIMESTAMP NOT NULL,
                    usage_start_time TIMESTAMPTZ NOT NULL,
                    usage_end_time TIMESTAMPTZ NOT NULL,
                    export_time TIMESTAMPTZ NOT NULL,
                    report JSONB NOT NULL,
                    system_labels JSONB NOT NULL
                )"#,
                table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS \"{}_{}_idx\" ON {} (\"{}\")",
                job.destination.table, partition_field, table, partition_field
            ),
        ];

        if !job.clustering.is_empty() {
            let columns = job
                .clustering
                .iter()
                .map(|c| identifier(c).map(|c| format!("\"{}\"", c)))
                .collect::<Result<Vec<_>, _>>()?;
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS \"{}_cluster_idx\" ON {} ({})",
                job.destination.table,
                table,
                columns.join(", ")
            ));
        }

        Ok(statements)
    }

    fn insert_rows<'a>(table: &str, rows: &'a [BillingRow]) -> QueryBuilder<'a, Postgres> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (customer, billing_account_id, project_id, cost, currency, \
             currency_conversion_rate, cost_type, sku_id, sku_description, service_id, \
             service_description, cloud_provider, usage, invoice, usage_date_time, \
             usage_start_time, usage_end_time, export_time, report, system_labels) ",
            table
        ));

        builder.push_values(rows, |mut b, row| {
            b.push_bind(&row.customer)
                .push_bind(&row.billing_account_id)
                .push_bind(&row.project_id)
                .push_bind(row.cost)
                .push_bind(&row.currency)
                .push_bind(row.currency_conversion_rate)
                .push_bind(&row.cost_type)
                .push_bind(&row.sku_id)
                .push_bind(&row.sku_description)
                .push_bind(&row.service_id)
                .push_bind(&row.service_description)
                .push_bind(&row.cloud_provider)
                .push_bind(Json(&row.usage))
                .push_bind(Json(&row.invoice))
                .push_bind(row.usage_date_time)
                .push_bind(row.usage_start_time)
                .push_bind(row.usage_end_time)
                .push_bind(row.export_time)
                .push_bind(Json(&row.report))
                .push_bind(Json(&row.system_labels));
        });

        builder
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    #[instrument(skip(self), fields(table = %table))]
    async fn table_exists(&self, table: &TableRef) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
            "#,
        )
        .bind(&table.dataset)
        .bind(&table.table)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| warehouse_error("Failed to check table", e))?;

        Ok(exists)
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, target = %job.target()))]
    async fn load(&self, job: &LoadJob) -> Result<LoadStats, AppError> {
        let timer = WAREHOUSE_LOAD_DURATION
            .with_label_values(&[job.destination.table.as_str()])
            .start_timer();

        let data = self.objects.download(&job.source_object).await?;
        let rows: Vec<BillingRow> = decode_ndjson_gzip(&data)?;
        let table = Self::qualified(&job.destination)?;
        let partition_field = identifier(&job.partition_field)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| warehouse_error("Failed to start load", e))?;

        for statement in Self::create_table_sql(job)? {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| warehouse_error("Failed to prepare table", e))?;
        }

        match job.partition {
            Some(partition) => {
                let next = partition
                    .checked_add_days(Days::new(1))
                    .unwrap_or(partition);
                sqlx::query(&format!(
                    "DELETE FROM {} WHERE \"{}\" >= $1 AND \"{}\" < $2",
                    table, partition_field, partition_field
                ))
                .bind(partition.and_hms_opt(0, 0, 0).map(|t| t.and_utc()))
                .bind(next.and_hms_opt(0, 0, 0).map(|t| t.and_utc()))
                .execute(&mut *tx)
                .await
                .map_err(|e| warehouse_error("Failed to truncate partition", e))?;
            }
            None => {
                sqlx::query(&format!("DELETE FROM {}", table))
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| warehouse_error("Failed to truncate table", e))?;
            }
        }

        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            Self::insert_rows(&table, chunk)
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| warehouse_error("Failed to insert rows", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| warehouse_error("Failed to commit load", e))?;

        timer.observe_duration();
        info!(rows = rows.len(), "Load job completed");

        Ok(LoadStats {
            rows_loaded: rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(partition: Option<NaiveDate>, clustering: Vec<&str>) -> LoadJob {
        LoadJob {
            job_id: "looker_1".to_string(),
            destination: TableRef::new("custom_billing", "looker"),
            partition,
            partition_field: "export_time".to_string(),
            clustering: clustering.into_iter().map(String::from).collect(),
            require_partition_filter: true,
            source_object: "looker/obj.json.gz".to_string(),
        }
    }

    #[test]
    fn test_partition_decorator() {
        let day = NaiveDate::from_ymd_opt(2023, 6, 5).unwrap();
        assert_eq!(
            TableRef::new("custom_billing", "looker").decorated(day),
            "looker$20230605"
        );
        assert_eq!(job(Some(day), vec![]).target(), "custom_billing.looker$20230605");
        assert_eq!(job(None, vec![]).target(), "custom_billing.looker");
    }

    #[test]
    fn test_identifier_validation() {
        assert!(identifier("custom_billing").is_ok());
        assert!(identifier("looker2").is_ok());
        assert!(identifier("").is_err());
        assert!(identifier("1table").is_err());
        assert!(identifier("looker\"; DROP TABLE x; --").is_err());
        assert!(identifier("a.b").is_err());
    }

    #[test]
    fn test_create_table_sql_includes_clustering_index() {
        let statements =
            PgWarehouse::create_table_sql(&job(None, vec!["customer", "cloud_provider"])).unwrap();
        assert_eq!(statements.len(), 4);
        assert!(statements[3].contains("(\"customer\", \"cloud_provider\")"));
    }

    #[test]
    fn test_create_table_sql_rejects_bad_clustering_column() {
        assert!(PgWarehouse::create_table_sql(&job(None, vec!["customer;"])).is_err());
    }
}
