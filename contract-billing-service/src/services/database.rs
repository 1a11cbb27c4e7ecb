//! Database service for contract-billing-service.

use crate::calendar::add_months;
use crate::models::Contract;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::ContractStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

const CONTRACT_COLUMNS: &str = "contract_id, customer_id, product_type, entity_id, assets, \
     discount, active, start_date, end_date, properties, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "contract-billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl ContractStore for Database {
    #[instrument(skip(self))]
    async fn active_contracts_for_product(
        &self,
        product_type: &str,
    ) -> Result<Vec<Contract>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_contracts_for_product"])
            .start_timer();

        let query = format!(
            "SELECT {} FROM contracts WHERE product_type = $1 AND active = TRUE ORDER BY contract_id",
            CONTRACT_COLUMNS
        );
        let contracts = sqlx::query_as::<_, Contract>(&query)
            .bind(product_type)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to list contracts: {}", e))
            })?;

        timer.observe_duration();
        info!(count = contracts.len(), "Active contracts loaded");

        Ok(contracts)
    }

    #[instrument(skip(self))]
    async fn active_customer_contracts_for_month(
        &self,
        customer_id: &str,
        month_start: NaiveDate,
        product_type: &str,
    ) -> Result<Vec<Contract>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_customer_contracts_for_month"])
            .start_timer();

        let month_end = add_months(month_start, 1);
        let query = format!(
            r#"
            SELECT {} FROM contracts
            WHERE customer_id = $1
              AND product_type = $2
              AND active = TRUE
              AND (start_date IS NULL OR start_date < $4::date)
              AND (end_date IS NULL OR end_date >= $3::date)
            ORDER BY contract_id
            "#,
            CONTRACT_COLUMNS
        );
        let contracts = sqlx::query_as::<_, Contract>(&query)
            .bind(customer_id)
            .bind(product_type)
            .bind(month_start)
            .bind(month_end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to list customer contracts: {}",
                    e
                ))
            })?;

        timer.observe_duration();

        Ok(contracts)
    }

    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }
}
