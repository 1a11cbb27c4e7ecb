//! Application startup and lifecycle management.

use crate::billing::ProductProfile;
use crate::config::ContractBillingConfig;
use crate::handlers::{
    health_check, invoice_rows, metrics_handler, readiness_check, time_params,
    update_billing_table,
};
use crate::services::{
    init_metrics, BillingOptions, ContractBillingService, Database, LoadSettings,
    LocalObjectStore, PgWarehouse, SystemClock, TableRef,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use service_core::retry::RetryConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub billing: Arc<ContractBillingService>,
}

/// HTTP routes of the service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/tasks/contracts/billing-table", post(update_billing_table))
        .route(
            "/tasks/contracts/invoice-rows/:customer_id",
            get(invoice_rows),
        )
        .route("/tasks/contracts/time-params", get(time_params))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Billing options derived from configuration.
pub fn billing_options(config: &ContractBillingConfig) -> BillingOptions {
    BillingOptions {
        profile: ProductProfile::for_product(&config.billing.product_type),
        timezone: config.billing.timezone.clone(),
        history_months: config.billing.history_months,
        load: LoadSettings {
            table: TableRef::new(&config.warehouse.dataset, &config.warehouse.table),
            partition_field: config.warehouse.partition_field.clone(),
            clustering: config.warehouse.clustering.clone(),
            require_partition_filter: config.warehouse.require_partition_filter,
            retry: RetryConfig::with_max_retries(config.billing.load_max_retries),
        },
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ContractBillingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: ContractBillingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: ContractBillingConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let warehouse_pool = if config.warehouse.url == config.database.url {
            db.pool().clone()
        } else {
            Database::new(
                &config.warehouse.url,
                config.database.max_connections,
                config.database.min_connections,
            )
            .await?
            .pool()
            .clone()
        };

        let objects = Arc::new(LocalObjectStore::new(&config.warehouse.staging_path).await?);
        let warehouse = Arc::new(PgWarehouse::new(warehouse_pool, objects.clone()));

        let billing = ContractBillingService::new(
            Arc::new(db),
            warehouse,
            objects,
            Arc::new(SystemClock),
            billing_options(&config),
        )?;

        let state = AppState {
            billing: Arc::new(billing),
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Contract billing service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = "contract-billing-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router(self.state)).await
    }
}
