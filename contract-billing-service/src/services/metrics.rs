//! Metrics module for contract-billing-service.
//! Provides Prometheus metrics for billing table loads and invoice row runs.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "contract_billing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Warehouse load duration histogram
pub static WAREHOUSE_LOAD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "contract_billing_warehouse_load_duration_seconds",
            "Warehouse partition load duration",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        ),
        &["table"]
    )
    .expect("Failed to register WAREHOUSE_LOAD_DURATION")
});

/// Billing table runs by product and outcome
pub static TABLE_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Rows written to the warehouse per product
pub static ROWS_LOADED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Contracts skipped during materialization
pub static CONTRACTS_SKIPPED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Invoice rows produced per product
pub static INVOICE_ROWS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    TABLE_RUNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "contract_billing_table_runs_total",
                "Total billing table runs by product and status"
            ),
            &["product_type", "status"]
        )
        .expect("Failed to register TABLE_RUNS_TOTAL")
    });

    ROWS_LOADED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "contract_billing_rows_loaded_total",
                "Total billing rows loaded into the warehouse by product"
            ),
            &["product_type"]
        )
        .expect("Failed to register ROWS_LOADED_TOTAL")
    });

    CONTRACTS_SKIPPED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "contract_billing_contracts_skipped_total",
                "Contracts skipped while building rows, by reason"
            ),
            &["product_type", "reason"]
        )
        .expect("Failed to register CONTRACTS_SKIPPED_TOTAL")
    });

    INVOICE_ROWS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "contract_billing_invoice_rows_total",
                "Total invoice rows produced by product"
            ),
            &["product_type"]
        )
        .expect("Failed to register INVOICE_ROWS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "contract_billing_errors_total",
                "Total errors by type for alerting"
            ),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
    let _ = &*WAREHOUSE_LOAD_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record a billing table run.
pub fn record_table_run(product_type: &str, status: &str) {
    if let Some(counter) = TABLE_RUNS_TOTAL.get() {
        counter.with_label_values(&[product_type, status]).inc();
    }
}

/// Record rows written to the warehouse.
pub fn record_rows_loaded(product_type: &str, rows: usize) {
    if let Some(counter) = ROWS_LOADED_TOTAL.get() {
        counter
            .with_label_values(&[product_type])
            .inc_by(rows as u64);
    }
}

/// Record contracts dropped before materialization.
pub fn record_contracts_skipped(product_type: &str, reason: &str, count: usize) {
    if count == 0 {
        return;
    }
    if let Some(counter) = CONTRACTS_SKIPPED_TOTAL.get() {
        counter
            .with_label_values(&[product_type, reason])
            .inc_by(count as u64);
    }
}

/// Record invoice rows produced.
pub fn record_invoice_rows(product_type: &str, rows: usize) {
    if let Some(counter) = INVOICE_ROWS_TOTAL.get() {
        counter
            .with_label_values(&[product_type])
            .inc_by(rows as u64);
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
