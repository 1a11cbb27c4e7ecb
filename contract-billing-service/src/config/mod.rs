use serde::Deserialize;
use service_core::config::{self as core_config, get_env};
use service_core::error::AppError;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct ContractBillingConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub warehouse: WarehouseConfig,
    pub billing: BillingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Destination of the custom billing table and where load files are staged.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    pub url: String,
    pub dataset: String,
    pub table: String,
    pub partition_field: String,
    pub clustering: Vec<String>,
    pub require_partition_filter: bool,
    pub staging_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingSettings {
    pub product_type: String,
    /// IANA zone in which usage days are billed.
    pub timezone: String,
    pub history_months: usize,
    pub load_max_retries: u32,
}

impl ContractBillingConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;
        let is_prod = common.is_production();

        let database_url = get_env("DATABASE_URL", None, is_prod)?;

        let config = ContractBillingConfig {
            service_name: get_env("SERVICE_NAME", Some("contract-billing-service"), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                max_connections: parse("DATABASE_MAX_CONNECTIONS", Some("10"), false)?,
                min_connections: parse("DATABASE_MIN_CONNECTIONS", Some("1"), false)?,
                url: database_url.clone(),
            },
            warehouse: WarehouseConfig {
                url: get_env("WAREHOUSE_URL", Some(database_url.as_str()), false)?,
                dataset: get_env("WAREHOUSE_DATASET", Some("custom_billing"), false)?,
                table: get_env("WAREHOUSE_TABLE", Some("looker"), false)?,
                partition_field: get_env("WAREHOUSE_PARTITION_FIELD", Some("export_time"), false)?,
                clustering: get_env(
                    "WAREHOUSE_CLUSTERING",
                    Some("customer,cloud_provider"),
                    false,
                )?
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
                require_partition_filter: parse("WAREHOUSE_REQUIRE_PARTITION_FILTER", Some("true"), false)?,
                staging_path: get_env("STAGING_PATH", Some("bq-load-jobs"), is_prod)?,
            },
            billing: BillingSettings {
                product_type: get_env("BILLING_PRODUCT_TYPE", Some("looker"), false)?,
                timezone: get_env("BILLING_TIMEZONE", Some("America/Los_Angeles"), false)?,
                history_months: parse("BILLING_HISTORY_MONTHS", Some("12"), false)?,
                load_max_retries: parse("BILLING_LOAD_MAX_RETRIES", Some("3"), false)?,
            },
            common,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.billing.history_months < 2 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BILLING_HISTORY_MONTHS must be at least 2, got {}",
                self.billing.history_months
            )));
        }
        if self.billing.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BILLING_TIMEZONE is not a known timezone: {}",
                self.billing.timezone
            )));
        }
        Ok(())
    }
}

fn parse<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = get_env(key, default, is_prod)?;
    value
        .trim()
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}
