//! Turns active contracts into warehouse billing rows and invoice rows.

use super::eligibility::{
    adjusted_charge, cycle_billing_date, discount_proportion, hourly_cost, is_day_billable,
    is_month_billable, remaining_months_in_period, BillingTerms, HOURS_PER_DAY,
};
use crate::calendar::add_months;
use crate::error::BillingError;
use crate::models::{
    BillingRow, Contract, ContractProperties, ContractSku, DeferredRevenuePeriod, Invoice,
    InvoiceRow, Label, ProductInvoiceRows, Report, Usage,
};
use crate::services::metrics::record_contracts_skipped;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const SOURCE_LABEL_KEY: &str = "cmp/source";
const COST_TYPE_REGULAR: &str = "regular";
const INVOICE_ROW_RANK: i32 = 1;

pub const SKIP_LEGACY_FORMAT: &str = "legacy_format";
pub const SKIP_INVALID_PROPERTIES: &str = "invalid_properties";
pub const SKIP_MISSING_BILLING_ACCOUNT: &str = "missing_billing_account";

/// Fixed attributes stamped on every row of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductProfile {
    pub product_type: String,
    pub description: String,
    pub service_id: String,
    pub service_description: String,
    pub cloud_provider: String,
    pub currency: String,
}

impl ProductProfile {
    pub fn looker() -> Self {
        Self {
            product_type: "looker".to_string(),
            description: "Google Looker".to_string(),
            service_id: "looker".to_string(),
            service_description: "Looker".to_string(),
            cloud_provider: "google-cloud".to_string(),
            currency: "USD".to_string(),
        }
    }

    /// Profile for a configured product type. Only `looker` has its own
    /// descriptions; other products reuse them under their own type.
    pub fn for_product(product_type: &str) -> Self {
        Self {
            product_type: product_type.to_string(),
            ..Self::looker()
        }
    }
}

/// Contract whose properties decoded and which has a billing account.
struct BillableContract<'a> {
    contract: &'a Contract,
    properties: ContractProperties,
    billing_account_id: String,
}

pub struct RowMaterializer {
    profile: ProductProfile,
    timezone: Tz,
}

impl RowMaterializer {
    pub fn new(profile: ProductProfile, timezone: &str) -> Result<Self, BillingError> {
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| BillingError::Timezone(timezone.to_string()))?;

        Ok(Self { profile, timezone })
    }

    pub fn profile(&self) -> &ProductProfile {
        &self.profile
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Contracts that can be billed. Skipped contracts are counted per reason.
    fn billable_contracts<'a>(&self, contracts: &'a [Contract]) -> Vec<BillableContract<'a>> {
        let product_type = &self.profile.product_type;
        let mut billable = Vec::with_capacity(contracts.len());

        for contract in contracts {
            if contract.is_legacy_format() {
                record_contracts_skipped(product_type, SKIP_LEGACY_FORMAT, 1);
                continue;
            }

            let properties = match contract.decode_properties() {
                Ok(properties) => properties,
                Err(e) => {
                    warn!(
                        contract_id = %contract.contract_id,
                        error = %e,
                        "Invalid contract properties, skipping contract"
                    );
                    record_contracts_skipped(product_type, SKIP_INVALID_PROPERTIES, 1);
                    continue;
                }
            };

            let billing_account_id = match contract.billing_account_id() {
                Ok(id) => id,
                Err(e) => {
                    info!(
                        contract_id = %contract.contract_id,
                        error = %e,
                        "Contract is not attached to any assets, skipping contract"
                    );
                    record_contracts_skipped(product_type, SKIP_MISSING_BILLING_ACCOUNT, 1);
                    continue;
                }
            };

            billable.push(BillableContract {
                contract,
                properties,
                billing_account_id,
            });
        }

        billable
    }

    /// Hourly rows for every billable contract SKU on each of `days`, grouped
    /// by partition date.
    pub fn create_hourly_rows(
        &self,
        contracts: &[Contract],
        days: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, Vec<BillingRow>>, BillingError> {
        let mut partitions: BTreeMap<NaiveDate, Vec<BillingRow>> = BTreeMap::new();

        for billable in self.billable_contracts(contracts) {
            for day in days {
                for sku in &billable.properties.skus {
                    let terms = match BillingTerms::for_sku(sku, &billable.properties) {
                        Ok(terms) => terms,
                        Err(e) => {
                            warn!(
                                contract_id = %billable.contract.contract_id,
                                error = %e,
                                "Invalid SKU terms, skipping SKU"
                            );
                            continue;
                        }
                    };

                    if !is_day_billable(&terms, *day) {
                        continue;
                    }

                    for hour in 0..HOURS_PER_DAY {
                        let row = self.hourly_row(&billable, sku, &terms, *day, hour)?;
                        partitions
                            .entry(row.export_time.date_naive())
                            .or_default()
                            .push(row);
                    }
                }
            }
        }

        Ok(partitions)
    }

    fn hourly_row(
        &self,
        billable: &BillableContract<'_>,
        sku: &ContractSku,
        terms: &BillingTerms,
        day: NaiveDate,
        hour: u32,
    ) -> Result<BillingRow, BillingError> {
        let contract = billable.contract;
        let quantity = sku.quantity as f64;

        let cost = hourly_cost(terms, sku.quantity, sku.sku_name.monthly_list_price, day);
        let report_cost = hourly_cost(terms, sku.quantity, sku.monthly_sales_price, day)
            * discount_proportion(contract.discount);

        let local = day
            .and_hms_opt(hour, 0, 0)
            .ok_or_else(|| BillingError::InvalidDate(format!("{} hour {}", day, hour)))?;
        let start = self.local_to_utc(local)?;
        let export_time = local
            .date()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .ok_or_else(|| BillingError::InvalidDate(local.date().to_string()))?;

        let google_sku = &sku.sku_name.google_sku;

        Ok(BillingRow {
            customer: contract.customer_id.clone(),
            billing_account_id: billable.billing_account_id.clone(),
            project_id: None,
            cost,
            currency: self.profile.currency.clone(),
            currency_conversion_rate: 1.0,
            cost_type: COST_TYPE_REGULAR.to_string(),
            sku_id: (!google_sku.is_empty()).then(|| google_sku.clone()),
            sku_description: Some(sku.sku_name.label.clone()),
            service_id: Some(self.profile.service_id.clone()),
            service_description: Some(self.profile.service_description.clone()),
            cloud_provider: self.profile.cloud_provider.clone(),
            usage: Usage {
                amount: quantity,
                amount_in_pricing_units: quantity,
                unit: None,
                pricing_unit: None,
            },
            invoice: Invoice {
                month: local.format("%Y%m").to_string(),
            },
            usage_date_time: local,
            usage_start_time: start,
            usage_end_time: start + Duration::hours(1),
            export_time,
            report: vec![Report {
                cost: report_cost,
                usage: quantity,
            }],
            system_labels: vec![Label {
                key: SOURCE_LABEL_KEY.to_string(),
                value: self.profile.product_type.clone(),
            }],
        })
    }

    /// Wall-clock time in the reference zone to UTC. Hours skipped by a DST
    /// transition move forward one hour; repeated hours take the earlier instant.
    fn local_to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, BillingError> {
        match self.timezone.from_local_datetime(&local) {
            LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => self
                .timezone
                .from_local_datetime(&(local + Duration::hours(1)))
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(|| {
                    BillingError::InvalidDate(format!("{} does not exist in {}", local, self.timezone))
                }),
        }
    }

    /// Invoice rows for every billable contract SKU in `invoice_month`.
    pub fn create_invoice_rows(
        &self,
        contracts: &[Contract],
        invoice_month: NaiveDate,
    ) -> ProductInvoiceRows {
        let mut result = ProductInvoiceRows {
            product_type: self.profile.product_type.clone(),
            ..Default::default()
        };

        for contract in contracts.iter().filter(|c| !c.is_legacy_format()) {
            let properties = match contract.decode_properties() {
                Ok(properties) => properties,
                Err(e) => {
                    warn!(
                        contract_id = %contract.contract_id,
                        error = %e,
                        "Invalid contract properties, skipping contract"
                    );
                    result
                        .errors
                        .push(format!("contract {}: {}", contract.contract_id, e));
                    continue;
                }
            };

            match extract_invoice_rows(&self.profile, &properties, invoice_month, contract) {
                Ok(rows) => result.rows.extend(rows),
                Err(e) => {
                    warn!(
                        contract_id = %contract.contract_id,
                        error = %e,
                        "Failed to build invoice rows, skipping contract"
                    );
                    result
                        .errors
                        .push(format!("contract {}: {}", contract.contract_id, e));
                }
            }
        }

        result
    }
}

/// One invoice row per SKU billable in `invoice_month`.
pub fn extract_invoice_rows(
    profile: &ProductProfile,
    properties: &ContractProperties,
    invoice_month: NaiveDate,
    contract: &Contract,
) -> Result<Vec<InvoiceRow>, BillingError> {
    let mut rows = Vec::new();

    for sku in &properties.skus {
        let terms = BillingTerms::for_sku(sku, properties)?;

        let months_to_bill = if terms.is_monthly() {
            if !is_month_billable(&terms, invoice_month) {
                continue;
            }
            1
        } else {
            match cycle_billing_date(&terms, invoice_month) {
                Some(billing_date) => remaining_months_in_period(&terms, billing_date),
                None => continue,
            }
        };

        let ppu = adjusted_charge(&terms, sku.monthly_sales_price, invoice_month)
            * Decimal::from(months_to_bill);
        let total = ppu
            * Decimal::from(sku.quantity)
            * discount_proportion(contract.discount);

        let deferred_revenue_period = (!terms.is_monthly()).then(|| DeferredRevenuePeriod {
            start_date: invoice_month,
            end_date: add_months(invoice_month, months_to_bill),
        });

        rows.push(InvoiceRow {
            contract_id: contract.contract_id.clone(),
            description: profile.description.clone(),
            details: sku.sku_name.label.clone(),
            sku: sku.sku_name.google_sku.clone(),
            quantity: sku.quantity,
            ppu,
            discount: contract.discount,
            total,
            currency: profile.currency.clone(),
            rank: INVOICE_ROW_RANK,
            product_type: profile.product_type.clone(),
            is_final: true,
            entity_id: contract.entity_id.clone(),
            deferred_revenue_period,
        });
    }

    Ok(rows)
}
