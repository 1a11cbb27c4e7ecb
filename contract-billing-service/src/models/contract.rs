//! Contract model and its typed properties.

use crate::error::BillingError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A customer's purchase agreement for a product.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contract {
    pub contract_id: String,
    pub customer_id: String,
    pub product_type: String,
    pub entity_id: Option<String>,
    pub assets: Vec<String>,
    pub discount: Decimal,
    pub active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Free-form properties as stored by contract management.
    pub properties: serde_json::Value,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Contract {
    /// Contracts written before per-SKU billing carry no `skus` field.
    pub fn is_legacy_format(&self) -> bool {
        self.properties.get("skus").is_none()
    }

    /// Billing account of the first attached asset: the last three
    /// `-`-separated parts of its id.
    pub fn billing_account_id(&self) -> Result<String, BillingError> {
        let asset = self
            .assets
            .first()
            .ok_or_else(|| BillingError::MissingBillingAccount(self.contract_id.clone()))?;

        let asset = asset.rsplit('/').next().unwrap_or(asset);
        let parts: Vec<&str> = asset.split('-').collect();
        if parts.len() < 3 {
            return Err(BillingError::MissingBillingAccount(self.contract_id.clone()));
        }

        Ok(parts[parts.len() - 3..].join("-"))
    }

    pub fn decode_properties(&self) -> Result<ContractProperties, BillingError> {
        ContractProperties::decode(&self.properties)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContractProperties {
    #[validate(range(min = 1, message = "contractDuration must be a positive number of months"))]
    pub contract_duration: i32,

    #[validate(range(min = 1, message = "invoiceFrequency must be a positive number of months"))]
    pub invoice_frequency: i32,

    #[validate(length(min = 1, message = "salesProcess is required"))]
    pub sales_process: String,

    #[validate(nested)]
    pub skus: Vec<ContractSku>,
}

impl ContractProperties {
    pub fn decode(properties: &serde_json::Value) -> Result<Self, BillingError> {
        let decoded: ContractProperties = serde_json::from_value(properties.clone())
            .map_err(|e| BillingError::InvalidProperties(e.to_string()))?;

        decoded
            .validate()
            .map_err(|e| BillingError::InvalidProperties(e.to_string()))?;

        Ok(decoded)
    }
}

/// One billable line within a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContractSku {
    pub monthly_sales_price: Decimal,

    #[validate(range(min = 1, message = "months must be positive"))]
    pub months: i32,

    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i64,

    #[validate(nested)]
    pub sku_name: SkuName,

    pub start_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SkuName {
    #[serde(default)]
    pub google_sku: String,

    #[validate(length(min = 1, message = "label is required"))]
    pub label: String,

    pub monthly_list_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract(properties: serde_json::Value, assets: Vec<&str>) -> Contract {
        Contract {
            contract_id: "contract1".to_string(),
            customer_id: "customer1".to_string(),
            product_type: "looker".to_string(),
            entity_id: None,
            assets: assets.into_iter().map(String::from).collect(),
            discount: Decimal::ZERO,
            active: true,
            start_date: None,
            end_date: None,
            properties,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    fn properties() -> serde_json::Value {
        json!({
            "contractDuration": 12,
            "invoiceFrequency": 1,
            "salesProcess": "Existing Renewal",
            "skus": [{
                "monthlySalesPrice": 100,
                "months": 12,
                "quantity": 1,
                "skuName": {
                    "googleSku": "14EB-3C03-C96B",
                    "label": "Add-On Instance - Customer Hosted",
                    "monthlyListPrice": 2000
                },
                "startDate": "2023-05-30T00:00:00Z"
            }]
        })
    }

    #[test]
    fn test_billing_account_from_asset() {
        let c = contract(properties(), vec!["google-cloud-000000-000000-000001"]);
        assert_eq!(c.billing_account_id().unwrap(), "000000-000000-000001");

        let c = contract(properties(), vec!["assets/google-cloud-0A0A0A-0B0B0B-0C0C0C"]);
        assert_eq!(c.billing_account_id().unwrap(), "0A0A0A-0B0B0B-0C0C0C");
    }

    #[test]
    fn test_billing_account_missing_assets() {
        let c = contract(properties(), vec![]);
        assert!(matches!(
            c.billing_account_id(),
            Err(BillingError::MissingBillingAccount(_))
        ));
    }

    #[test]
    fn test_legacy_format_detection() {
        assert!(!contract(properties(), vec![]).is_legacy_format());
        assert!(contract(json!({"invoiceFrequency": 1}), vec![]).is_legacy_format());
    }

    #[test]
    fn test_decode_properties() {
        let decoded = contract(properties(), vec![]).decode_properties().unwrap();
        assert_eq!(decoded.invoice_frequency, 1);
        assert_eq!(decoded.skus.len(), 1);
        assert_eq!(decoded.skus[0].monthly_sales_price, Decimal::from(100));
        assert_eq!(decoded.skus[0].sku_name.monthly_list_price, Decimal::from(2000));
    }

    #[test]
    fn test_decode_rejects_missing_required_field() {
        let mut props = properties();
        props["skus"][0]
            .as_object_mut()
            .unwrap()
            .remove("startDate");
        assert!(matches!(
            ContractProperties::decode(&props),
            Err(BillingError::InvalidProperties(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_positive_frequency() {
        let mut props = properties();
        props["invoiceFrequency"] = json!(0);
        assert!(ContractProperties::decode(&props).is_err());

        let mut props = properties();
        props["skus"][0]["months"] = json!(-1);
        assert!(ContractProperties::decode(&props).is_err());
    }
}
