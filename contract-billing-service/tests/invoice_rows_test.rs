//! Invoice row tests for multi-month and monthly contracts.

mod common;

use common::{at_noon, date, looker_contract, TestApp};
use contract_billing_service::models::{Contract, DeferredRevenuePeriod};
use rust_decimal::Decimal;

fn contracts() -> Vec<Contract> {
    vec![
        // billed every three months, started three months before the invoice
        looker_contract("contract1", 3, 12, date(2023, 3, 30)),
        // billed monthly, started last month
        looker_contract("contract2", 1, 12, date(2023, 5, 30)),
        // billed yearly, started two years before
        looker_contract("contract3", 12, 36, date(2021, 6, 30)),
        // billed every three months, started two months before
        looker_contract("contract4", 3, 12, date(2023, 4, 30)),
        // billed yearly, started a year and a half before
        looker_contract("contract5", 12, 12, date(2021, 12, 30)),
    ]
}

#[tokio::test]
async fn invoice_rows_for_billable_contracts() {
    let invoice_month = date(2023, 6, 30);
    let app = TestApp::new(contracts(), at_noon(invoice_month)).await;

    let result = app
        .service
        .invoice_rows(common::CUSTOMER_ID, invoice_month)
        .await
        .unwrap();

    assert_eq!(result.product_type, "looker");
    assert!(result.errors.is_empty());

    let ids: Vec<_> = result.rows.iter().map(|r| r.contract_id.as_str()).collect();
    assert_eq!(ids, vec!["contract1", "contract2", "contract3"]);

    let quarterly = &result.rows[0];
    assert_eq!(quarterly.ppu, Decimal::from(300));
    assert_eq!(quarterly.total, Decimal::from(300));
    assert_eq!(
        quarterly.deferred_revenue_period,
        Some(DeferredRevenuePeriod {
            start_date: invoice_month,
            end_date: date(2023, 9, 30),
        })
    );

    let monthly = &result.rows[1];
    assert_eq!(monthly.ppu, Decimal::from(100));
    assert_eq!(monthly.deferred_revenue_period, None);

    let yearly = &result.rows[2];
    assert_eq!(yearly.ppu, Decimal::from(1200));
    assert_eq!(
        yearly.deferred_revenue_period,
        Some(DeferredRevenuePeriod {
            start_date: invoice_month,
            end_date: date(2024, 6, 30),
        })
    );

    for row in &result.rows {
        assert_eq!(row.description, "Google Looker");
        assert_eq!(row.details, "Add-On Instance - Customer Hosted");
        assert_eq!(row.sku, "14EB-3C03-C96B");
        assert_eq!(row.currency, "USD");
        assert_eq!(row.rank, 1);
        assert!(row.is_final);
        assert_eq!(row.entity_id.as_deref(), Some("entities/0000"));
    }
}

#[tokio::test]
async fn monthly_start_month_is_prorated() {
    let contracts = vec![looker_contract("c1", 1, 12, date(2023, 4, 11))];
    let app = TestApp::new(contracts, at_noon(date(2023, 4, 30))).await;

    let result = app
        .service
        .invoice_rows(common::CUSTOMER_ID, date(2023, 4, 1))
        .await
        .unwrap();

    // 20 of 30 days
    let expected = Decimal::from(100) * Decimal::from(20) / Decimal::from(30);
    assert_eq!(result.rows[0].ppu, expected);
}

#[tokio::test]
async fn discount_reduces_total_not_ppu() {
    let mut contract = looker_contract("c1", 3, 12, date(2023, 3, 30));
    contract.discount = Decimal::from(10);
    let app = TestApp::new(vec![contract], at_noon(date(2023, 6, 30))).await;

    let result = app
        .service
        .invoice_rows(common::CUSTOMER_ID, date(2023, 6, 30))
        .await
        .unwrap();

    assert_eq!(result.rows[0].ppu, Decimal::from(300));
    assert_eq!(result.rows[0].total, Decimal::from(270));
    assert_eq!(result.rows[0].discount, Decimal::from(10));
}

#[tokio::test]
async fn undecodable_contract_is_reported_not_fatal() {
    let mut broken = looker_contract("broken", 1, 12, date(2023, 5, 1));
    broken.properties["invoiceFrequency"] = serde_json::json!(0);
    let contracts = vec![broken, looker_contract("c1", 1, 12, date(2023, 5, 1))];
    let app = TestApp::new(contracts, at_noon(date(2023, 6, 30))).await;

    let result = app
        .service
        .invoice_rows(common::CUSTOMER_ID, date(2023, 6, 1))
        .await
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("broken"));
}

#[tokio::test]
async fn truncated_final_cycle_bills_remaining_months() {
    let contracts = vec![looker_contract("c1", 3, 11, date(2023, 1, 15))];
    let app = TestApp::new(contracts, at_noon(date(2023, 10, 20))).await;

    let first_of_month = app
        .service
        .invoice_rows(common::CUSTOMER_ID, date(2023, 10, 1))
        .await
        .unwrap();
    let billing_day = app
        .service
        .invoice_rows(common::CUSTOMER_ID, date(2023, 10, 15))
        .await
        .unwrap();

    assert_eq!(first_of_month.rows[0].ppu, Decimal::from(200));
    assert_eq!(billing_day.rows[0].ppu, first_of_month.rows[0].ppu);
    assert_eq!(
        first_of_month.rows[0].deferred_revenue_period,
        Some(DeferredRevenuePeriod {
            start_date: date(2023, 10, 1),
            end_date: date(2023, 12, 1),
        })
    );

    let after_end = app
        .service
        .invoice_rows(common::CUSTOMER_ID, date(2024, 1, 1))
        .await
        .unwrap();
    assert!(after_end.rows.is_empty());
}
