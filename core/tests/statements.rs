//! Statement generation tests: aggregation window, overlap, finalize.

use chrono::{DateTime, Duration, TimeZone, Utc};
use marketplace_core::{
    clock::ManualClock,
    commission_subsystem::NewCommissionRule,
    config::MarketConfig,
    engine::Marketplace,
    error::{ConflictKind, ErrorKind, MarketError},
    notifier::NoopNotifier,
    statement_subsystem::NewProduct,
    store::{MarketStore, ProductRow, VendorRow},
    types::{Amount, CommissionType, StatementStatus},
    vendor_subsystem::NewVendor,
};
use serde_json::json;
use std::sync::Arc;

fn amt(s: &str) -> Amount {
    s.parse().unwrap()
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
}

struct Shop {
    vendor: VendorRow,
    product: ProductRow,
}

fn shop(m: &Marketplace, commission_type: CommissionType, value: &str) -> Shop {
    shop_for(m, "saffron", commission_type, value)
}

fn shop_for(m: &Marketplace, tag: &str, commission_type: CommissionType, value: &str) -> Shop {
    let vendor = m
        .create_vendor(NewVendor {
            name: format!("Retail {tag}"),
            email: format!("{tag}@example.in"),
            ..Default::default()
        })
        .unwrap();
    m.create_commission_rule(NewCommissionRule {
        vendor_id: vendor.vendor_id.clone(),
        category_id: None,
        commission_type,
        value: amt(value),
    })
    .unwrap();
    let product = m
        .statements()
        .add_product(NewProduct {
            vendor_id: vendor.vendor_id.clone(),
            category_id: None,
            name: "Laptop".into(),
        })
        .unwrap();
    Shop { vendor, product }
}

/// 125000.00 at 12% → fees 15000.00, net 110000.00.
#[test]
fn single_sale_statement_totals() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "12");
    let sale = m
        .statements()
        .record_sale(&s.product.product_id, amt("125000.00"), day(10))
        .unwrap();
    assert_eq!(sale.fee, amt("15000.00"));

    let statement = m
        .statements()
        .generate(&s.vendor.vendor_id, day(1), day(31))
        .unwrap();
    assert_eq!(statement.status, StatementStatus::Draft);
    assert_eq!(statement.total_sales, amt("125000.00"));
    assert_eq!(statement.total_fees, amt("15000.00"));
    assert_eq!(statement.net_amount, amt("110000.00"));
    assert_eq!(statement.sale_count, 1);

    let outcome = m.finalize_statement(&statement.statement_id).unwrap();
    assert!(!outcome.already_finalized);
    assert!(!outcome.flagged_non_positive);
    assert_eq!(outcome.statement.status, StatementStatus::Finalized);
    assert_eq!(outcome.statement.net_amount, amt("110000.00"));
    assert!(outcome.statement.finalized_at.is_some());
}

#[test]
fn window_is_half_open() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    let statements = m.statements();
    statements
        .record_sale(&s.product.product_id, amt("100"), day(1))
        .unwrap();
    statements
        .record_sale(&s.product.product_id, amt("200"), day(15) - Duration::milliseconds(1))
        .unwrap();
    statements
        .record_sale(&s.product.product_id, amt("400"), day(15))
        .unwrap();

    let first = statements.generate(&s.vendor.vendor_id, day(1), day(15)).unwrap();
    assert_eq!(first.sale_count, 2);
    assert_eq!(first.total_sales, amt("300"));
    assert_eq!(first.net_amount, amt("270"));

    // The next period starts where the last one ended.
    let second = statements.generate(&s.vendor.vendor_id, day(15), day(29)).unwrap();
    assert_eq!(second.sale_count, 1);
    assert_eq!(second.total_fees, amt("40"));
}

#[test]
fn overlapping_period_is_a_conflict() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    let existing = m
        .statements()
        .generate(&s.vendor.vendor_id, day(1), day(15))
        .unwrap();

    for (start, end) in [(day(10), day(20)), (day(1), day(15)), (day(2), day(3))] {
        let err = m
            .statements()
            .generate(&s.vendor.vendor_id, start, end)
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::Conflict(ConflictKind::OverlappingPeriod(ref id)) if *id == existing.statement_id
        ));
    }
}

#[test]
fn empty_or_inverted_period_is_rejected() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    for (start, end) in [(day(5), day(5)), (day(6), day(5))] {
        let err = m
            .statements()
            .generate(&s.vendor.vendor_id, start, end)
            .unwrap_err();
        assert!(matches!(err, MarketError::ValidationFailed { .. }));
    }
    assert!(m.list_statements(&s.vendor.vendor_id).unwrap().is_empty());
}

#[test]
fn finalize_is_idempotent() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    m.statements()
        .record_sale(&s.product.product_id, amt("1000"), day(3))
        .unwrap();
    let statement = m
        .statements()
        .generate(&s.vendor.vendor_id, day(1), day(8))
        .unwrap();

    let first = m.finalize_statement(&statement.statement_id).unwrap();
    let second = m.finalize_statement(&statement.statement_id).unwrap();
    assert!(second.already_finalized);
    assert_eq!(second.statement, first.statement);

    let finalized_events = m
        .events_for_entity(&statement.statement_id)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == "statement_finalized")
        .count();
    assert_eq!(finalized_events, 1);
}

#[test]
fn finalize_picks_up_late_sales_in_the_window() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    let statement = m
        .statements()
        .generate(&s.vendor.vendor_id, day(1), day(8))
        .unwrap();
    assert_eq!(statement.sale_count, 0);

    m.statements()
        .record_sale(&s.product.product_id, amt("500"), day(4))
        .unwrap();
    let refreshed = m.statements().refresh(&statement.statement_id).unwrap();
    assert_eq!(refreshed.net_amount, amt("450"));

    m.statements()
        .record_sale(&s.product.product_id, amt("100"), day(5))
        .unwrap();
    let outcome = m.finalize_statement(&statement.statement_id).unwrap();
    assert_eq!(outcome.statement.sale_count, 2);
    assert_eq!(outcome.statement.net_amount, amt("540"));
}

#[test]
fn finalized_statement_cannot_be_refreshed() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    let statement = m
        .statements()
        .generate(&s.vendor.vendor_id, day(1), day(8))
        .unwrap();
    m.finalize_statement(&statement.statement_id).unwrap();

    let err = m.statements().refresh(&statement.statement_id).unwrap_err();
    assert!(matches!(err, MarketError::InvalidState { entity: "statement", .. }));
}

#[test]
fn non_positive_net_is_flagged_not_refused() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    let statement = m
        .statements()
        .generate(&s.vendor.vendor_id, day(1), day(8))
        .unwrap();
    let outcome = m.finalize_statement(&statement.statement_id).unwrap();
    assert!(outcome.flagged_non_positive);
    assert_eq!(outcome.statement.status, StatementStatus::Finalized);
    assert_eq!(outcome.statement.net_amount, Amount::ZERO);
}

#[test]
fn flat_fee_never_exceeds_the_sale() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Flat, "500");
    let small = m
        .statements()
        .record_sale(&s.product.product_id, amt("200"), day(2))
        .unwrap();
    assert_eq!(small.fee, amt("200"));
    let large = m
        .statements()
        .record_sale(&s.product.product_id, amt("2000"), day(3))
        .unwrap();
    assert_eq!(large.fee, amt("500"));
}

/// Rules are applied when the sale happens; later edits leave history alone.
#[test]
fn fee_is_frozen_at_sale_time() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    m.statements()
        .record_sale(&s.product.product_id, amt("1000"), day(2))
        .unwrap();

    let rule = m.commission().rules_for_vendor(&s.vendor.vendor_id).unwrap()[0].clone();
    m.update_commission_rule(
        &rule.rule_id,
        marketplace_core::commission_subsystem::CommissionRulePatch {
            value: Some(amt("50")),
            ..Default::default()
        },
    )
    .unwrap();
    m.statements()
        .record_sale(&s.product.product_id, amt("1000"), day(3))
        .unwrap();

    let statement = m
        .statements()
        .generate(&s.vendor.vendor_id, day(1), day(8))
        .unwrap();
    assert_eq!(statement.total_fees, amt("600"));
    assert_eq!(statement.net_amount, amt("1400"));
}

#[test]
fn percentage_fee_rounds_half_away_from_zero() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "12.5");
    let sale = m
        .statements()
        .record_sale(&s.product.product_id, amt("0.20"), day(2))
        .unwrap();
    // 0.20 * 12.5% = 0.025
    assert_eq!(sale.fee, amt("0.03"));
}

#[test]
fn sale_must_be_positive_and_product_known() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    for amount in ["0", "-5"] {
        let err = m
            .statements()
            .record_sale(&s.product.product_id, amt(amount), day(2))
            .unwrap_err();
        assert!(matches!(err, MarketError::ValidationFailed { .. }));
    }
    let err = m
        .statements()
        .record_sale("ghost", amt("10"), day(2))
        .unwrap_err();
    assert!(matches!(err, MarketError::NotFound { entity: "product", .. }));
}

#[test]
fn statements_list_newest_period_first() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    let march = m
        .statements()
        .generate(&s.vendor.vendor_id, day(1), day(15))
        .unwrap();
    let later = m
        .statements()
        .generate(&s.vendor.vendor_id, day(15), day(29))
        .unwrap();
    let ids: Vec<_> = m
        .list_statements(&s.vendor.vendor_id)
        .unwrap()
        .into_iter()
        .map(|st| st.statement_id)
        .collect();
    assert_eq!(ids, vec![later.statement_id, march.statement_id]);
}

#[test]
fn sale_above_the_configured_ceiling_is_rejected() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    let ceiling = m.config().sales.max_sale_amount;

    let at_ceiling = m
        .statements()
        .record_sale(&s.product.product_id, ceiling, day(2))
        .unwrap();
    assert_eq!(at_ceiling.fee, ceiling / Amount::TEN);

    for amount in ["10000000000.01", "30000000000000000000000000000"] {
        let err = m
            .statements()
            .record_sale(&s.product.product_id, amt(amount), day(3))
            .unwrap_err();
        assert!(matches!(err, MarketError::ValidationFailed { field: "amount", .. }));
    }
}

#[test]
fn oversized_sale_over_json_is_an_error_response() {
    let m = Marketplace::build_test().unwrap();
    let s = shop(&m, CommissionType::Percentage, "10");
    let request = json!({
        "op": "record_sale",
        "product_id": s.product.product_id,
        "amount": "30000000000000000000000000000",
        "sold_at": day(2),
    });
    let response = m.handle_json(&request.to_string());
    assert!(!response.ok);
    assert_eq!(response.error_kind(), Some(ErrorKind::ValidationFailed));
}

/// With the ceiling lifted, totals that leave the decimal range fail the
/// statement instead of the process.
#[test]
fn statement_totals_out_of_range_are_an_error() {
    let mut config = MarketConfig::default_test();
    config.sales.max_sale_amount = Amount::MAX;
    let store = MarketStore::in_memory().unwrap();
    store.migrate().unwrap();
    let m = Marketplace::build(
        store,
        config,
        Arc::new(ManualClock::fixed()),
        Arc::new(NoopNotifier),
    );
    let s = shop(&m, CommissionType::Flat, "0");

    let huge = amt("50000000000000000000000000000");
    for d in [2, 3] {
        m.statements()
            .record_sale(&s.product.product_id, huge, day(d))
            .unwrap();
    }
    let err = m
        .statements()
        .generate(&s.vendor.vendor_id, day(1), day(8))
        .unwrap_err();
    assert!(matches!(err, MarketError::ValidationFailed { .. }));
    assert!(m.list_statements(&s.vendor.vendor_id).unwrap().is_empty());

    // A percentage fee on a sale this large has no representable value.
    let pct = shop_for(&m, "pct", CommissionType::Percentage, "50");
    let err = m
        .statements()
        .record_sale(&pct.product.product_id, huge, day(2))
        .unwrap_err();
    assert!(matches!(err, MarketError::ValidationFailed { .. }));
}
