//! Payout tests: one live payout per statement, batches, settlement.

use chrono::{DateTime, TimeZone, Utc};
use marketplace_core::{
    commission_subsystem::NewCommissionRule,
    engine::Marketplace,
    error::{ConflictKind, ErrorKind, MarketError},
    payout_subsystem::PayoutOutcome,
    statement_subsystem::NewProduct,
    store::{StatementRow, VendorRow},
    types::{Amount, CommissionType, PayoutStatus, VendorStatus},
    vendor_subsystem::NewVendor,
};

fn amt(s: &str) -> Amount {
    s.parse().unwrap()
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, d, 0, 0, 0).unwrap()
}

fn vendor(m: &Marketplace, tag: &str) -> VendorRow {
    let vendor = m
        .create_vendor(NewVendor {
            name: format!("Vendor {tag}"),
            email: format!("{tag}@example.in"),
            ..Default::default()
        })
        .unwrap();
    m.create_commission_rule(NewCommissionRule {
        vendor_id: vendor.vendor_id.clone(),
        category_id: None,
        commission_type: CommissionType::Percentage,
        value: amt("10"),
    })
    .unwrap();
    vendor
}

/// A statement over days 1..8 holding one sale of `sale`, optionally finalized.
fn statement(m: &Marketplace, v: &VendorRow, sale: &str, finalize: bool) -> StatementRow {
    let statements = m.statements();
    let product = statements
        .add_product(NewProduct {
            vendor_id: v.vendor_id.clone(),
            category_id: None,
            name: "Widget".into(),
        })
        .unwrap();
    statements
        .record_sale(&product.product_id, amt(sale), day(2))
        .unwrap();
    let draft = statements.generate(&v.vendor_id, day(1), day(8)).unwrap();
    if finalize {
        m.finalize_statement(&draft.statement_id).unwrap().statement
    } else {
        draft
    }
}

#[test]
fn second_payout_for_a_statement_is_a_conflict() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, "a");
    let s = statement(&m, &v, "1000.00", true);

    let payout = m.create_payout(&s.statement_id).unwrap();
    assert_eq!(payout.status, PayoutStatus::Initiated);
    assert_eq!(payout.amount, amt("900.00"));
    assert_eq!(payout.statement_id.as_deref(), Some(s.statement_id.as_str()));

    let err = m.create_payout(&s.statement_id).unwrap_err();
    assert!(matches!(
        err,
        MarketError::Conflict(ConflictKind::DuplicatePayout(ref id)) if *id == s.statement_id
    ));
    assert_eq!(m.payouts().list_for_statement(&s.statement_id).unwrap().len(), 1);
}

#[test]
fn draft_statement_cannot_be_paid() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, "a");
    let s = statement(&m, &v, "1000.00", false);
    let err = m.create_payout(&s.statement_id).unwrap_err();
    match err {
        MarketError::InvalidState { entity, detail, .. } => {
            assert_eq!(entity, "statement");
            assert_eq!(detail, "statement not finalized");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
    assert!(matches!(
        m.create_payout("ghost").unwrap_err(),
        MarketError::NotFound { entity: "statement", .. }
    ));
}

#[test]
fn completed_payout_blocks_a_new_one() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, "a");
    let s = statement(&m, &v, "1000.00", true);
    let payout = m.create_payout(&s.statement_id).unwrap();

    let done = m
        .complete_payout(
            &payout.payout_id,
            PayoutOutcome::Completed {
                reference: "UTR0000000001".into(),
            },
        )
        .unwrap();
    assert_eq!(done.status, PayoutStatus::Completed);
    assert_eq!(done.reference.as_deref(), Some("UTR0000000001"));
    assert!(done.completed_at.is_some());

    assert!(matches!(
        m.create_payout(&s.statement_id).unwrap_err(),
        MarketError::Conflict(ConflictKind::DuplicatePayout(_))
    ));
    // Settling twice is refused.
    let err = m
        .complete_payout(
            &payout.payout_id,
            PayoutOutcome::Failed {
                reason: "bank bounced".into(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidState { entity: "payout", .. }));
}

#[test]
fn failed_payout_frees_the_statement_for_a_retry() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, "a");
    let s = statement(&m, &v, "1000.00", true);
    let first = m.create_payout(&s.statement_id).unwrap();
    let failed = m
        .complete_payout(
            &first.payout_id,
            PayoutOutcome::Failed {
                reason: "invalid beneficiary account".into(),
            },
        )
        .unwrap();
    assert_eq!(failed.status, PayoutStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("invalid beneficiary account"));
    assert!(failed.completed_at.is_none());

    let retry = m.create_payout(&s.statement_id).unwrap();
    assert_ne!(retry.payout_id, first.payout_id);
    let attempts: Vec<_> = m
        .payouts()
        .list_for_statement(&s.statement_id)
        .unwrap()
        .into_iter()
        .map(|p| p.status)
        .collect();
    assert_eq!(attempts, vec![PayoutStatus::Failed, PayoutStatus::Initiated]);
}

#[test]
fn settlement_needs_a_reference_or_reason() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, "a");
    let s = statement(&m, &v, "1000.00", true);
    let payout = m.create_payout(&s.statement_id).unwrap();

    for outcome in [
        PayoutOutcome::Completed { reference: " ".into() },
        PayoutOutcome::Failed { reason: String::new() },
    ] {
        let err = m.complete_payout(&payout.payout_id, outcome).unwrap_err();
        assert!(matches!(err, MarketError::ValidationFailed { .. }));
    }
    assert_eq!(
        m.payouts().get(&payout.payout_id).unwrap().status,
        PayoutStatus::Initiated
    );
}

#[test]
fn batch_reports_per_statement_outcomes() {
    let m = Marketplace::build_test().unwrap();
    let a = vendor(&m, "a");
    let b = vendor(&m, "b");
    let c = vendor(&m, "c");
    let paid = statement(&m, &a, "1000.00", true);
    let fresh = statement(&m, &b, "2000.00", true);
    let draft = statement(&m, &c, "3000.00", false);
    m.create_payout(&paid.statement_id).unwrap();

    let ids = vec![
        paid.statement_id.clone(),
        fresh.statement_id.clone(),
        draft.statement_id.clone(),
        "ghost".to_string(),
    ];
    let outcome = m.create_batch_payouts(&ids).unwrap();
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.payouts[0].statement_id.as_deref(), Some(fresh.statement_id.as_str()));
    assert_eq!(outcome.payouts[0].amount, amt("1800.00"));

    let kinds: Vec<_> = outcome.skipped.iter().map(|s| (s.id.as_str(), s.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            (paid.statement_id.as_str(), ErrorKind::Conflict),
            (draft.statement_id.as_str(), ErrorKind::InvalidState),
            ("ghost", ErrorKind::NotFound),
        ]
    );
}

#[test]
fn ad_hoc_payout_needs_an_active_vendor() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, "a");
    let err = m.payouts().create_ad_hoc(&v.vendor_id, amt("250")).unwrap_err();
    assert!(matches!(err, MarketError::InvalidState { entity: "vendor", .. }));

    m.update_vendor_status(&v.vendor_id, VendorStatus::Active, None)
        .unwrap();
    let err = m.payouts().create_ad_hoc(&v.vendor_id, Amount::ZERO).unwrap_err();
    assert!(matches!(err, MarketError::ValidationFailed { .. }));

    let payout = m.payouts().create_ad_hoc(&v.vendor_id, amt("250")).unwrap();
    assert_eq!(payout.statement_id, None);
    assert_eq!(payout.status, PayoutStatus::Initiated);
    assert_eq!(m.list_payouts(&v.vendor_id).unwrap().len(), 1);
}

#[test]
fn payout_lifecycle_is_audited() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, "a");
    let s = statement(&m, &v, "1000.00", true);
    let payout = m.create_payout(&s.statement_id).unwrap();
    m.complete_payout(
        &payout.payout_id,
        PayoutOutcome::Completed {
            reference: "UTR42".into(),
        },
    )
    .unwrap();
    let types: Vec<_> = m
        .events_for_entity(&payout.payout_id)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, vec!["payout_created", "payout_settled"]);
}

#[test]
fn statement_with_nothing_to_pay_is_refused() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, "a");
    let b = vendor(&m, "b");
    let empty = m.statements().generate(&v.vendor_id, day(1), day(8)).unwrap();
    let empty = m.finalize_statement(&empty.statement_id).unwrap();
    assert!(empty.flagged_non_positive);

    let err = m.create_payout(&empty.statement.statement_id).unwrap_err();
    assert!(matches!(err, MarketError::ValidationFailed { field: "net_amount", .. }));
    assert!(m.list_payouts(&v.vendor_id).unwrap().is_empty());

    // In a batch it is one more skip reason.
    let paid = statement(&m, &b, "100.00", true);
    let outcome = m
        .create_batch_payouts(&[empty.statement.statement_id.clone(), paid.statement_id.clone()])
        .unwrap();
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].id, empty.statement.statement_id);
    assert_eq!(outcome.skipped[0].kind, ErrorKind::ValidationFailed);
}
