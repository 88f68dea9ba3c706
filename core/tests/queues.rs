//! Operational queue tests: ordering, paging, bulk moves, stats.

use chrono::{DateTime, Duration, TimeZone, Utc};
use marketplace_core::{
    clock::ManualClock,
    engine::Marketplace,
    error::ErrorKind,
    payout_subsystem::PayoutOutcome,
    statement_subsystem::NewProduct,
    store::VendorRow,
    types::{Amount, KycStatus, Page, PayoutStatus, VendorStatus},
    vendor_subsystem::{NewKyc, NewVendor},
};
use std::sync::Arc;

fn vendor(m: &Marketplace, n: usize) -> VendorRow {
    m.create_vendor(NewVendor {
        name: format!("Vendor {n}"),
        email: format!("v{n}@example.in"),
        ..Default::default()
    })
    .unwrap()
}

fn ids(rows: &[VendorRow]) -> Vec<String> {
    rows.iter().map(|v| v.vendor_id.clone()).collect()
}

#[test]
fn approval_queue_is_oldest_first_and_paged() {
    let clock = Arc::new(ManualClock::fixed());
    let m = Marketplace::build_test_with_clock(clock.clone()).unwrap();
    let mut created = Vec::new();
    for n in 0..5 {
        created.push(vendor(&m, n));
        clock.advance(Duration::minutes(1));
    }

    let first = m.get_approval_queue(Page::new(1, 2)).unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(ids(&first.items), ids(&created[0..2]));

    let last = m.get_approval_queue(Page::new(3, 2)).unwrap();
    assert_eq!(ids(&last.items), ids(&created[4..5]));

    let beyond = m.get_approval_queue(Page::new(4, 2)).unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 5);
}

#[test]
fn page_requests_are_clamped() {
    let m = Marketplace::build_test().unwrap();
    let queues = m.queues();
    let max = m.config().queues.max_page_size;
    assert_eq!(queues.page(None, None), Page::new(1, m.config().queues.default_page_size));
    assert_eq!(queues.page(Some(0), Some(0)), Page::new(1, 1));
    assert_eq!(queues.page(Some(3), Some(max + 50)), Page::new(3, max));
}

#[test]
fn bulk_approve_skips_rows_already_moved() {
    let m = Marketplace::build_test().unwrap();
    let a = vendor(&m, 0);
    let b = vendor(&m, 1);
    let c = vendor(&m, 2);
    m.update_vendor_status(&b.vendor_id, VendorStatus::Rejected, None)
        .unwrap();

    let ids = vec![
        a.vendor_id.clone(),
        b.vendor_id.clone(),
        c.vendor_id.clone(),
        "ghost".to_string(),
    ];
    let outcome = m.bulk_approve_vendors(&ids).unwrap();
    assert_eq!(outcome.updated, 2);
    assert_eq!(outcome.updated_ids, vec![a.vendor_id.clone(), c.vendor_id.clone()]);
    let skipped: Vec<_> = outcome.skipped.iter().map(|s| (s.id.as_str(), s.kind)).collect();
    assert_eq!(
        skipped,
        vec![
            (b.vendor_id.as_str(), ErrorKind::InvalidState),
            ("ghost", ErrorKind::NotFound),
        ]
    );

    // Running it again changes nothing.
    let again = m.bulk_approve_vendors(&ids).unwrap();
    assert_eq!(again.updated, 0);
    assert_eq!(again.skipped.len(), 4);
    assert_eq!(m.get_approval_queue(Page::first(20)).unwrap().total, 0);
}

#[test]
fn bulk_reject_records_the_reason() {
    let m = Marketplace::build_test().unwrap();
    let a = vendor(&m, 0);
    let outcome = m
        .bulk_reject_vendors(&[a.vendor_id.clone()], Some("duplicate storefront"))
        .unwrap();
    assert_eq!(outcome.updated, 1);
    assert_eq!(m.vendors().get(&a.vendor_id).unwrap().status, VendorStatus::Rejected);
    let issues = m.vendors().issues(&a.vendor_id).unwrap();
    assert_eq!(issues[0].description.as_deref(), Some("duplicate storefront"));
}

#[test]
fn kyc_queue_and_bulk_review() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, 0);
    let docs: Vec<_> = ["PAN_CARD", "GST_CERTIFICATE", "CANCELLED_CHEQUE"]
        .into_iter()
        .map(|doc_type| {
            m.vendors()
                .submit_kyc(
                    &v.vendor_id,
                    NewKyc {
                        doc_type: doc_type.into(),
                        doc_reference: None,
                    },
                )
                .unwrap()
        })
        .collect();

    let queue = m.get_kyc_queue(Page::first(10)).unwrap();
    assert_eq!(queue.total, 3);
    assert_eq!(queue.items[0].kyc_id, docs[0].kyc_id);

    let approved = m
        .bulk_approve_kyc(&[docs[0].kyc_id.clone(), docs[1].kyc_id.clone()])
        .unwrap();
    assert_eq!(approved.updated, 2);

    let rejected = m
        .bulk_reject_kyc(
            &[docs[1].kyc_id.clone(), docs[2].kyc_id.clone()],
            Some("cheque not legible"),
        )
        .unwrap();
    assert_eq!(rejected.updated_ids, vec![docs[2].kyc_id.clone()]);
    assert_eq!(rejected.skipped[0].id, docs[1].kyc_id);
    assert_eq!(rejected.skipped[0].kind, ErrorKind::InvalidState);

    let third = m.store().get_kyc(&docs[2].kyc_id).unwrap().unwrap();
    assert_eq!(third.status, KycStatus::Rejected);
    assert_eq!(third.remarks.as_deref(), Some("cheque not legible"));
    assert_eq!(m.get_kyc_queue(Page::first(10)).unwrap().total, 0);
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap()
}

#[test]
fn payout_due_queue_and_stats() {
    let m = Marketplace::build_test().unwrap();
    let v = vendor(&m, 0);
    let w = vendor(&m, 1);
    let statements = m.statements();
    for owner in [&v, &w] {
        let product = statements
            .add_product(NewProduct {
                vendor_id: owner.vendor_id.clone(),
                category_id: None,
                name: "Lamp".into(),
            })
            .unwrap();
        statements
            .record_sale(&product.product_id, "100.00".parse().unwrap(), day(2))
            .unwrap();
    }
    // Platform fallback is 5%, so each statement nets 95.00.
    let later = statements.generate(&v.vendor_id, day(1), day(20)).unwrap();
    let earlier = statements.generate(&w.vendor_id, day(1), day(10)).unwrap();
    let draft = statements.generate(&v.vendor_id, day(20), day(30)).unwrap();
    m.finalize_statement(&later.statement_id).unwrap();
    m.finalize_statement(&earlier.statement_id).unwrap();

    let due = m.get_payout_due_queue(Page::first(10)).unwrap();
    let order: Vec<_> = due.items.iter().map(|r| r.statement.statement_id.clone()).collect();
    assert_eq!(order, vec![earlier.statement_id.clone(), later.statement_id.clone()]);
    assert!(!order.contains(&draft.statement_id));
    assert!(due.items.iter().all(|r| r.open_payout_status.is_none()));

    let stats = m.get_queue_stats().unwrap();
    assert_eq!(stats.pending_vendors, 2);
    assert_eq!(stats.payouts_due, 2);
    assert_eq!(stats.payouts_due_amount, "190.00".parse::<Amount>().unwrap());

    // An initiated payout keeps the statement in the queue, marked.
    let payout = m.create_payout(&earlier.statement_id).unwrap();
    let due = m.get_payout_due_queue(Page::first(10)).unwrap();
    assert_eq!(due.items[0].open_payout_status, Some(PayoutStatus::Initiated));

    // A completed one removes it.
    m.complete_payout(
        &payout.payout_id,
        PayoutOutcome::Completed {
            reference: "UTR7".into(),
        },
    )
    .unwrap();
    let stats = m.get_queue_stats().unwrap();
    assert_eq!(stats.payouts_due, 1);
    assert_eq!(stats.payouts_due_amount, "95.00".parse::<Amount>().unwrap());
}
