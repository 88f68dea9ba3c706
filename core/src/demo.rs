//! Deterministic demo marketplace.
//!
//! Builds a small category tree, walks `vendors` vendors through the whole
//! onboarding path, approves them through the queues, hands out a few
//! commission rules and records a month of sales. Same seed, same data.

use crate::{
    category_subsystem::NewCategory,
    commission_subsystem::NewCommissionRule,
    engine::Marketplace,
    error::MarketResult,
    rng::{SeedRng, SeedStream},
    statement_subsystem::NewProduct,
    types::{Amount, Commission, CommissionType, EntityId, Timestamp},
    vendor_subsystem::{NewAddress, NewBankAccount, NewKyc, NewVendor},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

const SHOP_PREFIXES: &[&str] = &[
    "Sunrise", "Lotus", "Evergreen", "Bluebird", "Saffron", "Harbor", "Maple", "Crescent",
    "Summit", "Orchid",
];

const SHOP_SUFFIXES: &[&str] = &[
    "Traders", "Retail", "Emporium", "Outlet", "Supplies", "Bazaar", "Goods", "Mart",
];

const CITIES: &[(&str, &str, &str)] = &[
    ("Mumbai", "Maharashtra", "400001"),
    ("Bengaluru", "Karnataka", "560001"),
    ("Chennai", "Tamil Nadu", "600001"),
    ("Pune", "Maharashtra", "411001"),
    ("Jaipur", "Rajasthan", "302001"),
];

const BANKS: &[(&str, &str)] = &[
    ("HDFC", "HDFC Bank"),
    ("ICIC", "ICICI Bank"),
    ("SBIN", "State Bank of India"),
    ("UTIB", "Axis Bank"),
];

const PRODUCT_NOUNS: &[&str] = &[
    "Headphones", "Charger", "Kurta", "Sneakers", "Lamp", "Skillet", "Backpack", "Watch",
    "Blender", "Notebook",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemoSummary {
    pub category_ids: Vec<EntityId>,
    pub vendor_ids: Vec<EntityId>,
    pub product_ids: Vec<EntityId>,
    pub rule_count: usize,
    pub sale_count: usize,
    /// Window every seeded sale falls in.
    pub period_start: Timestamp,
    pub period_end: Timestamp,
}

pub fn seed_marketplace(
    market: &Marketplace,
    seed: u64,
    vendors: usize,
) -> MarketResult<DemoSummary> {
    let period_end = market.clock().now();
    let period_start = period_end - Duration::days(30);
    let mut summary = DemoSummary {
        period_start,
        period_end,
        ..Default::default()
    };

    let leaves = seed_categories(market, &mut summary)?;

    let mut rng = SeedRng::new(seed, SeedStream::Vendors).with_name("vendors");
    for index in 0..vendors {
        let vendor_id = onboard_vendor(market, &mut rng, seed, index)?;
        summary.vendor_ids.push(vendor_id);
    }
    market.bulk_approve_vendors(&summary.vendor_ids)?;

    // Approving drains the queue, so the first page is always the next batch.
    let first_page = market.queues().page(Some(1), None);
    loop {
        let pending: Vec<EntityId> = market
            .get_kyc_queue(first_page)?
            .items
            .into_iter()
            .map(|k| k.kyc_id)
            .collect();
        if pending.is_empty() || market.bulk_approve_kyc(&pending)?.updated == 0 {
            break;
        }
    }

    let mut rules = SeedRng::new(seed, SeedStream::Commission).with_name("commission");
    for vendor_id in &summary.vendor_ids {
        if rules.chance(0.5) {
            market.create_commission_rule(NewCommissionRule {
                vendor_id: vendor_id.clone(),
                category_id: None,
                commission_type: CommissionType::Percentage,
                value: Amount::from(rules.between(6, 15)),
            })?;
            summary.rule_count += 1;
        }
        if rules.chance(0.3) {
            if let Some(category_id) = rules.pick(&leaves) {
                market.create_commission_rule(NewCommissionRule {
                    vendor_id: vendor_id.clone(),
                    category_id: Some(category_id.clone()),
                    commission_type: CommissionType::Flat,
                    value: rules.amount(2_000, 9_900),
                })?;
                summary.rule_count += 1;
            }
        }
    }

    let mut catalogue = SeedRng::new(seed, SeedStream::Catalogue).with_name("catalogue");
    let mut sales = SeedRng::new(seed, SeedStream::Sales).with_name("sales");
    let window_secs = (period_end - period_start).num_seconds().max(1) as u64;
    for vendor_id in &summary.vendor_ids {
        let mut products = Vec::new();
        for _ in 0..catalogue.between(1, 3) {
            let noun = catalogue.pick(PRODUCT_NOUNS).copied().unwrap_or("Item");
            let product = market.statements().add_product(NewProduct {
                vendor_id: vendor_id.clone(),
                category_id: catalogue.pick(&leaves).cloned(),
                name: format!("{noun} {}", catalogue.between(100, 999)),
            })?;
            products.push(product.product_id);
        }
        for _ in 0..sales.between(3, 12) {
            let Some(product_id) = sales.pick(&products) else {
                continue;
            };
            let offset = Duration::seconds(sales.below(window_secs) as i64);
            market
                .statements()
                .record_sale(product_id, sales.amount(19_900, 2_500_000), period_start + offset)?;
            summary.sale_count += 1;
        }
        summary.product_ids.extend(products);
    }

    log::info!(
        "seeded {} categories, {} vendors, {} products, {} sales (seed {seed})",
        summary.category_ids.len(),
        summary.vendor_ids.len(),
        summary.product_ids.len(),
        summary.sale_count
    );
    Ok(summary)
}

/// Returns the leaf category ids products are placed in.
fn seed_categories(market: &Marketplace, summary: &mut DemoSummary) -> MarketResult<Vec<EntityId>> {
    let categories = market.categories();
    let electronics = categories.create(NewCategory::named("Electronics"))?;
    let fashion = categories.create(
        NewCategory::named("Fashion").with_commission(Commission::percentage(Amount::from(8))),
    )?;
    let home = categories.create(NewCategory::named("Home & Kitchen"))?;

    let mut leaves = Vec::new();
    for (name, parent) in [
        ("Phones", &electronics),
        ("Laptops", &electronics),
        ("Menswear", &fashion),
        ("Womenswear", &fashion),
        ("Cookware", &home),
    ] {
        let child = categories.create(NewCategory::named(name).under(&parent.category_id))?;
        leaves.push(child.category_id);
    }
    summary
        .category_ids
        .extend([electronics.category_id, fashion.category_id, home.category_id]);
    summary.category_ids.extend(leaves.iter().cloned());
    Ok(leaves)
}

fn onboard_vendor(
    market: &Marketplace,
    rng: &mut SeedRng,
    seed: u64,
    index: usize,
) -> MarketResult<EntityId> {
    let prefix = rng.pick(SHOP_PREFIXES).copied().unwrap_or("Demo");
    let suffix = rng.pick(SHOP_SUFFIXES).copied().unwrap_or("Store");
    let name = format!("{prefix} {suffix}");

    // The numeric block carries the index so PAN and GST stay unique.
    let head: String = (0..5).map(|_| rng.letter()).collect();
    let tail = rng.letter();
    let pan = format!("{head}{:04}{tail}", index % 10_000);
    let gst = format!("{:02}{pan}1Z{}", rng.between(1, 37), rng.below(10));

    let vendors = market.vendors();
    let vendor = vendors.create(NewVendor {
        name: name.clone(),
        legal_name: Some(format!("{name} Private Limited")),
        email: format!("vendor{index}.s{seed}@demo.market"),
        phone: Some(format!("+91 9{:09}", rng.below(1_000_000_000))),
        gst_number: Some(gst),
        pan_number: Some(pan),
    })?;

    let (city, state, postal_code) = rng.pick(CITIES).copied().unwrap_or(CITIES[0]);
    vendors.add_address(
        &vendor.vendor_id,
        NewAddress {
            line1: format!("{} Market Road", rng.between(1, 250)),
            line2: None,
            city: city.into(),
            state: state.into(),
            postal_code: postal_code.into(),
            country: "IN".into(),
            is_primary: true,
        },
    )?;

    let (ifsc_prefix, bank_name) = rng.pick(BANKS).copied().unwrap_or(BANKS[0]);
    vendors.add_bank_account(
        &vendor.vendor_id,
        NewBankAccount {
            account_holder: format!("{name} Private Limited"),
            account_number: format!("{:012}", rng.below(1_000_000_000_000)),
            ifsc_code: format!("{ifsc_prefix}0{:06}", rng.below(1_000_000)),
            bank_name: Some(bank_name.into()),
            is_primary: true,
        },
    )?;

    vendors.submit_kyc(
        &vendor.vendor_id,
        NewKyc {
            doc_type: "PAN_CARD".into(),
            doc_reference: Some(format!("kyc/{}/pan.pdf", vendor.vendor_id)),
        },
    )?;
    vendors.complete_onboarding(&vendor.vendor_id)?;
    Ok(vendor.vendor_id)
}
