//! Category hierarchy tests: depth, cycles, cascade, ordering.

use marketplace_core::{
    category_subsystem::{CategoryPatch, NewCategory, MAX_CATEGORY_DEPTH},
    commission_subsystem::NewCommissionRule,
    engine::Marketplace,
    error::{ConflictKind, MarketError},
    statement_subsystem::NewProduct,
    store::CategoryRow,
    types::CommissionType,
    vendor_subsystem::NewVendor,
};
use rust_decimal::Decimal;

fn market() -> Marketplace {
    Marketplace::build_test().unwrap()
}

fn create(m: &Marketplace, name: &str, parent: Option<&CategoryRow>) -> CategoryRow {
    let mut new = NewCategory::named(name);
    if let Some(p) = parent {
        new = new.under(&p.category_id);
    }
    m.create_category(new).unwrap()
}

/// root(0) → ... → level 5 is allowed; a sixth ancestor is not.
#[test]
fn level_counts_ancestors_and_caps_at_five() {
    let m = market();
    let mut parent = create(&m, "Level 0", None);
    assert_eq!(parent.level, 0);
    for depth in 1..=MAX_CATEGORY_DEPTH {
        parent = create(&m, &format!("Level {depth}"), Some(&parent));
        assert_eq!(parent.level, depth);
    }

    let err = m
        .create_category(NewCategory::named("Too deep").under(&parent.category_id))
        .unwrap_err();
    assert!(
        matches!(err, MarketError::DepthExceeded { level: 6, max: 5 }),
        "got {err:?}"
    );
}

#[test]
fn missing_parent_is_not_found() {
    let m = market();
    let err = m
        .create_category(NewCategory::named("Orphan").under("no-such-category"))
        .unwrap_err();
    assert!(matches!(err, MarketError::NotFound { entity: "category", .. }));
}

#[test]
fn duplicate_slug_is_a_conflict() {
    let m = market();
    let first = create(&m, "Home & Kitchen", None);
    assert_eq!(first.slug, "home-kitchen");

    let err = m
        .create_category(NewCategory::named("Home Kitchen"))
        .unwrap_err();
    assert!(matches!(
        err,
        MarketError::Conflict(ConflictKind::DuplicateSlug(ref s)) if s == "home-kitchen"
    ));

    let other = create(&m, "Garden", None);
    let err = m
        .update_category(
            &other.category_id,
            CategoryPatch {
                slug: Some("home-kitchen".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, MarketError::Conflict(ConflictKind::DuplicateSlug(_))));
}

/// a → b → c: moving a under c (or under itself) would make a its own ancestor.
#[test]
fn reparent_into_own_subtree_is_rejected() {
    let m = market();
    let a = create(&m, "A", None);
    let b = create(&m, "B", Some(&a));
    let c = create(&m, "C", Some(&b));

    for target in [&c, &b, &a] {
        let err = m
            .update_category(
                &a.category_id,
                CategoryPatch {
                    parent_id: Some(Some(target.category_id.clone())),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(
            matches!(err, MarketError::CircularDependency { .. }),
            "moving under {} gave {err:?}",
            target.name
        );
    }

    // Nothing moved.
    assert_eq!(m.categories().get(&a.category_id).unwrap().parent_id, None);
    assert_eq!(m.categories().get(&c.category_id).unwrap().level, 2);
}

/// Cycle detection walks the full chain: levels 0..=5, then every node is
/// offered the deepest leaf as a new parent.
#[test]
fn reparent_under_deepest_descendant_is_rejected() {
    let m = market();
    let mut chain = vec![create(&m, "Depth 0", None)];
    for depth in 1..=MAX_CATEGORY_DEPTH {
        let parent = chain.last().unwrap().clone();
        chain.push(create(&m, &format!("Depth {depth}"), Some(&parent)));
    }
    let leaf = chain.last().unwrap().clone();
    assert_eq!(leaf.level, MAX_CATEGORY_DEPTH);

    for node in &chain[..chain.len() - 1] {
        let err = m
            .update_category(
                &node.category_id,
                CategoryPatch {
                    parent_id: Some(Some(leaf.category_id.clone())),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(
            matches!(err, MarketError::CircularDependency { .. }),
            "moving {} under the leaf gave {err:?}",
            node.name
        );
    }

    for (depth, node) in chain.iter().enumerate() {
        let stored = m.categories().get(&node.category_id).unwrap();
        assert_eq!(stored.level, depth as u32);
        assert_eq!(stored.parent_id, node.parent_id);
    }
}

#[test]
fn reparent_recomputes_subtree_levels() {
    let m = market();
    let x = create(&m, "X", None);
    let y = create(&m, "Y", Some(&x));
    let a = create(&m, "A", None);
    let b = create(&m, "B", Some(&a));
    let c = create(&m, "C", Some(&b));

    let moved = m
        .update_category(
            &a.category_id,
            CategoryPatch {
                parent_id: Some(Some(y.category_id.clone())),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(moved.level, 2);
    assert_eq!(m.categories().get(&b.category_id).unwrap().level, 3);
    assert_eq!(m.categories().get(&c.category_id).unwrap().level, 4);

    // Back to the root.
    m.update_category(
        &a.category_id,
        CategoryPatch {
            parent_id: Some(None),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(m.categories().get(&a.category_id).unwrap().level, 0);
    assert_eq!(m.categories().get(&c.category_id).unwrap().level, 2);
}

/// Moving a subtree of height 1 under a level-4 node would put its leaf at 6.
#[test]
fn reparent_that_pushes_a_descendant_past_five_is_rejected() {
    let m = market();
    let mut deep = create(&m, "D0", None);
    for depth in 1..=4 {
        deep = create(&m, &format!("D{depth}"), Some(&deep));
    }
    let s = create(&m, "S", None);
    let t = create(&m, "T", Some(&s));

    let err = m
        .update_category(
            &s.category_id,
            CategoryPatch {
                parent_id: Some(Some(deep.category_id.clone())),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, MarketError::DepthExceeded { level: 6, .. }), "got {err:?}");
    assert_eq!(m.categories().get(&t.category_id).unwrap().level, 1);

    // A leaf fits.
    let moved = m
        .update_category(
            &t.category_id,
            CategoryPatch {
                parent_id: Some(Some(deep.category_id.clone())),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(moved.level, 5);
}

#[test]
fn delete_with_children_needs_cascade() {
    let m = market();
    let a = create(&m, "A", None);
    let b = create(&m, "B", Some(&a));
    let c = create(&m, "C", Some(&b));
    let d = create(&m, "D", Some(&a));

    let err = m.delete_category(&a.category_id, false).unwrap_err();
    assert!(matches!(err, MarketError::Conflict(ConflictKind::HasChildren(_))));

    let removed = m.delete_category(&a.category_id, true).unwrap();
    // Children strictly before their parents.
    let pos = |id: &str| removed.iter().position(|r| r == id).unwrap();
    assert_eq!(removed.len(), 4);
    assert!(pos(&c.category_id) < pos(&b.category_id));
    assert!(pos(&b.category_id) < pos(&a.category_id));
    assert!(pos(&d.category_id) < pos(&a.category_id));
    assert!(m.list_categories().unwrap().is_empty());

    let err = m.categories().get(&b.category_id).unwrap_err();
    assert!(matches!(err, MarketError::NotFound { .. }));
}

#[test]
fn delete_leaf_without_cascade() {
    let m = market();
    let a = create(&m, "A", None);
    let b = create(&m, "B", Some(&a));
    assert_eq!(m.delete_category(&b.category_id, false).unwrap(), vec![b.category_id]);
    assert_eq!(m.list_categories().unwrap().len(), 1);
}

#[test]
fn active_products_pin_a_category_unless_ignored() {
    let m = market();
    let a = create(&m, "A", None);
    let b = create(&m, "B", Some(&a));
    let vendor = m
        .create_vendor(NewVendor {
            name: "Shop".into(),
            email: "shop@example.in".into(),
            ..Default::default()
        })
        .unwrap();
    let product = m
        .statements()
        .add_product(NewProduct {
            vendor_id: vendor.vendor_id.clone(),
            category_id: Some(b.category_id.clone()),
            name: "Kettle".into(),
        })
        .unwrap();
    let rule = m
        .create_commission_rule(NewCommissionRule {
            vendor_id: vendor.vendor_id.clone(),
            category_id: Some(b.category_id.clone()),
            commission_type: CommissionType::Percentage,
            value: Decimal::from(9),
        })
        .unwrap();

    let err = m.delete_category(&a.category_id, true).unwrap_err();
    assert!(matches!(
        err,
        MarketError::Conflict(ConflictKind::CategoryInUse(_, 1))
    ));

    m.categories().remove(&a.category_id, true, true).unwrap();
    let product = m.store().get_product(&product.product_id).unwrap().unwrap();
    assert_eq!(product.category_id, None);
    // Rules scoped to a removed category go with it.
    assert!(m.store().get_commission_rule(&rule.rule_id).unwrap().is_none());
}

#[test]
fn tree_orders_siblings_by_sort_order_then_name() {
    let m = market();
    let root = create(&m, "Root", None);
    for (name, order) in [("Zeta", 0), ("Alpha", 1), ("Beta", 0)] {
        let mut new = NewCategory::named(name).under(&root.category_id);
        new.sort_order = order;
        m.create_category(new).unwrap();
    }

    let tree = m.category_tree().unwrap();
    assert_eq!(tree.len(), 1);
    let names: Vec<_> = tree[0]
        .children
        .iter()
        .map(|n| n.category.name.as_str())
        .collect();
    assert_eq!(names, vec!["Beta", "Zeta", "Alpha"]);
}

#[test]
fn invalid_default_commission_is_rejected() {
    let m = market();
    let mut new = NewCategory::named("Luxury");
    new.has_custom_commission = true;
    new.default_commission = Some(marketplace_core::types::Commission::percentage(
        Decimal::from(101),
    ));
    let err = m.create_category(new).unwrap_err();
    assert!(matches!(err, MarketError::ValidationFailed { .. }));
}

#[test]
fn mutations_leave_audit_events() {
    let m = market();
    let a = create(&m, "A", None);
    m.update_category(
        &a.category_id,
        CategoryPatch {
            name: Some("A prime".into()),
            ..Default::default()
        },
    )
    .unwrap();
    let types: Vec<_> = m
        .events_for_entity(&a.category_id)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, vec!["category_created", "category_updated"]);
}
