//! Category hierarchy: owns the category tree.
//!
//! The tree is held as an arena keyed by id with parent-id links. Every
//! structural check (cycle walk, depth, cascade order) runs over an arena loaded
//! inside the same IMMEDIATE transaction as the write it guards.
//!
//! Invariants:
//!   - level == number of ancestors, and level <= MAX_CATEGORY_DEPTH
//!   - no node is its own ancestor
//!   - slug is unique across all categories

use crate::{
    clock::Clock,
    commission_subsystem::validate_commission,
    error::{ConflictKind, MarketError, MarketResult},
    event::MarketEvent,
    store::{CategoryRow, MarketStore},
    subsystem::MarketSubsystem,
    types::{double_option, new_id, Commission, EntityId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum number of ancestors any category may have.
pub const MAX_CATEGORY_DEPTH: u32 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default = "yes")]
    pub is_active: bool,
    #[serde(default = "yes")]
    pub is_visible: bool,
    #[serde(default)]
    pub has_custom_commission: bool,
    #[serde(default)]
    pub default_commission: Option<Commission>,
}

fn yes() -> bool {
    true
}

impl NewCategory {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_active: true,
            is_visible: true,
            ..Default::default()
        }
    }

    pub fn under(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn with_commission(mut self, commission: Commission) -> Self {
        self.has_custom_commission = true;
        self.default_commission = Some(commission);
        self
    }
}

/// Partial update. `parent_id: Some(None)` moves the node to the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<EntityId>>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_visible: Option<bool>,
    #[serde(default)]
    pub has_custom_commission: Option<bool>,
    #[serde(default)]
    pub default_commission: Option<Commission>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTreeNode {
    #[serde(flatten)]
    pub category: CategoryRow,
    pub children: Vec<CategoryTreeNode>,
}

// ── Arena ──────────────────────────────────────────────────────────

/// In-memory view of the whole tree. Child lists keep the canonical
/// (sort_order, name) order of the rows it was built from.
pub struct CategoryArena {
    nodes: HashMap<EntityId, CategoryRow>,
    roots: Vec<EntityId>,
    children: HashMap<EntityId, Vec<EntityId>>,
}

impl CategoryArena {
    /// `rows` must already be in canonical sibling order.
    pub fn from_rows(rows: Vec<CategoryRow>) -> Self {
        let mut roots = Vec::new();
        let mut children: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
        for row in &rows {
            match &row.parent_id {
                Some(parent) => children
                    .entry(parent.clone())
                    .or_default()
                    .push(row.category_id.clone()),
                None => roots.push(row.category_id.clone()),
            }
        }
        let nodes = rows
            .into_iter()
            .map(|r| (r.category_id.clone(), r))
            .collect();
        Self {
            nodes,
            roots,
            children,
        }
    }

    pub fn get(&self, id: &str) -> Option<&CategoryRow> {
        self.nodes.get(id)
    }

    pub fn children_of(&self, id: &str) -> &[EntityId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Would placing `id` under `new_parent` make `id` its own ancestor?
    /// Walks from the proposed parent up to the root. A walk longer than the
    /// arena means the stored links already loop, which is treated as a cycle.
    pub fn would_cycle(&self, id: &str, new_parent: &str) -> bool {
        let mut cursor = Some(new_parent);
        let mut steps = 0usize;
        while let Some(current) = cursor {
            if current == id || steps > self.nodes.len() {
                return true;
            }
            steps += 1;
            cursor = self.nodes.get(current).and_then(|n| n.parent_id.as_deref());
        }
        false
    }

    /// Longest downward path from `id` to a leaf, in edges.
    pub fn subtree_height(&self, id: &str) -> u32 {
        self.descendants_with_depth(id)
            .iter()
            .map(|(_, depth)| *depth)
            .max()
            .unwrap_or(0)
    }

    /// Every strict descendant of `id` with its distance below `id`, parents
    /// before children.
    pub fn descendants_with_depth(&self, id: &str) -> Vec<(EntityId, u32)> {
        let mut out = Vec::new();
        let mut stack: Vec<(&str, u32)> = self
            .children_of(id)
            .iter()
            .rev()
            .map(|c| (c.as_str(), 1))
            .collect();
        while let Some((current, depth)) = stack.pop() {
            out.push((current.to_string(), depth));
            for child in self.children_of(current).iter().rev() {
                stack.push((child.as_str(), depth + 1));
            }
        }
        out
    }

    /// `id` and all its descendants, children strictly before parents.
    /// This is the order a cascading delete must follow.
    pub fn post_order(&self, id: &str) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack: Vec<(&str, bool)> = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                out.push(current.to_string());
                continue;
            }
            stack.push((current, true));
            for child in self.children_of(current).iter().rev() {
                stack.push((child.as_str(), false));
            }
        }
        out
    }

    /// Roots with children populated depth-first, canonical order at every level.
    pub fn tree(&self) -> Vec<CategoryTreeNode> {
        self.roots.iter().filter_map(|id| self.build_node(id)).collect()
    }

    fn build_node(&self, id: &str) -> Option<CategoryTreeNode> {
        let category = self.nodes.get(id)?.clone();
        let children = self
            .children_of(id)
            .iter()
            .filter_map(|c| self.build_node(c))
            .collect();
        Some(CategoryTreeNode { category, children })
    }
}

// ── Subsystem ──────────────────────────────────────────────────────

pub struct CategorySubsystem<'a> {
    store: &'a MarketStore,
    clock: &'a dyn Clock,
}

impl MarketSubsystem for CategorySubsystem<'_> {
    fn name(&self) -> &'static str {
        "category"
    }

    fn store(&self) -> &MarketStore {
        self.store
    }

    fn clock(&self) -> &dyn Clock {
        self.clock
    }
}

impl<'a> CategorySubsystem<'a> {
    pub fn new(store: &'a MarketStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    pub fn create(&self, new: NewCategory) -> MarketResult<CategoryRow> {
        let name = required_name(&new.name)?;
        let slug = match new.slug.as_deref() {
            Some(s) => slugify(s),
            None => slugify(&name),
        };
        if slug.is_empty() {
            return Err(MarketError::validation("slug", "must contain letters or digits"));
        }
        let default_commission = new
            .default_commission
            .unwrap_or(Commission::percentage(Decimal::ZERO));
        validate_commission("default_commission", &default_commission)?;

        self.store.in_transaction(|| {
            if self.store.slug_taken(&slug, None)? {
                return Err(MarketError::Conflict(ConflictKind::DuplicateSlug(slug.clone())));
            }
            let level = match new.parent_id.as_deref() {
                Some(parent_id) => {
                    let parent = self
                        .store
                        .get_category(parent_id)?
                        .ok_or_else(|| MarketError::not_found("category", parent_id))?;
                    parent.level + 1
                }
                None => 0,
            };
            if level > MAX_CATEGORY_DEPTH {
                return Err(MarketError::DepthExceeded {
                    level,
                    max: MAX_CATEGORY_DEPTH,
                });
            }

            let now = self.clock.now();
            let row = CategoryRow {
                category_id: new_id(),
                name: name.clone(),
                slug: slug.clone(),
                description: new.description.clone(),
                parent_id: new.parent_id.clone(),
                level,
                sort_order: new.sort_order,
                is_active: new.is_active,
                is_visible: new.is_visible,
                has_custom_commission: new.has_custom_commission,
                default_commission_type: default_commission.commission_type,
                default_commission_value: default_commission.value,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_category(&row)?;
            self.record(
                &row.category_id,
                &MarketEvent::CategoryCreated {
                    category_id: row.category_id.clone(),
                    parent_id: row.parent_id.clone(),
                    level,
                },
            )?;
            log::info!("category {} '{}' created at level {level}", row.category_id, row.slug);
            Ok(row)
        })
    }

    pub fn update(&self, category_id: &str, patch: CategoryPatch) -> MarketResult<CategoryRow> {
        if let Some(c) = &patch.default_commission {
            validate_commission("default_commission", c)?;
        }

        self.store.in_transaction(|| {
            let arena = CategoryArena::from_rows(self.store.all_categories()?);
            let current = arena
                .get(category_id)
                .ok_or_else(|| MarketError::not_found("category", category_id))?;
            let mut next = current.clone();

            if let Some(name) = &patch.name {
                next.name = required_name(name)?;
            }
            if let Some(slug) = &patch.slug {
                next.slug = slugify(slug);
                if next.slug.is_empty() {
                    return Err(MarketError::validation("slug", "must contain letters or digits"));
                }
                if next.slug != current.slug && self.store.slug_taken(&next.slug, Some(category_id))? {
                    return Err(MarketError::Conflict(ConflictKind::DuplicateSlug(next.slug)));
                }
            }
            if let Some(description) = &patch.description {
                next.description = description.clone();
            }
            if let Some(order) = patch.sort_order {
                next.sort_order = order;
            }
            if let Some(active) = patch.is_active {
                next.is_active = active;
            }
            if let Some(visible) = patch.is_visible {
                next.is_visible = visible;
            }
            if let Some(custom) = patch.has_custom_commission {
                next.has_custom_commission = custom;
            }
            if let Some(c) = patch.default_commission {
                next.default_commission_type = c.commission_type;
                next.default_commission_value = c.value;
            }

            let reparented = match &patch.parent_id {
                Some(parent) if *parent != current.parent_id => {
                    next.parent_id = parent.clone();
                    next.level = self.level_under(&arena, category_id, parent.as_deref())?;
                    true
                }
                _ => false,
            };

            let now = self.clock.now();
            next.updated_at = now;
            self.store.update_category(&next)?;

            if reparented {
                for (descendant, depth) in arena.descendants_with_depth(category_id) {
                    self.store
                        .set_category_level(&descendant, next.level + depth, now)?;
                }
            }
            self.record(
                category_id,
                &MarketEvent::CategoryUpdated {
                    category_id: category_id.to_string(),
                    reparented,
                },
            )?;
            Ok(next)
        })
    }

    /// Level `category_id` would have under `new_parent`, after checking that
    /// the move creates no cycle and keeps the whole subtree within depth.
    fn level_under(
        &self,
        arena: &CategoryArena,
        category_id: &str,
        new_parent: Option<&str>,
    ) -> MarketResult<u32> {
        let level = match new_parent {
            None => 0,
            Some(parent_id) => {
                let parent = arena
                    .get(parent_id)
                    .ok_or_else(|| MarketError::not_found("category", parent_id))?;
                if arena.would_cycle(category_id, parent_id) {
                    return Err(MarketError::CircularDependency {
                        category_id: category_id.to_string(),
                        parent_id: parent_id.to_string(),
                    });
                }
                parent.level + 1
            }
        };
        let deepest = level + arena.subtree_height(category_id);
        if deepest > MAX_CATEGORY_DEPTH {
            return Err(MarketError::DepthExceeded {
                level: deepest,
                max: MAX_CATEGORY_DEPTH,
            });
        }
        Ok(level)
    }

    /// Remove a category. Without `cascade`, a node with children is refused.
    /// With it, descendants go first, deepest first. Active products pin the
    /// whole subtree unless `ignore_products` is set, in which case they are
    /// detached. Returns the removed ids in deletion order.
    pub fn remove(
        &self,
        category_id: &str,
        cascade: bool,
        ignore_products: bool,
    ) -> MarketResult<Vec<EntityId>> {
        self.store.in_transaction(|| {
            let arena = CategoryArena::from_rows(self.store.all_categories()?);
            if arena.get(category_id).is_none() {
                return Err(MarketError::not_found("category", category_id));
            }
            if !cascade && !arena.children_of(category_id).is_empty() {
                return Err(MarketError::Conflict(ConflictKind::HasChildren(
                    category_id.to_string(),
                )));
            }

            let doomed = arena.post_order(category_id);
            let in_use = self.store.active_product_count(&doomed)?;
            if in_use > 0 {
                if !ignore_products {
                    return Err(MarketError::Conflict(ConflictKind::CategoryInUse(
                        category_id.to_string(),
                        in_use,
                    )));
                }
                let detached = self.store.clear_product_category(&doomed)?;
                log::warn!("detached {detached} product(s) from removed category {category_id}");
            }

            for id in &doomed {
                self.store.delete_category(id)?;
                let cascaded_from = (id != category_id).then(|| category_id.to_string());
                self.record(
                    id,
                    &MarketEvent::CategoryDeleted {
                        category_id: id.clone(),
                        cascaded_from,
                    },
                )?;
            }
            log::info!("removed category {category_id} ({} node(s))", doomed.len());
            Ok(doomed)
        })
    }

    pub fn get(&self, category_id: &str) -> MarketResult<CategoryRow> {
        self.store
            .get_category(category_id)?
            .ok_or_else(|| MarketError::not_found("category", category_id))
    }

    /// Flat list in canonical (sort_order, name) order.
    pub fn list(&self) -> MarketResult<Vec<CategoryRow>> {
        self.store.all_categories()
    }

    pub fn tree(&self) -> MarketResult<Vec<CategoryTreeNode>> {
        Ok(CategoryArena::from_rows(self.store.all_categories()?).tree())
    }

    /// The category's own commission, when it declares one.
    pub fn custom_commission(category: &CategoryRow) -> Option<Commission> {
        category.has_custom_commission.then(|| {
            Commission::new(
                category.default_commission_type,
                category.default_commission_value,
            )
        })
    }
}

fn required_name(name: &str) -> MarketResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(MarketError::validation("name", "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Lower-case ASCII letters and digits, runs of anything else collapsed to '-'.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
