use super::{dec, get_dec, get_ts, placeholders, ts, CategoryRow, MarketStore};
use crate::{
    error::{is_unique_violation, ConflictKind, MarketError, MarketResult},
    types::Timestamp,
};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const CATEGORY_COLUMNS: &str = "category_id, name, slug, description, parent_id, level, sort_order,
     is_active, is_visible, has_custom_commission, default_commission_type,
     default_commission_value, created_at, updated_at";

fn category_from_row(r: &Row<'_>) -> rusqlite::Result<CategoryRow> {
    Ok(CategoryRow {
        category_id: r.get(0)?,
        name: r.get(1)?,
        slug: r.get(2)?,
        description: r.get(3)?,
        parent_id: r.get(4)?,
        level: r.get(5)?,
        sort_order: r.get(6)?,
        is_active: r.get(7)?,
        is_visible: r.get(8)?,
        has_custom_commission: r.get(9)?,
        default_commission_type: r.get(10)?,
        default_commission_value: get_dec(r, 11)?,
        created_at: get_ts(r, 12)?,
        updated_at: get_ts(r, 13)?,
    })
}

impl MarketStore {
    // ── Category ──────────────────────────────────────────────────

    pub fn insert_category(&self, c: &CategoryRow) -> MarketResult<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO category ({CATEGORY_COLUMNS})
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)"
                ),
                params![
                    c.category_id,
                    c.name,
                    c.slug,
                    c.description,
                    c.parent_id,
                    c.level,
                    c.sort_order,
                    c.is_active,
                    c.is_visible,
                    c.has_custom_commission,
                    c.default_commission_type,
                    dec(c.default_commission_value),
                    ts(c.created_at),
                    ts(c.updated_at),
                ],
            )
            .map_err(|e| slug_conflict(e, &c.slug))?;
        Ok(())
    }

    pub fn get_category(&self, category_id: &str) -> MarketResult<Option<CategoryRow>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM category WHERE category_id = ?1"),
                params![category_id],
                category_from_row,
            )
            .optional()?)
    }

    /// Every category, in canonical sibling order (sort_order, name).
    pub fn all_categories(&self) -> MarketResult<Vec<CategoryRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM category
             ORDER BY sort_order ASC, name ASC, category_id ASC"
        ))?;
        let rows = stmt.query_map([], category_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn slug_taken(&self, slug: &str, exclude_id: Option<&str>) -> MarketResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM category WHERE slug = ?1 AND category_id IS NOT ?2",
            params![slug, exclude_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Overwrite every mutable column of an existing category.
    pub fn update_category(&self, c: &CategoryRow) -> MarketResult<()> {
        self.conn
            .execute(
                "UPDATE category SET
                    name = ?1, slug = ?2, description = ?3, parent_id = ?4, level = ?5,
                    sort_order = ?6, is_active = ?7, is_visible = ?8,
                    has_custom_commission = ?9, default_commission_type = ?10,
                    default_commission_value = ?11, updated_at = ?12
                 WHERE category_id = ?13",
                params![
                    c.name,
                    c.slug,
                    c.description,
                    c.parent_id,
                    c.level,
                    c.sort_order,
                    c.is_active,
                    c.is_visible,
                    c.has_custom_commission,
                    c.default_commission_type,
                    dec(c.default_commission_value),
                    ts(c.updated_at),
                    c.category_id,
                ],
            )
            .map_err(|e| slug_conflict(e, &c.slug))?;
        Ok(())
    }

    pub fn set_category_level(
        &self,
        category_id: &str,
        level: u32,
        now: Timestamp,
    ) -> MarketResult<()> {
        self.conn.execute(
            "UPDATE category SET level = ?1, updated_at = ?2 WHERE category_id = ?3",
            params![level, ts(now), category_id],
        )?;
        Ok(())
    }

    pub fn child_count(&self, category_id: &str) -> MarketResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM category WHERE parent_id = ?1",
            params![category_id],
            |r| r.get(0),
        )?)
    }

    /// Returns the number of rows removed (0 or 1).
    pub fn delete_category(&self, category_id: &str) -> MarketResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM category WHERE category_id = ?1",
            params![category_id],
        )?)
    }

    pub fn active_product_count(&self, category_ids: &[String]) -> MarketResult<i64> {
        if category_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM product WHERE is_active = 1 AND category_id IN ({})",
            placeholders(1, category_ids.len())
        );
        Ok(self
            .conn
            .query_row(&sql, params_from_iter(category_ids.iter()), |r| r.get(0))?)
    }

    /// Detach products from categories about to be removed.
    pub fn clear_product_category(&self, category_ids: &[String]) -> MarketResult<usize> {
        if category_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE product SET category_id = NULL WHERE category_id IN ({})",
            placeholders(1, category_ids.len())
        );
        Ok(self.conn.execute(&sql, params_from_iter(category_ids.iter()))?)
    }
}

fn slug_conflict(e: rusqlite::Error, slug: &str) -> MarketError {
    if is_unique_violation(&e) {
        MarketError::Conflict(ConflictKind::DuplicateSlug(slug.to_string()))
    } else {
        e.into()
    }
}
