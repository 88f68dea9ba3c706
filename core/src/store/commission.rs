use super::{dec, get_dec, get_ts, ts, CommissionRuleRow, MarketStore};
use crate::error::MarketResult;
use rusqlite::{params, OptionalExtension, Row};

const RULE_COLUMNS: &str =
    "rule_id, vendor_id, category_id, commission_type, value, is_active, created_at, updated_at";

fn rule_from_row(r: &Row<'_>) -> rusqlite::Result<CommissionRuleRow> {
    Ok(CommissionRuleRow {
        rule_id: r.get(0)?,
        vendor_id: r.get(1)?,
        category_id: r.get(2)?,
        commission_type: r.get(3)?,
        value: get_dec(r, 4)?,
        is_active: r.get(5)?,
        created_at: get_ts(r, 6)?,
        updated_at: get_ts(r, 7)?,
    })
}

impl MarketStore {
    // ── Commission rules ──────────────────────────────────────────

    pub fn insert_commission_rule(&self, rule: &CommissionRuleRow) -> MarketResult<()> {
        self.conn.execute(
            &format!("INSERT INTO commission_rule ({RULE_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)"),
            params![
                rule.rule_id,
                rule.vendor_id,
                rule.category_id,
                rule.commission_type,
                dec(rule.value),
                rule.is_active,
                ts(rule.created_at),
                ts(rule.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_commission_rule(&self, rule_id: &str) -> MarketResult<Option<CommissionRuleRow>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM commission_rule WHERE rule_id = ?1"),
                params![rule_id],
                rule_from_row,
            )
            .optional()?)
    }

    pub fn update_commission_rule(&self, rule: &CommissionRuleRow) -> MarketResult<()> {
        self.conn.execute(
            "UPDATE commission_rule SET commission_type = ?1, value = ?2, is_active = ?3,
                updated_at = ?4
             WHERE rule_id = ?5",
            params![
                rule.commission_type,
                dec(rule.value),
                rule.is_active,
                ts(rule.updated_at),
                rule.rule_id,
            ],
        )?;
        Ok(())
    }

    pub fn delete_commission_rule(&self, rule_id: &str) -> MarketResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM commission_rule WHERE rule_id = ?1",
            params![rule_id],
        )?)
    }

    pub fn commission_rules_for_vendor(
        &self,
        vendor_id: &str,
    ) -> MarketResult<Vec<CommissionRuleRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM commission_rule WHERE vendor_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![vendor_id], rule_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Most recently touched active rule for (vendor, category).
    /// `category_id = None` selects vendor-wide rules. Duplicates are tolerated:
    /// the latest `updated_at`, then `created_at`, then insertion order wins.
    pub fn latest_active_rule(
        &self,
        vendor_id: &str,
        category_id: Option<&str>,
    ) -> MarketResult<Option<CommissionRuleRow>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {RULE_COLUMNS} FROM commission_rule
                     WHERE vendor_id = ?1 AND category_id IS ?2 AND is_active = 1
                     ORDER BY updated_at DESC, created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![vendor_id, category_id],
                rule_from_row,
            )
            .optional()?)
    }

    pub fn active_rule_exists(
        &self,
        vendor_id: &str,
        category_id: Option<&str>,
        exclude_rule_id: Option<&str>,
    ) -> MarketResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM commission_rule
             WHERE vendor_id = ?1 AND category_id IS ?2 AND is_active = 1 AND rule_id IS NOT ?3",
            params![vendor_id, category_id, exclude_rule_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }
}
