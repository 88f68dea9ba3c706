use super::{
    dec, get_dec, get_opt_ts, get_ts, ts, MarketStore, ProductRow, SaleRow, SaleTotals,
    StatementRow,
};
use crate::{error::MarketResult, types::Timestamp};
use rusqlite::{params, OptionalExtension, Row};

const STATEMENT_COLUMNS: &str = "statement_id, vendor_id, period_start, period_end, total_sales,
     total_fees, net_amount, sale_count, status, finalized_at, created_at, updated_at";

pub(super) fn statement_from_row(r: &Row<'_>) -> rusqlite::Result<StatementRow> {
    Ok(StatementRow {
        statement_id: r.get(0)?,
        vendor_id: r.get(1)?,
        period_start: get_ts(r, 2)?,
        period_end: get_ts(r, 3)?,
        total_sales: get_dec(r, 4)?,
        total_fees: get_dec(r, 5)?,
        net_amount: get_dec(r, 6)?,
        sale_count: r.get(7)?,
        status: r.get(8)?,
        finalized_at: get_opt_ts(r, 9)?,
        created_at: get_ts(r, 10)?,
        updated_at: get_ts(r, 11)?,
    })
}

/// Qualified column list for joins against vendor_statement aliased as `s`.
pub(super) fn statement_columns_as(alias: &str) -> String {
    STATEMENT_COLUMNS
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl MarketStore {
    // ── Products ──────────────────────────────────────────────────

    pub fn insert_product(&self, p: &ProductRow) -> MarketResult<()> {
        self.conn.execute(
            "INSERT INTO product (product_id, vendor_id, category_id, name, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                p.product_id,
                p.vendor_id,
                p.category_id,
                p.name,
                p.is_active,
                ts(p.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_product(&self, product_id: &str) -> MarketResult<Option<ProductRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT product_id, vendor_id, category_id, name, is_active, created_at
                 FROM product WHERE product_id = ?1",
                params![product_id],
                |r| {
                    Ok(ProductRow {
                        product_id: r.get(0)?,
                        vendor_id: r.get(1)?,
                        category_id: r.get(2)?,
                        name: r.get(3)?,
                        is_active: r.get(4)?,
                        created_at: get_ts(r, 5)?,
                    })
                },
            )
            .optional()?)
    }

    // ── Sales ledger ──────────────────────────────────────────────

    pub fn insert_sale(&self, s: &SaleRow) -> MarketResult<()> {
        self.conn.execute(
            "INSERT INTO vendor_sale (
                sale_id, vendor_id, product_id, category_id, amount,
                commission_type, commission_value, fee, sold_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                s.sale_id,
                s.vendor_id,
                s.product_id,
                s.category_id,
                dec(s.amount),
                s.commission_type,
                dec(s.commission_value),
                dec(s.fee),
                ts(s.sold_at),
            ],
        )?;
        Ok(())
    }

    /// Exact sums over sales with `sold_at` in `[start, end)`.
    /// Amounts are TEXT decimals, so they are summed here rather than by SQLite's
    /// floating-point SUM().
    pub fn sale_totals(
        &self,
        vendor_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> MarketResult<SaleTotals> {
        let mut stmt = self.conn.prepare(
            "SELECT amount, fee FROM vendor_sale
             WHERE vendor_id = ?1 AND sold_at >= ?2 AND sold_at < ?3",
        )?;
        let mut rows = stmt.query(params![vendor_id, ts(start), ts(end)])?;
        let mut totals = SaleTotals::default();
        while let Some(row) = rows.next()? {
            totals.add(get_dec(row, 0)?, get_dec(row, 1)?)?;
        }
        Ok(totals)
    }

    // ── Statements ────────────────────────────────────────────────

    pub fn insert_statement(&self, s: &StatementRow) -> MarketResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO vendor_statement ({STATEMENT_COLUMNS})
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)"
            ),
            params![
                s.statement_id,
                s.vendor_id,
                ts(s.period_start),
                ts(s.period_end),
                dec(s.total_sales),
                dec(s.total_fees),
                dec(s.net_amount),
                s.sale_count,
                s.status,
                s.finalized_at.map(ts),
                ts(s.created_at),
                ts(s.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_statement(&self, statement_id: &str) -> MarketResult<Option<StatementRow>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {STATEMENT_COLUMNS} FROM vendor_statement WHERE statement_id = ?1"),
                params![statement_id],
                statement_from_row,
            )
            .optional()?)
    }

    /// Newest period first.
    pub fn statements_for_vendor(&self, vendor_id: &str) -> MarketResult<Vec<StatementRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STATEMENT_COLUMNS} FROM vendor_statement WHERE vendor_id = ?1
             ORDER BY period_start DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![vendor_id], statement_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// An existing statement of `vendor_id` whose window intersects `[start, end)`.
    pub fn overlapping_statement(
        &self,
        vendor_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> MarketResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT statement_id FROM vendor_statement
                 WHERE vendor_id = ?1 AND period_start < ?3 AND period_end > ?2
                 ORDER BY period_start ASC LIMIT 1",
                params![vendor_id, ts(start), ts(end)],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// Rewrite totals of a DRAFT statement. False when it is no longer a draft.
    pub fn refresh_draft_statement(
        &self,
        statement_id: &str,
        totals: &SaleTotals,
        now: Timestamp,
    ) -> MarketResult<bool> {
        let net = totals.net()?;
        let n = self.conn.execute(
            "UPDATE vendor_statement SET total_sales = ?1, total_fees = ?2, net_amount = ?3,
                sale_count = ?4, updated_at = ?5
             WHERE statement_id = ?6 AND status = 'draft'",
            params![
                dec(totals.total_sales),
                dec(totals.total_fees),
                dec(net),
                totals.sale_count,
                ts(now),
                statement_id,
            ],
        )?;
        Ok(n == 1)
    }

    /// DRAFT → FINALIZED. False when the statement was not a draft.
    pub fn finalize_draft_statement(&self, statement_id: &str, now: Timestamp) -> MarketResult<bool> {
        let n = self.conn.execute(
            "UPDATE vendor_statement SET status = 'finalized', finalized_at = ?1, updated_at = ?1
             WHERE statement_id = ?2 AND status = 'draft'",
            params![ts(now), statement_id],
        )?;
        Ok(n == 1)
    }
}
