use super::{
    checked_sum, dec, get_dec, get_opt_ts, get_ts,
    statement::{statement_columns_as, statement_from_row},
    ts, MarketStore, PayoutDueRow, PayoutRow,
};
use crate::{
    error::{is_unique_violation, ConflictKind, MarketError, MarketResult},
    types::{Amount, Page, PayoutStatus, Timestamp},
};
use rusqlite::{params, OptionalExtension, Row};

const PAYOUT_COLUMNS: &str = "payout_id, vendor_id, statement_id, amount, status, reference,
     failure_reason, created_at, updated_at, completed_at";

const PAYOUT_DUE_FILTER: &str = "s.status = 'finalized'
     AND NOT EXISTS (
         SELECT 1 FROM payout p
         WHERE p.statement_id = s.statement_id AND p.status = 'completed'
     )";

fn payout_from_row(r: &Row<'_>) -> rusqlite::Result<PayoutRow> {
    Ok(PayoutRow {
        payout_id: r.get(0)?,
        vendor_id: r.get(1)?,
        statement_id: r.get(2)?,
        amount: get_dec(r, 3)?,
        status: r.get(4)?,
        reference: r.get(5)?,
        failure_reason: r.get(6)?,
        created_at: get_ts(r, 7)?,
        updated_at: get_ts(r, 8)?,
        completed_at: get_opt_ts(r, 9)?,
    })
}

impl MarketStore {
    // ── Payouts ───────────────────────────────────────────────────

    /// Insert a payout. The partial unique index on (statement_id) for non-failed
    /// rows is the authoritative duplicate guard; a violation surfaces as
    /// `Conflict(DuplicatePayout)`.
    pub fn insert_payout(&self, p: &PayoutRow) -> MarketResult<()> {
        self.conn
            .execute(
                &format!("INSERT INTO payout ({PAYOUT_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)"),
                params![
                    p.payout_id,
                    p.vendor_id,
                    p.statement_id,
                    dec(p.amount),
                    p.status,
                    p.reference,
                    p.failure_reason,
                    ts(p.created_at),
                    ts(p.updated_at),
                    p.completed_at.map(ts),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MarketError::Conflict(ConflictKind::DuplicatePayout(
                        p.statement_id.clone().unwrap_or_default(),
                    ))
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    pub fn get_payout(&self, payout_id: &str) -> MarketResult<Option<PayoutRow>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {PAYOUT_COLUMNS} FROM payout WHERE payout_id = ?1"),
                params![payout_id],
                payout_from_row,
            )
            .optional()?)
    }

    /// The statement's INITIATED or COMPLETED payout, if any.
    pub fn open_payout_for_statement(&self, statement_id: &str) -> MarketResult<Option<PayoutRow>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {PAYOUT_COLUMNS} FROM payout
                     WHERE statement_id = ?1 AND status <> 'failed' LIMIT 1"
                ),
                params![statement_id],
                payout_from_row,
            )
            .optional()?)
    }

    pub fn payouts_for_vendor(&self, vendor_id: &str) -> MarketResult<Vec<PayoutRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payout WHERE vendor_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![vendor_id], payout_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every attempt for a statement, oldest first.
    pub fn payouts_for_statement(&self, statement_id: &str) -> MarketResult<Vec<PayoutRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payout WHERE statement_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![statement_id], payout_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// INITIATED → `to`. False when the payout is no longer INITIATED.
    pub fn settle_initiated_payout(
        &self,
        payout_id: &str,
        to: PayoutStatus,
        reference: Option<&str>,
        failure_reason: Option<&str>,
        now: Timestamp,
    ) -> MarketResult<bool> {
        let completed_at = (to == PayoutStatus::Completed).then(|| ts(now));
        let n = self.conn.execute(
            "UPDATE payout SET status = ?1, reference = ?2, failure_reason = ?3,
                completed_at = ?4, updated_at = ?5
             WHERE payout_id = ?6 AND status = 'initiated'",
            params![to, reference, failure_reason, completed_at, ts(now), payout_id],
        )?;
        Ok(n == 1)
    }

    // ── Payout due queue ──────────────────────────────────────────

    /// FINALIZED statements without a COMPLETED payout, oldest period_end first.
    pub fn payouts_due(&self, page: Page) -> MarketResult<Vec<PayoutDueRow>> {
        let columns = statement_columns_as("s");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {columns},
                    (SELECT p.status FROM payout p
                     WHERE p.statement_id = s.statement_id AND p.status <> 'failed'
                     LIMIT 1)
             FROM vendor_statement s
             WHERE {PAYOUT_DUE_FILTER}
             ORDER BY s.period_end ASC, s.rowid ASC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![page.per_page, page.offset()], |r| {
            Ok(PayoutDueRow {
                statement: statement_from_row(r)?,
                open_payout_status: r.get(12)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn payouts_due_count(&self) -> MarketResult<i64> {
        Ok(self.conn.query_row(
            &format!("SELECT COUNT(*) FROM vendor_statement s WHERE {PAYOUT_DUE_FILTER}"),
            [],
            |r| r.get(0),
        )?)
    }

    /// Exact total of net amounts still owed.
    pub fn payouts_due_amount(&self) -> MarketResult<Amount> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT s.net_amount FROM vendor_statement s WHERE {PAYOUT_DUE_FILTER}"
        ))?;
        let mut rows = stmt.query([])?;
        let mut total = Amount::ZERO;
        while let Some(row) = rows.next()? {
            total = checked_sum(total, get_dec(row, 0)?)?;
        }
        Ok(total)
    }
}
