//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components call typed, entity-scoped store methods; they never execute SQL directly.
//! Every state-changing UPDATE carries its precondition in the WHERE clause and
//! reports whether a row actually moved.

use crate::{
    error::{MarketError, MarketResult},
    event::EventLogEntry,
    types::{
        Amount, CommissionType, EntityId, IssueStatus, KycStatus, PayoutStatus, StatementStatus,
        Timestamp, VendorStatus,
    },
};
use chrono::DateTime;
use rusqlite::{
    params, types::Type, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

mod category;
mod commission;
mod payout;
mod statement;
mod vendor;

pub use vendor::VendorIdentifier;

pub struct MarketStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file or shared-cache URI
}

impl MarketStore {
    pub fn open(path: &str) -> MarketResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> MarketResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open a second connection to the same database.
    /// For a private in-memory database this returns a new, isolated one;
    /// use a `file:<name>?mode=memory&cache=shared` URI to share.
    pub fn reopen(&self) -> MarketResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Idempotent.
    pub fn migrate(&self) -> MarketResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_categories.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_vendors.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_commission.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/005_settlement.sql"))?;
        Ok(())
    }

    /// Run `f` inside one IMMEDIATE transaction: the write lock is taken up
    /// front, so reads done by `f` cannot be invalidated before its writes land.
    /// Rolls back when `f` fails. Must not be nested.
    pub fn in_transaction<T>(&self, f: impl FnOnce() -> MarketResult<T>) -> MarketResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f()?;
        tx.commit()?;
        Ok(out)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> MarketResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (subsystem, event_type, entity_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.subsystem,
                entry.event_type,
                entry.entity_id,
                entry.payload,
                ts(entry.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_entity(&self, entity_id: &str) -> MarketResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subsystem, event_type, entity_id, payload, created_at
             FROM event_log WHERE entity_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![entity_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    subsystem: row.get(1)?,
                    event_type: row.get(2)?,
                    entity_id: row.get(3)?,
                    payload: row.get(4)?,
                    created_at: get_ts(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> MarketResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |r| r.get(0))?)
    }

    // ── Platform settings ──────────────────────────────────────

    pub fn platform_setting(&self, key: &str) -> MarketResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM platform_setting WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?)
    }

    pub fn set_platform_setting(&self, key: &str, value: &str, now: Timestamp) -> MarketResult<()> {
        self.conn.execute(
            "INSERT INTO platform_setting (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, ts(now)],
        )?;
        Ok(())
    }
}

// ── Column codecs ──────────────────────────────────────────────────

pub(crate) fn ts(t: Timestamp) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Timestamp> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Timestamp>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(ms) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms)),
        None => Ok(None),
    }
}

pub(crate) fn dec(value: Amount) -> String {
    value.to_string()
}

pub(crate) fn get_dec(row: &Row<'_>, idx: usize) -> rusqlite::Result<Amount> {
    let text: String = row.get(idx)?;
    parse_dec(idx, &text)
}

pub(crate) fn get_opt_dec(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Amount>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => parse_dec(idx, &text).map(Some),
        None => Ok(None),
    }
}

fn parse_dec(idx: usize, text: &str) -> rusqlite::Result<Amount> {
    Amount::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Renders `?N, ?N+1, ...` for an IN (...) list starting at placeholder `start`.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub category_id: EntityId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<EntityId>,
    pub level: u32,
    pub sort_order: i64,
    pub is_active: bool,
    pub is_visible: bool,
    pub has_custom_commission: bool,
    pub default_commission_type: CommissionType,
    pub default_commission_value: Amount,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorRow {
    pub vendor_id: EntityId,
    pub name: String,
    pub legal_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub gst_number: Option<String>,
    pub pan_number: Option<String>,
    pub status: VendorStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorSettingRow {
    pub vendor_id: EntityId,
    pub auto_payout: bool,
    pub default_commission_type: Option<CommissionType>,
    pub default_commission_value: Option<Amount>,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorAddressRow {
    pub address_id: EntityId,
    pub vendor_id: EntityId,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub is_primary: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccountRow {
    pub bank_account_id: EntityId,
    pub vendor_id: EntityId,
    pub account_holder: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: Option<String>,
    pub is_primary: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycRow {
    pub kyc_id: EntityId,
    pub vendor_id: EntityId,
    pub doc_type: String,
    pub doc_reference: Option<String>,
    pub status: KycStatus,
    pub remarks: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRow {
    pub issue_id: EntityId,
    pub vendor_id: EntityId,
    pub subject: String,
    pub description: Option<String>,
    pub status: IssueStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRuleRow {
    pub rule_id: EntityId,
    pub vendor_id: EntityId,
    /// None = vendor-wide rule.
    pub category_id: Option<EntityId>,
    pub commission_type: CommissionType,
    pub value: Amount,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub product_id: EntityId,
    pub vendor_id: EntityId,
    pub category_id: Option<EntityId>,
    pub name: String,
    pub is_active: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRow {
    pub sale_id: EntityId,
    pub vendor_id: EntityId,
    pub product_id: EntityId,
    pub category_id: Option<EntityId>,
    pub amount: Amount,
    pub commission_type: CommissionType,
    pub commission_value: Amount,
    pub fee: Amount,
    pub sold_at: Timestamp,
}

/// Raw sums over a vendor's sales window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaleTotals {
    pub total_sales: Amount,
    pub total_fees: Amount,
    pub sale_count: i64,
}

impl SaleTotals {
    pub fn add(&mut self, amount: Amount, fee: Amount) -> MarketResult<()> {
        self.total_sales = checked_sum(self.total_sales, amount)?;
        self.total_fees = checked_sum(self.total_fees, fee)?;
        self.sale_count += 1;
        Ok(())
    }

    /// `total_sales - total_fees`.
    pub fn net(&self) -> MarketResult<Amount> {
        self.total_sales
            .checked_sub(self.total_fees)
            .ok_or_else(|| MarketError::validation("net_amount", "net amount is out of range"))
    }
}

pub(crate) fn checked_sum(total: Amount, next: Amount) -> MarketResult<Amount> {
    total
        .checked_add(next)
        .ok_or_else(|| MarketError::validation("amount", "total is out of range"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub statement_id: EntityId,
    pub vendor_id: EntityId,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub total_sales: Amount,
    pub total_fees: Amount,
    pub net_amount: Amount,
    pub sale_count: i64,
    pub status: StatementStatus,
    pub finalized_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRow {
    pub payout_id: EntityId,
    pub vendor_id: EntityId,
    pub statement_id: Option<EntityId>,
    pub amount: Amount,
    pub status: PayoutStatus,
    pub reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// A finalized statement still owed to its vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutDueRow {
    pub statement: StatementRow,
    /// Status of the statement's current non-failed payout, if one exists.
    pub open_payout_status: Option<PayoutStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending_vendors: i64,
    pub pending_kyc: i64,
    pub payouts_due: i64,
    pub payouts_due_amount: Amount,
}
