use super::{
    dec, get_opt_dec, get_ts, ts, BankAccountRow, IssueRow, KycRow, MarketStore,
    VendorAddressRow, VendorRow, VendorSettingRow,
};
use crate::{
    error::{is_unique_violation, ConflictKind, MarketError, MarketResult},
    types::{KycStatus, Page, Timestamp, VendorStatus},
};
use rusqlite::{params, OptionalExtension, Row};

const VENDOR_COLUMNS: &str = "vendor_id, name, legal_name, email, phone, gst_number, pan_number,
     status, created_at, updated_at";

const KYC_COLUMNS: &str =
    "kyc_id, vendor_id, doc_type, doc_reference, status, remarks, created_at, updated_at";

/// Vendor columns that must be unique across vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorIdentifier {
    Email,
    Gst,
    Pan,
}

impl VendorIdentifier {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Gst => "gst_number",
            Self::Pan => "pan_number",
        }
    }
}

fn vendor_from_row(r: &Row<'_>) -> rusqlite::Result<VendorRow> {
    Ok(VendorRow {
        vendor_id: r.get(0)?,
        name: r.get(1)?,
        legal_name: r.get(2)?,
        email: r.get(3)?,
        phone: r.get(4)?,
        gst_number: r.get(5)?,
        pan_number: r.get(6)?,
        status: r.get(7)?,
        created_at: get_ts(r, 8)?,
        updated_at: get_ts(r, 9)?,
    })
}

fn kyc_from_row(r: &Row<'_>) -> rusqlite::Result<KycRow> {
    Ok(KycRow {
        kyc_id: r.get(0)?,
        vendor_id: r.get(1)?,
        doc_type: r.get(2)?,
        doc_reference: r.get(3)?,
        status: r.get(4)?,
        remarks: r.get(5)?,
        created_at: get_ts(r, 6)?,
        updated_at: get_ts(r, 7)?,
    })
}

impl MarketStore {
    // ── Vendor ────────────────────────────────────────────────────

    pub fn insert_vendor(&self, v: &VendorRow) -> MarketResult<()> {
        self.conn
            .execute(
                &format!("INSERT INTO vendor ({VENDOR_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)"),
                params![
                    v.vendor_id,
                    v.name,
                    v.legal_name,
                    v.email,
                    v.phone,
                    v.gst_number,
                    v.pan_number,
                    v.status,
                    ts(v.created_at),
                    ts(v.updated_at),
                ],
            )
            .map_err(|e| identifier_conflict(e, v))?;
        Ok(())
    }

    pub fn get_vendor(&self, vendor_id: &str) -> MarketResult<Option<VendorRow>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {VENDOR_COLUMNS} FROM vendor WHERE vendor_id = ?1"),
                params![vendor_id],
                vendor_from_row,
            )
            .optional()?)
    }

    /// The vendor (other than `exclude_id`) already holding `value`, if any.
    pub fn vendor_holding_identifier(
        &self,
        identifier: VendorIdentifier,
        value: &str,
        exclude_id: Option<&str>,
    ) -> MarketResult<Option<String>> {
        let sql = format!(
            "SELECT vendor_id FROM vendor WHERE {} = ?1 AND vendor_id IS NOT ?2 LIMIT 1",
            identifier.column()
        );
        Ok(self
            .conn
            .query_row(&sql, params![value, exclude_id], |r| r.get(0))
            .optional()?)
    }

    /// Profile columns only; status is never written here.
    pub fn update_vendor_profile(&self, v: &VendorRow) -> MarketResult<()> {
        self.conn
            .execute(
                "UPDATE vendor SET name = ?1, legal_name = ?2, email = ?3, phone = ?4,
                    gst_number = ?5, pan_number = ?6, updated_at = ?7
                 WHERE vendor_id = ?8",
                params![
                    v.name,
                    v.legal_name,
                    v.email,
                    v.phone,
                    v.gst_number,
                    v.pan_number,
                    ts(v.updated_at),
                    v.vendor_id,
                ],
            )
            .map_err(|e| identifier_conflict(e, v))?;
        Ok(())
    }

    /// Move a vendor from `from` to `to`. False when the vendor is no longer in `from`.
    pub fn transition_vendor_status(
        &self,
        vendor_id: &str,
        from: VendorStatus,
        to: VendorStatus,
        now: Timestamp,
    ) -> MarketResult<bool> {
        let n = self.conn.execute(
            "UPDATE vendor SET status = ?1, updated_at = ?2
             WHERE vendor_id = ?3 AND status = ?4",
            params![to, ts(now), vendor_id, from],
        )?;
        Ok(n == 1)
    }

    pub fn vendor_count_by_status(&self, status: VendorStatus) -> MarketResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM vendor WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?)
    }

    /// Oldest first; ties broken by insertion order.
    pub fn vendors_by_status(
        &self,
        status: VendorStatus,
        page: Page,
    ) -> MarketResult<Vec<VendorRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VENDOR_COLUMNS} FROM vendor WHERE status = ?1
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![status, page.per_page, page.offset()],
            vendor_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Vendor setting ────────────────────────────────────────────

    pub fn insert_vendor_setting(&self, s: &VendorSettingRow) -> MarketResult<()> {
        self.conn.execute(
            "INSERT INTO vendor_setting (
                vendor_id, auto_payout, default_commission_type, default_commission_value, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(vendor_id) DO UPDATE SET
                auto_payout = excluded.auto_payout,
                default_commission_type = excluded.default_commission_type,
                default_commission_value = excluded.default_commission_value,
                updated_at = excluded.updated_at",
            params![
                s.vendor_id,
                s.auto_payout,
                s.default_commission_type,
                s.default_commission_value.map(dec),
                ts(s.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_vendor_setting(&self, vendor_id: &str) -> MarketResult<Option<VendorSettingRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT vendor_id, auto_payout, default_commission_type,
                        default_commission_value, updated_at
                 FROM vendor_setting WHERE vendor_id = ?1",
                params![vendor_id],
                |r| {
                    Ok(VendorSettingRow {
                        vendor_id: r.get(0)?,
                        auto_payout: r.get(1)?,
                        default_commission_type: r.get(2)?,
                        default_commission_value: get_opt_dec(r, 3)?,
                        updated_at: get_ts(r, 4)?,
                    })
                },
            )
            .optional()?)
    }

    // ── Address / bank account ────────────────────────────────────

    pub fn insert_address(&self, a: &VendorAddressRow) -> MarketResult<()> {
        self.conn.execute(
            "INSERT INTO vendor_address (
                address_id, vendor_id, line1, line2, city, state, postal_code, country,
                is_primary, created_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                a.address_id,
                a.vendor_id,
                a.line1,
                a.line2,
                a.city,
                a.state,
                a.postal_code,
                a.country,
                a.is_primary,
                ts(a.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn address_count(&self, vendor_id: &str) -> MarketResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM vendor_address WHERE vendor_id = ?1",
            params![vendor_id],
            |r| r.get(0),
        )?)
    }

    pub fn insert_bank_account(&self, b: &BankAccountRow) -> MarketResult<()> {
        self.conn.execute(
            "INSERT INTO vendor_bank_account (
                bank_account_id, vendor_id, account_holder, account_number, ifsc_code,
                bank_name, is_primary, created_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                b.bank_account_id,
                b.vendor_id,
                b.account_holder,
                b.account_number,
                b.ifsc_code,
                b.bank_name,
                b.is_primary,
                ts(b.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn bank_account_count(&self, vendor_id: &str) -> MarketResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM vendor_bank_account WHERE vendor_id = ?1",
            params![vendor_id],
            |r| r.get(0),
        )?)
    }

    // ── KYC ───────────────────────────────────────────────────────

    pub fn insert_kyc(&self, k: &KycRow) -> MarketResult<()> {
        self.conn.execute(
            &format!("INSERT INTO vendor_kyc ({KYC_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)"),
            params![
                k.kyc_id,
                k.vendor_id,
                k.doc_type,
                k.doc_reference,
                k.status,
                k.remarks,
                ts(k.created_at),
                ts(k.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_kyc(&self, kyc_id: &str) -> MarketResult<Option<KycRow>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {KYC_COLUMNS} FROM vendor_kyc WHERE kyc_id = ?1"),
                params![kyc_id],
                kyc_from_row,
            )
            .optional()?)
    }

    /// KYC documents of a vendor that have not been rejected.
    pub fn live_kyc_count(&self, vendor_id: &str) -> MarketResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM vendor_kyc WHERE vendor_id = ?1 AND status <> 'rejected'",
            params![vendor_id],
            |r| r.get(0),
        )?)
    }

    /// Review a pending document. False when it is no longer pending.
    pub fn review_pending_kyc(
        &self,
        kyc_id: &str,
        to: KycStatus,
        remarks: Option<&str>,
        now: Timestamp,
    ) -> MarketResult<bool> {
        let n = self.conn.execute(
            "UPDATE vendor_kyc SET status = ?1, remarks = COALESCE(?2, remarks), updated_at = ?3
             WHERE kyc_id = ?4 AND status = 'pending'",
            params![to, remarks, ts(now), kyc_id],
        )?;
        Ok(n == 1)
    }

    pub fn kyc_count_by_status(&self, status: KycStatus) -> MarketResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM vendor_kyc WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?)
    }

    pub fn kyc_by_status(&self, status: KycStatus, page: Page) -> MarketResult<Vec<KycRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {KYC_COLUMNS} FROM vendor_kyc WHERE status = ?1
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(params![status, page.per_page, page.offset()], kyc_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Issues ────────────────────────────────────────────────────

    pub fn insert_issue(&self, i: &IssueRow) -> MarketResult<()> {
        self.conn.execute(
            "INSERT INTO vendor_issue (
                issue_id, vendor_id, subject, description, status, created_at, updated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                i.issue_id,
                i.vendor_id,
                i.subject,
                i.description,
                i.status,
                ts(i.created_at),
                ts(i.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn issues_for_vendor(&self, vendor_id: &str) -> MarketResult<Vec<IssueRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, vendor_id, subject, description, status, created_at, updated_at
             FROM vendor_issue WHERE vendor_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![vendor_id], |r| {
            Ok(IssueRow {
                issue_id: r.get(0)?,
                vendor_id: r.get(1)?,
                subject: r.get(2)?,
                description: r.get(3)?,
                status: r.get(4)?,
                created_at: get_ts(r, 5)?,
                updated_at: get_ts(r, 6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

/// Translate a UNIQUE failure on vendor into the identifier that collided.
fn identifier_conflict(e: rusqlite::Error, v: &VendorRow) -> MarketError {
    if !is_unique_violation(&e) {
        return e.into();
    }
    let message = e.to_string();
    let (field, value) = if message.contains("vendor.gst_number") {
        ("gst_number", v.gst_number.clone().unwrap_or_default())
    } else if message.contains("vendor.pan_number") {
        ("pan_number", v.pan_number.clone().unwrap_or_default())
    } else {
        ("email", v.email.clone())
    };
    MarketError::Conflict(ConflictKind::DuplicateIdentifier { field, value })
}
