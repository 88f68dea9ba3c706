//! Operational queues: approval, KYC review and payout due.
//!
//! Reads are plain ordered pages. Bulk writes move one row per transaction and
//! each move is conditional on the row still being PENDING, so two operators
//! working the same page never both count a row as updated.

use crate::{
    clock::Clock,
    config::MarketConfig,
    error::{ErrorKind, MarketError, MarketResult, SkippedItem},
    store::{KycRow, MarketStore, PayoutDueRow, QueueStats, VendorRow},
    subsystem::MarketSubsystem,
    types::{EntityId, KycStatus, Page, PageResult, VendorStatus},
    vendor_subsystem::VendorSubsystem,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub updated: usize,
    pub updated_ids: Vec<EntityId>,
    pub skipped: Vec<SkippedItem>,
}

impl BulkOutcome {
    fn absorb(&mut self, id: &str, result: MarketResult<Option<SkippedItem>>) -> MarketResult<()> {
        match result {
            Ok(None) => {
                self.updated += 1;
                self.updated_ids.push(id.to_string());
            }
            Ok(Some(skip)) => {
                log::warn!("bulk skip {id}: {}", skip.message);
                self.skipped.push(skip);
            }
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(e) => self.skipped.push(SkippedItem::from_error(id, &e)),
        }
        Ok(())
    }
}

pub struct QueueSubsystem<'a> {
    store: &'a MarketStore,
    clock: &'a dyn Clock,
    config: &'a MarketConfig,
    vendors: VendorSubsystem<'a>,
}

impl MarketSubsystem for QueueSubsystem<'_> {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn store(&self) -> &MarketStore {
        self.store
    }

    fn clock(&self) -> &dyn Clock {
        self.clock
    }
}

impl<'a> QueueSubsystem<'a> {
    pub fn new(
        store: &'a MarketStore,
        clock: &'a dyn Clock,
        config: &'a MarketConfig,
        vendors: VendorSubsystem<'a>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            vendors,
        }
    }

    /// 1-based page with the size clamped to the configured maximum.
    pub fn page(&self, page: Option<u32>, per_page: Option<u32>) -> Page {
        Page::new(page.unwrap_or(1).max(1), self.config.page_size(per_page))
    }

    // ── Approval queue ────────────────────────────────────────────

    /// PENDING vendors, oldest first.
    pub fn approval_queue(&self, page: Page) -> MarketResult<PageResult<VendorRow>> {
        let items = self.store.vendors_by_status(VendorStatus::Pending, page)?;
        let total = self.store.vendor_count_by_status(VendorStatus::Pending)?;
        log::debug!("approval queue page {}: {} of {total}", page.page, items.len());
        Ok(PageResult {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    pub fn bulk_approve_vendors(&self, vendor_ids: &[EntityId]) -> MarketResult<BulkOutcome> {
        self.bulk_move_pending(vendor_ids, VendorStatus::Active, None)
    }

    pub fn bulk_reject_vendors(
        &self,
        vendor_ids: &[EntityId],
        reason: Option<&str>,
    ) -> MarketResult<BulkOutcome> {
        self.bulk_move_pending(vendor_ids, VendorStatus::Rejected, reason)
    }

    fn bulk_move_pending(
        &self,
        vendor_ids: &[EntityId],
        to: VendorStatus,
        reason: Option<&str>,
    ) -> MarketResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for id in vendor_ids {
            let result = self.store.in_transaction(|| {
                if self
                    .vendors
                    .transition_in_tx(id, VendorStatus::Pending, to, reason, false)?
                {
                    return Ok(None);
                }
                Ok(Some(match self.store.get_vendor(id)? {
                    None => SkippedItem::from_error(id, &MarketError::not_found("vendor", id)),
                    Some(v) => SkippedItem::new(
                        id,
                        ErrorKind::InvalidState,
                        format!("vendor is {}, not pending", v.status),
                    ),
                }))
            });
            outcome.absorb(id, result)?;
        }
        log::info!(
            "bulk {to}: {} updated, {} skipped",
            outcome.updated,
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    // ── KYC review queue ──────────────────────────────────────────

    /// PENDING KYC documents, oldest first.
    pub fn kyc_queue(&self, page: Page) -> MarketResult<PageResult<KycRow>> {
        let items = self.store.kyc_by_status(KycStatus::Pending, page)?;
        let total = self.store.kyc_count_by_status(KycStatus::Pending)?;
        Ok(PageResult {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// Review one document. Fails when it is missing or already reviewed.
    pub fn review_kyc(
        &self,
        kyc_id: &str,
        approve: bool,
        remarks: Option<&str>,
    ) -> MarketResult<KycRow> {
        self.store.in_transaction(|| {
            if let Some(row) = self.vendors.review_kyc_in_tx(kyc_id, approve, remarks)? {
                return Ok(row);
            }
            Err(self.kyc_not_pending(kyc_id)?)
        })
    }

    pub fn bulk_approve_kyc(&self, kyc_ids: &[EntityId]) -> MarketResult<BulkOutcome> {
        self.bulk_review_kyc(kyc_ids, true, None)
    }

    pub fn bulk_reject_kyc(
        &self,
        kyc_ids: &[EntityId],
        remarks: Option<&str>,
    ) -> MarketResult<BulkOutcome> {
        self.bulk_review_kyc(kyc_ids, false, remarks)
    }

    fn bulk_review_kyc(
        &self,
        kyc_ids: &[EntityId],
        approve: bool,
        remarks: Option<&str>,
    ) -> MarketResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for id in kyc_ids {
            let result = self.store.in_transaction(|| {
                match self.vendors.review_kyc_in_tx(id, approve, remarks)? {
                    Some(_) => Ok(None),
                    None => Ok(Some(SkippedItem::from_error(id, &self.kyc_not_pending(id)?))),
                }
            });
            outcome.absorb(id, result)?;
        }
        Ok(outcome)
    }

    /// The business error for a document that did not move.
    fn kyc_not_pending(&self, kyc_id: &str) -> MarketResult<MarketError> {
        Ok(match self.store.get_kyc(kyc_id)? {
            None => MarketError::not_found("kyc", kyc_id),
            Some(row) => MarketError::invalid_state(
                "kyc",
                kyc_id,
                format!("document is {}, not pending", row.status),
            ),
        })
    }

    // ── Payout due queue ──────────────────────────────────────────

    /// FINALIZED statements with no COMPLETED payout, oldest period_end first.
    pub fn payout_due_queue(&self, page: Page) -> MarketResult<PageResult<PayoutDueRow>> {
        let items = self.store.payouts_due(page)?;
        let total = self.store.payouts_due_count()?;
        Ok(PageResult {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    pub fn stats(&self) -> MarketResult<QueueStats> {
        Ok(QueueStats {
            pending_vendors: self.store.vendor_count_by_status(VendorStatus::Pending)?,
            pending_kyc: self.store.kyc_count_by_status(KycStatus::Pending)?,
            payouts_due: self.store.payouts_due_count()?,
            payouts_due_amount: self.store.payouts_due_amount()?,
        })
    }
}
