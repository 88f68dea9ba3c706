//! Payout batch processor.
//!
//! RULE: A finalized statement has at most one payout that is not FAILED.
//! The check here is a fast path; the partial unique index on
//! payout(statement_id) is what actually holds under concurrent callers.
//!
//! Payout rows are terminal once COMPLETED or FAILED. A retry is a new row
//! against the same statement, allowed only after the previous one failed.

use crate::{
    clock::Clock,
    error::{ConflictKind, MarketError, MarketResult, SkippedItem},
    event::MarketEvent,
    store::{MarketStore, PayoutRow},
    subsystem::MarketSubsystem,
    types::{new_id, Amount, EntityId, PayoutStatus, StatementStatus, VendorStatus},
};
use serde::{Deserialize, Serialize};

/// External confirmation for an INITIATED payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayoutOutcome {
    Completed { reference: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub created: usize,
    pub payouts: Vec<PayoutRow>,
    pub skipped: Vec<SkippedItem>,
}

pub struct PayoutSubsystem<'a> {
    store: &'a MarketStore,
    clock: &'a dyn Clock,
}

impl MarketSubsystem for PayoutSubsystem<'_> {
    fn name(&self) -> &'static str {
        "payout"
    }

    fn store(&self) -> &MarketStore {
        self.store
    }

    fn clock(&self) -> &dyn Clock {
        self.clock
    }
}

impl<'a> PayoutSubsystem<'a> {
    pub fn new(store: &'a MarketStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// INITIATED payout for the statement's full net amount, which must be
    /// positive.
    pub fn create_payout(&self, statement_id: &str) -> MarketResult<PayoutRow> {
        self.store.in_transaction(|| {
            let statement = self
                .store
                .get_statement(statement_id)?
                .ok_or_else(|| MarketError::not_found("statement", statement_id))?;
            if statement.status != StatementStatus::Finalized {
                return Err(MarketError::invalid_state(
                    "statement",
                    statement_id,
                    "statement not finalized",
                ));
            }
            // Flagged at finalize; nothing to disburse.
            if statement.net_amount <= Amount::ZERO {
                return Err(MarketError::validation(
                    "net_amount",
                    format!("statement nets {}, nothing to pay", statement.net_amount),
                ));
            }
            if self.store.open_payout_for_statement(statement_id)?.is_some() {
                return Err(MarketError::Conflict(ConflictKind::DuplicatePayout(
                    statement_id.to_string(),
                )));
            }
            self.insert_initiated(&statement.vendor_id, Some(statement_id), statement.net_amount)
        })
    }

    /// Apply `create_payout` to each id on its own. Business failures are
    /// collected per id; only an infrastructure fault stops the batch.
    pub fn create_batch(&self, statement_ids: &[EntityId]) -> MarketResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for statement_id in statement_ids {
            match self.create_payout(statement_id) {
                Ok(payout) => {
                    outcome.created += 1;
                    outcome.payouts.push(payout);
                }
                Err(e) if e.is_infrastructure() => return Err(e),
                Err(e) => {
                    log::warn!("batch payout skipped statement {statement_id}: {e}");
                    outcome.skipped.push(SkippedItem::from_error(statement_id, &e));
                }
            }
        }
        log::info!(
            "batch payouts: {} created, {} skipped",
            outcome.created,
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    /// Payout not tied to any statement.
    pub fn create_ad_hoc(&self, vendor_id: &str, amount: Amount) -> MarketResult<PayoutRow> {
        if amount <= Amount::ZERO {
            return Err(MarketError::validation("amount", "payout amount must be positive"));
        }
        self.store.in_transaction(|| {
            let vendor = self
                .store
                .get_vendor(vendor_id)?
                .ok_or_else(|| MarketError::not_found("vendor", vendor_id))?;
            if vendor.status != VendorStatus::Active {
                return Err(MarketError::invalid_state(
                    "vendor",
                    vendor_id,
                    format!("cannot pay a {} vendor", vendor.status),
                ));
            }
            self.insert_initiated(vendor_id, None, amount)
        })
    }

    fn insert_initiated(
        &self,
        vendor_id: &str,
        statement_id: Option<&str>,
        amount: Amount,
    ) -> MarketResult<PayoutRow> {
        let now = self.clock.now();
        let payout = PayoutRow {
            payout_id: new_id(),
            vendor_id: vendor_id.to_string(),
            statement_id: statement_id.map(str::to_string),
            amount,
            status: PayoutStatus::Initiated,
            reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.store.insert_payout(&payout)?;
        self.record(
            &payout.payout_id,
            &MarketEvent::PayoutCreated {
                payout_id: payout.payout_id.clone(),
                statement_id: payout.statement_id.clone(),
                amount,
            },
        )?;
        log::info!(
            "payout {} initiated for vendor {vendor_id}: {amount}",
            payout.payout_id
        );
        Ok(payout)
    }

    /// INITIATED → COMPLETED or FAILED.
    pub fn complete_payout(
        &self,
        payout_id: &str,
        outcome: PayoutOutcome,
    ) -> MarketResult<PayoutRow> {
        let (to, reference, failure_reason) = match &outcome {
            PayoutOutcome::Completed { reference } => {
                if reference.trim().is_empty() {
                    return Err(MarketError::validation("reference", "must not be empty"));
                }
                (PayoutStatus::Completed, Some(reference.trim()), None)
            }
            PayoutOutcome::Failed { reason } => {
                if reason.trim().is_empty() {
                    return Err(MarketError::validation("reason", "must not be empty"));
                }
                (PayoutStatus::Failed, None, Some(reason.trim()))
            }
        };

        self.store.in_transaction(|| {
            let payout = self.get(payout_id)?;
            if payout.status != PayoutStatus::Initiated {
                return Err(MarketError::invalid_state(
                    "payout",
                    payout_id,
                    format!("already {}", payout.status),
                ));
            }
            if !self.store.settle_initiated_payout(
                payout_id,
                to,
                reference,
                failure_reason,
                self.clock.now(),
            )? {
                return Err(MarketError::invalid_state(
                    "payout",
                    payout_id,
                    "settled concurrently",
                ));
            }
            self.record(
                payout_id,
                &MarketEvent::PayoutSettled {
                    payout_id: payout_id.to_string(),
                    status: to,
                    reference: reference.map(str::to_string),
                },
            )?;
            match to {
                PayoutStatus::Failed => log::warn!(
                    "payout {payout_id} failed: {}",
                    failure_reason.unwrap_or_default()
                ),
                _ => log::info!("payout {payout_id} {to}"),
            }
            self.get(payout_id)
        })
    }

    pub fn get(&self, payout_id: &str) -> MarketResult<PayoutRow> {
        self.store
            .get_payout(payout_id)?
            .ok_or_else(|| MarketError::not_found("payout", payout_id))
    }

    /// Newest first.
    pub fn list_for_vendor(&self, vendor_id: &str) -> MarketResult<Vec<PayoutRow>> {
        if self.store.get_vendor(vendor_id)?.is_none() {
            return Err(MarketError::not_found("vendor", vendor_id));
        }
        self.store.payouts_for_vendor(vendor_id)
    }

    /// Every attempt for the statement, oldest first.
    pub fn list_for_statement(&self, statement_id: &str) -> MarketResult<Vec<PayoutRow>> {
        if self.store.get_statement(statement_id)?.is_none() {
            return Err(MarketError::not_found("statement", statement_id));
        }
        self.store.payouts_for_statement(statement_id)
    }
}
