//! Statement generator: sales ledger and period statements.
//!
//! A statement covers `[period_start, period_end)` for one vendor. Its totals
//! are always aggregated from the sales ledger; net is never entered by hand.
//! Drafts can be re-aggregated; finalized statements never change again.

use crate::{
    clock::Clock,
    commission_subsystem::CommissionSubsystem,
    config::MarketConfig,
    error::{ConflictKind, MarketError, MarketResult},
    event::MarketEvent,
    store::{MarketStore, ProductRow, SaleRow, StatementRow},
    subsystem::MarketSubsystem,
    types::{new_id, Amount, EntityId, StatementStatus, Timestamp},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub vendor_id: EntityId,
    #[serde(default)]
    pub category_id: Option<EntityId>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeOutcome {
    pub statement: StatementRow,
    /// The statement was already finalized; nothing changed.
    pub already_finalized: bool,
    /// Net amount is zero or negative. Finalized anyway, but worth a look.
    pub flagged_non_positive: bool,
}

pub struct StatementSubsystem<'a> {
    store: &'a MarketStore,
    clock: &'a dyn Clock,
    config: &'a MarketConfig,
    commission: CommissionSubsystem<'a>,
}

impl MarketSubsystem for StatementSubsystem<'_> {
    fn name(&self) -> &'static str {
        "statement"
    }

    fn store(&self) -> &MarketStore {
        self.store
    }

    fn clock(&self) -> &dyn Clock {
        self.clock
    }
}

impl<'a> StatementSubsystem<'a> {
    pub fn new(
        store: &'a MarketStore,
        clock: &'a dyn Clock,
        config: &'a MarketConfig,
        commission: CommissionSubsystem<'a>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            commission,
        }
    }

    // ── Catalogue and sales ───────────────────────────────────────

    pub fn add_product(&self, new: NewProduct) -> MarketResult<ProductRow> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(MarketError::validation("name", "must not be empty"));
        }
        self.store.in_transaction(|| {
            if self.store.get_vendor(&new.vendor_id)?.is_none() {
                return Err(MarketError::not_found("vendor", &new.vendor_id));
            }
            if let Some(category_id) = new.category_id.as_deref() {
                if self.store.get_category(category_id)?.is_none() {
                    return Err(MarketError::not_found("category", category_id));
                }
            }
            let product = ProductRow {
                product_id: new_id(),
                vendor_id: new.vendor_id.clone(),
                category_id: new.category_id.clone(),
                name: name.clone(),
                is_active: true,
                created_at: self.clock.now(),
            };
            self.store.insert_product(&product)?;
            Ok(product)
        })
    }

    /// Record a sale. The commission is resolved now and frozen on the row, so
    /// later rule changes never rewrite history.
    pub fn record_sale(
        &self,
        product_id: &str,
        amount: Amount,
        sold_at: Timestamp,
    ) -> MarketResult<SaleRow> {
        if amount <= Amount::ZERO {
            return Err(MarketError::validation("amount", "sale amount must be positive"));
        }
        let ceiling = self.config.sales.max_sale_amount;
        if amount > ceiling {
            return Err(MarketError::validation(
                "amount",
                format!("sale amount exceeds the {ceiling} limit"),
            ));
        }
        self.store.in_transaction(|| {
            let product = self
                .store
                .get_product(product_id)?
                .ok_or_else(|| MarketError::not_found("product", product_id))?;
            if !product.is_active {
                return Err(MarketError::invalid_state("product", product_id, "inactive"));
            }
            let resolved = self
                .commission
                .resolve(&product.vendor_id, product.category_id.as_deref())?;
            let fee = self.commission.fee_for(amount, &resolved.commission)?;

            let sale = SaleRow {
                sale_id: new_id(),
                vendor_id: product.vendor_id.clone(),
                product_id: product.product_id.clone(),
                category_id: product.category_id.clone(),
                amount,
                commission_type: resolved.commission.commission_type,
                commission_value: resolved.commission.value,
                fee,
                sold_at,
            };
            self.store.insert_sale(&sale)?;
            self.record(
                &sale.sale_id,
                &MarketEvent::SaleRecorded {
                    sale_id: sale.sale_id.clone(),
                    vendor_id: sale.vendor_id.clone(),
                    amount,
                    fee,
                },
            )?;
            log::debug!(
                "sale {} for vendor {}: {amount} fee {fee} ({:?})",
                sale.sale_id,
                sale.vendor_id,
                resolved.source
            );
            Ok(sale)
        })
    }

    // ── Statements ────────────────────────────────────────────────

    pub fn generate(
        &self,
        vendor_id: &str,
        period_start: Timestamp,
        period_end: Timestamp,
    ) -> MarketResult<StatementRow> {
        if period_start >= period_end {
            return Err(MarketError::validation(
                "period_end",
                "period_start must be before period_end",
            ));
        }
        self.store.in_transaction(|| {
            if self.store.get_vendor(vendor_id)?.is_none() {
                return Err(MarketError::not_found("vendor", vendor_id));
            }
            if let Some(existing) =
                self.store
                    .overlapping_statement(vendor_id, period_start, period_end)?
            {
                return Err(MarketError::Conflict(ConflictKind::OverlappingPeriod(existing)));
            }

            let totals = self.store.sale_totals(vendor_id, period_start, period_end)?;
            let now = self.clock.now();
            let statement = StatementRow {
                statement_id: new_id(),
                vendor_id: vendor_id.to_string(),
                period_start,
                period_end,
                total_sales: totals.total_sales,
                total_fees: totals.total_fees,
                net_amount: totals.net()?,
                sale_count: totals.sale_count,
                status: StatementStatus::Draft,
                finalized_at: None,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_statement(&statement)?;
            self.record(
                &statement.statement_id,
                &MarketEvent::StatementGenerated {
                    statement_id: statement.statement_id.clone(),
                    vendor_id: vendor_id.to_string(),
                    net_amount: statement.net_amount,
                },
            )?;
            log::info!(
                "statement {} for vendor {vendor_id}: {} sale(s), net {}",
                statement.statement_id,
                statement.sale_count,
                statement.net_amount
            );
            Ok(statement)
        })
    }

    /// Re-aggregate a draft from the ledger.
    pub fn refresh(&self, statement_id: &str) -> MarketResult<StatementRow> {
        self.store.in_transaction(|| {
            let statement = self.get(statement_id)?;
            if statement.status != StatementStatus::Draft {
                return Err(MarketError::invalid_state(
                    "statement",
                    statement_id,
                    "finalized statements are immutable",
                ));
            }
            self.refresh_draft_in_tx(&statement)?;
            self.get(statement_id)
        })
    }

    fn refresh_draft_in_tx(&self, statement: &StatementRow) -> MarketResult<()> {
        let totals = self.store.sale_totals(
            &statement.vendor_id,
            statement.period_start,
            statement.period_end,
        )?;
        if !self
            .store
            .refresh_draft_statement(&statement.statement_id, &totals, self.clock.now())?
        {
            return Err(MarketError::invalid_state(
                "statement",
                &statement.statement_id,
                "no longer a draft",
            ));
        }
        self.record(
            &statement.statement_id,
            &MarketEvent::StatementRefreshed {
                statement_id: statement.statement_id.clone(),
                net_amount: totals.net()?,
            },
        )
    }

    /// DRAFT → FINALIZED with freshly aggregated totals. Finalizing an already
    /// finalized statement succeeds and changes nothing.
    pub fn finalize(&self, statement_id: &str) -> MarketResult<FinalizeOutcome> {
        self.store.in_transaction(|| {
            let current = self.get(statement_id)?;
            if current.status == StatementStatus::Finalized {
                return Ok(FinalizeOutcome {
                    flagged_non_positive: current.net_amount <= Amount::ZERO,
                    statement: current,
                    already_finalized: true,
                });
            }

            self.refresh_draft_in_tx(&current)?;
            if !self
                .store
                .finalize_draft_statement(statement_id, self.clock.now())?
            {
                return Err(MarketError::invalid_state(
                    "statement",
                    statement_id,
                    "no longer a draft",
                ));
            }
            let statement = self.get(statement_id)?;
            let flagged_non_positive = statement.net_amount <= Amount::ZERO;
            if flagged_non_positive {
                log::warn!(
                    "statement {statement_id} finalized with non-positive net {}",
                    statement.net_amount
                );
            }
            self.record(
                statement_id,
                &MarketEvent::StatementFinalized {
                    statement_id: statement_id.to_string(),
                    net_amount: statement.net_amount,
                    flagged_non_positive,
                },
            )?;
            log::info!("statement {statement_id} finalized, net {}", statement.net_amount);
            Ok(FinalizeOutcome {
                statement,
                already_finalized: false,
                flagged_non_positive,
            })
        })
    }

    pub fn get(&self, statement_id: &str) -> MarketResult<StatementRow> {
        self.store
            .get_statement(statement_id)?
            .ok_or_else(|| MarketError::not_found("statement", statement_id))
    }

    pub fn list_for_vendor(&self, vendor_id: &str) -> MarketResult<Vec<StatementRow>> {
        if self.store.get_vendor(vendor_id)?.is_none() {
            return Err(MarketError::not_found("vendor", vendor_id));
        }
        self.store.statements_for_vendor(vendor_id)
    }
}
