//! The marketplace facade: one handle over the store and every component.
//!
//! DEPENDENCY ORDER (leaves first):
//!   1. Category hierarchy
//!   2. Vendor lifecycle
//!   3. Commission resolver   (reads 1 and 2)
//!   4. Statement generator   (uses 3)
//!   5. Payout processor      (reads 4)
//!   6. Operational queues    (reads everything, writes through 2)
//!
//! RULES:
//!   - Components are built per call and borrow from the Marketplace; they
//!     keep nothing between calls.
//!   - The only process-wide state is the platform settings cache, which is
//!     owned here and injected.
//!   - Several Marketplace handles may share one database.

use crate::{
    category_subsystem::{CategoryPatch, CategorySubsystem, CategoryTreeNode, NewCategory},
    clock::{Clock, ManualClock, SystemClock},
    commission_subsystem::{
        CommissionRulePatch, CommissionSubsystem, NewCommissionRule, PlatformSettingsCache,
        ResolvedCommission,
    },
    config::MarketConfig,
    error::MarketResult,
    event::EventLogEntry,
    notifier::{LogNotifier, NoopNotifier, Notifier},
    payout_subsystem::{BatchOutcome, PayoutOutcome, PayoutSubsystem},
    queue_subsystem::{BulkOutcome, QueueSubsystem},
    statement_subsystem::{FinalizeOutcome, StatementSubsystem},
    store::{
        CategoryRow, CommissionRuleRow, KycRow, MarketStore, PayoutDueRow, PayoutRow, QueueStats,
        StatementRow, VendorRow,
    },
    types::{EntityId, Page, PageResult, VendorStatus},
    vendor_subsystem::{NewVendor, OnboardingProgress, VendorPatch, VendorSubsystem},
};
use chrono::Duration;
use std::sync::Arc;

pub struct Marketplace {
    store: MarketStore,
    config: MarketConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    platform_cache: PlatformSettingsCache,
}

impl Marketplace {
    /// Wire a marketplace over an already migrated store.
    pub fn build(
        store: MarketStore,
        config: MarketConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let platform_cache = PlatformSettingsCache::new(
            Duration::seconds(config.cache.platform_settings_ttl_secs),
            clock.clone(),
        );
        Self {
            store,
            config,
            clock,
            notifier,
            platform_cache,
        }
    }

    /// Open (and migrate) a database with the system clock and a logging notifier.
    pub fn open(path: &str, config: MarketConfig) -> MarketResult<Self> {
        let store = MarketStore::open(path)?;
        store.migrate()?;
        Ok(Self::build(
            store,
            config,
            Arc::new(SystemClock),
            Arc::new(LogNotifier),
        ))
    }

    /// In-memory, migrated, test config, clock pinned to 2024-01-01.
    pub fn build_test() -> MarketResult<Self> {
        Self::build_test_with_clock(Arc::new(ManualClock::fixed()))
    }

    pub fn build_test_with_clock(clock: Arc<ManualClock>) -> MarketResult<Self> {
        let store = MarketStore::in_memory()?;
        store.migrate()?;
        Ok(Self::build(
            store,
            MarketConfig::default_test(),
            clock,
            Arc::new(NoopNotifier),
        ))
    }

    /// A second handle on the same database, sharing clock and notifier but
    /// with its own connection and its own settings cache.
    pub fn reopen(&self) -> MarketResult<Self> {
        Ok(Self::build(
            self.store.reopen()?,
            self.config.clone(),
            self.clock.clone(),
            self.notifier.clone(),
        ))
    }

    pub fn store(&self) -> &MarketStore {
        &self.store
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn platform_cache(&self) -> &PlatformSettingsCache {
        &self.platform_cache
    }

    // ── Components ────────────────────────────────────────────────

    pub fn categories(&self) -> CategorySubsystem<'_> {
        CategorySubsystem::new(&self.store, self.clock())
    }

    pub fn commission(&self) -> CommissionSubsystem<'_> {
        CommissionSubsystem::new(&self.store, self.clock(), &self.config, &self.platform_cache)
    }

    pub fn vendors(&self) -> VendorSubsystem<'_> {
        VendorSubsystem::new(&self.store, self.clock(), &self.config, self.notifier.as_ref())
    }

    pub fn statements(&self) -> StatementSubsystem<'_> {
        StatementSubsystem::new(&self.store, self.clock(), &self.config, self.commission())
    }

    pub fn payouts(&self) -> PayoutSubsystem<'_> {
        PayoutSubsystem::new(&self.store, self.clock())
    }

    pub fn queues(&self) -> QueueSubsystem<'_> {
        QueueSubsystem::new(&self.store, self.clock(), &self.config, self.vendors())
    }

    // ── Category ──────────────────────────────────────────────────

    pub fn create_category(&self, new: NewCategory) -> MarketResult<CategoryRow> {
        self.categories().create(new)
    }

    pub fn update_category(&self, id: &str, patch: CategoryPatch) -> MarketResult<CategoryRow> {
        self.categories().update(id, patch)
    }

    pub fn delete_category(&self, id: &str, cascade: bool) -> MarketResult<Vec<EntityId>> {
        self.categories().remove(id, cascade, false)
    }

    pub fn list_categories(&self) -> MarketResult<Vec<CategoryRow>> {
        self.categories().list()
    }

    pub fn category_tree(&self) -> MarketResult<Vec<CategoryTreeNode>> {
        self.categories().tree()
    }

    // ── Commission ────────────────────────────────────────────────

    pub fn get_effective_commission(
        &self,
        vendor_id: &str,
        category_id: Option<&str>,
    ) -> MarketResult<ResolvedCommission> {
        self.commission().resolve(vendor_id, category_id)
    }

    pub fn create_commission_rule(&self, new: NewCommissionRule) -> MarketResult<CommissionRuleRow> {
        self.commission().create_rule(new)
    }

    pub fn update_commission_rule(
        &self,
        rule_id: &str,
        patch: CommissionRulePatch,
    ) -> MarketResult<CommissionRuleRow> {
        self.commission().update_rule(rule_id, patch)
    }

    pub fn delete_commission_rule(&self, rule_id: &str) -> MarketResult<()> {
        self.commission().delete_rule(rule_id)
    }

    // ── Vendor lifecycle ──────────────────────────────────────────

    pub fn create_vendor(&self, new: NewVendor) -> MarketResult<VendorRow> {
        self.vendors().create(new)
    }

    pub fn update_vendor(&self, vendor_id: &str, patch: VendorPatch) -> MarketResult<VendorRow> {
        self.vendors().update(vendor_id, patch)
    }

    pub fn update_vendor_status(
        &self,
        vendor_id: &str,
        status: VendorStatus,
        reason: Option<&str>,
    ) -> MarketResult<VendorRow> {
        self.vendors().update_status(vendor_id, status, reason)
    }

    pub fn get_onboarding_progress(&self, vendor_id: &str) -> MarketResult<OnboardingProgress> {
        self.vendors().onboarding_progress(vendor_id)
    }

    // ── Statements and payouts ────────────────────────────────────

    pub fn list_statements(&self, vendor_id: &str) -> MarketResult<Vec<StatementRow>> {
        self.statements().list_for_vendor(vendor_id)
    }

    pub fn finalize_statement(&self, statement_id: &str) -> MarketResult<FinalizeOutcome> {
        self.statements().finalize(statement_id)
    }

    pub fn create_payout(&self, statement_id: &str) -> MarketResult<PayoutRow> {
        self.payouts().create_payout(statement_id)
    }

    pub fn create_batch_payouts(&self, statement_ids: &[EntityId]) -> MarketResult<BatchOutcome> {
        self.payouts().create_batch(statement_ids)
    }

    pub fn complete_payout(
        &self,
        payout_id: &str,
        outcome: PayoutOutcome,
    ) -> MarketResult<PayoutRow> {
        self.payouts().complete_payout(payout_id, outcome)
    }

    pub fn list_payouts(&self, vendor_id: &str) -> MarketResult<Vec<PayoutRow>> {
        self.payouts().list_for_vendor(vendor_id)
    }

    // ── Queues ────────────────────────────────────────────────────

    pub fn get_approval_queue(&self, page: Page) -> MarketResult<PageResult<VendorRow>> {
        self.queues().approval_queue(page)
    }

    pub fn bulk_approve_vendors(&self, ids: &[EntityId]) -> MarketResult<BulkOutcome> {
        self.queues().bulk_approve_vendors(ids)
    }

    pub fn bulk_reject_vendors(
        &self,
        ids: &[EntityId],
        reason: Option<&str>,
    ) -> MarketResult<BulkOutcome> {
        self.queues().bulk_reject_vendors(ids, reason)
    }

    pub fn get_kyc_queue(&self, page: Page) -> MarketResult<PageResult<KycRow>> {
        self.queues().kyc_queue(page)
    }

    pub fn bulk_approve_kyc(&self, ids: &[EntityId]) -> MarketResult<BulkOutcome> {
        self.queues().bulk_approve_kyc(ids)
    }

    pub fn bulk_reject_kyc(
        &self,
        ids: &[EntityId],
        remarks: Option<&str>,
    ) -> MarketResult<BulkOutcome> {
        self.queues().bulk_reject_kyc(ids, remarks)
    }

    pub fn get_payout_due_queue(&self, page: Page) -> MarketResult<PageResult<PayoutDueRow>> {
        self.queues().payout_due_queue(page)
    }

    pub fn get_queue_stats(&self) -> MarketResult<QueueStats> {
        self.queues().stats()
    }

    // ── Audit ─────────────────────────────────────────────────────

    pub fn events_for_entity(&self, entity_id: &str) -> MarketResult<Vec<EventLogEntry>> {
        self.store.events_for_entity(entity_id)
    }
}
