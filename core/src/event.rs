//! Audit events: every successful mutation leaves one behind.
//!
//! RULE: Events are written inside the same transaction as the change they
//! describe, so the log never claims a transition that was rolled back.

use crate::types::{Amount, EntityId, KycStatus, PayoutStatus, Timestamp, VendorStatus};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended: never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    // ── Category tree ──────────────────────────────
    CategoryCreated {
        category_id: EntityId,
        parent_id: Option<EntityId>,
        level: u32,
    },
    CategoryUpdated {
        category_id: EntityId,
        reparented: bool,
    },
    CategoryDeleted {
        category_id: EntityId,
        cascaded_from: Option<EntityId>,
    },

    // ── Commission ─────────────────────────────────
    CommissionRuleCreated {
        rule_id: EntityId,
        vendor_id: EntityId,
        category_id: Option<EntityId>,
    },
    CommissionRuleUpdated {
        rule_id: EntityId,
    },
    CommissionRuleDeleted {
        rule_id: EntityId,
    },
    PlatformCommissionChanged {
        value: Amount,
    },

    // ── Vendor lifecycle ───────────────────────────
    VendorCreated {
        vendor_id: EntityId,
    },
    VendorUpdated {
        vendor_id: EntityId,
    },
    VendorStatusChanged {
        vendor_id: EntityId,
        from: VendorStatus,
        to: VendorStatus,
        reason: Option<String>,
        forced: bool,
    },
    VendorOnboardingCompleted {
        vendor_id: EntityId,
    },
    KycSubmitted {
        kyc_id: EntityId,
        vendor_id: EntityId,
    },
    KycReviewed {
        kyc_id: EntityId,
        vendor_id: EntityId,
        status: KycStatus,
    },

    // ── Settlement ─────────────────────────────────
    SaleRecorded {
        sale_id: EntityId,
        vendor_id: EntityId,
        amount: Amount,
        fee: Amount,
    },
    StatementGenerated {
        statement_id: EntityId,
        vendor_id: EntityId,
        net_amount: Amount,
    },
    StatementRefreshed {
        statement_id: EntityId,
        net_amount: Amount,
    },
    StatementFinalized {
        statement_id: EntityId,
        net_amount: Amount,
        flagged_non_positive: bool,
    },
    PayoutCreated {
        payout_id: EntityId,
        statement_id: Option<EntityId>,
        amount: Amount,
    },
    PayoutSettled {
        payout_id: EntityId,
        status: PayoutStatus,
        reference: Option<String>,
    },
}

impl MarketEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CategoryCreated { .. } => "category_created",
            Self::CategoryUpdated { .. } => "category_updated",
            Self::CategoryDeleted { .. } => "category_deleted",
            Self::CommissionRuleCreated { .. } => "commission_rule_created",
            Self::CommissionRuleUpdated { .. } => "commission_rule_updated",
            Self::CommissionRuleDeleted { .. } => "commission_rule_deleted",
            Self::PlatformCommissionChanged { .. } => "platform_commission_changed",
            Self::VendorCreated { .. } => "vendor_created",
            Self::VendorUpdated { .. } => "vendor_updated",
            Self::VendorStatusChanged { .. } => "vendor_status_changed",
            Self::VendorOnboardingCompleted { .. } => "vendor_onboarding_completed",
            Self::KycSubmitted { .. } => "kyc_submitted",
            Self::KycReviewed { .. } => "kyc_reviewed",
            Self::SaleRecorded { .. } => "sale_recorded",
            Self::StatementGenerated { .. } => "statement_generated",
            Self::StatementRefreshed { .. } => "statement_refreshed",
            Self::StatementFinalized { .. } => "statement_finalized",
            Self::PayoutCreated { .. } => "payout_created",
            Self::PayoutSettled { .. } => "payout_settled",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub subsystem: String,
    pub event_type: String,
    pub entity_id: EntityId,
    pub payload: String, // JSON-serialized MarketEvent
    pub created_at: Timestamp,
}

impl EventLogEntry {
    pub fn decode(&self) -> serde_json::Result<MarketEvent> {
        serde_json::from_str(&self.payload)
    }
}
