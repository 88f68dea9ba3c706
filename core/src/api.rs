//! Request/response boundary.
//!
//! Every operation the marketplace exposes has one `ApiRequest` variant. A
//! request never fails at the process level: business errors and store faults
//! both come back as `{ok: false, error: {kind, message}}`.

use crate::{
    category_subsystem::{CategoryPatch, NewCategory},
    commission_subsystem::{CommissionRulePatch, NewCommissionRule},
    engine::Marketplace,
    error::{ErrorKind, MarketError, MarketResult},
    payout_subsystem::PayoutOutcome,
    statement_subsystem::NewProduct,
    types::{Amount, Commission, EntityId, Timestamp, VendorStatus},
    vendor_subsystem::{
        NewAddress, NewBankAccount, NewKyc, NewVendor, VendorPatch, VendorSettingsPatch,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    // Category
    CreateCategory {
        category: NewCategory,
    },
    UpdateCategory {
        category_id: EntityId,
        patch: CategoryPatch,
    },
    DeleteCategory {
        category_id: EntityId,
        #[serde(default)]
        cascade: bool,
        #[serde(default)]
        ignore_products: bool,
    },
    GetCategory {
        category_id: EntityId,
    },
    ListCategories {
        #[serde(default)]
        tree: bool,
    },

    // Commission
    GetEffectiveCommission {
        vendor_id: EntityId,
        #[serde(default)]
        category_id: Option<EntityId>,
    },
    CreateCommissionRule {
        rule: NewCommissionRule,
    },
    UpdateCommissionRule {
        rule_id: EntityId,
        patch: CommissionRulePatch,
    },
    DeleteCommissionRule {
        rule_id: EntityId,
    },
    ListCommissionRules {
        vendor_id: EntityId,
    },
    SetPlatformCommission {
        commission: Commission,
    },

    // Vendor lifecycle
    CreateVendor {
        vendor: NewVendor,
    },
    UpdateVendor {
        vendor_id: EntityId,
        patch: VendorPatch,
    },
    GetVendor {
        vendor_id: EntityId,
    },
    UpdateVendorStatus {
        vendor_id: EntityId,
        status: VendorStatus,
        #[serde(default)]
        reason: Option<String>,
    },
    ForceVendorStatus {
        vendor_id: EntityId,
        status: VendorStatus,
        reason: String,
    },
    GetOnboardingProgress {
        vendor_id: EntityId,
    },
    CompleteOnboarding {
        vendor_id: EntityId,
    },
    AddAddress {
        vendor_id: EntityId,
        address: NewAddress,
    },
    AddBankAccount {
        vendor_id: EntityId,
        account: NewBankAccount,
    },
    SubmitKyc {
        vendor_id: EntityId,
        document: NewKyc,
    },
    GetVendorSettings {
        vendor_id: EntityId,
    },
    UpdateVendorSettings {
        vendor_id: EntityId,
        patch: VendorSettingsPatch,
    },
    ListIssues {
        vendor_id: EntityId,
    },

    // Sales and statements
    AddProduct {
        product: NewProduct,
    },
    RecordSale {
        product_id: EntityId,
        amount: Amount,
        sold_at: Timestamp,
    },
    GenerateStatement {
        vendor_id: EntityId,
        period_start: Timestamp,
        period_end: Timestamp,
    },
    RefreshStatement {
        statement_id: EntityId,
    },
    GetStatement {
        statement_id: EntityId,
    },
    ListStatements {
        vendor_id: EntityId,
    },
    FinalizeStatement {
        statement_id: EntityId,
    },

    // Payouts
    CreatePayout {
        statement_id: EntityId,
    },
    CreateBatchPayouts {
        statement_ids: Vec<EntityId>,
    },
    CreateAdHocPayout {
        vendor_id: EntityId,
        amount: Amount,
    },
    CompletePayout {
        payout_id: EntityId,
        outcome: PayoutOutcome,
    },
    GetPayout {
        payout_id: EntityId,
    },
    ListPayouts {
        vendor_id: EntityId,
    },
    ListPayoutsForStatement {
        statement_id: EntityId,
    },

    // Queues
    GetApprovalQueue {
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        per_page: Option<u32>,
    },
    BulkApproveVendors {
        ids: Vec<EntityId>,
    },
    BulkRejectVendors {
        ids: Vec<EntityId>,
        #[serde(default)]
        reason: Option<String>,
    },
    GetKycQueue {
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        per_page: Option<u32>,
    },
    ReviewKyc {
        kyc_id: EntityId,
        approve: bool,
        #[serde(default)]
        remarks: Option<String>,
    },
    BulkApproveKyc {
        ids: Vec<EntityId>,
    },
    BulkRejectKyc {
        ids: Vec<EntityId>,
        #[serde(default)]
        remarks: Option<String>,
    },
    GetPayoutDueQueue {
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        per_page: Option<u32>,
    },
    GetQueueStats,

    // Audit
    EventsForEntity {
        entity_id: EntityId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ApiError {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn from_error(err: &MarketError) -> Self {
        Self::failure(err.kind(), err.to_string())
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

fn json<T: Serialize>(value: T) -> MarketResult<Value> {
    Ok(serde_json::to_value(value)?)
}

impl Marketplace {
    /// Serve one request.
    pub fn handle(&self, request: ApiRequest) -> ApiResponse {
        match self.dispatch(request) {
            Ok(data) => ApiResponse::success(data),
            Err(e) => {
                if e.is_infrastructure() {
                    log::error!("request failed on infrastructure: {e}");
                } else {
                    log::debug!("request rejected: {e}");
                }
                ApiResponse::from_error(&e)
            }
        }
    }

    /// Parse and serve one JSON request. Malformed input is a validation failure.
    pub fn handle_json(&self, raw: &str) -> ApiResponse {
        match serde_json::from_str::<ApiRequest>(raw) {
            Ok(request) => self.handle(request),
            Err(e) => ApiResponse::failure(ErrorKind::ValidationFailed, format!("bad request: {e}")),
        }
    }

    fn dispatch(&self, request: ApiRequest) -> MarketResult<Value> {
        use ApiRequest as R;
        match request {
            R::CreateCategory { category } => json(self.create_category(category)?),
            R::UpdateCategory { category_id, patch } => {
                json(self.update_category(&category_id, patch)?)
            }
            R::DeleteCategory {
                category_id,
                cascade,
                ignore_products,
            } => json(
                self.categories()
                    .remove(&category_id, cascade, ignore_products)?,
            ),
            R::GetCategory { category_id } => json(self.categories().get(&category_id)?),
            R::ListCategories { tree: true } => json(self.category_tree()?),
            R::ListCategories { tree: false } => json(self.list_categories()?),

            R::GetEffectiveCommission {
                vendor_id,
                category_id,
            } => json(self.get_effective_commission(&vendor_id, category_id.as_deref())?),
            R::CreateCommissionRule { rule } => json(self.create_commission_rule(rule)?),
            R::UpdateCommissionRule { rule_id, patch } => {
                json(self.update_commission_rule(&rule_id, patch)?)
            }
            R::DeleteCommissionRule { rule_id } => {
                self.delete_commission_rule(&rule_id)?;
                json(serde_json::json!({ "deleted": rule_id }))
            }
            R::ListCommissionRules { vendor_id } => {
                json(self.commission().rules_for_vendor(&vendor_id)?)
            }
            R::SetPlatformCommission { commission } => {
                json(self.commission().set_platform_commission(commission)?)
            }

            R::CreateVendor { vendor } => json(self.create_vendor(vendor)?),
            R::UpdateVendor { vendor_id, patch } => json(self.update_vendor(&vendor_id, patch)?),
            R::GetVendor { vendor_id } => json(self.vendors().get(&vendor_id)?),
            R::UpdateVendorStatus {
                vendor_id,
                status,
                reason,
            } => json(self.update_vendor_status(&vendor_id, status, reason.as_deref())?),
            R::ForceVendorStatus {
                vendor_id,
                status,
                reason,
            } => json(self.vendors().force_status(&vendor_id, status, &reason)?),
            R::GetOnboardingProgress { vendor_id } => {
                json(self.get_onboarding_progress(&vendor_id)?)
            }
            R::CompleteOnboarding { vendor_id } => {
                json(self.vendors().complete_onboarding(&vendor_id)?)
            }
            R::AddAddress { vendor_id, address } => {
                json(self.vendors().add_address(&vendor_id, address)?)
            }
            R::AddBankAccount { vendor_id, account } => {
                json(self.vendors().add_bank_account(&vendor_id, account)?)
            }
            R::SubmitKyc {
                vendor_id,
                document,
            } => json(self.vendors().submit_kyc(&vendor_id, document)?),
            R::GetVendorSettings { vendor_id } => json(self.vendors().settings(&vendor_id)?),
            R::UpdateVendorSettings { vendor_id, patch } => {
                json(self.vendors().update_settings(&vendor_id, patch)?)
            }
            R::ListIssues { vendor_id } => json(self.vendors().issues(&vendor_id)?),

            R::AddProduct { product } => json(self.statements().add_product(product)?),
            R::RecordSale {
                product_id,
                amount,
                sold_at,
            } => json(self.statements().record_sale(&product_id, amount, sold_at)?),
            R::GenerateStatement {
                vendor_id,
                period_start,
                period_end,
            } => json(
                self.statements()
                    .generate(&vendor_id, period_start, period_end)?,
            ),
            R::RefreshStatement { statement_id } => {
                json(self.statements().refresh(&statement_id)?)
            }
            R::GetStatement { statement_id } => json(self.statements().get(&statement_id)?),
            R::ListStatements { vendor_id } => json(self.list_statements(&vendor_id)?),
            R::FinalizeStatement { statement_id } => {
                json(self.finalize_statement(&statement_id)?)
            }

            R::CreatePayout { statement_id } => json(self.create_payout(&statement_id)?),
            R::CreateBatchPayouts { statement_ids } => {
                json(self.create_batch_payouts(&statement_ids)?)
            }
            R::CreateAdHocPayout { vendor_id, amount } => {
                json(self.payouts().create_ad_hoc(&vendor_id, amount)?)
            }
            R::CompletePayout { payout_id, outcome } => {
                json(self.complete_payout(&payout_id, outcome)?)
            }
            R::GetPayout { payout_id } => json(self.payouts().get(&payout_id)?),
            R::ListPayouts { vendor_id } => json(self.list_payouts(&vendor_id)?),
            R::ListPayoutsForStatement { statement_id } => {
                json(self.payouts().list_for_statement(&statement_id)?)
            }

            R::GetApprovalQueue { page, per_page } => {
                let queues = self.queues();
                json(queues.approval_queue(queues.page(page, per_page))?)
            }
            R::BulkApproveVendors { ids } => json(self.bulk_approve_vendors(&ids)?),
            R::BulkRejectVendors { ids, reason } => {
                json(self.bulk_reject_vendors(&ids, reason.as_deref())?)
            }
            R::GetKycQueue { page, per_page } => {
                let queues = self.queues();
                json(queues.kyc_queue(queues.page(page, per_page))?)
            }
            R::ReviewKyc {
                kyc_id,
                approve,
                remarks,
            } => json(self.queues().review_kyc(&kyc_id, approve, remarks.as_deref())?),
            R::BulkApproveKyc { ids } => json(self.bulk_approve_kyc(&ids)?),
            R::BulkRejectKyc { ids, remarks } => {
                json(self.bulk_reject_kyc(&ids, remarks.as_deref())?)
            }
            R::GetPayoutDueQueue { page, per_page } => {
                let queues = self.queues();
                json(queues.payout_due_queue(queues.page(page, per_page))?)
            }
            R::GetQueueStats => json(self.get_queue_stats()?),

            R::EventsForEntity { entity_id } => {
                let entries = self.events_for_entity(&entity_id)?;
                let events = entries
                    .iter()
                    .map(|entry| entry.decode())
                    .collect::<Result<Vec<_>, _>>()?;
                json(events)
            }
        }
    }
}
