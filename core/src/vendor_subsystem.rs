//! Vendor lifecycle: status state machine and onboarding progression.
//!
//! Status edges:
//!
//!   PENDING   → ACTIVE     (approve)
//!   PENDING   → REJECTED   (reject)
//!   ACTIVE    → SUSPENDED  (suspend)
//!   SUSPENDED → ACTIVE     (reactivate)
//!
//! Anything else needs `force_status`, which requires a reason.
//! Every status write is conditional on the status it was read in; a vendor
//! moved by someone else in between is never moved twice.
//!
//! Onboarding progress is derived from the vendor's records on every read and
//! is never stored.

use crate::{
    clock::Clock,
    commission_subsystem::validate_commission,
    config::MarketConfig,
    error::{ConflictKind, MarketError, MarketResult},
    event::MarketEvent,
    notifier::{send_quietly, Notification, Notifier},
    store::{
        BankAccountRow, IssueRow, KycRow, MarketStore, VendorAddressRow, VendorIdentifier,
        VendorRow, VendorSettingRow,
    },
    subsystem::MarketSubsystem,
    types::{double_option, new_id, Commission, EntityId, IssueStatus, KycStatus, VendorStatus},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVendor {
    pub name: String,
    #[serde(default)]
    pub legal_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub gst_number: Option<String>,
    #[serde(default)]
    pub pan_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub legal_name: Option<Option<String>>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub gst_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub pan_number: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBankAccount {
    pub account_holder: String,
    pub account_number: String,
    pub ifsc_code: String,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewKyc {
    pub doc_type: String,
    #[serde(default)]
    pub doc_reference: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorSettingsPatch {
    #[serde(default)]
    pub auto_payout: Option<bool>,
    /// `Some(None)` clears the vendor default.
    #[serde(default, deserialize_with = "double_option")]
    pub default_commission: Option<Option<Commission>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    BusinessInfo,
    Address,
    BankAccount,
    Kyc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProgress {
    pub vendor_id: EntityId,
    pub business_info: bool,
    pub address: bool,
    pub bank_account: bool,
    pub kyc: bool,
    pub completed_steps: u8,
    pub next_step: Option<OnboardingStep>,
    pub is_complete: bool,
}

impl OnboardingProgress {
    fn from_flags(vendor_id: &str, flags: [(OnboardingStep, bool); 4]) -> Self {
        let completed_steps = flags.iter().filter(|(_, done)| *done).count() as u8;
        let next_step = flags.iter().find(|(_, done)| !done).map(|(step, _)| *step);
        Self {
            vendor_id: vendor_id.to_string(),
            business_info: flags[0].1,
            address: flags[1].1,
            bank_account: flags[2].1,
            kyc: flags[3].1,
            completed_steps,
            next_step,
            is_complete: next_step.is_none(),
        }
    }
}

/// Edges reachable through `update_status`.
pub fn is_allowed_transition(from: VendorStatus, to: VendorStatus) -> bool {
    use VendorStatus::*;
    matches!(
        (from, to),
        (Pending, Active) | (Pending, Rejected) | (Active, Suspended) | (Suspended, Active)
    )
}

pub struct VendorSubsystem<'a> {
    store: &'a MarketStore,
    clock: &'a dyn Clock,
    config: &'a MarketConfig,
    notifier: &'a dyn Notifier,
}

impl MarketSubsystem for VendorSubsystem<'_> {
    fn name(&self) -> &'static str {
        "vendor"
    }

    fn store(&self) -> &MarketStore {
        self.store
    }

    fn clock(&self) -> &dyn Clock {
        self.clock
    }
}

impl<'a> VendorSubsystem<'a> {
    pub fn new(
        store: &'a MarketStore,
        clock: &'a dyn Clock,
        config: &'a MarketConfig,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            notifier,
        }
    }

    // ── Profile ───────────────────────────────────────────────────

    pub fn create(&self, new: NewVendor) -> MarketResult<VendorRow> {
        let now = self.clock.now();
        let mut vendor = VendorRow {
            vendor_id: new_id(),
            name: new.name,
            legal_name: new.legal_name,
            email: new.email,
            phone: new.phone,
            gst_number: new.gst_number,
            pan_number: new.pan_number,
            status: VendorStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        normalize_profile(&mut vendor)?;

        self.store.in_transaction(|| {
            self.ensure_identifiers_free(&vendor)?;
            self.store.insert_vendor(&vendor)?;
            self.store.insert_vendor_setting(&VendorSettingRow {
                vendor_id: vendor.vendor_id.clone(),
                auto_payout: false,
                default_commission_type: None,
                default_commission_value: None,
                updated_at: now,
            })?;
            self.record(
                &vendor.vendor_id,
                &MarketEvent::VendorCreated {
                    vendor_id: vendor.vendor_id.clone(),
                },
            )?;
            log::info!("vendor {} '{}' created (pending)", vendor.vendor_id, vendor.name);
            Ok(vendor.clone())
        })
    }

    pub fn update(&self, vendor_id: &str, patch: VendorPatch) -> MarketResult<VendorRow> {
        self.store.in_transaction(|| {
            let mut vendor = self.get(vendor_id)?;
            if let Some(name) = patch.name.clone() {
                vendor.name = name;
            }
            if let Some(legal_name) = patch.legal_name.clone() {
                vendor.legal_name = legal_name;
            }
            if let Some(email) = patch.email.clone() {
                vendor.email = email;
            }
            if let Some(phone) = patch.phone.clone() {
                vendor.phone = phone;
            }
            if let Some(gst) = patch.gst_number.clone() {
                vendor.gst_number = gst;
            }
            if let Some(pan) = patch.pan_number.clone() {
                vendor.pan_number = pan;
            }
            normalize_profile(&mut vendor)?;
            self.ensure_identifiers_free(&vendor)?;

            vendor.updated_at = self.clock.now();
            self.store.update_vendor_profile(&vendor)?;
            self.record(
                vendor_id,
                &MarketEvent::VendorUpdated {
                    vendor_id: vendor_id.to_string(),
                },
            )?;
            Ok(vendor)
        })
    }

    pub fn get(&self, vendor_id: &str) -> MarketResult<VendorRow> {
        self.store
            .get_vendor(vendor_id)?
            .ok_or_else(|| MarketError::not_found("vendor", vendor_id))
    }

    /// Fast-path uniqueness check. The UNIQUE columns still back it up.
    fn ensure_identifiers_free(&self, vendor: &VendorRow) -> MarketResult<()> {
        let candidates = [
            (VendorIdentifier::Email, Some(vendor.email.as_str())),
            (VendorIdentifier::Gst, vendor.gst_number.as_deref()),
            (VendorIdentifier::Pan, vendor.pan_number.as_deref()),
        ];
        for (identifier, value) in candidates {
            let Some(value) = value else { continue };
            if self
                .store
                .vendor_holding_identifier(identifier, value, Some(&vendor.vendor_id))?
                .is_some()
            {
                return Err(MarketError::Conflict(ConflictKind::DuplicateIdentifier {
                    field: identifier.column(),
                    value: value.to_string(),
                }));
            }
        }
        Ok(())
    }

    // ── Status ────────────────────────────────────────────────────

    /// Follow one edge of the state machine. A reason, when given, is kept as
    /// a vendor issue.
    pub fn update_status(
        &self,
        vendor_id: &str,
        to: VendorStatus,
        reason: Option<&str>,
    ) -> MarketResult<VendorRow> {
        self.store.in_transaction(|| {
            let vendor = self.get(vendor_id)?;
            if !is_allowed_transition(vendor.status, to) {
                return Err(MarketError::invalid_state(
                    "vendor",
                    vendor_id,
                    format!("no transition from {} to {}", vendor.status, to),
                ));
            }
            if !self.transition_in_tx(vendor_id, vendor.status, to, reason, false)? {
                return Err(MarketError::invalid_state(
                    "vendor",
                    vendor_id,
                    format!("status changed from {} concurrently", vendor.status),
                ));
            }
            self.get(vendor_id)
        })
    }

    /// Manual override that ignores the edge table.
    pub fn force_status(
        &self,
        vendor_id: &str,
        to: VendorStatus,
        reason: &str,
    ) -> MarketResult<VendorRow> {
        if reason.trim().is_empty() {
            return Err(MarketError::validation("reason", "a forced status change needs a reason"));
        }
        self.store.in_transaction(|| {
            let vendor = self.get(vendor_id)?;
            if vendor.status == to {
                return Err(MarketError::invalid_state(
                    "vendor",
                    vendor_id,
                    format!("already {to}"),
                ));
            }
            if !self.transition_in_tx(vendor_id, vendor.status, to, Some(reason), true)? {
                return Err(MarketError::invalid_state(
                    "vendor",
                    vendor_id,
                    format!("status changed from {} concurrently", vendor.status),
                ));
            }
            log::warn!("vendor {vendor_id} forced {} -> {to}: {reason}", vendor.status);
            self.get(vendor_id)
        })
    }

    /// Conditional `from → to` move. Caller owns the transaction.
    /// Returns false when the vendor was no longer in `from`.
    pub(crate) fn transition_in_tx(
        &self,
        vendor_id: &str,
        from: VendorStatus,
        to: VendorStatus,
        reason: Option<&str>,
        forced: bool,
    ) -> MarketResult<bool> {
        let now = self.clock.now();
        if !self.store.transition_vendor_status(vendor_id, from, to, now)? {
            return Ok(false);
        }
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if let Some(reason) = reason {
            self.open_issue(vendor_id, &format!("Status changed to {to}"), Some(reason))?;
        }
        self.record(
            vendor_id,
            &MarketEvent::VendorStatusChanged {
                vendor_id: vendor_id.to_string(),
                from,
                to,
                reason: reason.map(str::to_string),
                forced,
            },
        )?;
        log::info!("vendor {vendor_id}: {from} -> {to}");
        Ok(true)
    }

    fn open_issue(
        &self,
        vendor_id: &str,
        subject: &str,
        description: Option<&str>,
    ) -> MarketResult<IssueRow> {
        let now = self.clock.now();
        let issue = IssueRow {
            issue_id: new_id(),
            vendor_id: vendor_id.to_string(),
            subject: subject.to_string(),
            description: description.map(str::to_string),
            status: IssueStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_issue(&issue)?;
        Ok(issue)
    }

    pub fn issues(&self, vendor_id: &str) -> MarketResult<Vec<IssueRow>> {
        self.get(vendor_id)?;
        self.store.issues_for_vendor(vendor_id)
    }

    // ── Onboarding records ────────────────────────────────────────

    pub fn add_address(&self, vendor_id: &str, new: NewAddress) -> MarketResult<VendorAddressRow> {
        for (field, value) in [
            ("line1", &new.line1),
            ("city", &new.city),
            ("state", &new.state),
            ("postal_code", &new.postal_code),
            ("country", &new.country),
        ] {
            require(field, value)?;
        }
        self.store.in_transaction(|| {
            self.get(vendor_id)?;
            let row = VendorAddressRow {
                address_id: new_id(),
                vendor_id: vendor_id.to_string(),
                line1: new.line1.trim().to_string(),
                line2: new.line2.clone(),
                city: new.city.trim().to_string(),
                state: new.state.trim().to_string(),
                postal_code: new.postal_code.trim().to_string(),
                country: new.country.trim().to_string(),
                is_primary: new.is_primary,
                created_at: self.clock.now(),
            };
            self.store.insert_address(&row)?;
            self.record(
                vendor_id,
                &MarketEvent::VendorUpdated {
                    vendor_id: vendor_id.to_string(),
                },
            )?;
            Ok(row)
        })
    }

    pub fn add_bank_account(
        &self,
        vendor_id: &str,
        new: NewBankAccount,
    ) -> MarketResult<BankAccountRow> {
        require("account_holder", &new.account_holder)?;
        require("account_number", &new.account_number)?;
        if !new.account_number.trim().chars().all(|c| c.is_ascii_digit()) {
            return Err(MarketError::validation("account_number", "digits only"));
        }
        let ifsc = new.ifsc_code.trim().to_ascii_uppercase();
        if !is_valid_ifsc(&ifsc) {
            return Err(MarketError::validation("ifsc_code", "expected 4 letters, '0', 6 alphanumerics"));
        }
        self.store.in_transaction(|| {
            self.get(vendor_id)?;
            let row = BankAccountRow {
                bank_account_id: new_id(),
                vendor_id: vendor_id.to_string(),
                account_holder: new.account_holder.trim().to_string(),
                account_number: new.account_number.trim().to_string(),
                ifsc_code: ifsc.clone(),
                bank_name: new.bank_name.clone(),
                is_primary: new.is_primary,
                created_at: self.clock.now(),
            };
            self.store.insert_bank_account(&row)?;
            self.record(
                vendor_id,
                &MarketEvent::VendorUpdated {
                    vendor_id: vendor_id.to_string(),
                },
            )?;
            Ok(row)
        })
    }

    pub fn submit_kyc(&self, vendor_id: &str, new: NewKyc) -> MarketResult<KycRow> {
        require("doc_type", &new.doc_type)?;
        self.store.in_transaction(|| {
            self.get(vendor_id)?;
            let now = self.clock.now();
            let row = KycRow {
                kyc_id: new_id(),
                vendor_id: vendor_id.to_string(),
                doc_type: new.doc_type.trim().to_string(),
                doc_reference: new.doc_reference.clone(),
                status: KycStatus::Pending,
                remarks: None,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_kyc(&row)?;
            self.record(
                &row.kyc_id,
                &MarketEvent::KycSubmitted {
                    kyc_id: row.kyc_id.clone(),
                    vendor_id: vendor_id.to_string(),
                },
            )?;
            Ok(row)
        })
    }

    /// Conditional PENDING → APPROVED/REJECTED. Caller owns the transaction.
    /// `None` when the document was no longer pending.
    pub(crate) fn review_kyc_in_tx(
        &self,
        kyc_id: &str,
        approve: bool,
        remarks: Option<&str>,
    ) -> MarketResult<Option<KycRow>> {
        let to = if approve {
            KycStatus::Approved
        } else {
            KycStatus::Rejected
        };
        if !self
            .store
            .review_pending_kyc(kyc_id, to, remarks, self.clock.now())?
        {
            return Ok(None);
        }
        let Some(row) = self.store.get_kyc(kyc_id)? else {
            return Ok(None);
        };
        self.record(
            kyc_id,
            &MarketEvent::KycReviewed {
                kyc_id: kyc_id.to_string(),
                vendor_id: row.vendor_id.clone(),
                status: to,
            },
        )?;
        log::info!("kyc {kyc_id} of vendor {} -> {to}", row.vendor_id);
        Ok(Some(row))
    }

    // ── Settings ──────────────────────────────────────────────────

    pub fn settings(&self, vendor_id: &str) -> MarketResult<VendorSettingRow> {
        self.store
            .get_vendor_setting(vendor_id)?
            .ok_or_else(|| MarketError::not_found("vendor_setting", vendor_id))
    }

    pub fn update_settings(
        &self,
        vendor_id: &str,
        patch: VendorSettingsPatch,
    ) -> MarketResult<VendorSettingRow> {
        if let Some(Some(c)) = &patch.default_commission {
            validate_commission("default_commission", c)?;
        }
        self.store.in_transaction(|| {
            self.get(vendor_id)?;
            let mut setting = self.settings(vendor_id)?;
            if let Some(auto) = patch.auto_payout {
                setting.auto_payout = auto;
            }
            if let Some(commission) = patch.default_commission {
                setting.default_commission_type = commission.map(|c| c.commission_type);
                setting.default_commission_value = commission.map(|c| c.value);
            }
            setting.updated_at = self.clock.now();
            self.store.insert_vendor_setting(&setting)?;
            self.record(
                vendor_id,
                &MarketEvent::VendorUpdated {
                    vendor_id: vendor_id.to_string(),
                },
            )?;
            Ok(setting)
        })
    }

    // ── Onboarding ────────────────────────────────────────────────

    pub fn onboarding_progress(&self, vendor_id: &str) -> MarketResult<OnboardingProgress> {
        let vendor = self.get(vendor_id)?;
        let business_info = vendor.legal_name.is_some()
            && (vendor.gst_number.is_some() || vendor.pan_number.is_some());
        Ok(OnboardingProgress::from_flags(
            vendor_id,
            [
                (OnboardingStep::BusinessInfo, business_info),
                (OnboardingStep::Address, self.store.address_count(vendor_id)? > 0),
                (OnboardingStep::BankAccount, self.store.bank_account_count(vendor_id)? > 0),
                (OnboardingStep::Kyc, self.store.live_kyc_count(vendor_id)? > 0),
            ],
        ))
    }

    /// Close out onboarding once every step is present and send the vendor a
    /// portal invite. Delivery happens after commit and never fails the call.
    pub fn complete_onboarding(&self, vendor_id: &str) -> MarketResult<OnboardingProgress> {
        let (vendor, progress) = self.store.in_transaction(|| {
            let vendor = self.get(vendor_id)?;
            if vendor.status == VendorStatus::Rejected {
                return Err(MarketError::invalid_state("vendor", vendor_id, "vendor was rejected"));
            }
            let progress = self.onboarding_progress(vendor_id)?;
            if let Some(step) = progress.next_step {
                return Err(MarketError::invalid_state(
                    "vendor",
                    vendor_id,
                    format!("onboarding incomplete: {step:?} missing"),
                ));
            }
            self.record(
                vendor_id,
                &MarketEvent::VendorOnboardingCompleted {
                    vendor_id: vendor_id.to_string(),
                },
            )?;
            Ok((vendor, progress))
        })?;

        let notifications = &self.config.notifications;
        send_quietly(
            self.notifier,
            &Notification {
                to: vendor.email.clone(),
                from: notifications.sender.clone(),
                subject: "Your vendor portal is ready".to_string(),
                body: format!(
                    "Hello {},\n\nOnboarding for {} is complete. Sign in at {}.",
                    vendor.name,
                    vendor.legal_name.as_deref().unwrap_or(&vendor.name),
                    notifications.portal_url
                ),
            },
        );
        Ok(progress)
    }
}

// ── Identifier checks ──────────────────────────────────────────────

fn require(field: &'static str, value: &str) -> MarketResult<()> {
    if value.trim().is_empty() {
        return Err(MarketError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Trim and canonicalise identifiers, then validate their formats.
fn normalize_profile(v: &mut VendorRow) -> MarketResult<()> {
    v.name = v.name.trim().to_string();
    require("name", &v.name)?;
    v.email = v.email.trim().to_ascii_lowercase();
    if !is_valid_email(&v.email) {
        return Err(MarketError::validation("email", "expected local@domain"));
    }
    v.legal_name = non_blank(v.legal_name.take());
    v.phone = non_blank(v.phone.take());
    v.pan_number = non_blank(v.pan_number.take()).map(|p| p.to_ascii_uppercase());
    v.gst_number = non_blank(v.gst_number.take()).map(|g| g.to_ascii_uppercase());

    if let Some(pan) = &v.pan_number {
        if !is_valid_pan(pan) {
            return Err(MarketError::validation("pan_number", "expected AAAAA9999A"));
        }
    }
    if let Some(gst) = &v.gst_number {
        if gst.len() != 15 || !gst.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MarketError::validation("gst_number", "expected 15 alphanumerics"));
        }
        if let Some(pan) = &v.pan_number {
            if &gst[2..12] != pan.as_str() {
                return Err(MarketError::validation("gst_number", "does not embed the PAN"));
            }
        }
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Five letters, four digits, one letter.
pub fn is_valid_pan(pan: &str) -> bool {
    let b = pan.as_bytes();
    b.len() == 10
        && b[..5].iter().all(u8::is_ascii_uppercase)
        && b[5..9].iter().all(u8::is_ascii_digit)
        && b[9].is_ascii_uppercase()
}

fn is_valid_ifsc(ifsc: &str) -> bool {
    let b = ifsc.as_bytes();
    b.len() == 11
        && b[..4].iter().all(u8::is_ascii_uppercase)
        && b[4] == b'0'
        && b[5..].iter().all(u8::is_ascii_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_table() {
        use VendorStatus::*;
        assert!(is_allowed_transition(Pending, Active));
        assert!(is_allowed_transition(Suspended, Active));
        assert!(!is_allowed_transition(Rejected, Active));
        assert!(!is_allowed_transition(Pending, Suspended));
        assert!(!is_allowed_transition(Active, Pending));
    }

    #[test]
    fn identifier_formats() {
        assert!(is_valid_pan("ABCDE1234F"));
        assert!(!is_valid_pan("ABCD12345F"));
        assert!(is_valid_email("shop@example.in"));
        assert!(!is_valid_email("shop@localhost"));
        assert!(!is_valid_email("@example.in"));
        assert!(is_valid_ifsc("HDFC0001234"));
        assert!(!is_valid_ifsc("HDFC1001234"));
    }

    #[test]
    fn gst_must_embed_pan() {
        let mut v = VendorRow {
            vendor_id: "v".into(),
            name: "Acme".into(),
            legal_name: None,
            email: " Sales@Acme.IN ".into(),
            phone: None,
            gst_number: Some("27abcde1234f1z5".into()),
            pan_number: Some("abcde1234f".into()),
            status: VendorStatus::Pending,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        normalize_profile(&mut v).unwrap();
        assert_eq!(v.email, "sales@acme.in");
        assert_eq!(v.gst_number.as_deref(), Some("27ABCDE1234F1Z5"));

        v.pan_number = Some("ZZZZZ9999Z".into());
        assert!(normalize_profile(&mut v).is_err());
    }

    #[test]
    fn progress_points_at_first_missing_step() {
        let p = OnboardingProgress::from_flags(
            "v",
            [
                (OnboardingStep::BusinessInfo, true),
                (OnboardingStep::Address, false),
                (OnboardingStep::BankAccount, true),
                (OnboardingStep::Kyc, false),
            ],
        );
        assert_eq!(p.completed_steps, 2);
        assert_eq!(p.next_step, Some(OnboardingStep::Address));
        assert!(!p.is_complete);
    }
}
