//! Commission resolver and rule management.
//!
//! Resolution walks a fixed, ordered chain of lookups and stops at the first
//! one that yields a commission:
//!
//!   1. active rule for the exact (vendor, category)
//!   2. the category's own default, when it declares a custom commission
//!   3. active vendor-wide rule (no category)
//!   4. the vendor's settings default
//!   5. platform fallback (platform_setting row, else config)
//!
//! Category defaults are never inherited from ancestors: only the exact
//! category assigned to the product is consulted.

use crate::{
    cache::TtlCache,
    category_subsystem::CategorySubsystem,
    clock::Clock,
    config::MarketConfig,
    error::{ConflictKind, MarketError, MarketResult},
    event::MarketEvent,
    store::{CategoryRow, CommissionRuleRow, MarketStore},
    subsystem::MarketSubsystem,
    types::{new_id, Amount, Commission, CommissionType, EntityId},
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub const PLATFORM_COMMISSION_TYPE_KEY: &str = "platform_commission_type";
pub const PLATFORM_COMMISSION_VALUE_KEY: &str = "platform_commission_value";

/// Cached platform fallback commission.
pub type PlatformSettingsCache = TtlCache<Commission>;

/// Which link of the resolution chain produced a commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionSource {
    ExactVendorCategoryRule,
    CategoryDefault,
    VendorWideRule,
    VendorDefault,
    PlatformFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCommission {
    #[serde(flatten)]
    pub commission: Commission,
    pub source: CommissionSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCommissionRule {
    pub vendor_id: EntityId,
    #[serde(default)]
    pub category_id: Option<EntityId>,
    #[serde(rename = "type")]
    pub commission_type: CommissionType,
    pub value: Amount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommissionRulePatch {
    #[serde(default, rename = "type")]
    pub commission_type: Option<CommissionType>,
    #[serde(default)]
    pub value: Option<Amount>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// What a lookup sees: the vendor and, when the sale has one, its category row.
struct Lookup<'c> {
    vendor_id: &'c str,
    category: Option<&'c CategoryRow>,
}

type LookupFn = fn(&CommissionSubsystem<'_>, &Lookup<'_>) -> MarketResult<Option<Commission>>;

/// The chain before the platform fallback, highest priority first.
const RESOLUTION_ORDER: [(CommissionSource, LookupFn); 4] = [
    (CommissionSource::ExactVendorCategoryRule, exact_rule),
    (CommissionSource::CategoryDefault, category_default),
    (CommissionSource::VendorWideRule, vendor_wide_rule),
    (CommissionSource::VendorDefault, vendor_default),
];

fn exact_rule(s: &CommissionSubsystem<'_>, l: &Lookup<'_>) -> MarketResult<Option<Commission>> {
    let Some(category) = l.category else {
        return Ok(None);
    };
    Ok(s.store
        .latest_active_rule(l.vendor_id, Some(&category.category_id))?
        .map(|r| Commission::new(r.commission_type, r.value)))
}

fn category_default(
    _s: &CommissionSubsystem<'_>,
    l: &Lookup<'_>,
) -> MarketResult<Option<Commission>> {
    Ok(l.category.and_then(CategorySubsystem::custom_commission))
}

fn vendor_wide_rule(s: &CommissionSubsystem<'_>, l: &Lookup<'_>) -> MarketResult<Option<Commission>> {
    Ok(s.store
        .latest_active_rule(l.vendor_id, None)?
        .map(|r| Commission::new(r.commission_type, r.value)))
}

fn vendor_default(s: &CommissionSubsystem<'_>, l: &Lookup<'_>) -> MarketResult<Option<Commission>> {
    Ok(s.store.get_vendor_setting(l.vendor_id)?.and_then(|setting| {
        match (setting.default_commission_type, setting.default_commission_value) {
            (Some(t), Some(v)) => Some(Commission::new(t, v)),
            _ => None,
        }
    }))
}

pub struct CommissionSubsystem<'a> {
    store: &'a MarketStore,
    clock: &'a dyn Clock,
    config: &'a MarketConfig,
    platform: &'a PlatformSettingsCache,
}

impl MarketSubsystem for CommissionSubsystem<'_> {
    fn name(&self) -> &'static str {
        "commission"
    }

    fn store(&self) -> &MarketStore {
        self.store
    }

    fn clock(&self) -> &dyn Clock {
        self.clock
    }
}

impl<'a> CommissionSubsystem<'a> {
    pub fn new(
        store: &'a MarketStore,
        clock: &'a dyn Clock,
        config: &'a MarketConfig,
        platform: &'a PlatformSettingsCache,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            platform,
        }
    }

    // ── Resolution ────────────────────────────────────────────────

    /// Effective commission for a sale by `vendor_id` in `category_id`.
    /// `None` category (uncategorised product) skips the category links.
    pub fn resolve(
        &self,
        vendor_id: &str,
        category_id: Option<&str>,
    ) -> MarketResult<ResolvedCommission> {
        if self.store.get_vendor(vendor_id)?.is_none() {
            return Err(MarketError::not_found("vendor", vendor_id));
        }
        let category = match category_id {
            Some(id) => Some(
                self.store
                    .get_category(id)?
                    .ok_or_else(|| MarketError::not_found("category", id))?,
            ),
            None => None,
        };
        let lookup = Lookup {
            vendor_id,
            category: category.as_ref(),
        };

        for (source, find) in RESOLUTION_ORDER {
            if let Some(commission) = find(self, &lookup)? {
                return Ok(ResolvedCommission { commission, source });
            }
        }
        Ok(ResolvedCommission {
            commission: self.platform_commission()?,
            source: CommissionSource::PlatformFallback,
        })
    }

    /// Fee for `sale` under `commission`, rounded to the configured scale.
    pub fn fee_for(&self, sale: Amount, commission: &Commission) -> MarketResult<Amount> {
        apply_commission(sale, commission, self.config.commission.fee_scale)
    }

    // ── Platform fallback ─────────────────────────────────────────

    /// The platform-wide fallback, read through the TTL cache.
    pub fn platform_commission(&self) -> MarketResult<Commission> {
        self.platform.get_or_load(|| self.load_platform_commission())
    }

    fn load_platform_commission(&self) -> MarketResult<Commission> {
        let kind = self.store.platform_setting(PLATFORM_COMMISSION_TYPE_KEY)?;
        let value = self.store.platform_setting(PLATFORM_COMMISSION_VALUE_KEY)?;
        let stored = match (kind, value) {
            (Some(kind), Some(value)) => {
                let parsed = CommissionType::parse(&kind)
                    .zip(value.parse::<Decimal>().ok())
                    .map(|(t, v)| Commission::new(t, v));
                if parsed.is_none() {
                    log::warn!("ignoring malformed platform commission setting ({kind}, {value})");
                }
                parsed
            }
            _ => None,
        };
        Ok(stored.unwrap_or_else(|| self.config.platform_fallback()))
    }

    /// Persist a new platform fallback and drop the cached one.
    pub fn set_platform_commission(&self, commission: Commission) -> MarketResult<Commission> {
        validate_commission("commission", &commission)?;
        self.store.in_transaction(|| {
            let now = self.clock.now();
            self.store.set_platform_setting(
                PLATFORM_COMMISSION_TYPE_KEY,
                commission.commission_type.as_str(),
                now,
            )?;
            self.store.set_platform_setting(
                PLATFORM_COMMISSION_VALUE_KEY,
                &commission.value.to_string(),
                now,
            )?;
            self.record(
                "platform",
                &MarketEvent::PlatformCommissionChanged {
                    value: commission.value,
                },
            )
        })?;
        self.platform.invalidate();
        log::info!(
            "platform commission set to {} {}",
            commission.value,
            commission.commission_type
        );
        Ok(commission)
    }

    // ── Rules ─────────────────────────────────────────────────────

    pub fn create_rule(&self, new: NewCommissionRule) -> MarketResult<CommissionRuleRow> {
        let commission = Commission::new(new.commission_type, new.value);
        validate_commission("value", &commission)?;

        self.store.in_transaction(|| {
            if self.store.get_vendor(&new.vendor_id)?.is_none() {
                return Err(MarketError::not_found("vendor", &new.vendor_id));
            }
            if let Some(category_id) = new.category_id.as_deref() {
                if self.store.get_category(category_id)?.is_none() {
                    return Err(MarketError::not_found("category", category_id));
                }
            }
            if self
                .store
                .active_rule_exists(&new.vendor_id, new.category_id.as_deref(), None)?
            {
                return Err(MarketError::Conflict(ConflictKind::DuplicateRule));
            }

            let now = self.clock.now();
            let rule = CommissionRuleRow {
                rule_id: new_id(),
                vendor_id: new.vendor_id.clone(),
                category_id: new.category_id.clone(),
                commission_type: commission.commission_type,
                value: commission.value,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_commission_rule(&rule)?;
            self.record(
                &rule.rule_id,
                &MarketEvent::CommissionRuleCreated {
                    rule_id: rule.rule_id.clone(),
                    vendor_id: rule.vendor_id.clone(),
                    category_id: rule.category_id.clone(),
                },
            )?;
            Ok(rule)
        })
    }

    pub fn update_rule(
        &self,
        rule_id: &str,
        patch: CommissionRulePatch,
    ) -> MarketResult<CommissionRuleRow> {
        self.store.in_transaction(|| {
            let mut rule = self
                .store
                .get_commission_rule(rule_id)?
                .ok_or_else(|| MarketError::not_found("commission_rule", rule_id))?;
            if let Some(t) = patch.commission_type {
                rule.commission_type = t;
            }
            if let Some(v) = patch.value {
                rule.value = v;
            }
            if let Some(active) = patch.is_active {
                rule.is_active = active;
            }
            validate_commission("value", &Commission::new(rule.commission_type, rule.value))?;

            if rule.is_active
                && self.store.active_rule_exists(
                    &rule.vendor_id,
                    rule.category_id.as_deref(),
                    Some(rule_id),
                )?
            {
                return Err(MarketError::Conflict(ConflictKind::DuplicateRule));
            }

            rule.updated_at = self.clock.now();
            self.store.update_commission_rule(&rule)?;
            self.record(
                rule_id,
                &MarketEvent::CommissionRuleUpdated {
                    rule_id: rule_id.to_string(),
                },
            )?;
            Ok(rule)
        })
    }

    pub fn delete_rule(&self, rule_id: &str) -> MarketResult<()> {
        self.store.in_transaction(|| {
            if self.store.delete_commission_rule(rule_id)? == 0 {
                return Err(MarketError::not_found("commission_rule", rule_id));
            }
            self.record(
                rule_id,
                &MarketEvent::CommissionRuleDeleted {
                    rule_id: rule_id.to_string(),
                },
            )
        })
    }

    pub fn get_rule(&self, rule_id: &str) -> MarketResult<CommissionRuleRow> {
        self.store
            .get_commission_rule(rule_id)?
            .ok_or_else(|| MarketError::not_found("commission_rule", rule_id))
    }

    pub fn rules_for_vendor(&self, vendor_id: &str) -> MarketResult<Vec<CommissionRuleRow>> {
        if self.store.get_vendor(vendor_id)?.is_none() {
            return Err(MarketError::not_found("vendor", vendor_id));
        }
        self.store.commission_rules_for_vendor(vendor_id)
    }
}

/// Commission values are non-negative; percentages are at most 100.
pub fn validate_commission(field: &'static str, commission: &Commission) -> MarketResult<()> {
    if commission.value.is_sign_negative() && !commission.value.is_zero() {
        return Err(MarketError::validation(field, "commission value must not be negative"));
    }
    if commission.commission_type == CommissionType::Percentage
        && commission.value > Decimal::ONE_HUNDRED
    {
        return Err(MarketError::validation(field, "percentage must not exceed 100"));
    }
    Ok(())
}

/// `sale * value / 100` for percentages, `value` capped at `sale` for flat
/// fees. Rounded half away from zero to `scale` decimal places.
pub fn apply_commission(sale: Amount, commission: &Commission, scale: u32) -> MarketResult<Amount> {
    let raw = match commission.commission_type {
        CommissionType::Percentage => sale
            .checked_mul(commission.value)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| MarketError::validation("amount", "fee is out of range"))?,
        CommissionType::Flat => commission.value.min(sale),
    };
    Ok(raw.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero))
}
