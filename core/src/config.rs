use crate::types::{Amount, Commission, CommissionType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Used when neither category, vendor rule, vendor setting nor a
    /// platform_setting row supplies a commission.
    pub platform_fallback_type: CommissionType,
    pub platform_fallback_value: Amount,
    /// Decimal places fees are rounded to.
    #[serde(default = "default_fee_scale")]
    pub fee_scale: u32,
}

fn default_fee_scale() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesConfig {
    /// Largest single sale `record_sale` accepts. Keeps fee and statement
    /// sums well inside the decimal range.
    pub max_sale_amount: Amount,
}

impl Default for SalesConfig {
    fn default() -> Self {
        Self {
            max_sale_amount: Decimal::new(10_000_000_000, 0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub platform_settings_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub sender: String,
    pub portal_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub commission: CommissionConfig,
    #[serde(default)]
    pub sales: SalesConfig,
    pub queues: QueueConfig,
    pub cache: CacheConfig,
    pub notifications: NotificationConfig,
}

impl MarketConfig {
    /// Load from the data/ directory.
    /// In tests, use MarketConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/market.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: MarketConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        log::info!("Loaded market config from {path}");
        Ok(config)
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            commission: CommissionConfig {
                platform_fallback_type: CommissionType::Percentage,
                platform_fallback_value: Decimal::new(5, 0),
                fee_scale: 2,
            },
            sales: SalesConfig::default(),
            queues: QueueConfig {
                default_page_size: 20,
                max_page_size: 100,
            },
            cache: CacheConfig {
                platform_settings_ttl_secs: 300,
            },
            notifications: NotificationConfig {
                sender: "onboarding@marketplace.test".into(),
                portal_url: "https://vendors.marketplace.test".into(),
            },
        }
    }

    pub fn platform_fallback(&self) -> Commission {
        Commission::new(
            self.commission.platform_fallback_type,
            self.commission.platform_fallback_value,
        )
    }

    /// Clamp a requested page size into [1, max_page_size].
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.queues.default_page_size)
            .clamp(1, self.queues.max_page_size)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let value = self.commission.platform_fallback_value;
        if value.is_sign_negative() {
            anyhow::bail!("platform_fallback_value must be non-negative, got {value}");
        }
        if self.commission.platform_fallback_type == CommissionType::Percentage
            && value > Decimal::ONE_HUNDRED
        {
            anyhow::bail!("platform_fallback_value is a percentage above 100: {value}");
        }
        if self.sales.max_sale_amount <= Decimal::ZERO {
            anyhow::bail!("max_sale_amount must be positive");
        }
        if self.queues.default_page_size == 0 || self.queues.max_page_size == 0 {
            anyhow::bail!("queue page sizes must be positive");
        }
        if self.cache.platform_settings_ttl_secs < 0 {
            anyhow::bail!("platform_settings_ttl_secs must be non-negative");
        }
        Ok(())
    }
}
