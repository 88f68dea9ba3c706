//! Shared primitive types used across the marketplace core.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// A stable, unique identifier for any persisted entity.
pub type EntityId = String;

/// Wall-clock instant. Persisted as Unix milliseconds.
pub type Timestamp = DateTime<Utc>;

/// Money and commission values. Exact decimal arithmetic only.
pub type Amount = rust_decimal::Decimal;

pub fn new_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

/// Patch-field deserializer: absent → None, null → Some(None), value → Some(Some(v)).
/// Use with `#[serde(default, deserialize_with = "double_option")]`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Declares a status-like enum stored as lower-case TEXT.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                Self::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} '{}'", stringify!($name), text).into())
                })
            }
        }
    };
}

text_enum!(
    /// Vendor account status. Mutated only by the lifecycle manager.
    VendorStatus {
        Pending => "pending",
        Active => "active",
        Suspended => "suspended",
        Rejected => "rejected",
    }
);

text_enum!(
    CommissionType {
        Percentage => "percentage",
        Flat => "flat",
    }
);

text_enum!(
    StatementStatus {
        Draft => "draft",
        Finalized => "finalized",
    }
);

text_enum!(
    PayoutStatus {
        Initiated => "initiated",
        Completed => "completed",
        Failed => "failed",
    }
);

text_enum!(
    KycStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
);

text_enum!(
    IssueStatus {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
);

/// A resolved or declared commission: what kind of fee, and how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    #[serde(rename = "type")]
    pub commission_type: CommissionType,
    pub value: Amount,
}

impl Commission {
    pub fn new(commission_type: CommissionType, value: Amount) -> Self {
        Self {
            commission_type,
            value,
        }
    }

    pub fn percentage(value: Amount) -> Self {
        Self::new(CommissionType::Percentage, value)
    }

    pub fn flat(value: Amount) -> Self {
        Self::new(CommissionType::Flat, value)
    }
}

/// 1-based page request for queue reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    pub fn first(per_page: u32) -> Self {
        Self::new(1, per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.per_page)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
