use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a mutation collided with existing data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    #[error("slug '{0}' is already taken")]
    DuplicateSlug(String),

    #[error("{field} '{value}' is already registered to another vendor")]
    DuplicateIdentifier { field: &'static str, value: String },

    #[error("statement '{0}' already has an open or completed payout")]
    DuplicatePayout(String),

    #[error("category '{0}' has children")]
    HasChildren(String),

    #[error("category '{0}' is referenced by {1} active product(s)")]
    CategoryInUse(String, i64),

    #[error("period overlaps statement '{0}'")]
    OverlappingPeriod(String),

    #[error("an active commission rule already exists for this vendor/category")]
    DuplicateRule,
}

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Invalid state for {entity} '{id}': {detail}")]
    InvalidState {
        entity: &'static str,
        id: String,
        detail: String,
    },

    #[error("Validation failed on '{field}': {reason}")]
    ValidationFailed { field: &'static str, reason: String },

    #[error("Category depth {level} exceeds maximum {max}")]
    DepthExceeded { level: u32, max: u32 },

    #[error("Category '{category_id}' cannot be placed under '{parent_id}': cycle")]
    CircularDependency { category_id: String, parent_id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type MarketResult<T> = Result<T, MarketError>;

/// Stable, serializable classification used at the request/response boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    ValidationFailed,
    DepthExceeded,
    CircularDependency,
    Infrastructure,
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid_state(
        entity: &'static str,
        id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.into(),
            detail: detail.into(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            Self::CircularDependency { .. } => ErrorKind::CircularDependency,
            Self::Database(_) | Self::Serialization(_) | Self::Other(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// True when the store itself failed, as opposed to a business rule.
    pub fn is_infrastructure(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }

    pub fn conflict_kind(&self) -> Option<&ConflictKind> {
        match self {
            Self::Conflict(kind) => Some(kind),
            _ => None,
        }
    }
}

/// One row a bulk operation left alone, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl SkippedItem {
    pub fn new(id: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            kind,
            message: message.into(),
        }
    }

    pub fn from_error(id: &str, err: &MarketError) -> Self {
        Self::new(id, err.kind(), err.to_string())
    }
}

/// True when SQLite rejected a write because of a UNIQUE constraint.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
