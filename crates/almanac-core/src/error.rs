//! Error types for the almanac persistence core.

use crate::generation::{GenerationStage, MonthStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the almanac persistence core.
///
/// Validation and not-found failures are typed so the caller can map them
/// to precise responses; durability and corruption failures are recovered
/// inside the storage layer and never reach this type on the read path.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AlmanacError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Product type is not part of the known price table
    #[error("Invalid product type: '{0}'")]
    InvalidProductType(String),

    /// Cart quantity outside the accepted 1..=99 range
    #[error("Quantity out of range: {0} (must be 1..=99)")]
    QuantityOutOfRange(u32),

    /// Variant index does not address an existing variant
    #[error("Variant index {index} out of range (have {len} variants)")]
    VariantIndexOutOfRange { index: usize, len: usize },

    /// A month has already used all of its regeneration attempts
    #[error("Retry limit reached for month {month_number}")]
    RetryLimitReached { month_number: u8 },

    /// Rejected generation-stage transition
    #[error("Invalid generation stage transition: {from} -> {to}")]
    InvalidStageTransition {
        from: GenerationStage,
        to: GenerationStage,
    },

    /// Rejected month-status transition
    #[error("Invalid month status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: MonthStatus,
        to: MonthStatus,
    },

    /// A required theme entry was missing from the supplied theme table
    #[error("Theme table has no entry for month {0}")]
    MissingTheme(u8),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AlmanacError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Migration error
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a validation failure (safe to map to a 4xx
    /// response; the record was left untouched).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidProductType(_)
                | Self::QuantityOutOfRange(_)
                | Self::VariantIndexOutOfRange { .. }
                | Self::RetryLimitReached { .. }
                | Self::InvalidStageTransition { .. }
                | Self::InvalidStatusTransition { .. }
                | Self::MissingTheme(_)
        )
    }
}

impl From<std::io::Error> for AlmanacError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for AlmanacError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, AlmanacError>`.
pub type Result<T> = std::result::Result<T, AlmanacError>;
