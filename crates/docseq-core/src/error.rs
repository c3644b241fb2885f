//! # Error Types
//!
//! Domain-specific error types for docseq-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  docseq-core errors (this file)                                        │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  docseq-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  docseq-engine errors                                                  │
//! │  └── AllocError       - What callers of generate/confirm/cancel see    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → AllocError → caller               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A reservation status string read from storage is not one we know.
    #[error("Unknown reservation status: {0}")]
    UnknownStatus(String),

    /// A source kind string is not one we know.
    #[error("Unknown source kind: {0}")]
    UnknownSourceKind(String),

    /// A scope name in configuration is not one we know.
    #[error("Unknown scope: {0}")]
    UnknownScope(String),

    /// Year/month outside the range a document code can express.
    #[error("Invalid period {year}-{month:02}")]
    InvalidPeriod { year: i32, month: u32 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any lock is taken, so a bad request never costs the
/// other callers in the bucket anything.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (malformed document code, bad prefix characters, ...).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidFormat`].
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidPeriod {
            year: 2025,
            month: 13,
        };
        assert_eq!(err.to_string(), "Invalid period 2025-13");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::required("source");
        assert_eq!(err.to_string(), "source is required");

        let err = ValidationError::invalid_format("code", "missing sequence number");
        assert_eq!(
            err.to_string(),
            "code has invalid format: missing sequence number"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("transaction_type").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
