//! # Validation Module
//!
//! Input validation for the allocator and its administrative surface.
//!
//! Prefix codes and branch initials end up inside `-` delimited codes, so
//! they may not contain `-` themselves; otherwise a code could not be split
//! back into its parts.
//!
//! ## Usage
//! ```rust
//! use docseq_core::validation::{validate_prefix_code, validate_transaction_type};
//!
//! validate_transaction_type("Purchase Order").unwrap();
//! validate_prefix_code("PO").unwrap();
//! assert!(validate_prefix_code("P-O").is_err());
//! ```

use crate::error::ValidationError;
use crate::types::CallerContext;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted transaction type name.
pub const MAX_TRANSACTION_TYPE_LEN: usize = 100;

/// Longest accepted prefix code.
pub const MAX_PREFIX_LEN: usize = 10;

/// Longest accepted branch initial.
pub const MAX_INITIAL_LEN: usize = 10;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a transaction type name.
///
/// ## Returns
/// The trimmed name.
pub fn validate_transaction_type(transaction_type: &str) -> ValidationResult<&str> {
    let transaction_type = transaction_type.trim();

    if transaction_type.is_empty() {
        return Err(ValidationError::required("transaction_type"));
    }

    if transaction_type.len() > MAX_TRANSACTION_TYPE_LEN {
        return Err(ValidationError::TooLong {
            field: "transaction_type".to_string(),
            max: MAX_TRANSACTION_TYPE_LEN,
        });
    }

    Ok(transaction_type)
}

/// Validates a prefix code.
///
/// ## Rules
/// - 1 to 10 characters
/// - ASCII letters and digits only
pub fn validate_prefix_code(prefix_code: &str) -> ValidationResult<()> {
    validate_code_token("prefix_code", prefix_code, MAX_PREFIX_LEN)
}

/// Validates a branch initial. Same rules as a prefix code.
pub fn validate_branch_initial(initial: &str) -> ValidationResult<()> {
    validate_code_token("initial", initial, MAX_INITIAL_LEN)
}

fn validate_code_token(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::invalid_format(
            field,
            "must contain only ASCII letters and digits",
        ));
    }

    Ok(())
}

// =============================================================================
// Caller Validators
// =============================================================================

/// Validates the caller context supplied by the session layer.
pub fn validate_caller(caller: &CallerContext) -> ValidationResult<()> {
    if caller.user_id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "user_id".to_string(),
        });
    }

    if matches!(caller.branch_id, Some(id) if id <= 0) {
        return Err(ValidationError::MustBePositive {
            field: "branch_id".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_transaction_type() {
        assert_eq!(
            validate_transaction_type("  Purchase Order ").unwrap(),
            "Purchase Order"
        );
        assert!(validate_transaction_type("   ").is_err());
        assert!(validate_transaction_type(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_prefix_code() {
        assert!(validate_prefix_code("PO").is_ok());
        assert!(validate_prefix_code("INV2").is_ok());
        assert!(validate_prefix_code("").is_err());
        assert!(validate_prefix_code("P-O").is_err());
        assert!(validate_prefix_code("P O").is_err());
        assert!(validate_prefix_code("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn test_validate_branch_initial() {
        assert!(validate_branch_initial("JKT").is_ok());
        assert!(validate_branch_initial("J-K").is_err());
    }

    #[test]
    fn test_validate_caller() {
        assert!(validate_caller(&CallerContext::new(1)).is_ok());
        assert!(validate_caller(&CallerContext::new(0)).is_err());
        assert!(validate_caller(&CallerContext::new(1).with_branch(0)).is_err());
    }
}
