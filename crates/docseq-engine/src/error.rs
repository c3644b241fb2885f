//! # Allocator Error Types
//!
//! What callers of the allocator see.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Allocator Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────────┐  ┌─────────────────┐ │
//! │  │   Configuration     │  │   Caller input      │  │   Ledger state  │ │
//! │  │                     │  │                     │  │                 │ │
//! │  │ PrefixNotConfigured │  │ Validation          │  │ NotFoundOr-     │ │
//! │  │ Config              │  │ BranchNotFound      │  │   Expired       │ │
//! │  └─────────────────────┘  └─────────────────────┘  └─────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────────┐                      │
//! │  │   Contention        │  │   Storage           │                      │
//! │  │                     │  │                     │                      │
//! │  │ ConcurrencyTimeout  │  │ AllocationFailure   │                      │
//! │  │ (retryable)         │  │                     │                      │
//! │  └─────────────────────┘  └─────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use docseq_core::ValidationError;
use docseq_db::DbError;

/// Result type alias for allocator operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// Allocator error type.
#[derive(Debug, Error)]
pub enum AllocError {
    /// No prefix is seeded for the transaction type.
    #[error("No prefix configured for transaction type '{transaction_type}'")]
    PrefixNotConfigured { transaction_type: String },

    /// The branch whose initial should appear in the code does not exist.
    #[error("Branch {branch_id} not found")]
    BranchNotFound { branch_id: i64 },

    /// Missing or malformed input (source reference, code string, ...).
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No reservation in the expected state owned by the caller.
    ///
    /// Covers wrong owner, wrong status, already reclaimed, never issued.
    #[error("Code '{code}' not found or expired")]
    NotFoundOrExpired { code: String },

    /// Waited too long for the bucket lock or the database write lock.
    #[error("Timed out waiting for lock on {bucket}")]
    ConcurrencyTimeout { bucket: String },

    /// Storage failed underneath the allocator.
    #[error("Allocation failed: {0}")]
    AllocationFailure(String),

    /// Engine configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AllocError {
    /// Maps a storage error raised while working on `bucket`.
    pub(crate) fn from_db(err: DbError, bucket: impl ToString) -> Self {
        if err.is_transient() {
            AllocError::ConcurrencyTimeout {
                bucket: bucket.to_string(),
            }
        } else {
            AllocError::AllocationFailure(err.to_string())
        }
    }

    /// Returns true if the same call may succeed when simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocError::ConcurrencyTimeout { .. })
    }

    /// Returns true for the not-found family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AllocError::PrefixNotConfigured { .. }
                | AllocError::BranchNotFound { .. }
                | AllocError::NotFoundOrExpired { .. }
        )
    }
}

impl From<DbError> for AllocError {
    fn from(err: DbError) -> Self {
        AllocError::from_db(err, "database")
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration load/validate failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    /// Failed to write the config file.
    #[error("Failed to save config: {0}")]
    SaveFailed(String),

    /// Config parsed but holds an unusable value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

// =============================================================================
// Worker Errors
// =============================================================================

/// Reclaim worker control failures.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker is gone; its control channel is closed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The task queue could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_errors_are_retryable() {
        let err = AllocError::from_db(DbError::LockTimeout, "prefix#1/2025-01");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("prefix#1/2025-01"));

        let err = AllocError::from_db(DbError::PoolExhausted, "prefix#1/2025-01");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_db_errors_are_failures() {
        let err = AllocError::from_db(DbError::QueryFailed("no such table".into()), "b");
        assert!(matches!(err, AllocError::AllocationFailure(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_family() {
        assert!(AllocError::NotFoundOrExpired {
            code: "PO-2501-0001".into()
        }
        .is_not_found());
        assert!(AllocError::PrefixNotConfigured {
            transaction_type: "Purchase Order".into()
        }
        .is_not_found());
        assert!(!AllocError::Validation(ValidationError::required("source")).is_not_found());
    }
}
