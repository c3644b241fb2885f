//! # docseq-db: Database Layer for docseq
//!
//! SQLite storage for prefixes, branches, sequence counters, reservations
//! and the reclaim task queue, accessed through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        docseq Data Flow                                 │
//! │                                                                         │
//! │  Allocator::generate("Purchase Order", caller, None)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     docseq-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ PrefixRepository   │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ BranchRepository   │  │ 001_init   │  │   │
//! │  │   │ WAL + busy    │    │ SequenceRepository │  │            │  │   │
//! │  │   │ timeout       │    │ ReclaimRepository  │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      SQLite (docseq.db)                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docseq_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./docseq.db")).await?;
//! let prefix = db.prefixes().get_by_transaction_type("Purchase Order").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::branch::BranchRepository;
pub use repository::prefix::PrefixRepository;
pub use repository::reclaim::{ReclaimOutcome, ReclaimRepository};
pub use repository::sequence::{Allocation, BucketSnapshot, SequenceRepository};
