//! # docseq-core: Pure Domain Logic for docseq
//!
//! This crate holds everything about document numbering that can be decided
//! without touching a database or a clock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        docseq Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Application layer (out of scope)                    │   │
//! │  │    save purchase order ──► generate / confirm / cancel           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    docseq-engine (Allocator)                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ docseq-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   scope   │  │   code    │  │ validation│  │   │
//! │  │   │ Period    │  │ Scope     │  │ format    │  │  rules    │  │   │
//! │  │   │ Bucket    │  │ ScopeTable│  │ parse     │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    docseq-db (Database Layer)                    │   │
//! │  │        counters, reservations, reclaim tasks (SQLite)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Prefix, SequenceCounter, Reservation, ...)
//! - [`scope`] - Transaction-type scoping rules
//! - [`code`] - Document code formatting and parsing
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use docseq_core::code::format_code;
//! use docseq_core::types::Period;
//!
//! let period = Period::new(2025, 1).unwrap();
//! assert_eq!(format_code("PO", None, period, 42), "PO-2501-0042");
//! assert_eq!(format_code("SA", Some("JKT"), period, 1), "SA-JKT-2501-0001");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod code;
pub mod error;
pub mod scope;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use code::{format_code, parse_code, ParsedCode};
pub use error::{CoreError, ValidationError};
pub use scope::{Scope, ScopeTable};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// How long a reservation stays claimed before the reclaimer may return it
/// to the pool (seconds).
///
/// ## Business Reason
/// One hour is long enough for a clerk to finish filling in a document
/// after previewing its number, short enough that abandoned drafts do not
/// leave holes in the month's numbering for long.
pub const DEFAULT_RESERVATION_TTL_SECS: i64 = 3600;

/// Default lifetime of a cached prefix or branch lookup (seconds).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Minimum rendered width of the sequence number.
///
/// Numbers past 9999 widen instead of wrapping.
pub const SEQUENCE_WIDTH: usize = 4;
