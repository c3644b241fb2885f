//! # Repository Module
//!
//! Database repository implementations for docseq.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and their tables                        │
//! │                                                                         │
//! │  PrefixRepository    ──► prefixes                                      │
//! │  BranchRepository    ──► branches                                      │
//! │  SequenceRepository  ──► sequence_counters + sequence_reservations     │
//! │                          (+ reclaim_tasks inside the same transaction) │
//! │  ReclaimRepository   ──► reclaim_tasks (firing, retry, recovery)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PrefixRepository`](prefix::PrefixRepository) - transaction type → prefix code
//! - [`BranchRepository`](branch::BranchRepository) - branch initials
//! - [`SequenceRepository`](sequence::SequenceRepository) - allocate, confirm, cancel, release
//! - [`ReclaimRepository`](reclaim::ReclaimRepository) - expiry reclaim queue

pub mod branch;
pub mod prefix;
pub mod reclaim;
pub mod sequence;

use chrono::{DateTime, Utc};

use crate::error::{DbError, DbResult};

/// Converts a stored unix-millisecond column back into a timestamp.
pub(crate) fn from_millis(table: &str, millis: i64) -> DbResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::corrupt(table, format!("timestamp out of range: {millis}")))
}
