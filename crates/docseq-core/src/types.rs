//! # Domain Types
//!
//! Core domain types used throughout docseq.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────┐      │
//! │  │     Prefix      │   │ SequenceCounter  │   │  Reservation    │      │
//! │  │  ─────────────  │   │  ──────────────  │   │  ─────────────  │      │
//! │  │  id             │◄──│  prefix_id       │◄──│  counter_id     │      │
//! │  │  transaction_   │   │  year, month     │   │  sequence_number│      │
//! │  │    type (key)   │   │  source?         │   │  status         │      │
//! │  │  prefix_code    │   │  current_value   │   │  owner, expiry  │      │
//! │  └─────────────────┘   └──────────────────┘   └─────────────────┘      │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────┐      │
//! │  │    SourceRef    │   │     Period      │   │ReservationStatus │      │
//! │  │  kind + id      │   │  year + month   │   │  Available       │      │
//! │  │  branch:7       │   │  2025-01 → 2501 │   │  Reserved        │      │
//! │  └─────────────────┘   └─────────────────┘   │  Confirmed       │      │
//! │                                              └──────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Bucket Identity
//! A [`BucketKey`] is (prefix, period, optional source). Every bucket owns
//! exactly one counter and the pool of reservations minted from it.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// =============================================================================
// Prefix
// =============================================================================

/// Mapping of a transaction type to its short code prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefix {
    /// Surrogate key; counters reference this, not the code string.
    pub id: i64,

    /// Transaction type name, e.g. "Purchase Order".
    pub transaction_type: String,

    /// Short code, e.g. "PO".
    pub prefix_code: String,

    /// When the prefix was seeded.
    pub created_at: DateTime<Utc>,

    /// When the prefix code was last edited.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Branch
// =============================================================================

/// A branch whose initial appears in branch-scoped codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    /// Short code rendered into documents, e.g. "JKT".
    pub initial: String,
    pub is_active: bool,
}

// =============================================================================
// Source Reference
// =============================================================================

/// Kind of entity a source-scoped counter is partitioned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Branch,
    Warehouse,
}

impl SourceKind {
    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Branch => "branch",
            SourceKind::Warehouse => "warehouse",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "branch" => Ok(SourceKind::Branch),
            "warehouse" => Ok(SourceKind::Warehouse),
            other => Err(CoreError::UnknownSourceKind(other.to_string())),
        }
    }
}

/// The originating entity of a transaction, e.g. `branch:7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub id: i64,
}

impl SourceRef {
    /// Creates a source reference.
    pub const fn new(kind: SourceKind, id: i64) -> Self {
        SourceRef { kind, id }
    }

    /// Reference to a branch.
    pub const fn branch(id: i64) -> Self {
        SourceRef::new(SourceKind::Branch, id)
    }

    /// Reference to a warehouse.
    pub const fn warehouse(id: i64) -> Self {
        SourceRef::new(SourceKind::Warehouse, id)
    }

    /// Returns the branch id if this is a branch reference.
    pub fn branch_id(&self) -> Option<i64> {
        match self.kind {
            SourceKind::Branch => Some(self.id),
            SourceKind::Warehouse => None,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// =============================================================================
// Caller Context
// =============================================================================

/// Who is asking, supplied by the session layer on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: i64,
    /// Branch the user works at, used by caller-branch-scoped types.
    pub branch_id: Option<i64>,
}

impl CallerContext {
    /// A caller with no branch affiliation.
    pub const fn new(user_id: i64) -> Self {
        CallerContext {
            user_id,
            branch_id: None,
        }
    }

    /// Sets the caller's branch affiliation.
    pub const fn with_branch(mut self, branch_id: i64) -> Self {
        self.branch_id = Some(branch_id);
        self
    }
}

// =============================================================================
// Period
// =============================================================================

/// A (year, month) numbering period. Counters restart in every period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Creates a period.
    ///
    /// Years are limited to 2000..=2099 so the two-digit year in a code maps
    /// back to exactly one period.
    pub fn new(year: i32, month: u32) -> Result<Self, CoreError> {
        if !(2000..=2099).contains(&year) || !(1..=12).contains(&month) {
            return Err(CoreError::InvalidPeriod { year, month });
        }
        Ok(Period { year, month })
    }

    /// Period containing the given instant (UTC).
    pub fn containing(at: DateTime<Utc>) -> Result<Self, CoreError> {
        Period::new(at.year(), at.month())
    }

    /// Four-digit year.
    #[inline]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Month, 1-12.
    #[inline]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// `yymm` token as rendered in codes, e.g. "2501".
    pub fn yymm(&self) -> String {
        format!("{:02}{:02}", self.year % 100, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

// =============================================================================
// Bucket
// =============================================================================

/// Partition owning one counter and its reservation pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub prefix_id: i64,
    pub period: Period,
    /// Present only for source-scoped transaction types.
    pub source: Option<SourceRef>,
}

impl BucketKey {
    pub const fn new(prefix_id: i64, period: Period, source: Option<SourceRef>) -> Self {
        BucketKey {
            prefix_id,
            period,
            source,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(source) => write!(f, "prefix#{}/{}/{}", self.prefix_id, self.period, source),
            None => write!(f, "prefix#{}/{}", self.prefix_id, self.period),
        }
    }
}

// =============================================================================
// Sequence Counter
// =============================================================================

/// Monotonic high-water mark of numbers minted in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounter {
    pub id: i64,
    pub bucket: BucketKey,
    /// Largest sequence number ever minted; 0 before the first one.
    pub current_value: i64,
}

// =============================================================================
// Reservation Status
// =============================================================================

/// State of a single sequence number within its bucket.
///
/// ## Transitions
/// ```text
///              generate                confirm
///  available ───────────► reserved ───────────► confirmed
///      ▲                     │                      │
///      │   release / expiry  │                      │
///      ├─────────────────────┘                      │
///      │                 cancel (void)              │
///      └────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Free for the next `generate` in the bucket.
    Available,
    /// Claimed by a caller until confirmed, released, or expired.
    Reserved,
    /// Consumed by a persisted document.
    Confirmed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Available => "available",
            ReservationStatus::Reserved => "reserved",
            ReservationStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ReservationStatus::Available),
            "reserved" => Ok(ReservationStatus::Reserved),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// A claim on one sequence number. Recycled forever, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique identifier (UUID v4); reclaim tasks are keyed by it.
    pub id: String,

    /// Counter (bucket) this number was minted from.
    pub counter_id: i64,

    /// Immutable once created.
    pub sequence_number: i64,

    pub status: ReservationStatus,

    /// Set while reserved or confirmed.
    pub owner_user_id: Option<i64>,

    /// Set only while reserved.
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Reclaim Task
// =============================================================================

/// A scheduled expiry check for one reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimTask {
    pub reservation_id: String,
    /// When the task becomes due.
    pub run_at: DateTime<Utc>,
    /// Failed firings so far.
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_period_bounds() {
        assert!(Period::new(2025, 1).is_ok());
        assert!(Period::new(2025, 0).is_err());
        assert!(Period::new(2025, 13).is_err());
        assert!(Period::new(1999, 12).is_err());
        assert!(Period::new(2100, 1).is_err());
    }

    #[test]
    fn test_period_yymm() {
        assert_eq!(Period::new(2025, 1).unwrap().yymm(), "2501");
        assert_eq!(Period::new(2009, 11).unwrap().yymm(), "0911");
    }

    #[test]
    fn test_period_containing() {
        let at = Utc.with_ymd_and_hms(2025, 2, 28, 23, 59, 59).unwrap();
        let period = Period::containing(at).unwrap();
        assert_eq!(period.year(), 2025);
        assert_eq!(period.month(), 2);
    }

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("branch".parse::<SourceKind>().unwrap(), SourceKind::Branch);
        assert_eq!("Warehouse".parse::<SourceKind>().unwrap(), SourceKind::Warehouse);
        assert!("region".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_bucket_display() {
        let period = Period::new(2025, 1).unwrap();
        assert_eq!(BucketKey::new(3, period, None).to_string(), "prefix#3/2025-01");
        assert_eq!(
            BucketKey::new(3, period, Some(SourceRef::branch(7))).to_string(),
            "prefix#3/2025-01/branch:7"
        );
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            ReservationStatus::Available,
            ReservationStatus::Reserved,
            ReservationStatus::Confirmed,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), status);
        }
        assert!("void".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ReservationStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
    }
}
