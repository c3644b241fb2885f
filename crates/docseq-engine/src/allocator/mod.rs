//! # Allocator
//!
//! The surface business code calls when it saves or voids a document.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Reservation Lifecycle                               │
//! │                                                                         │
//! │               generate                    confirm                       │
//! │   (minted) ──────────────► RESERVED ─────────────────► CONFIRMED        │
//! │                              │  ▲                          │            │
//! │              release/expiry  │  │ generate                 │ cancel     │
//! │                              ▼  │ (smallest first)         ▼            │
//! │                            AVAILABLE ◄─────────────────────┘            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Call Path
//! ```text
//!   validate ─► prefix registry ─► scope table ─► branch directory
//!       │
//!       ▼
//!   BucketKey(prefix, period, source)
//!       │
//!       ▼
//!   bucket lock ─► one SQLite transaction ─► format code
//! ```
//!
//! Lookups that may touch the database (prefix, branch initial) happen before
//! the bucket lock is taken. Only the single ledger transaction runs under it.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use docseq_core::validation::{validate_caller, validate_transaction_type};
use docseq_core::{
    format_code, parse_code, Branch, BucketKey, CallerContext, Period, Prefix, Reservation,
    ScopeTable, SourceRef,
};
use docseq_db::{BucketSnapshot, Database};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{AllocError, AllocResult};
use crate::locks::BucketLocks;
use crate::registry::{BranchDirectory, PrefixRegistry};


/// Issues, confirms and voids document codes.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct Allocator {
    db: Database,
    prefixes: PrefixRegistry,
    branches: BranchDirectory,
    scopes: ScopeTable,
    locks: BucketLocks,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    lock_timeout: Duration,
}

/// A code resolved back to the bucket and number it names.
#[derive(Debug, Clone, Copy)]
struct Target {
    bucket: BucketKey,
    sequence_number: i64,
}

impl Allocator {
    /// Creates an allocator on the system clock.
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    /// Creates an allocator on the given clock.
    pub fn with_clock(db: Database, config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let prefix_ttl = Duration::from_secs(config.cache.prefix_ttl_secs);
        let branch_ttl = Duration::from_secs(config.cache.branch_ttl_secs);

        Allocator {
            prefixes: PrefixRegistry::new(db.clone(), prefix_ttl, clock.clone()),
            branches: BranchDirectory::new(db.clone(), branch_ttl, clock.clone()),
            scopes: config.scope_table(),
            locks: BucketLocks::new(),
            ttl: config.reservation.ttl(),
            lock_timeout: config.reservation.lock_timeout(),
            clock,
            db,
        }
    }

    /// The database this allocator writes to.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Reserves a number and returns its code.
    ///
    /// The smallest available number in the bucket is handed out first; a
    /// number the caller already holds unexpired counts as available to
    /// them. Only when none exists is a new number minted.
    ///
    /// ## Errors
    /// * `Validation` - bad caller, or a required source is missing
    /// * `PrefixNotConfigured` / `BranchNotFound`
    /// * `ConcurrencyTimeout` - retryable
    /// * `AllocationFailure`
    #[instrument(skip(self, caller, source), fields(user_id = caller.user_id))]
    pub async fn generate(
        &self,
        transaction_type: &str,
        caller: &CallerContext,
        source: Option<SourceRef>,
    ) -> AllocResult<String> {
        let transaction_type = validate_transaction_type(transaction_type)?;
        validate_caller(caller)?;

        let prefix = self.prefixes.resolve(transaction_type).await?;
        let source = self
            .scopes
            .classify(transaction_type)
            .resolve_source(source, caller)?;

        let branch_initial = match source.and_then(|s| s.branch_id()) {
            Some(branch_id) => Some(self.branches.initial(branch_id).await?),
            None => None,
        };

        let now = self.clock.now();
        let period = Period::containing(now)
            .map_err(|e| AllocError::AllocationFailure(e.to_string()))?;
        let bucket = BucketKey::new(prefix.id, period, source);

        let allocation = {
            let _guard = self.locks.acquire(&bucket, self.lock_timeout).await?;
            self.db
                .sequences()
                .allocate(&bucket, caller.user_id, now, self.ttl)
                .await
                .map_err(|e| AllocError::from_db(e, bucket))?
        };

        let sequence_number = allocation.reservation.sequence_number;
        let code = format_code(
            &prefix.prefix_code,
            branch_initial.as_deref(),
            period,
            sequence_number,
        );

        info!(
            transaction_type = %transaction_type,
            bucket = %bucket,
            sequence_number,
            reservation_id = %allocation.reservation.id,
            minted = allocation.minted,
            code = %code,
            "Code reserved"
        );

        Ok(code)
    }

    /// Marks a reserved code as used by a saved document.
    ///
    /// Only the owner may confirm, and only before the reservation expires.
    /// An expired code fails with `NotFoundOrExpired` whether or not the
    /// reclaimer has returned it to the pool yet.
    #[instrument(skip(self, caller, source), fields(user_id = caller.user_id))]
    pub async fn confirm(
        &self,
        transaction_type: &str,
        code: &str,
        caller: &CallerContext,
        source: Option<SourceRef>,
    ) -> AllocResult<()> {
        let target = self.resolve_code(transaction_type, code, caller, source).await?;

        let confirmed = {
            let _guard = self.locks.acquire(&target.bucket, self.lock_timeout).await?;
            self.db
                .sequences()
                .confirm(&target.bucket, target.sequence_number, caller.user_id, self.clock.now())
                .await
                .map_err(|e| AllocError::from_db(e, target.bucket))?
        };

        let reservation = confirmed.ok_or_else(|| not_found_or_expired(code))?;
        info!(
            code = %code,
            bucket = %target.bucket,
            reservation_id = %reservation.id,
            "Code confirmed"
        );

        Ok(())
    }

    /// Voids a confirmed code. Its number goes back to the pool.
    #[instrument(skip(self, caller, source), fields(user_id = caller.user_id))]
    pub async fn cancel(
        &self,
        transaction_type: &str,
        code: &str,
        caller: &CallerContext,
        source: Option<SourceRef>,
    ) -> AllocResult<()> {
        let target = self.resolve_code(transaction_type, code, caller, source).await?;

        let cancelled = {
            let _guard = self.locks.acquire(&target.bucket, self.lock_timeout).await?;
            self.db
                .sequences()
                .cancel(&target.bucket, target.sequence_number, caller.user_id, self.clock.now())
                .await
                .map_err(|e| AllocError::from_db(e, target.bucket))?
        };

        let reservation = cancelled.ok_or_else(|| not_found_or_expired(code))?;
        info!(
            code = %code,
            bucket = %target.bucket,
            reservation_id = %reservation.id,
            "Code cancelled"
        );

        Ok(())
    }

    /// Gives back a reserved code that will not be saved.
    ///
    /// Same as letting it expire, without waiting for the reclaimer.
    #[instrument(skip(self, caller, source), fields(user_id = caller.user_id))]
    pub async fn release(
        &self,
        transaction_type: &str,
        code: &str,
        caller: &CallerContext,
        source: Option<SourceRef>,
    ) -> AllocResult<()> {
        let target = self.resolve_code(transaction_type, code, caller, source).await?;

        let released = {
            let _guard = self.locks.acquire(&target.bucket, self.lock_timeout).await?;
            self.db
                .sequences()
                .release(&target.bucket, target.sequence_number, caller.user_id, self.clock.now())
                .await
                .map_err(|e| AllocError::from_db(e, target.bucket))?
        };

        let reservation = released.ok_or_else(|| not_found_or_expired(code))?;
        info!(
            code = %code,
            bucket = %target.bucket,
            reservation_id = %reservation.id,
            "Code released"
        );

        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// The reservation row behind a code, whoever owns it.
    pub async fn lookup(
        &self,
        transaction_type: &str,
        code: &str,
        caller: &CallerContext,
        source: Option<SourceRef>,
    ) -> AllocResult<Reservation> {
        let target = self.resolve_code(transaction_type, code, caller, source).await?;

        self.db
            .sequences()
            .find(&target.bucket, target.sequence_number)
            .await?
            .ok_or_else(|| not_found_or_expired(code))
    }

    /// Counter and reservations of the bucket the next `generate` with these
    /// arguments would draw from. `None` until the bucket's first number.
    pub async fn snapshot(
        &self,
        transaction_type: &str,
        caller: &CallerContext,
        source: Option<SourceRef>,
    ) -> AllocResult<Option<BucketSnapshot>> {
        let transaction_type = validate_transaction_type(transaction_type)?;
        validate_caller(caller)?;

        let prefix = self.prefixes.resolve(transaction_type).await?;
        let source = self
            .scopes
            .classify(transaction_type)
            .resolve_source(source, caller)?;
        let period = Period::containing(self.clock.now())
            .map_err(|e| AllocError::AllocationFailure(e.to_string()))?;

        Ok(self
            .db
            .sequences()
            .snapshot(&BucketKey::new(prefix.id, period, source))
            .await?)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Creates or edits the prefix of a transaction type.
    ///
    /// Existing buckets keep counting; only the text of new codes changes.
    pub async fn set_prefix(&self, transaction_type: &str, prefix_code: &str) -> AllocResult<Prefix> {
        self.prefixes.set(transaction_type, prefix_code).await
    }

    pub async fn list_prefixes(&self) -> AllocResult<Vec<Prefix>> {
        self.prefixes.list().await
    }

    /// Creates or replaces a branch.
    pub async fn upsert_branch(&self, id: i64, name: &str, initial: &str) -> AllocResult<()> {
        self.branches
            .upsert(Branch {
                id,
                name: name.trim().to_string(),
                initial: initial.trim().to_string(),
                is_active: true,
            })
            .await
    }

    /// Drops cached lookups so the next call reads the database.
    pub async fn invalidate_caches(&self, transaction_type: &str, branch_id: Option<i64>) {
        self.prefixes.invalidate(transaction_type).await;
        if let Some(branch_id) = branch_id {
            self.branches.invalidate(branch_id).await;
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Maps a code back to its bucket.
    ///
    /// The period and number come from the code's last two tokens; the
    /// prefix and source come from the transaction type and the call, the
    /// same way `generate` derived them.
    async fn resolve_code(
        &self,
        transaction_type: &str,
        code: &str,
        caller: &CallerContext,
        source: Option<SourceRef>,
    ) -> AllocResult<Target> {
        let transaction_type = validate_transaction_type(transaction_type)?;
        validate_caller(caller)?;
        let parsed = parse_code(code)?;

        let prefix = self.prefixes.resolve(transaction_type).await?;
        let source = self
            .scopes
            .classify(transaction_type)
            .resolve_source(source, caller)?;

        debug!(
            code = %code,
            head = %parsed.head,
            source_kind = source.map(|s| s.kind.as_str()).unwrap_or(""),
            "Code resolved"
        );

        Ok(Target {
            bucket: BucketKey::new(prefix.id, parsed.period, source),
            sequence_number: parsed.sequence_number,
        })
    }
}

fn not_found_or_expired(code: &str) -> AllocError {
    AllocError::NotFoundOrExpired {
        code: code.trim().to_string(),
    }
}
