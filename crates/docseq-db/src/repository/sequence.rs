//! # Sequence Repository
//!
//! Counters and the reservation ledger. Every state change happens inside
//! one SQLite transaction whose first statement is a write, so the
//! transaction owns the database write lock from its first step until
//! commit and allocations never interleave.
//!
//! ## Allocation Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    allocate(bucket, user, now, ttl)                     │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   1. UPSERT sequence_counters (bucket)      ← takes the write lock     │
//! │   2. SELECT smallest reusable reservation                              │
//! │        status = 'available'                                            │
//! │        OR (status = 'reserved' AND owner = user AND expires_at > now)  │
//! │   3a. found   → UPDATE it: reserved, owner = user, expires = now+ttl   │
//! │   3b. missing → counter += 1, INSERT reservation (reserved)            │
//! │   4. UPSERT reclaim_tasks (reservation, run_at = expires)              │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status Transitions
//! ```text
//!  confirm : reserved  → confirmed   (owner must match, before expiry; task removed)
//!  release : reserved  → available   (owner must match; task removed)
//!  cancel  : confirmed → available   (owner must match)
//! ```
//! A transition that matches no row returns `Ok(None)`; the caller decides
//! what that means.

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::from_millis;
use crate::error::{DbError, DbResult};
use docseq_core::{BucketKey, Period, Reservation, ReservationStatus, SequenceCounter, SourceRef};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CounterRow {
    id: i64,
    prefix_id: i64,
    year: i64,
    month: i64,
    source_kind: String,
    source_id: i64,
    current_value: i64,
}

impl TryFrom<CounterRow> for SequenceCounter {
    type Error = DbError;

    fn try_from(row: CounterRow) -> DbResult<Self> {
        let period = Period::new(row.year as i32, row.month as u32)
            .map_err(|e| DbError::corrupt("sequence_counters", e.to_string()))?;

        let source = if row.source_kind.is_empty() {
            None
        } else {
            let kind = row
                .source_kind
                .parse()
                .map_err(|e: docseq_core::CoreError| DbError::corrupt("sequence_counters", e.to_string()))?;
            Some(SourceRef::new(kind, row.source_id))
        };

        Ok(SequenceCounter {
            id: row.id,
            bucket: BucketKey::new(row.prefix_id, period, source),
            current_value: row.current_value,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: String,
    counter_id: i64,
    sequence_number: i64,
    status: ReservationStatus,
    owner_user_id: Option<i64>,
    expires_at: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = DbError;

    fn try_from(row: ReservationRow) -> DbResult<Self> {
        let expires_at = row
            .expires_at
            .map(|ms| from_millis("sequence_reservations", ms))
            .transpose()?;

        Ok(Reservation {
            id: row.id,
            counter_id: row.counter_id,
            sequence_number: row.sequence_number,
            status: row.status,
            owner_user_id: row.owner_user_id,
            expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Storage form of an optional source. Unscoped buckets use `('', 0)` so
/// the UNIQUE constraint treats them as one key.
fn source_columns(bucket: &BucketKey) -> (&'static str, i64) {
    match bucket.source {
        Some(source) => (source.kind.as_str(), source.id),
        None => ("", 0),
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of a successful allocation.
#[derive(Debug, Clone)]
pub struct Allocation {
    /// The bucket's counter after the allocation.
    pub counter: SequenceCounter,
    /// The reservation now held by the caller.
    pub reservation: Reservation,
    /// True when a new number was minted, false when one was reused.
    pub minted: bool,
}

/// Point-in-time view of one bucket.
#[derive(Debug, Clone)]
pub struct BucketSnapshot {
    pub counter: SequenceCounter,
    /// Every reservation in the bucket, ordered by sequence number.
    pub reservations: Vec<Reservation>,
}

impl BucketSnapshot {
    /// Number of reservations currently in `status`.
    pub fn count(&self, status: ReservationStatus) -> usize {
        self.reservations.iter().filter(|r| r.status == status).count()
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for counters and reservations.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    /// Creates a new SequenceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Reserves the next number in `bucket` for `user_id`.
    ///
    /// Reuses the smallest available number (or one the same user still
    /// holds) before minting a new one. The reservation expires at
    /// `now + ttl` and a reclaim task is scheduled for that instant.
    pub async fn allocate(
        &self,
        bucket: &BucketKey,
        user_id: i64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> DbResult<Allocation> {
        let expires_ms = (now + ttl).timestamp_millis();
        let now_ms = now.timestamp_millis();

        let mut tx = self.pool.begin().await?;

        let counter_row = lock_counter(&mut *tx, bucket, now).await?;
        let counter_id = counter_row.id;
        let mut counter = SequenceCounter::try_from(counter_row)?;

        let reusable: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, counter_id, sequence_number, status, owner_user_id,
                   expires_at, created_at, updated_at
            FROM sequence_reservations
            WHERE counter_id = ?1
              AND (status = 'available'
                   OR (status = 'reserved' AND owner_user_id = ?2 AND expires_at > ?3))
            ORDER BY sequence_number ASC
            LIMIT 1
            "#,
        )
        .bind(counter_id)
        .bind(user_id)
        .bind(now_ms)
        .fetch_optional(&mut *tx)
        .await?;

        let (row, minted) = match reusable {
            Some(candidate) => {
                let row: ReservationRow = sqlx::query_as(
                    r#"
                    UPDATE sequence_reservations SET
                        status = ?2,
                        owner_user_id = ?3,
                        expires_at = ?4,
                        updated_at = ?5
                    WHERE id = ?1
                    RETURNING id, counter_id, sequence_number, status, owner_user_id,
                              expires_at, created_at, updated_at
                    "#,
                )
                .bind(&candidate.id)
                .bind(ReservationStatus::Reserved)
                .bind(user_id)
                .bind(expires_ms)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                (row, false)
            }
            None => {
                let next: i64 = sqlx::query_scalar(
                    r#"
                    UPDATE sequence_counters SET
                        current_value = current_value + 1,
                        updated_at = ?2
                    WHERE id = ?1
                    RETURNING current_value
                    "#,
                )
                .bind(counter_id)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                counter.current_value = next;

                let row: ReservationRow = sqlx::query_as(
                    r#"
                    INSERT INTO sequence_reservations (
                        id, counter_id, sequence_number, status,
                        owner_user_id, expires_at, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    RETURNING id, counter_id, sequence_number, status, owner_user_id,
                              expires_at, created_at, updated_at
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(counter_id)
                .bind(next)
                .bind(ReservationStatus::Reserved)
                .bind(user_id)
                .bind(expires_ms)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                (row, true)
            }
        };

        schedule_reclaim(&mut *tx, &row.id, expires_ms, now).await?;

        tx.commit().await?;

        let reservation = Reservation::try_from(row)?;

        debug!(
            bucket = %bucket,
            sequence_number = reservation.sequence_number,
            reservation_id = %reservation.id,
            minted,
            "Reserved sequence number"
        );

        Ok(Allocation {
            counter,
            reservation,
            minted,
        })
    }

    /// reserved → confirmed for the owning user, while the hold is still
    /// live. Removes the reclaim task.
    ///
    /// A reservation past `expires_at` is treated as gone even if the
    /// reclaimer has not fired yet; the same `COALESCE(expires_at, 0)` rule
    /// as [`ReclaimRepository::fire`](crate::ReclaimRepository::fire).
    pub async fn confirm(
        &self,
        bucket: &BucketKey,
        sequence_number: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Reservation>> {
        self.transition(
            bucket,
            sequence_number,
            user_id,
            ReservationStatus::Reserved,
            ReservationStatus::Confirmed,
            now,
        )
        .await
    }

    /// confirmed → available for the owning user (void).
    pub async fn cancel(
        &self,
        bucket: &BucketKey,
        sequence_number: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Reservation>> {
        self.transition(
            bucket,
            sequence_number,
            user_id,
            ReservationStatus::Confirmed,
            ReservationStatus::Available,
            now,
        )
        .await
    }

    /// reserved → available for the owning user, before expiry would do it.
    pub async fn release(
        &self,
        bucket: &BucketKey,
        sequence_number: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Reservation>> {
        self.transition(
            bucket,
            sequence_number,
            user_id,
            ReservationStatus::Reserved,
            ReservationStatus::Available,
            now,
        )
        .await
    }

    async fn transition(
        &self,
        bucket: &BucketKey,
        sequence_number: i64,
        user_id: i64,
        from: ReservationStatus,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Reservation>> {
        let (source_kind, source_id) = source_columns(bucket);
        let clears_owner = to == ReservationStatus::Available;
        let needs_live_hold = to == ReservationStatus::Confirmed;

        let mut tx = self.pool.begin().await?;

        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            UPDATE sequence_reservations SET
                status = ?1,
                owner_user_id = CASE WHEN ?2 THEN NULL ELSE owner_user_id END,
                expires_at = NULL,
                updated_at = ?3
            WHERE sequence_number = ?4
              AND owner_user_id = ?5
              AND status = ?6
              AND counter_id = (
                  SELECT id FROM sequence_counters
                  WHERE prefix_id = ?7 AND year = ?8 AND month = ?9
                    AND source_kind = ?10 AND source_id = ?11
              )
              AND (NOT ?12 OR COALESCE(expires_at, 0) > ?13)
            RETURNING id, counter_id, sequence_number, status, owner_user_id,
                      expires_at, created_at, updated_at
            "#,
        )
        .bind(to)
        .bind(clears_owner)
        .bind(now)
        .bind(sequence_number)
        .bind(user_id)
        .bind(from)
        .bind(bucket.prefix_id)
        .bind(bucket.period.year())
        .bind(bucket.period.month())
        .bind(source_kind)
        .bind(source_id)
        .bind(needs_live_hold)
        .bind(now.timestamp_millis())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            debug!(
                bucket = %bucket,
                sequence_number,
                from = %from,
                to = %to,
                "No matching reservation"
            );
            return Ok(None);
        };

        sqlx::query("DELETE FROM reclaim_tasks WHERE reservation_id = ?1")
            .bind(&row.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            bucket = %bucket,
            sequence_number,
            reservation_id = %row.id,
            from = %from,
            to = %to,
            "Reservation transitioned"
        );

        Reservation::try_from(row).map(Some)
    }

    /// Reads the reservation for one number in a bucket.
    pub async fn find(&self, bucket: &BucketKey, sequence_number: i64) -> DbResult<Option<Reservation>> {
        let (source_kind, source_id) = source_columns(bucket);

        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.counter_id, r.sequence_number, r.status, r.owner_user_id,
                   r.expires_at, r.created_at, r.updated_at
            FROM sequence_reservations r
            JOIN sequence_counters c ON c.id = r.counter_id
            WHERE c.prefix_id = ?1 AND c.year = ?2 AND c.month = ?3
              AND c.source_kind = ?4 AND c.source_id = ?5
              AND r.sequence_number = ?6
            "#,
        )
        .bind(bucket.prefix_id)
        .bind(bucket.period.year())
        .bind(bucket.period.month())
        .bind(source_kind)
        .bind(source_id)
        .bind(sequence_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Reservation::try_from).transpose()
    }

    /// Reads a reservation by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, counter_id, sequence_number, status, owner_user_id,
                   expires_at, created_at, updated_at
            FROM sequence_reservations
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Reservation::try_from).transpose()
    }

    /// Reads a bucket's counter without creating it.
    pub async fn counter(&self, bucket: &BucketKey) -> DbResult<Option<SequenceCounter>> {
        let (source_kind, source_id) = source_columns(bucket);

        let row: Option<CounterRow> = sqlx::query_as(
            r#"
            SELECT id, prefix_id, year, month, source_kind, source_id, current_value
            FROM sequence_counters
            WHERE prefix_id = ?1 AND year = ?2 AND month = ?3
              AND source_kind = ?4 AND source_id = ?5
            "#,
        )
        .bind(bucket.prefix_id)
        .bind(bucket.period.year())
        .bind(bucket.period.month())
        .bind(source_kind)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SequenceCounter::try_from).transpose()
    }

    /// Counter plus every reservation of a bucket. `None` if nothing was
    /// ever allocated there.
    pub async fn snapshot(&self, bucket: &BucketKey) -> DbResult<Option<BucketSnapshot>> {
        let Some(counter) = self.counter(bucket).await? else {
            return Ok(None);
        };

        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, counter_id, sequence_number, status, owner_user_id,
                   expires_at, created_at, updated_at
            FROM sequence_reservations
            WHERE counter_id = ?1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(counter.id)
        .fetch_all(&self.pool)
        .await?;

        let reservations = rows
            .into_iter()
            .map(Reservation::try_from)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(Some(BucketSnapshot {
            counter,
            reservations,
        }))
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Loads or creates the bucket's counter row.
///
/// Always a write, even when the row exists, so it is the statement that
/// takes the database write lock for the enclosing transaction.
async fn lock_counter(
    conn: &mut SqliteConnection,
    bucket: &BucketKey,
    now: DateTime<Utc>,
) -> DbResult<CounterRow> {
    let (source_kind, source_id) = source_columns(bucket);

    let row: CounterRow = sqlx::query_as(
        r#"
        INSERT INTO sequence_counters (
            prefix_id, year, month, source_kind, source_id,
            current_value, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
        ON CONFLICT (prefix_id, year, month, source_kind, source_id) DO UPDATE SET
            updated_at = excluded.updated_at
        RETURNING id, prefix_id, year, month, source_kind, source_id, current_value
        "#,
    )
    .bind(bucket.prefix_id)
    .bind(bucket.period.year())
    .bind(bucket.period.month())
    .bind(source_kind)
    .bind(source_id)
    .bind(now)
    .fetch_one(conn)
    .await?;

    Ok(row)
}

/// Creates or re-arms the reclaim task of a reservation.
///
/// Keyed by reservation id, so a re-arm replaces the due time and resets
/// the failure count instead of adding a second task.
pub(crate) async fn schedule_reclaim(
    conn: &mut SqliteConnection,
    reservation_id: &str,
    run_at_ms: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO reclaim_tasks (reservation_id, run_at, attempts, last_error, created_at)
        VALUES (?1, ?2, 0, NULL, ?3)
        ON CONFLICT (reservation_id) DO UPDATE SET
            run_at = excluded.run_at,
            attempts = 0,
            last_error = NULL
        "#,
    )
    .bind(reservation_id)
    .bind(run_at_ms)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    async fn setup() -> (Database, BucketKey) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let prefix = db.prefixes().upsert("Purchase Order", "PO").await.unwrap();
        let bucket = BucketKey::new(prefix.id, Period::new(2025, 1).unwrap(), None);
        (db, bucket)
    }

    fn ttl() -> Duration {
        Duration::hours(1)
    }

    #[tokio::test]
    async fn test_held_write_lock_surfaces_as_lock_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docseq.db");
        let db = Database::new(
            DbConfig::new(&path).busy_timeout(std::time::Duration::from_millis(100)),
        )
        .await
        .unwrap();
        let prefix = db.prefixes().upsert("Purchase Order", "PO").await.unwrap();
        let bucket = BucketKey::new(prefix.id, Period::new(2025, 1).unwrap(), None);

        let other = Database::new(DbConfig::new(&path).max_connections(1))
            .await
            .unwrap();
        let mut holder = other.pool().acquire().await.unwrap();
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *holder).await.unwrap();

        let err = db
            .sequences()
            .allocate(&bucket, 1, at(15, 10), ttl())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::LockTimeout), "got {err:?}");
        assert!(err.is_transient());

        sqlx::query("ROLLBACK").execute(&mut *holder).await.unwrap();
        let allocation = db
            .sequences()
            .allocate(&bucket, 1, at(15, 10), ttl())
            .await
            .unwrap();
        assert_eq!(allocation.reservation.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_allocate_mints_sequential_numbers() {
        let (db, bucket) = setup().await;
        let repo = db.sequences();

        let first = repo.allocate(&bucket, 1, at(15, 10), ttl()).await.unwrap();
        let second = repo.allocate(&bucket, 2, at(15, 10), ttl()).await.unwrap();

        assert_eq!(first.reservation.sequence_number, 1);
        assert_eq!(second.reservation.sequence_number, 2);
        assert!(first.minted && second.minted);
        assert_eq!(second.counter.current_value, 2);
        assert_eq!(second.reservation.status, ReservationStatus::Reserved);
        assert_eq!(second.reservation.owner_user_id, Some(2));
        assert_eq!(second.reservation.expires_at, Some(at(15, 11)));
    }

    #[tokio::test]
    async fn test_same_user_reuses_own_unexpired_reservation() {
        let (db, bucket) = setup().await;
        let repo = db.sequences();

        let first = repo.allocate(&bucket, 1, at(15, 10), ttl()).await.unwrap();
        let again = repo
            .allocate(&bucket, 1, at(15, 10) + Duration::minutes(30), ttl())
            .await
            .unwrap();

        assert_eq!(again.reservation.id, first.reservation.id);
        assert!(!again.minted);
        // Expiry is re-armed from the second call.
        assert_eq!(
            again.reservation.expires_at,
            Some(at(15, 11) + Duration::minutes(30))
        );

        let task = db
            .reclaim_tasks()
            .get(&first.reservation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.run_at, at(15, 11) + Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_expired_reservation_is_not_reused_before_reclaim() {
        let (db, bucket) = setup().await;
        let repo = db.sequences();

        repo.allocate(&bucket, 1, at(15, 10), ttl()).await.unwrap();
        let later = repo.allocate(&bucket, 1, at(15, 12), ttl()).await.unwrap();

        assert_eq!(later.reservation.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_confirm_after_expiry_is_refused() {
        let (db, bucket) = setup().await;
        let repo = db.sequences();
        let allocation = repo.allocate(&bucket, 1, at(15, 10), ttl()).await.unwrap();
        let number = allocation.reservation.sequence_number;

        // Expiry is at 11:00; the reclaimer has not run.
        assert!(repo.confirm(&bucket, number, 1, at(15, 11)).await.unwrap().is_none());

        let still_held = repo.find(&bucket, number).await.unwrap().unwrap();
        assert_eq!(still_held.status, ReservationStatus::Reserved);

        let outcome = db
            .reclaim_tasks()
            .fire(&allocation.reservation.id, at(15, 11))
            .await
            .unwrap();
        assert_eq!(outcome, crate::ReclaimOutcome::Reclaimed { sequence_number: number });
    }

    #[tokio::test]
    async fn test_confirm_requires_owner_and_reserved() {
        let (db, bucket) = setup().await;
        let repo = db.sequences();
        let allocation = repo.allocate(&bucket, 1, at(15, 10), ttl()).await.unwrap();
        let number = allocation.reservation.sequence_number;

        assert!(repo.confirm(&bucket, number, 2, at(15, 10)).await.unwrap().is_none());

        let confirmed = repo
            .confirm(&bucket, number, 1, at(15, 10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert_eq!(confirmed.owner_user_id, Some(1));
        assert!(confirmed.expires_at.is_none());

        // Already confirmed.
        assert!(repo.confirm(&bucket, number, 1, at(15, 10)).await.unwrap().is_none());
        // Task is gone.
        assert!(db
            .reclaim_tasks()
            .get(&allocation.reservation.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cancel_returns_number_to_pool() {
        let (db, bucket) = setup().await;
        let repo = db.sequences();
        for user in 1..=3 {
            let a = repo.allocate(&bucket, user, at(15, 10), ttl()).await.unwrap();
            repo.confirm(&bucket, a.reservation.sequence_number, user, at(15, 10))
                .await
                .unwrap()
                .unwrap();
        }

        // Only confirmed numbers can be cancelled, only by their owner.
        assert!(repo.cancel(&bucket, 2, 1, at(15, 10)).await.unwrap().is_none());
        let cancelled = repo.cancel(&bucket, 2, 2, at(15, 10)).await.unwrap().unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Available);
        assert!(cancelled.owner_user_id.is_none());

        let next = repo.allocate(&bucket, 9, at(15, 10), ttl()).await.unwrap();
        assert_eq!(next.reservation.sequence_number, 2);
        assert!(!next.minted);
        assert_eq!(next.counter.current_value, 3);
    }

    #[tokio::test]
    async fn test_release_frees_reserved_number() {
        let (db, bucket) = setup().await;
        let repo = db.sequences();
        let a = repo.allocate(&bucket, 1, at(15, 10), ttl()).await.unwrap();

        assert!(repo.cancel(&bucket, 1, 1, at(15, 10)).await.unwrap().is_none());
        let released = repo.release(&bucket, 1, 1, at(15, 10)).await.unwrap().unwrap();
        assert_eq!(released.status, ReservationStatus::Available);
        assert!(db.reclaim_tasks().get(&a.reservation.id).await.unwrap().is_none());

        let next = repo.allocate(&bucket, 2, at(15, 10), ttl()).await.unwrap();
        assert_eq!(next.reservation.id, a.reservation.id);
    }

    #[tokio::test]
    async fn test_source_buckets_are_independent() {
        let (db, bucket) = setup().await;
        let repo = db.sequences();
        let jkt = BucketKey::new(bucket.prefix_id, bucket.period, Some(SourceRef::branch(3)));
        let bdg = BucketKey::new(bucket.prefix_id, bucket.period, Some(SourceRef::branch(4)));

        repo.allocate(&jkt, 1, at(15, 10), ttl()).await.unwrap();
        let second_jkt = repo.allocate(&jkt, 1, at(15, 12), ttl()).await.unwrap();
        let first_bdg = repo.allocate(&bdg, 1, at(15, 10), ttl()).await.unwrap();
        let shared = repo.allocate(&bucket, 1, at(15, 10), ttl()).await.unwrap();

        assert_eq!(second_jkt.reservation.sequence_number, 2);
        assert_eq!(first_bdg.reservation.sequence_number, 1);
        assert_eq!(shared.reservation.sequence_number, 1);
        assert_eq!(second_jkt.counter.bucket, jkt);
        assert_ne!(second_jkt.counter.id, first_bdg.counter.id);
    }

    #[tokio::test]
    async fn test_snapshot_and_find() {
        let (db, bucket) = setup().await;
        let repo = db.sequences();
        assert!(repo.snapshot(&bucket).await.unwrap().is_none());

        repo.allocate(&bucket, 1, at(15, 10), ttl()).await.unwrap();
        repo.allocate(&bucket, 2, at(15, 10), ttl()).await.unwrap();
        repo.confirm(&bucket, 2, 2, at(15, 10)).await.unwrap().unwrap();

        let snapshot = repo.snapshot(&bucket).await.unwrap().unwrap();
        assert_eq!(snapshot.counter.current_value, 2);
        assert_eq!(snapshot.count(ReservationStatus::Reserved), 1);
        assert_eq!(snapshot.count(ReservationStatus::Confirmed), 1);
        assert_eq!(snapshot.count(ReservationStatus::Available), 0);

        let found = repo.find(&bucket, 2).await.unwrap().unwrap();
        assert_eq!(found.status, ReservationStatus::Confirmed);
        assert!(repo.find(&bucket, 3).await.unwrap().is_none());
    }
}
