//! # Reclaim Task Repository
//!
//! Scheduled expiry checks, one per reserved reservation, keyed directly by
//! reservation id.
//!
//! ## Firing a Task
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      fire(reservation_id, now)                          │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   UPDATE reservation → available                                       │
//! │     WHERE status = 'reserved' AND expires_at <= now                    │
//! │       │                                                                 │
//! │       ├── 1 row  → DELETE task                       ⇒ Reclaimed       │
//! │       │                                                                 │
//! │       └── 0 rows → re-read reservation                                 │
//! │             ├── reserved, expires later → task.run_at = expires        │
//! │             │                                         ⇒ Rearmed        │
//! │             └── available / confirmed / gone → DELETE task             │
//! │                                                       ⇒ Dropped        │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Firing the same task any number of times, late or early, leaves the
//! ledger in the same state as firing it once at the right time.
//!
//! A firing that errors leaves the task in place. The worker records the
//! failure with [`ReclaimRepository::mark_failed`] and pushes `run_at` out.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::from_millis;
use super::sequence::schedule_reclaim;
use crate::error::DbResult;
use docseq_core::ReclaimTask;

#[derive(Debug, sqlx::FromRow)]
struct ReclaimTaskRow {
    reservation_id: String,
    run_at: i64,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReclaimTaskRow> for ReclaimTask {
    type Error = crate::error::DbError;

    fn try_from(row: ReclaimTaskRow) -> DbResult<Self> {
        Ok(ReclaimTask {
            reservation_id: row.reservation_id,
            run_at: from_millis("reclaim_tasks", row.run_at)?,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

/// What a single firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// The reservation was expired and is available again.
    Reclaimed { sequence_number: i64 },
    /// The reservation was extended; the task now waits for the new expiry.
    Rearmed { run_at: DateTime<Utc> },
    /// Nothing to reclaim (confirmed, released, already reclaimed, or gone).
    Dropped,
}

/// Repository for the reclaim task queue.
#[derive(Debug, Clone)]
pub struct ReclaimRepository {
    pool: SqlitePool,
}

impl ReclaimRepository {
    /// Creates a new ReclaimRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReclaimRepository { pool }
    }

    /// Tasks due at `now`, oldest first.
    pub async fn due(&self, now: DateTime<Utc>, limit: u32) -> DbResult<Vec<ReclaimTask>> {
        let rows: Vec<ReclaimTaskRow> = sqlx::query_as(
            r#"
            SELECT reservation_id, run_at, attempts, last_error, created_at
            FROM reclaim_tasks
            WHERE run_at <= ?1
            ORDER BY run_at ASC
            LIMIT ?2
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReclaimTask::try_from).collect()
    }

    /// Gets the task of a reservation.
    pub async fn get(&self, reservation_id: &str) -> DbResult<Option<ReclaimTask>> {
        let row: Option<ReclaimTaskRow> = sqlx::query_as(
            r#"
            SELECT reservation_id, run_at, attempts, last_error, created_at
            FROM reclaim_tasks
            WHERE reservation_id = ?1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReclaimTask::try_from).transpose()
    }

    /// Earliest `run_at` in the queue.
    pub async fn next_due(&self) -> DbResult<Option<DateTime<Utc>>> {
        let millis: Option<i64> = sqlx::query_scalar("SELECT MIN(run_at) FROM reclaim_tasks")
            .fetch_one(&self.pool)
            .await?;

        millis.map(|ms| from_millis("reclaim_tasks", ms)).transpose()
    }

    /// Counts queued tasks.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reclaim_tasks")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Fires the reclaim check for one reservation.
    ///
    /// Always re-reads the reservation; the task row carries no payload.
    pub async fn fire(&self, reservation_id: &str, now: DateTime<Utc>) -> DbResult<ReclaimOutcome> {
        let now_ms = now.timestamp_millis();

        let mut tx = self.pool.begin().await?;

        let reclaimed: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE sequence_reservations SET
                status = 'available',
                owner_user_id = NULL,
                expires_at = NULL,
                updated_at = ?2
            WHERE id = ?1
              AND status = 'reserved'
              AND COALESCE(expires_at, 0) <= ?3
            RETURNING sequence_number
            "#,
        )
        .bind(reservation_id)
        .bind(now)
        .bind(now_ms)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match reclaimed {
            Some(sequence_number) => ReclaimOutcome::Reclaimed { sequence_number },
            None => {
                let later_expiry: Option<Option<i64>> = sqlx::query_scalar(
                    r#"
                    SELECT expires_at FROM sequence_reservations
                    WHERE id = ?1 AND status = 'reserved'
                    "#,
                )
                .bind(reservation_id)
                .fetch_optional(&mut *tx)
                .await?;

                match later_expiry.flatten() {
                    Some(expires_ms) => ReclaimOutcome::Rearmed {
                        run_at: from_millis("sequence_reservations", expires_ms)?,
                    },
                    None => ReclaimOutcome::Dropped,
                }
            }
        };

        match outcome {
            ReclaimOutcome::Rearmed { run_at } => {
                schedule_reclaim(&mut *tx, reservation_id, run_at.timestamp_millis(), now).await?;
            }
            ReclaimOutcome::Reclaimed { .. } | ReclaimOutcome::Dropped => {
                sqlx::query("DELETE FROM reclaim_tasks WHERE reservation_id = ?1")
                    .bind(reservation_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        debug!(reservation_id = %reservation_id, outcome = ?outcome, "Reclaim task fired");

        Ok(outcome)
    }

    /// Records a failed firing and pushes the task to `retry_at`.
    ///
    /// ## Returns
    /// The attempt count after this failure, or `None` if the task no
    /// longer exists.
    pub async fn mark_failed(
        &self,
        reservation_id: &str,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> DbResult<Option<i64>> {
        let attempts: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE reclaim_tasks SET
                attempts = attempts + 1,
                last_error = ?2,
                run_at = ?3
            WHERE reservation_id = ?1
            RETURNING attempts
            "#,
        )
        .bind(reservation_id)
        .bind(error)
        .bind(retry_at.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts)
    }

    /// Schedules a task for every reserved reservation that has none.
    ///
    /// Run at worker start so reservations imported or edited by hand cannot
    /// stay reserved forever. Returns how many tasks were created.
    pub async fn recover_missing(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO reclaim_tasks (reservation_id, run_at, attempts, last_error, created_at)
            SELECT r.id, COALESCE(r.expires_at, ?1), 0, NULL, ?2
            FROM sequence_reservations r
            LEFT JOIN reclaim_tasks t ON t.reservation_id = r.id
            WHERE r.status = 'reserved' AND t.reservation_id IS NULL
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
