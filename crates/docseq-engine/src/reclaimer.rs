//! # Reclaim Worker
//!
//! Returns abandoned reservations to the pool once they expire.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reclaim Worker Flow                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    reclaim_tasks Table                          │   │
//! │  │                                                                 │   │
//! │  │  reservation_id | run_at        | attempts | last_error        │   │
//! │  │  ───────────────┼───────────────┼──────────┼──────────────────  │   │
//! │  │  9f1c…          │ 10:00         │ 0        │ NULL              │   │
//! │  │  27ab…          │ 10:04         │ 2        │ database is locked│   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    ReclaimWorker                                │   │
//! │  │                                                                 │   │
//! │  │  0. Start: schedule a task for any reserved row lacking one    │   │
//! │  │                                                                 │   │
//! │  │  1. Poll: tasks WHERE run_at <= now, oldest first              │   │
//! │  │                                                                 │   │
//! │  │  2. Fire: re-read the reservation; reclaim only if still       │   │
//! │  │           reserved AND expired. Extended → re-arm.             │   │
//! │  │           Anything else → drop the task.                       │   │
//! │  │                                                                 │   │
//! │  │  3. Retry: on failure, attempts += 1, push run_at out with     │   │
//! │  │            exponential backoff. Never deleted on failure.      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Firings may be late or duplicated; each one is idempotent.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use docseq_db::{Database, DbResult, ReclaimOutcome};

use crate::clock::Clock;
use crate::config::ReclaimerSettings;
use crate::error::WorkerError;

/// Upper bound on backoff steps; the delay has long hit its cap by then.
const MAX_BACKOFF_STEPS: i64 = 64;

/// What one poll did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    pub reclaimed: usize,
    pub rearmed: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl ReclaimStats {
    pub fn total(&self) -> usize {
        self.reclaimed + self.rearmed + self.dropped + self.failed
    }
}

// =============================================================================
// Reclaim Worker
// =============================================================================

/// Polls the reclaim task queue and fires due tasks.
pub struct ReclaimWorker {
    db: Database,
    clock: Arc<dyn Clock>,
    settings: ReclaimerSettings,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running worker.
#[derive(Clone)]
pub struct ReclaimWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ReclaimWorkerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), WorkerError> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| WorkerError::ChannelError("Shutdown channel closed".into()))
    }
}

impl ReclaimWorker {
    /// Creates a worker and the handle that stops it.
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        settings: ReclaimerSettings,
    ) -> (Self, ReclaimWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = ReclaimWorker {
            db,
            clock,
            settings,
            shutdown_rx,
        };

        (worker, ReclaimWorkerHandle { shutdown_tx })
    }

    /// Runs the worker loop until shut down.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            poll_interval_ms = self.settings.poll_interval_ms,
            batch_size = self.settings.batch_size,
            "Reclaim worker starting"
        );

        match self.db.reclaim_tasks().recover_missing(self.clock.now()).await {
            Ok(0) => {}
            Ok(recovered) => warn!(recovered, "Scheduled reclaim for reservations without a task"),
            Err(e) => error!(?e, "Reclaim recovery sweep failed"),
        }

        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut backoff = self.loop_backoff();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(stats) => {
                            backoff.reset();
                            if stats.total() > 0 {
                                info!(
                                    reclaimed = stats.reclaimed,
                                    rearmed = stats.rearmed,
                                    dropped = stats.dropped,
                                    failed = stats.failed,
                                    "Reclaim batch processed"
                                );
                            }
                        }
                        Err(e) => {
                            let delay = backoff.next_backoff().unwrap_or(self.settings.retry_max());
                            error!(?e, delay_ms = delay.as_millis() as u64, "Failed to poll reclaim tasks");

                            let stopped = tokio::select! {
                                _ = tokio::time::sleep(delay) => false,
                                _ = self.shutdown_rx.recv() => true,
                            };
                            if stopped {
                                info!("Reclaim worker shutting down");
                                break;
                            }
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Reclaim worker shutting down");
                    break;
                }
            }
        }

        info!("Reclaim worker stopped");
    }

    /// Fires every task due now, up to one batch.
    ///
    /// A failed firing is recorded on the task and retried later; only a
    /// failure to read the queue is returned as an error.
    pub async fn run_once(&self) -> DbResult<ReclaimStats> {
        let reclaim = self.db.reclaim_tasks();
        let now = self.clock.now();
        let tasks = reclaim.due(now, self.settings.batch_size).await?;

        if tasks.is_empty() {
            debug!("No due reclaim tasks");
            return Ok(ReclaimStats::default());
        }

        let mut stats = ReclaimStats::default();

        for task in tasks {
            match reclaim.fire(&task.reservation_id, now).await {
                Ok(ReclaimOutcome::Reclaimed { sequence_number }) => {
                    info!(
                        reservation_id = %task.reservation_id,
                        sequence_number,
                        "Expired reservation reclaimed"
                    );
                    stats.reclaimed += 1;
                }
                Ok(ReclaimOutcome::Rearmed { run_at }) => {
                    debug!(reservation_id = %task.reservation_id, %run_at, "Reclaim re-armed");
                    stats.rearmed += 1;
                }
                Ok(ReclaimOutcome::Dropped) => {
                    stats.dropped += 1;
                }
                Err(e) => {
                    stats.failed += 1;
                    let delay = self.retry_delay(task.attempts + 1);
                    let retry_at = now
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(self.settings.retry_max_secs as i64));

                    match reclaim.mark_failed(&task.reservation_id, &e.to_string(), retry_at).await {
                        Ok(attempts) => warn!(
                            reservation_id = %task.reservation_id,
                            attempts = attempts.unwrap_or(task.attempts + 1),
                            %retry_at,
                            error = %e,
                            "Reclaim failed, will retry"
                        ),
                        // Still due; the next poll picks it up again.
                        Err(mark_err) => error!(
                            reservation_id = %task.reservation_id,
                            error = %e,
                            mark_error = %mark_err,
                            "Reclaim failed and could not be rescheduled"
                        ),
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Delay before retrying a task that has failed `attempts` times.
    ///
    /// Doubles from `retry_initial` up to `retry_max`, without jitter.
    pub fn retry_delay(&self, attempts: i64) -> Duration {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.settings.retry_initial(),
            current_interval: self.settings.retry_initial(),
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.settings.retry_max(),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let mut delay = self.settings.retry_initial();
        for _ in 0..attempts.clamp(1, MAX_BACKOFF_STEPS) {
            delay = backoff.next_backoff().unwrap_or(self.settings.retry_max());
        }
        delay
    }

    /// Backoff between failed polls of the whole queue.
    fn loop_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.poll_interval(),
            current_interval: self.settings.poll_interval(),
            multiplier: 2.0,
            max_interval: self.settings.retry_max(),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use chrono::{TimeZone, Utc};
    use docseq_core::{CallerContext, ReservationStatus};
    use docseq_db::DbConfig;

    async fn setup() -> (Allocator, ManualClock) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.prefixes().upsert("Purchase Order", "PO").await.unwrap();

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap());
        let allocator = Allocator::with_clock(db, &EngineConfig::default(), Arc::new(clock.clone()));
        (allocator, clock)
    }

    fn worker(allocator: &Allocator, clock: &ManualClock, settings: ReclaimerSettings) -> (ReclaimWorker, ReclaimWorkerHandle) {
        ReclaimWorker::new(allocator.database().clone(), Arc::new(clock.clone()), settings)
    }

    #[tokio::test]
    async fn test_run_once_reclaims_only_expired() {
        let (allocator, clock) = setup().await;
        let (worker, _handle) = worker(&allocator, &clock, ReclaimerSettings::default());

        let abandoned = allocator
            .generate("Purchase Order", &CallerContext::new(1), None)
            .await
            .unwrap();
        let saved = allocator
            .generate("Purchase Order", &CallerContext::new(2), None)
            .await
            .unwrap();
        allocator
            .confirm("Purchase Order", &saved, &CallerContext::new(2), None)
            .await
            .unwrap();

        // Nothing due yet.
        assert_eq!(worker.run_once().await.unwrap(), ReclaimStats::default());

        clock.advance(chrono::Duration::minutes(61));
        let stats = worker.run_once().await.unwrap();
        assert_eq!(stats.reclaimed, 1);
        assert_eq!(stats.failed, 0);

        let reservation = allocator
            .lookup("Purchase Order", &abandoned, &CallerContext::new(1), None)
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Available);
        assert_eq!(reservation.owner_user_id, None);

        // Queue drained; a second pass is a no-op.
        assert_eq!(worker.run_once().await.unwrap().total(), 0);
        assert_eq!(allocator.database().reclaim_tasks().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_firing_is_rescheduled_not_lost() {
        let (allocator, clock) = setup().await;
        let (worker, _handle) = worker(&allocator, &clock, ReclaimerSettings::default());
        let caller = CallerContext::new(1);
        let db = allocator.database();

        let code = allocator.generate("Purchase Order", &caller, None).await.unwrap();
        let id = allocator
            .lookup("Purchase Order", &code, &caller, None)
            .await
            .unwrap()
            .id;

        sqlx::query(
            "CREATE TRIGGER reject_reservation_writes BEFORE UPDATE ON sequence_reservations \
             BEGIN SELECT RAISE(ABORT, 'store unavailable'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        clock.advance(chrono::Duration::minutes(61));
        let stats = worker.run_once().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.reclaimed, 0);

        let task = db.reclaim_tasks().get(&id).await.unwrap().unwrap();
        assert_eq!(task.attempts, 1);
        assert!(task
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("store unavailable")));
        let retry = chrono::Duration::from_std(worker.retry_delay(1)).unwrap();
        assert_eq!(task.run_at, clock.now() + retry);

        // Not due again until the retry time.
        assert_eq!(worker.run_once().await.unwrap().total(), 0);

        sqlx::query("DROP TRIGGER reject_reservation_writes")
            .execute(db.pool())
            .await
            .unwrap();
        clock.advance(retry);

        let stats = worker.run_once().await.unwrap();
        assert_eq!(stats.reclaimed, 1);
        assert_eq!(stats.failed, 0);

        let reservation = allocator
            .lookup("Purchase Order", &code, &caller, None)
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Available);
        assert!(db.reclaim_tasks().get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_delay_doubles_up_to_cap() {
        let (allocator, clock) = setup().await;
        let settings = ReclaimerSettings {
            retry_initial_ms: 500,
            retry_max_secs: 4,
            ..ReclaimerSettings::default()
        };
        let (worker, _handle) = worker(&allocator, &clock, settings);

        assert_eq!(worker.retry_delay(1), Duration::from_millis(500));
        assert_eq!(worker.retry_delay(2), Duration::from_millis(1000));
        assert_eq!(worker.retry_delay(3), Duration::from_millis(2000));
        assert_eq!(worker.retry_delay(4), Duration::from_millis(4000));
        assert_eq!(worker.retry_delay(10), Duration::from_millis(4000));
        assert_eq!(worker.retry_delay(10_000), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_spawned_worker_reclaims_and_stops() {
        let (allocator, clock) = setup().await;
        let settings = ReclaimerSettings {
            poll_interval_ms: 10,
            ..ReclaimerSettings::default()
        };

        let code = allocator
            .generate("Purchase Order", &CallerContext::new(1), None)
            .await
            .unwrap();

        // Simulate a task lost in a crash; the start-up sweep restores it.
        let id = allocator
            .lookup("Purchase Order", &code, &CallerContext::new(1), None)
            .await
            .unwrap()
            .id;
        delete_task(allocator.database(), &id).await;

        clock.advance(chrono::Duration::hours(2));

        let (worker, handle) = worker(&allocator, &clock, settings);
        let join = tokio::spawn(worker.run());

        let mut reclaimed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let reservation = allocator
                .lookup("Purchase Order", &code, &CallerContext::new(1), None)
                .await
                .unwrap();
            if reservation.status == ReservationStatus::Available {
                reclaimed = true;
                break;
            }
        }
        assert!(reclaimed);

        handle.shutdown().await.unwrap();
        join.await.unwrap();
        assert!(handle.shutdown().await.is_err());
    }

    async fn delete_task(db: &Database, reservation_id: &str) {
        assert!(db.reclaim_tasks().get(reservation_id).await.unwrap().is_some());
        sqlx::query("DELETE FROM reclaim_tasks WHERE reservation_id = ?1")
            .bind(reservation_id)
            .execute(db.pool())
            .await
            .unwrap();
    }
}
