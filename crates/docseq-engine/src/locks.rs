//! # Bucket Locks
//!
//! One async mutex per bucket, held for the duration of a single database
//! transaction on that bucket.
//!
//! ## Lock Order
//! ```text
//!   bucket mutex (this module)  ──►  SQLite write lock (first write in tx)
//! ```
//! Every allocator path takes them in that order. The reclaim worker only
//! takes the SQLite lock, so no cycle is possible.
//!
//! Callers in the same bucket queue here instead of all piling onto the
//! database busy handler. Callers in different buckets do not wait on each
//! other at this level.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use docseq_core::BucketKey;

use crate::error::{AllocError, AllocResult};

/// Idle locks are dropped once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Per-bucket mutexes.
#[derive(Debug, Default)]
pub struct BucketLocks {
    locks: Mutex<HashMap<BucketKey, Arc<Mutex<()>>>>,
}

/// Proof that the caller holds a bucket's lock. Released on drop.
#[derive(Debug)]
pub struct BucketGuard {
    _guard: OwnedMutexGuard<()>,
}

impl BucketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the bucket's lock.
    ///
    /// ## Errors
    /// `ConcurrencyTimeout` if the wait runs out.
    pub async fn acquire(&self, bucket: &BucketKey, timeout: Duration) -> AllocResult<BucketGuard> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                // Only the map holds a reference to an idle lock.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(*bucket).or_default().clone()
        };

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(BucketGuard { _guard: guard }),
            Err(_) => {
                warn!(bucket = %bucket, timeout_ms = timeout.as_millis() as u64, "Bucket lock wait timed out");
                Err(AllocError::ConcurrencyTimeout {
                    bucket: bucket.to_string(),
                })
            }
        }
    }

    /// Number of buckets with a lock entry.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docseq_core::{Period, SourceRef};

    fn bucket(source: Option<SourceRef>) -> BucketKey {
        BucketKey::new(1, Period::new(2025, 1).unwrap(), source)
    }

    #[tokio::test]
    async fn test_same_bucket_times_out_while_held() {
        let locks = BucketLocks::new();
        let _held = locks.acquire(&bucket(None), Duration::from_millis(50)).await.unwrap();

        let err = locks
            .acquire(&bucket(None), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_different_buckets_do_not_block() {
        let locks = BucketLocks::new();
        let _held = locks.acquire(&bucket(None), Duration::from_millis(50)).await.unwrap();

        let other = locks
            .acquire(&bucket(Some(SourceRef::branch(3))), Duration::from_millis(20))
            .await;
        assert!(other.is_ok());
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let locks = BucketLocks::new();
        let held = locks.acquire(&bucket(None), Duration::from_millis(50)).await.unwrap();
        drop(held);

        assert!(locks.acquire(&bucket(None), Duration::from_millis(20)).await.is_ok());
    }
}
