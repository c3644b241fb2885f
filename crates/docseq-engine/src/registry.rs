//! # Prefix Registry and Branch Directory
//!
//! Read-mostly lookups in front of the database, each behind a [`TtlCache`].
//! Administrative writes go through the same objects so the cached entry is
//! replaced at once instead of waiting out the TTL.
//!
//! A stale prefix only changes the text of new codes. Buckets are keyed by
//! prefix id, so numbering is unaffected.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use docseq_core::validation::{validate_branch_initial, validate_prefix_code, validate_transaction_type};
use docseq_core::{Branch, Prefix};
use docseq_db::Database;

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::error::{AllocError, AllocResult};

// =============================================================================
// Prefix Registry
// =============================================================================

/// Transaction type → [`Prefix`], cached.
#[derive(Debug)]
pub struct PrefixRegistry {
    db: Database,
    cache: TtlCache<String, Prefix>,
}

impl PrefixRegistry {
    pub fn new(db: Database, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        PrefixRegistry {
            db,
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Resolves the prefix of a transaction type.
    ///
    /// ## Errors
    /// `PrefixNotConfigured` when the type was never seeded.
    pub async fn resolve(&self, transaction_type: &str) -> AllocResult<Prefix> {
        if let Some(prefix) = self.cache.get(transaction_type).await {
            return Ok(prefix);
        }

        let prefix = self
            .db
            .prefixes()
            .get_by_transaction_type(transaction_type)
            .await?
            .ok_or_else(|| AllocError::PrefixNotConfigured {
                transaction_type: transaction_type.to_string(),
            })?;

        debug!(transaction_type = %transaction_type, prefix_code = %prefix.prefix_code, "Prefix cached");
        self.cache.put(transaction_type.to_string(), prefix.clone()).await;

        Ok(prefix)
    }

    /// Creates or edits a prefix and refreshes its cache entry.
    pub async fn set(&self, transaction_type: &str, prefix_code: &str) -> AllocResult<Prefix> {
        let transaction_type = validate_transaction_type(transaction_type)?;
        let prefix_code = prefix_code.trim();
        validate_prefix_code(prefix_code)?;

        let prefix = self.db.prefixes().upsert(transaction_type, prefix_code).await?;
        self.cache.put(transaction_type.to_string(), prefix.clone()).await;

        info!(transaction_type = %transaction_type, prefix_code = %prefix_code, "Prefix set");
        Ok(prefix)
    }

    /// All configured prefixes, straight from the database.
    pub async fn list(&self) -> AllocResult<Vec<Prefix>> {
        Ok(self.db.prefixes().list().await?)
    }

    /// Forgets the cached entry for one transaction type.
    pub async fn invalidate(&self, transaction_type: &str) {
        self.cache.invalidate(transaction_type).await;
    }
}

// =============================================================================
// Branch Directory
// =============================================================================

/// Branch id → [`Branch`], cached.
#[derive(Debug)]
pub struct BranchDirectory {
    db: Database,
    cache: TtlCache<i64, Branch>,
}

impl BranchDirectory {
    pub fn new(db: Database, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        BranchDirectory {
            db,
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Looks a branch up.
    ///
    /// ## Errors
    /// `BranchNotFound` when no branch has this id.
    pub async fn get(&self, branch_id: i64) -> AllocResult<Branch> {
        if let Some(branch) = self.cache.get(&branch_id).await {
            return Ok(branch);
        }

        let branch = self
            .db
            .branches()
            .get_by_id(branch_id)
            .await?
            .ok_or(AllocError::BranchNotFound { branch_id })?;

        self.cache.put(branch_id, branch.clone()).await;
        Ok(branch)
    }

    /// Initial rendered into branch-scoped codes.
    pub async fn initial(&self, branch_id: i64) -> AllocResult<String> {
        Ok(self.get(branch_id).await?.initial)
    }

    /// Creates or replaces a branch and refreshes its cache entry.
    pub async fn upsert(&self, branch: Branch) -> AllocResult<()> {
        if branch.id <= 0 {
            return Err(docseq_core::ValidationError::MustBePositive {
                field: "branch.id".to_string(),
            }
            .into());
        }
        validate_branch_initial(&branch.initial)?;

        self.db.branches().upsert(&branch).await?;
        info!(branch_id = branch.id, initial = %branch.initial, "Branch upserted");
        self.cache.put(branch.id, branch).await;

        Ok(())
    }

    /// Forgets the cached entry for one branch.
    pub async fn invalidate(&self, branch_id: i64) {
        self.cache.invalidate(&branch_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use docseq_db::DbConfig;

    async fn setup() -> (Database, ManualClock) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap());
        (db, clock)
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_not_configured() {
        let (db, clock) = setup().await;
        let registry = PrefixRegistry::new(db, Duration::from_secs(3600), Arc::new(clock));

        let err = registry.resolve("Purchase Order").await.unwrap_err();
        assert!(matches!(err, AllocError::PrefixNotConfigured { .. }));
    }

    #[tokio::test]
    async fn test_cached_prefix_survives_out_of_band_edit_until_ttl() {
        let (db, clock) = setup().await;
        db.prefixes().upsert("Purchase Order", "PO").await.unwrap();
        let registry = PrefixRegistry::new(db.clone(), Duration::from_secs(3600), Arc::new(clock.clone()));

        assert_eq!(registry.resolve("Purchase Order").await.unwrap().prefix_code, "PO");

        // Edited behind the registry's back.
        db.prefixes().upsert("Purchase Order", "PUR").await.unwrap();
        assert_eq!(registry.resolve("Purchase Order").await.unwrap().prefix_code, "PO");

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(registry.resolve("Purchase Order").await.unwrap().prefix_code, "PUR");
    }

    #[tokio::test]
    async fn test_set_prefix_refreshes_cache() {
        let (db, clock) = setup().await;
        let registry = PrefixRegistry::new(db, Duration::from_secs(3600), Arc::new(clock));

        let first = registry.set("Purchase Order", "PO").await.unwrap();
        assert_eq!(registry.resolve("Purchase Order").await.unwrap().prefix_code, "PO");

        let second = registry.set("Purchase Order", "POX").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(registry.resolve("Purchase Order").await.unwrap().prefix_code, "POX");

        assert!(matches!(
            registry.set("Purchase Order", "P-O").await,
            Err(AllocError::Validation(_))
        ));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_branch_directory() {
        let (db, clock) = setup().await;
        let directory = BranchDirectory::new(db, Duration::from_secs(3600), Arc::new(clock));

        assert!(matches!(
            directory.initial(3).await,
            Err(AllocError::BranchNotFound { branch_id: 3 })
        ));

        directory
            .upsert(Branch {
                id: 3,
                name: "Jakarta".to_string(),
                initial: "JKT".to_string(),
                is_active: true,
            })
            .await
            .unwrap();
        assert_eq!(directory.initial(3).await.unwrap(), "JKT");

        let bad = Branch {
            id: 4,
            name: "Bad".to_string(),
            initial: "B K".to_string(),
            is_active: true,
        };
        assert!(matches!(directory.upsert(bad).await, Err(AllocError::Validation(_))));
    }
}
