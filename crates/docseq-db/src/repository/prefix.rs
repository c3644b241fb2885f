//! # Prefix Repository
//!
//! Transaction type → prefix code mapping.
//!
//! Counters reference a prefix by its surrogate `id`, so editing the code
//! string does not split or merge any numbering bucket.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use docseq_core::Prefix;

#[derive(Debug, sqlx::FromRow)]
struct PrefixRow {
    id: i64,
    transaction_type: String,
    prefix_code: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PrefixRow> for Prefix {
    fn from(row: PrefixRow) -> Self {
        Prefix {
            id: row.id,
            transaction_type: row.transaction_type,
            prefix_code: row.prefix_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for prefix operations.
#[derive(Debug, Clone)]
pub struct PrefixRepository {
    pool: SqlitePool,
}

impl PrefixRepository {
    /// Creates a new PrefixRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PrefixRepository { pool }
    }

    /// Gets the prefix configured for a transaction type.
    pub async fn get_by_transaction_type(&self, transaction_type: &str) -> DbResult<Option<Prefix>> {
        let row: Option<PrefixRow> = sqlx::query_as(
            r#"
            SELECT id, transaction_type, prefix_code, created_at, updated_at
            FROM prefixes
            WHERE transaction_type = ?1
            "#,
        )
        .bind(transaction_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Prefix::from))
    }

    /// Lists every configured prefix, ordered by transaction type.
    pub async fn list(&self) -> DbResult<Vec<Prefix>> {
        let rows: Vec<PrefixRow> = sqlx::query_as(
            r#"
            SELECT id, transaction_type, prefix_code, created_at, updated_at
            FROM prefixes
            ORDER BY transaction_type ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Prefix::from).collect())
    }

    /// Inserts a prefix or changes the code of an existing one.
    ///
    /// The row id survives an update, so existing counters stay attached.
    pub async fn upsert(&self, transaction_type: &str, prefix_code: &str) -> DbResult<Prefix> {
        let now = Utc::now();

        debug!(transaction_type = %transaction_type, prefix_code = %prefix_code, "Upserting prefix");

        let row: PrefixRow = sqlx::query_as(
            r#"
            INSERT INTO prefixes (transaction_type, prefix_code, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT (transaction_type) DO UPDATE SET
                prefix_code = excluded.prefix_code,
                updated_at = excluded.updated_at
            RETURNING id, transaction_type, prefix_code, created_at, updated_at
            "#,
        )
        .bind(transaction_type)
        .bind(prefix_code)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Counts configured prefixes.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prefixes")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_upsert_keeps_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.prefixes();

        let first = repo.upsert("Purchase Order", "PO").await.unwrap();
        let second = repo.upsert("Purchase Order", "POR").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.prefix_code, "POR");
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_prefix() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let missing = db
            .prefixes()
            .get_by_transaction_type("Purchase Order")
            .await
            .unwrap();

        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.prefixes();
        repo.upsert("Stock Audit", "SA").await.unwrap();
        repo.upsert("Purchase Order", "PO").await.unwrap();

        let names: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.transaction_type)
            .collect();

        assert_eq!(names, vec!["Purchase Order", "Stock Audit"]);
    }
}
