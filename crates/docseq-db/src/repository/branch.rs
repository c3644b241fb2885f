//! # Branch Repository
//!
//! Branch initials rendered into branch-scoped codes.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use docseq_core::Branch;

#[derive(Debug, sqlx::FromRow)]
struct BranchRow {
    id: i64,
    name: String,
    initial: String,
    is_active: bool,
}

impl From<BranchRow> for Branch {
    fn from(row: BranchRow) -> Self {
        Branch {
            id: row.id,
            name: row.name,
            initial: row.initial,
            is_active: row.is_active,
        }
    }
}

/// Repository for branch lookups.
#[derive(Debug, Clone)]
pub struct BranchRepository {
    pool: SqlitePool,
}

impl BranchRepository {
    /// Creates a new BranchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BranchRepository { pool }
    }

    /// Gets a branch by ID, active or not.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Branch>> {
        let row: Option<BranchRow> = sqlx::query_as(
            r#"
            SELECT id, name, initial, is_active
            FROM branches
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Branch::from))
    }

    /// Inserts or replaces a branch.
    pub async fn upsert(&self, branch: &Branch) -> DbResult<()> {
        debug!(id = branch.id, initial = %branch.initial, "Upserting branch");

        sqlx::query(
            r#"
            INSERT INTO branches (id, name, initial, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                initial = excluded.initial,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(branch.id)
        .bind(&branch.name)
        .bind(&branch.initial)
        .bind(branch.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists active branches ordered by id.
    pub async fn list_active(&self) -> DbResult<Vec<Branch>> {
        let rows: Vec<BranchRow> = sqlx::query_as(
            r#"
            SELECT id, name, initial, is_active
            FROM branches
            WHERE is_active = 1
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Branch::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn branch(id: i64, initial: &str, is_active: bool) -> Branch {
        Branch {
            id,
            name: format!("Branch {initial}"),
            initial: initial.to_string(),
            is_active,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.branches();

        repo.upsert(&branch(3, "JKT", true)).await.unwrap();
        repo.upsert(&branch(3, "JKTA", true)).await.unwrap();

        let found = repo.get_by_id(3).await.unwrap().unwrap();
        assert_eq!(found.initial, "JKTA");
        assert!(repo.get_by_id(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_skips_inactive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.branches();

        repo.upsert(&branch(1, "BDG", true)).await.unwrap();
        repo.upsert(&branch(2, "SBY", false)).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].initial, "BDG");
    }
}
