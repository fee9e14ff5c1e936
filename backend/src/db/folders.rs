//! Folder registration repository
//!
//! A registration ties a provider folder to a user-chosen path label. There is
//! at most one registration per (user, path); registering again returns the
//! existing row untouched.

use anyhow::{Result, anyhow};
use serde::Serialize;
use sqlx::SqlitePool;

use super::sqlite_helpers::{new_id, now_iso8601};

/// Folder registration record from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FolderRecord {
    pub id: String,
    pub user_id: String,
    pub path: String,
    pub provider: String,
    pub provider_id: String,
    pub created_at: String,
}

/// Registration plus the number of items cataloged under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FolderWithItemCount {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub folder: FolderRecord,
    pub item_count: i64,
}

/// Input for registering a folder
#[derive(Debug, Clone)]
pub struct RegisterFolder {
    pub user_id: String,
    pub path: String,
    pub provider: String,
    pub provider_id: String,
}

pub struct FolderRepository {
    pool: SqlitePool,
}

impl FolderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the registration for a user's path label
    pub async fn get_by_user_and_path(&self, user_id: &str, path: &str) -> Result<Option<FolderRecord>> {
        let record = sqlx::query_as::<_, FolderRecord>(
            r#"
            SELECT id, user_id, path, provider, provider_id, created_at
            FROM library_folders
            WHERE user_id = ? AND path = ?
            "#,
        )
        .bind(user_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Get a registration by id, scoped to its owner
    pub async fn get_by_id_and_user(&self, id: &str, user_id: &str) -> Result<Option<FolderRecord>> {
        let record = sqlx::query_as::<_, FolderRecord>(
            r#"
            SELECT id, user_id, path, provider, provider_id, created_at
            FROM library_folders
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// List a user's registrations with item counts, oldest first
    pub async fn list_with_item_counts(&self, user_id: &str) -> Result<Vec<FolderWithItemCount>> {
        let records = sqlx::query_as::<_, FolderWithItemCount>(
            r#"
            SELECT f.id, f.user_id, f.path, f.provider, f.provider_id, f.created_at,
                   COUNT(m.id) AS item_count
            FROM library_folders f
            LEFT JOIN media_items m ON m.folder_id = f.id
            WHERE f.user_id = ?
            GROUP BY f.id
            ORDER BY f.created_at, f.rowid
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Look up or create the registration for (user, path).
    ///
    /// Returns the record and whether it was created by this call. The insert
    /// is `ON CONFLICT DO NOTHING`, so concurrent callers converge on one row.
    pub async fn find_or_create(&self, input: RegisterFolder) -> Result<(FolderRecord, bool)> {
        if let Some(existing) = self.get_by_user_and_path(&input.user_id, &input.path).await? {
            return Ok((existing, false));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO library_folders (id, user_id, path, provider, provider_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, path) DO NOTHING
            "#,
        )
        .bind(new_id())
        .bind(&input.user_id)
        .bind(&input.path)
        .bind(&input.provider)
        .bind(&input.provider_id)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;

        let record = self
            .get_by_user_and_path(&input.user_id, &input.path)
            .await?
            .ok_or_else(|| anyhow!("Folder registration vanished after insert"))?;

        Ok((record, result.rows_affected() == 1))
    }
}
