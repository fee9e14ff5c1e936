//! Media item repository
//!
//! Items are keyed on (user_id, provider_item_id). Inserts never update an
//! existing row: a re-scan keeps the first-seen size and download URL.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use super::sqlite_helpers::{new_id, now_iso8601};

/// Media item record from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MediaItemRecord {
    pub id: String,
    pub user_id: String,
    pub folder_id: String,
    pub title: String,
    pub filename: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub provider_item_id: String,
    pub download_url: String,
    pub created_at: String,
}

/// Input for cataloging a discovered file
#[derive(Debug, Clone)]
pub struct CreateMediaItem {
    pub user_id: String,
    pub folder_id: String,
    pub title: String,
    pub filename: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub provider_item_id: String,
    pub download_url: String,
}

/// Result of an insert-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

pub struct MediaItemRepository {
    pool: SqlitePool,
}

impl MediaItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the item unless the user already has one with the same provider id
    pub async fn insert_if_absent(&self, input: &CreateMediaItem) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO media_items (
                id, user_id, folder_id, title, filename, size_bytes,
                mime_type, provider_item_id, download_url, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, provider_item_id) DO NOTHING
            "#,
        )
        .bind(new_id())
        .bind(&input.user_id)
        .bind(&input.folder_id)
        .bind(&input.title)
        .bind(&input.filename)
        .bind(input.size_bytes)
        .bind(&input.mime_type)
        .bind(&input.provider_item_id)
        .bind(&input.download_url)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::AlreadyPresent
        } else {
            InsertOutcome::Inserted
        })
    }

    /// All items owned by a user, newest first
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<MediaItemRecord>> {
        let records = sqlx::query_as::<_, MediaItemRecord>(
            r#"
            SELECT id, user_id, folder_id, title, filename, size_bytes,
                   mime_type, provider_item_id, download_url, created_at
            FROM media_items
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
