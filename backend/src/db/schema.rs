//! Static schema creation
//!
//! Every statement is idempotent (`IF NOT EXISTS`) and runs at start-up before
//! any repository is used. Uniqueness constraints here are what make folder
//! registration and media insertion safe under concurrent scans.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

const STATEMENTS: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "library_folders",
        r#"
        CREATE TABLE IF NOT EXISTS library_folders (
            id TEXT PRIMARY KEY NOT NULL,
            user_id TEXT NOT NULL,
            path TEXT NOT NULL,
            provider TEXT NOT NULL,
            provider_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, path)
        )
        "#,
    ),
    (
        "media_items",
        r#"
        CREATE TABLE IF NOT EXISTS media_items (
            id TEXT PRIMARY KEY NOT NULL,
            user_id TEXT NOT NULL,
            folder_id TEXT NOT NULL,
            title TEXT NOT NULL,
            filename TEXT NOT NULL,
            size_bytes INTEGER NOT NULL DEFAULT 0,
            mime_type TEXT NOT NULL DEFAULT '',
            provider_item_id TEXT NOT NULL,
            download_url TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            UNIQUE (user_id, provider_item_id)
        )
        "#,
    ),
    (
        "idx_media_items_user_created",
        "CREATE INDEX IF NOT EXISTS idx_media_items_user_created ON media_items (user_id, created_at)",
    ),
    (
        "idx_media_items_folder",
        "CREATE INDEX IF NOT EXISTS idx_media_items_folder ON media_items (folder_id)",
    ),
    (
        "scan_runs",
        r#"
        CREATE TABLE IF NOT EXISTS scan_runs (
            id TEXT PRIMARY KEY NOT NULL,
            user_id TEXT NOT NULL,
            folder_id TEXT NOT NULL,
            root_provider_id TEXT NOT NULL,
            status TEXT NOT NULL,
            folders_visited INTEGER NOT NULL DEFAULT 0,
            folders_failed INTEGER NOT NULL DEFAULT 0,
            pages_fetched INTEGER NOT NULL DEFAULT 0,
            files_seen INTEGER NOT NULL DEFAULT 0,
            items_added INTEGER NOT NULL DEFAULT 0,
            items_existing INTEGER NOT NULL DEFAULT 0,
            items_failed INTEGER NOT NULL DEFAULT 0,
            abort_reason TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT
        )
        "#,
    ),
    (
        "idx_scan_runs_user_created",
        "CREATE INDEX IF NOT EXISTS idx_scan_runs_user_created ON scan_runs (user_id, created_at)",
    ),
    (
        "user_data",
        r#"
        CREATE TABLE IF NOT EXISTS user_data (
            user_id TEXT PRIMARY KEY NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
];

/// Create all tables and indexes
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for (name, sql) in STATEMENTS {
        debug!(object = %name, "Ensuring schema object");
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {}", name))?;
    }
    Ok(())
}
