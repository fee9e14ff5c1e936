//! Database connection and repositories
//!
//! [Database] wraps the SQLite pool and hands out one repository per table.
//! Repositories are cheap to construct (they clone the pool handle).

pub mod folders;
pub mod media_items;
pub mod scan_runs;
pub mod schema;
pub mod sqlite_helpers;
pub mod user_data;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub use folders::{FolderRecord, FolderRepository, FolderWithItemCount, RegisterFolder};
pub use media_items::{CreateMediaItem, InsertOutcome, MediaItemRecord, MediaItemRepository};
pub use scan_runs::{ScanCounters, ScanRunRecord, ScanRunRepository, ScanStatus};
pub use user_data::UserDataRepository;
pub use users::{UserRecord, UsersRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL '{}'", url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let options = if in_memory {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        if !in_memory {
            ensure_parent_dir(url).await?;
        }

        // Every connection to `:memory:` is its own database, so keep exactly
        // one alive for the life of the pool.
        let pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(10));
        let pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database '{}'", url))?;

        schema::ensure_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// Fresh in-memory database with the schema applied
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get a folder registration repository
    pub fn folders(&self) -> FolderRepository {
        FolderRepository::new(self.pool.clone())
    }

    /// Get a media items repository
    pub fn media_items(&self) -> MediaItemRepository {
        MediaItemRepository::new(self.pool.clone())
    }

    /// Get a scan runs repository
    pub fn scan_runs(&self) -> ScanRunRepository {
        ScanRunRepository::new(self.pool.clone())
    }

    /// Get a users repository
    pub fn users(&self) -> UsersRepository {
        UsersRepository::new(self.pool.clone())
    }

    /// Get a per-user sync document repository
    pub fn user_data(&self) -> UserDataRepository {
        UserDataRepository::new(self.pool.clone())
    }
}

/// Create the directory holding a file-backed database
async fn ensure_parent_dir(url: &str) -> Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}
