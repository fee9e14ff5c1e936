//! Scan run repository
//!
//! One row per scan execution. The row is the only place a client can learn
//! whether a background scan finished, is still running, or was aborted.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::Serialize;
use sqlx::SqlitePool;

use super::sqlite_helpers::{new_id, now_iso8601, str_to_datetime};

/// Lifecycle of a scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Queued,
    Traversing,
    Completed,
    Aborted,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Queued => "queued",
            ScanStatus::Traversing => "traversing",
            ScanStatus::Completed => "completed",
            ScanStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Aborted)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(ScanStatus::Queued),
            "traversing" => Ok(ScanStatus::Traversing),
            "completed" => Ok(ScanStatus::Completed),
            "aborted" => Ok(ScanStatus::Aborted),
            other => Err(anyhow!("Unknown scan status '{}'", other)),
        }
    }
}

/// Running totals for a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanCounters {
    pub folders_visited: i64,
    pub folders_failed: i64,
    pub pages_fetched: i64,
    pub files_seen: i64,
    pub items_added: i64,
    pub items_existing: i64,
    pub items_failed: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ScanRunRow {
    id: String,
    user_id: String,
    folder_id: String,
    root_provider_id: String,
    status: String,
    folders_visited: i64,
    folders_failed: i64,
    pages_fetched: i64,
    files_seen: i64,
    items_added: i64,
    items_existing: i64,
    items_failed: i64,
    abort_reason: Option<String>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
}

/// Scan run record from database
#[derive(Debug, Clone, Serialize)]
pub struct ScanRunRecord {
    pub id: String,
    pub user_id: String,
    pub folder_id: String,
    pub root_provider_id: String,
    pub status: ScanStatus,
    #[serde(flatten)]
    pub counters: ScanCounters,
    pub abort_reason: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    /// Wall-clock seconds between start and finish, once finished
    pub duration_secs: Option<f64>,
}

impl TryFrom<ScanRunRow> for ScanRunRecord {
    type Error = anyhow::Error;

    fn try_from(row: ScanRunRow) -> Result<Self> {
        let duration_secs = match (&row.started_at, &row.finished_at) {
            (Some(start), Some(end)) => {
                let elapsed = str_to_datetime(end)? - str_to_datetime(start)?;
                Some(elapsed.num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        };

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            folder_id: row.folder_id,
            root_provider_id: row.root_provider_id,
            status: row.status.parse()?,
            counters: ScanCounters {
                folders_visited: row.folders_visited,
                folders_failed: row.folders_failed,
                pages_fetched: row.pages_fetched,
                files_seen: row.files_seen,
                items_added: row.items_added,
                items_existing: row.items_existing,
                items_failed: row.items_failed,
            },
            abort_reason: row.abort_reason,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            duration_secs,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, folder_id, root_provider_id, status,
           folders_visited, folders_failed, pages_fetched, files_seen,
           items_added, items_existing, items_failed, abort_reason,
           created_at, started_at, finished_at
    FROM scan_runs
"#;

pub struct ScanRunRepository {
    pool: SqlitePool,
}

impl ScanRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a new queued run
    pub async fn create(&self, user_id: &str, folder_id: &str, root_provider_id: &str) -> Result<ScanRunRecord> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO scan_runs (id, user_id, folder_id, root_provider_id, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(folder_id)
        .bind(root_provider_id)
        .bind(ScanStatus::Queued.as_str())
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| anyhow!("Failed to create scan run"))
    }

    /// Get a run by id
    pub async fn get_by_id(&self, id: &str) -> Result<Option<ScanRunRecord>> {
        let row = sqlx::query_as::<_, ScanRunRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ScanRunRecord::try_from).transpose()
    }

    /// Get a run by id, scoped to its owner
    pub async fn get_by_id_and_user(&self, id: &str, user_id: &str) -> Result<Option<ScanRunRecord>> {
        let row = sqlx::query_as::<_, ScanRunRow>(&format!("{} WHERE id = ? AND user_id = ?", SELECT_COLUMNS))
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ScanRunRecord::try_from).transpose()
    }

    /// Most recent runs for a user, newest first
    pub async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<ScanRunRecord>> {
        let rows = sqlx::query_as::<_, ScanRunRow>(&format!(
            "{} WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ScanRunRecord::try_from).collect()
    }

    /// Queued -> Traversing
    pub async fn mark_traversing(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE scan_runs SET status = ?, started_at = ? WHERE id = ? AND status = ?")
            .bind(ScanStatus::Traversing.as_str())
            .bind(now_iso8601())
            .bind(id)
            .bind(ScanStatus::Queued.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Overwrite the progress counters of a running scan
    pub async fn update_progress(&self, id: &str, counters: &ScanCounters) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scan_runs
            SET folders_visited = ?, folders_failed = ?, pages_fetched = ?, files_seen = ?,
                items_added = ?, items_existing = ?, items_failed = ?
            WHERE id = ?
            "#,
        )
        .bind(counters.folders_visited)
        .bind(counters.folders_failed)
        .bind(counters.pages_fetched)
        .bind(counters.files_seen)
        .bind(counters.items_added)
        .bind(counters.items_existing)
        .bind(counters.items_failed)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move a run to a terminal status with its final counters
    pub async fn finish(
        &self,
        id: &str,
        status: ScanStatus,
        counters: &ScanCounters,
        abort_reason: Option<&str>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(anyhow!("Cannot finish scan run with non-terminal status {}", status));
        }

        let now = now_iso8601();
        sqlx::query(
            r#"
            UPDATE scan_runs
            SET status = ?, abort_reason = ?, finished_at = ?,
                started_at = COALESCE(started_at, ?),
                folders_visited = ?, folders_failed = ?, pages_fetched = ?, files_seen = ?,
                items_added = ?, items_existing = ?, items_failed = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(abort_reason)
        .bind(&now)
        .bind(&now)
        .bind(counters.folders_visited)
        .bind(counters.folders_failed)
        .bind(counters.pages_fetched)
        .bind(counters.files_seen)
        .bind(counters.items_added)
        .bind(counters.items_existing)
        .bind(counters.items_failed)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Abort every run left queued or traversing by a previous process.
    /// Returns the number of runs updated.
    pub async fn abort_unfinished(&self, reason: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE scan_runs
            SET status = ?, abort_reason = ?, finished_at = ?
            WHERE status IN (?, ?)
            "#,
        )
        .bind(ScanStatus::Aborted.as_str())
        .bind(reason)
        .bind(now_iso8601())
        .bind(ScanStatus::Queued.as_str())
        .bind(ScanStatus::Traversing.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
