//! Drive scan orchestrator
//!
//! Walks a user's remote folder tree depth-first and catalogs every file the
//! classifier accepts. Traversal uses an explicit stack of pending folder ids,
//! so depth is bounded only by memory.
//!
//! Failure handling is per folder: a page that fails with a transient or
//! protocol error abandons that folder along with everything beneath it, and the
//! scan carries on with folders already queued. A rejected access token ends
//! the whole run. Items written before an abort are kept.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::classifier::is_media;
use super::drive::{DriveError, Page, RemoteEntry, RemoteTree};
use super::rate_limiter::{RetryConfig, retry_async};
use crate::db::{CreateMediaItem, Database, InsertOutcome, ScanCounters, ScanStatus};

/// Abort reason recorded when the provider rejects the access token
pub const ABORT_AUTH_EXPIRED: &str = "auth_expired";
/// Abort reason recorded when a run is cancelled
pub const ABORT_CANCELLED: &str = "cancelled";
/// Abort reason recorded at start-up for runs a previous process left unfinished
pub const ABORT_INTERRUPTED: &str = "interrupted";

/// Everything a single run needs
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub run_id: String,
    pub user_id: String,
    /// Folder registration the items are attached to
    pub folder_id: String,
    /// Provider id of the folder the walk starts from
    pub root_provider_id: String,
    pub access_token: String,
    pub cancel: CancellationToken,
}

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub status: ScanStatus,
    pub counters: ScanCounters,
    pub abort_reason: Option<String>,
}

enum FolderResult {
    /// Listing fully read; subfolders in discovery order
    Listed(Vec<String>),
    /// Listing failed; the folder and its subtree are skipped
    Abandoned,
    /// The whole run must stop
    Abort(&'static str),
}

pub struct ScanOrchestrator {
    db: Database,
    tree: Arc<dyn RemoteTree>,
    retry: RetryConfig,
}

impl ScanOrchestrator {
    pub fn new(db: Database, tree: Arc<dyn RemoteTree>, retry: RetryConfig) -> Self {
        Self { db, tree, retry }
    }

    /// Run a scan to completion. Never fails: every remote and store error is
    /// classified here and reflected in the outcome and the run record.
    pub async fn run(&self, job: &ScanJob) -> ScanOutcome {
        info!(
            scan_id = %job.run_id,
            user_id = %job.user_id,
            folder_id = %job.folder_id,
            root = %job.root_provider_id,
            "Starting drive scan"
        );

        if let Err(e) = self.db.scan_runs().mark_traversing(&job.run_id).await {
            warn!(scan_id = %job.run_id, error = %e, "Failed to mark scan as traversing");
        }

        let mut counters = ScanCounters::default();
        let abort_reason = self.traverse(job, &mut counters).await;

        let status = match abort_reason {
            Some(_) => ScanStatus::Aborted,
            None => ScanStatus::Completed,
        };

        if let Err(e) = self
            .db
            .scan_runs()
            .finish(&job.run_id, status, &counters, abort_reason)
            .await
        {
            error!(scan_id = %job.run_id, error = %e, "Failed to record scan outcome");
        }

        info!(
            scan_id = %job.run_id,
            status = %status,
            abort_reason = abort_reason.unwrap_or(""),
            folders_visited = counters.folders_visited,
            folders_failed = counters.folders_failed,
            pages = counters.pages_fetched,
            files = counters.files_seen,
            added = counters.items_added,
            existing = counters.items_existing,
            failed = counters.items_failed,
            "Drive scan finished"
        );

        ScanOutcome {
            status,
            counters,
            abort_reason: abort_reason.map(str::to_string),
        }
    }

    /// Depth-first walk. Returns the abort reason if the run stopped early.
    async fn traverse(&self, job: &ScanJob, counters: &mut ScanCounters) -> Option<&'static str> {
        let mut pending = vec![job.root_provider_id.clone()];

        while let Some(folder_id) = pending.pop() {
            if job.cancel.is_cancelled() {
                return Some(ABORT_CANCELLED);
            }

            match self.scan_folder(job, &folder_id, counters).await {
                FolderResult::Listed(subfolders) => {
                    counters.folders_visited += 1;
                    // Reversed so the first-discovered subfolder is visited next
                    pending.extend(subfolders.into_iter().rev());
                }
                FolderResult::Abandoned => counters.folders_failed += 1,
                FolderResult::Abort(reason) => return Some(reason),
            }

            if let Err(e) = self.db.scan_runs().update_progress(&job.run_id, counters).await {
                warn!(scan_id = %job.run_id, error = %e, "Failed to record scan progress");
            }
        }

        None
    }

    /// Read every page of one folder, cataloging files as they arrive.
    /// Subfolders are only handed back once the listing is complete.
    async fn scan_folder(
        &self,
        job: &ScanJob,
        folder_id: &str,
        counters: &mut ScanCounters,
    ) -> FolderResult {
        let mut cursor: Option<String> = None;
        let mut subfolders = Vec::new();

        loop {
            if job.cancel.is_cancelled() {
                return FolderResult::Abort(ABORT_CANCELLED);
            }

            let fetched = tokio::select! {
                biased;
                _ = job.cancel.cancelled() => return FolderResult::Abort(ABORT_CANCELLED),
                result = self.fetch_page(job, folder_id, cursor.as_deref()) => result,
            };

            let Page { entries, next_cursor } = match fetched {
                Ok(page) => page,
                Err(DriveError::AuthExpired) => {
                    warn!(scan_id = %job.run_id, folder = %folder_id, "Access token rejected, aborting scan");
                    return FolderResult::Abort(ABORT_AUTH_EXPIRED);
                }
                Err(e) => {
                    warn!(
                        scan_id = %job.run_id,
                        folder = %folder_id,
                        error = %e,
                        "Abandoning folder and its subfolders"
                    );
                    return FolderResult::Abandoned;
                }
            };
            counters.pages_fetched += 1;

            for entry in entries {
                match entry {
                    RemoteEntry::Folder { id, .. } => subfolders.push(id),
                    file @ RemoteEntry::File { .. } => self.catalog_file(job, file, counters).await,
                }
            }

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => return FolderResult::Listed(subfolders),
            }
        }
    }

    async fn fetch_page(
        &self,
        job: &ScanJob,
        folder_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page, DriveError> {
        retry_async(
            || self.tree.list_children(&job.access_token, folder_id, cursor),
            DriveError::is_retryable,
            &self.retry,
            "list_children",
        )
        .await
    }

    async fn catalog_file(&self, job: &ScanJob, entry: RemoteEntry, counters: &mut ScanCounters) {
        let RemoteEntry::File { id, name, size, mime_type, download_url } = entry else {
            return;
        };
        counters.files_seen += 1;

        if !is_media(&mime_type, &name) {
            return;
        }

        let item = CreateMediaItem {
            user_id: job.user_id.clone(),
            folder_id: job.folder_id.clone(),
            title: name.clone(),
            filename: name,
            size_bytes: i64::try_from(size).unwrap_or(i64::MAX),
            mime_type,
            provider_item_id: id,
            download_url: download_url.unwrap_or_default(),
        };

        match self.db.media_items().insert_if_absent(&item).await {
            Ok(InsertOutcome::Inserted) => {
                counters.items_added += 1;
                debug!(scan_id = %job.run_id, filename = %item.filename, "Cataloged media item");
            }
            Ok(InsertOutcome::AlreadyPresent) => counters.items_existing += 1,
            Err(e) => {
                counters.items_failed += 1;
                error!(
                    scan_id = %job.run_id,
                    provider_item_id = %item.provider_item_id,
                    error = %e,
                    "Failed to store media item, skipping"
                );
            }
        }
    }
}
