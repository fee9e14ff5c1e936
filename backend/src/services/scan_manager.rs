//! Background scan management
//!
//! Accepts scan requests, records them, and runs each one as a detached tokio
//! task. Active runs are tracked in memory so they can be cancelled one at a
//! time or all together on shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::scanner::{ABORT_INTERRUPTED, ScanJob, ScanOrchestrator};
use crate::db::{Database, RegisterFolder};

/// Input to [`ScanService::start_scan`]
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Provider id of the folder to scan
    pub folder_id: String,
    pub access_token: String,
    /// Label for the registration; defaults to `folder_id`
    pub path: Option<String>,
    /// Defaults to the configured provider
    pub provider: Option<String>,
}

/// Handle returned once a scan has been queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanAccepted {
    /// Folder registration id
    pub folder_id: String,
    /// Scan run id
    pub scan_id: String,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Access Token required")]
    MissingAccessToken,

    #[error("Malformed access token")]
    MalformedAccessToken,

    #[error("folderId required")]
    MissingFolderId,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

struct ActiveScan {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ScanService {
    db: Database,
    orchestrator: Arc<ScanOrchestrator>,
    default_provider: String,
    active: Arc<RwLock<HashMap<String, ActiveScan>>>,
}

impl ScanService {
    pub fn new(db: Database, orchestrator: Arc<ScanOrchestrator>, default_provider: String) -> Self {
        Self {
            db,
            orchestrator,
            default_provider,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register the folder if needed, queue a run and start it in the background.
    /// Returns as soon as the run is recorded; the traversal is never awaited here.
    pub async fn start_scan(&self, user_id: &str, request: ScanRequest) -> Result<ScanAccepted, ScanError> {
        let access_token = normalize_access_token(&request.access_token)?;

        let root_provider_id = request.folder_id.trim().to_string();
        if root_provider_id.is_empty() {
            return Err(ScanError::MissingFolderId);
        }

        let path = request
            .path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| root_provider_id.clone());
        let provider = request
            .provider
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.default_provider.clone());

        let (registration, created) = self
            .db
            .folders()
            .find_or_create(RegisterFolder {
                user_id: user_id.to_string(),
                path,
                provider,
                provider_id: root_provider_id,
            })
            .await?;
        if created {
            info!(user_id = %user_id, folder_id = %registration.id, path = %registration.path, "Registered library folder");
        }

        // A reused registration keeps the provider folder it was first registered with
        let run = self
            .db
            .scan_runs()
            .create(user_id, &registration.id, &registration.provider_id)
            .await?;

        let job = ScanJob {
            run_id: run.id.clone(),
            user_id: user_id.to_string(),
            folder_id: registration.id.clone(),
            root_provider_id: registration.provider_id.clone(),
            access_token,
            cancel: CancellationToken::new(),
        };
        self.spawn(job);

        info!(user_id = %user_id, scan_id = %run.id, folder_id = %registration.id, "Scan queued");
        Ok(ScanAccepted { folder_id: registration.id, scan_id: run.id })
    }

    fn spawn(&self, job: ScanJob) {
        let orchestrator = self.orchestrator.clone();
        let active = self.active.clone();
        let run_id = job.run_id.clone();
        let cancel = job.cancel.clone();

        // Held across the spawn so the task cannot deregister before it is registered
        let mut scans = self.active.write();
        let handle = tokio::spawn(async move {
            orchestrator.run(&job).await;
            active.write().remove(&job.run_id);
        });
        scans.insert(run_id, ActiveScan { cancel, handle });
    }

    /// Request cancellation of a running scan. Returns false if it is not active.
    pub fn cancel_scan(&self, scan_id: &str) -> bool {
        match self.active.read().get(scan_id) {
            Some(scan) => {
                info!(scan_id = %scan_id, "Cancelling scan");
                scan.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, scan_id: &str) -> bool {
        self.active.read().contains_key(scan_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Mark runs left queued or traversing by a previous process as aborted
    pub async fn recover_interrupted(&self) -> anyhow::Result<u64> {
        let count = self.db.scan_runs().abort_unfinished(ABORT_INTERRUPTED).await?;
        if count > 0 {
            warn!(count = count, "Marked interrupted scans as aborted");
        }
        Ok(count)
    }

    /// Cancel every active scan and wait for each to record its outcome
    pub async fn shutdown(&self) {
        let scans: Vec<(String, ActiveScan)> = self.active.write().drain().collect();
        if scans.is_empty() {
            return;
        }

        info!(count = scans.len(), "Cancelling active scans");
        for (_, scan) in &scans {
            scan.cancel.cancel();
        }
        for (scan_id, scan) in scans {
            if let Err(e) = scan.handle.await {
                warn!(scan_id = %scan_id, error = %e, "Scan task ended abnormally");
            }
        }
    }
}

/// Accepts a raw token or a `Bearer <token>` header value. Only the shape is
/// checked; whether the provider accepts it is found out during the scan.
pub fn normalize_access_token(raw: &str) -> Result<String, ScanError> {
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw);
    if token.is_empty() {
        return Err(ScanError::MissingAccessToken);
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ScanError::MalformedAccessToken);
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use crate::db::ScanStatus;
    use crate::services::drive::{DriveError, Page, RemoteEntry, RemoteTree};
    use crate::services::rate_limiter::RetryConfig;

    /// Root holds one movie; any other folder hangs until cancelled
    struct OneFolderTree;

    #[async_trait]
    impl RemoteTree for OneFolderTree {
        async fn list_children(&self, _: &str, folder_id: &str, _: Option<&str>) -> Result<Page, DriveError> {
            if folder_id != "root" {
                std::future::pending::<()>().await;
            }
            Ok(Page {
                entries: vec![RemoteEntry::File {
                    id: "m1".into(),
                    name: "movie.mp4".into(),
                    size: 1,
                    mime_type: "video/mp4".into(),
                    download_url: None,
                }],
                next_cursor: None,
            })
        }
    }

    async fn service() -> (Database, ScanService) {
        let db = Database::in_memory().await.unwrap();
        let orchestrator = Arc::new(ScanOrchestrator::new(
            db.clone(),
            Arc::new(OneFolderTree),
            RetryConfig::default(),
        ));
        (db.clone(), ScanService::new(db, orchestrator, "onedrive".into()))
    }

    fn request(folder_id: &str, path: Option<&str>) -> ScanRequest {
        ScanRequest {
            folder_id: folder_id.into(),
            access_token: "Bearer abc123".into(),
            path: path.map(str::to_string),
            provider: None,
        }
    }

    async fn wait_for_terminal(db: &Database, scan_id: &str) -> ScanStatus {
        for _ in 0..200 {
            let run = db.scan_runs().get_by_id(scan_id).await.unwrap().unwrap();
            if run.status.is_terminal() {
                return run.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scan {} never finished", scan_id);
    }

    #[test]
    fn test_normalize_access_token() {
        assert_eq!(normalize_access_token("abc").unwrap(), "abc");
        assert_eq!(normalize_access_token("Bearer abc").unwrap(), "abc");
        assert_matches!(normalize_access_token(""), Err(ScanError::MissingAccessToken));
        assert_matches!(normalize_access_token("Bearer "), Err(ScanError::MissingAccessToken));
        assert_matches!(normalize_access_token("ab c"), Err(ScanError::MalformedAccessToken));
        assert_matches!(normalize_access_token("abc\n"), Err(ScanError::MalformedAccessToken));
    }

    #[tokio::test]
    async fn test_start_scan_runs_in_background() {
        let (db, scans) = service().await;

        let accepted = scans.start_scan("u1", request("root", None)).await.unwrap();

        assert_eq!(wait_for_terminal(&db, &accepted.scan_id).await, ScanStatus::Completed);
        let folder = db.folders().get_by_id_and_user(&accepted.folder_id, "u1").await.unwrap().unwrap();
        assert_eq!(folder.path, "root");
        assert_eq!(folder.provider, "onedrive");
        assert_eq!(db.media_items().list_by_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_folder_registration_reused_per_path() {
        let (db, scans) = service().await;

        let first = scans.start_scan("u1", request("root", Some("/Movies"))).await.unwrap();
        let second = scans.start_scan("u1", request("root", Some("/Movies"))).await.unwrap();
        let third = scans.start_scan("u1", request("root", Some("/Shows"))).await.unwrap();

        assert_eq!(first.folder_id, second.folder_id);
        assert_ne!(first.folder_id, third.folder_id);
        assert_ne!(first.scan_id, second.scan_id);

        for accepted in [&first, &second, &third] {
            wait_for_terminal(&db, &accepted.scan_id).await;
        }
        assert_eq!(db.folders().list_with_item_counts("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let (_db, scans) = service().await;

        let mut missing_token = request("root", None);
        missing_token.access_token = String::new();
        assert_matches!(scans.start_scan("u1", missing_token).await, Err(ScanError::MissingAccessToken));
        assert_matches!(scans.start_scan("u1", request("  ", None)).await, Err(ScanError::MissingFolderId));
        assert_eq!(scans.active_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_and_shutdown() {
        let (db, scans) = service().await;

        let hung = scans.start_scan("u1", request("elsewhere", None)).await.unwrap();
        let other = scans.start_scan("u1", request("elsewhere-too", None)).await.unwrap();
        assert!(scans.is_active(&hung.scan_id));

        assert!(scans.cancel_scan(&hung.scan_id));
        assert_eq!(wait_for_terminal(&db, &hung.scan_id).await, ScanStatus::Aborted);
        assert!(!scans.cancel_scan("no-such-scan"));

        scans.shutdown().await;
        assert_eq!(scans.active_count(), 0);
        let run = db.scan_runs().get_by_id(&other.scan_id).await.unwrap().unwrap();
        assert_eq!(run.status, ScanStatus::Aborted);
        assert_eq!(run.abort_reason.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_recover_interrupted() {
        let (db, scans) = service().await;
        let stale = db.scan_runs().create("u1", "f1", "root").await.unwrap();

        assert_eq!(scans.recover_interrupted().await.unwrap(), 1);
        let run = db.scan_runs().get_by_id(&stale.id).await.unwrap().unwrap();
        assert_eq!(run.status, ScanStatus::Aborted);
        assert_eq!(run.abort_reason.as_deref(), Some(ABORT_INTERRUPTED));
    }
}
