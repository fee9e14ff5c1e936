//! Scanning, drive access and authentication services

pub mod auth;
pub mod classifier;
pub mod drive;
pub mod rate_limiter;
pub mod scan_manager;
pub mod scanner;

pub use auth::{AuthConfig, AuthError, AuthService, Claims};
pub use classifier::is_media;
pub use drive::{DriveError, GraphDriveClient, Page, RemoteEntry, RemoteTree};
pub use rate_limiter::{RateLimitConfig, RetryConfig};
pub use scan_manager::{ScanAccepted, ScanError, ScanRequest, ScanService};
pub use scanner::{ScanJob, ScanOrchestrator, ScanOutcome};
