//! Application state and HTTP router construction.
//!
//! Used by [main] and by the integration tests to build the Axum app.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::Config;
use crate::db::Database;
use crate::services::{
    AuthConfig, AuthService, GraphDriveClient, RemoteTree, RetryConfig, ScanOrchestrator, ScanService,
};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub auth: AuthService,
    pub scans: Arc<ScanService>,
}

impl AppState {
    /// Wire services against the Microsoft Graph drive client
    pub fn new(config: Arc<Config>, db: Database) -> Result<Self> {
        let tree = Arc::new(GraphDriveClient::from_config(&config)?);
        Ok(Self::with_tree(config, db, tree))
    }

    /// Wire services against any remote tree
    pub fn with_tree(config: Arc<Config>, db: Database, tree: Arc<dyn RemoteTree>) -> Self {
        let orchestrator = Arc::new(ScanOrchestrator::new(
            db.clone(),
            tree,
            RetryConfig::with_retries(config.scan_page_retries),
        ));
        let scans = Arc::new(ScanService::new(
            db.clone(),
            orchestrator,
            config.default_provider.clone(),
        ));
        let auth = AuthService::new(db.clone(), AuthConfig::from_config(&config));

        Self { config, db, auth, scans }
    }
}

/// Build the full Axum router: health probes, /api, layers.
/// Returns Router<()> (state fully applied) for use with axum::serve.
pub fn build_app(state: AppState) -> Router<()> {
    Router::new()
        .merge(api::health::router())
        .nest("/api", api::api_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
