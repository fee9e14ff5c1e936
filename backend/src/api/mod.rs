//! REST API routes
//!
//! Everything under `/api` except registration and login requires a session
//! token. Health probes live at the root.

pub mod auth;
pub mod error;
pub mod health;
pub mod library;
pub mod sync;

use axum::Router;

use crate::app::AppState;

pub use auth::AuthUser;
pub use error::{ApiError, ApiResult};

/// Routes nested under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(library::router())
        .merge(sync::router())
}
