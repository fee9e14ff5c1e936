//! Library endpoints: scan trigger, catalog listing, scan status and control

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{Value, json};

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use crate::app::AppState;
use crate::services::scan_manager::ScanRequest;

/// Runs returned by the scan history endpoint
const RECENT_SCANS_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBody {
    #[serde(default)]
    pub folder_id: String,
    #[serde(default)]
    pub access_token: String,
    pub path: Option<String>,
    pub provider: Option<String>,
}

/// Queue a background scan and return immediately
async fn scan(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(body), _): WithRejection<Json<ScanBody>, ApiError>,
) -> ApiResult<Json<Value>> {
    let accepted = state
        .scans
        .start_scan(
            user.id(),
            ScanRequest {
                folder_id: body.folder_id,
                access_token: body.access_token,
                path: body.path,
                provider: body.provider,
            },
        )
        .await?;

    Ok(Json(json!({
        "ok": true,
        "status": "scanning_background",
        "folderId": accepted.folder_id,
        "scanId": accepted.scan_id,
    })))
}

/// All of the user's media items, newest first
async fn list_items(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Value>> {
    let items = state.db.media_items().list_by_user(user.id()).await?;
    Ok(Json(json!({ "items": items })))
}

/// Registered folders with the number of items cataloged under each
async fn list_folders(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Value>> {
    let folders = state.db.folders().list_with_item_counts(user.id()).await?;
    Ok(Json(json!({ "folders": folders })))
}

async fn list_scans(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Value>> {
    let scans = state.db.scan_runs().list_by_user(user.id(), RECENT_SCANS_LIMIT).await?;
    Ok(Json(json!({ "scans": scans })))
}

async fn get_scan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(scan_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let scan = state
        .db
        .scan_runs()
        .get_by_id_and_user(&scan_id, user.id())
        .await?
        .ok_or_else(|| ApiError::not_found("Scan not found"))?;

    Ok(Json(json!({ "scan": scan })))
}

async fn cancel_scan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(scan_id): Path<String>,
) -> ApiResult<Json<Value>> {
    // Ownership check first so one user cannot cancel another's run
    state
        .db
        .scan_runs()
        .get_by_id_and_user(&scan_id, user.id())
        .await?
        .ok_or_else(|| ApiError::not_found("Scan not found"))?;

    let cancelled = state.scans.cancel_scan(&scan_id);
    Ok(Json(json!({ "ok": true, "cancelled": cancelled })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/library/scan", post(scan))
        .route("/library/items", get(list_items))
        .route("/library/folders", get(list_folders))
        .route("/library/scans", get(list_scans))
        .route("/library/scans/{id}", get(get_scan))
        .route("/library/scans/{id}/cancel", post(cancel_scan))
}
