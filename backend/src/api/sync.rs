//! Per-user sync document

use axum::{Json, Router, extract::State, routing::get};
use axum_extra::extract::WithRejection;
use serde_json::{Value, json};

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use crate::app::AppState;

async fn get_document(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Value>> {
    let data = state.db.user_data().get(user.id()).await?;
    Ok(Json(data.unwrap_or_else(|| json!({}))))
}

async fn put_document(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(body), _): WithRejection<Json<Value>, ApiError>,
) -> ApiResult<Json<Value>> {
    state.db.user_data().upsert(user.id(), &body).await?;
    Ok(Json(json!({ "success": true })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/sync", get(get_document).post(put_document))
}
