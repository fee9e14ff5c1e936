//! Account endpoints and the authenticated-user extractor

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{Value, json};

use super::error::{ApiError, ApiResult};
use crate::app::AppState;
use crate::services::auth::Claims;

/// The caller of a protected route, taken from `Authorization: Bearer <jwt>`
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.sub
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

        let claims = state.auth.verify_token(token)?;
        Ok(AuthUser(claims))
    }
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

async fn register(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<Credentials>, ApiError>,
) -> ApiResult<Json<Value>> {
    let user = state.auth.register(&body.email, &body.password).await?;
    Ok(Json(json!({ "ok": true, "id": user.id, "email": user.email })))
}

async fn login(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<Credentials>, ApiError>,
) -> ApiResult<Json<Value>> {
    let login = state.auth.login(&body.email, &body.password).await?;
    Ok(Json(json!({
        "token": login.token,
        "user": {
            "id": login.user.id,
            "email": login.user.email,
            "created_at": login.user.created_at,
        }
    })))
}

async fn me(user: AuthUser) -> Json<Value> {
    Json(json!({ "user": user.0 }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}
