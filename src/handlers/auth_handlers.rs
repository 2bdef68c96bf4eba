//! Admin register/login/logout and the bearer-token extractor guarding
//! mutating routes.

use crate::{
    errors::AppError,
    models::admin::Session,
    services::auth_service::AuthService,
    state::AppState,
};
use axum::{
    Json,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .register(&req.email, &req.password, &req.confirm_password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Admin created successfully" })),
    ))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = state.auth.login(&req.email, &req.password).await?;
    Ok(Json(json!({ "token": token })))
}

/// `POST /api/auth/logout` revokes the presented token.
pub async fn logout(
    State(state): State<AppState>,
    admin: AdminSession,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(&admin.token).await?;
    tracing::info!(admin_id = %admin.session.admin_id, "admin logged out");
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// A caller holding a live bearer token.
pub struct AdminSession {
    pub session: Session,
    pub token: String,
}

impl<S> FromRequestParts<S> for AdminSession
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?
            .to_string();
        let session = AuthService::from_ref(state).verify(&token).await?;
        Ok(Self { session, token })
    }
}

/// The "Bearer" scheme is matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
        .filter(|token| !token.is_empty())
}
