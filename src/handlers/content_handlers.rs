//! Generic CRUD handlers shared by every content resource.
//!
//! Routes instantiate them per type, e.g. `post(create::<Word>)`.

use crate::{
    errors::AppError,
    handlers::auth_handlers::AdminSession,
    models::document::Resource,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

pub async fn create<R: Resource>(
    State(state): State<AppState>,
    _admin: AdminSession,
    Json(body): Json<R>,
) -> Result<impl IntoResponse, AppError> {
    let doc = state.content.create(body).await?;
    tracing::info!(collection = R::COLLECTION, id = %doc.id, "created document");
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn list<R: Resource>(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.content.list::<R>().await?))
}

pub async fn update<R: Resource>(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
    Json(patch): Json<R::Patch>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id::<R>(&id)?;
    state
        .content
        .update::<R>(id, patch)
        .await?
        .map(Json)
        .ok_or_else(not_found::<R>)
}

pub async fn delete<R: Resource>(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id::<R>(&id)?;
    if !state.content.delete::<R>(id).await? {
        return Err(not_found::<R>());
    }
    tracing::info!(collection = R::COLLECTION, %id, "deleted document");
    Ok(Json(json!({
        "message": format!("{} deleted successfully", R::DISPLAY_NAME)
    })))
}

fn parse_id<R: Resource>(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| not_found::<R>())
}

fn not_found<R: Resource>() -> AppError {
    AppError::not_found(format!("{} not found", R::DISPLAY_NAME))
}
