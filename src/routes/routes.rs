//! Route table.
//!
//! ## Structure
//! - **Health**: `GET /healthz`, `GET /readyz`
//!
//! - **Image store** (mounted at the configured prefix, default `/image`)
//!   - `POST   {prefix}`: upload (multipart `file` + `label`)
//!   - `GET    {prefix}`: list stored objects
//!   - `GET    {prefix}/{filename}`: stream an object
//!   - `POST   {prefix}/update/{id}`: replace the payload, keep the label
//!   - `POST   {prefix}/update-label/{id}`: relabel
//!   - `POST   {prefix}/del/{id}`: delete object and ledger record
//!   - `GET    {prefix}_api/metadata`: ledger records
//!   - `GET    {prefix}_api/orphans`: partial-failure report
//!   - `POST   {prefix}_api/reconcile`: remove aged orphans (admin)
//!
//! - **Content** (`/api/...`): words, scrolling info, YouTube links.
//!   Reads are public, writes need a bearer token.
//!
//! - **Auth**: `POST /api/auth/{register,login,logout}`

use crate::{
    handlers::{
        auth_handlers::{login, logout, register},
        content_handlers,
        health_handlers::{healthz, readyz},
        object_handlers::{
            delete_object, get_object, list_metadata, list_objects, orphans, reconcile,
            update_label, update_object, upload_object,
        },
    },
    models::document::{ScrollingInfo, Word, YouTubeLink},
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Room for multipart boundaries and the label part on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the router for every endpoint. State is attached by the caller.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(object_routes(state))
        .merge(content_routes())
        .merge(auth_routes())
}

fn object_routes(state: &AppState) -> Router<AppState> {
    let config = state.objects.config();
    let prefix = config.route_prefix.as_str();
    let body_limit = usize::try_from(config.max_file_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route(prefix, post(upload_object).get(list_objects))
        .route(&format!("{}/{{filename}}", prefix), get(get_object))
        .route(&format!("{}/update/{{id}}", prefix), post(update_object))
        .route(&format!("{}/update-label/{{id}}", prefix), post(update_label))
        .route(&format!("{}/del/{{id}}", prefix), post(delete_object))
        .route(&format!("{}_api/metadata", prefix), get(list_metadata))
        .route(&format!("{}_api/orphans", prefix), get(orphans))
        .route(&format!("{}_api/reconcile", prefix), post(reconcile))
        .layer(DefaultBodyLimit::max(body_limit))
}

fn content_routes() -> Router<AppState> {
    use content_handlers::{create, delete, list, update};

    Router::new()
        .route("/api/word", post(create::<Word>))
        .route("/api/words", get(list::<Word>))
        .route("/api/word/{id}", put(update::<Word>).delete(delete::<Word>))
        .route(
            "/api/scrolling-info",
            post(create::<ScrollingInfo>).get(list::<ScrollingInfo>),
        )
        .route(
            "/api/scrolling-info/{id}",
            put(update::<ScrollingInfo>).delete(delete::<ScrollingInfo>),
        )
        .route("/api/youtube-link", post(create::<YouTubeLink>))
        .route("/api/youtube-links", get(list::<YouTubeLink>))
        .route(
            "/api/youtube-link/{id}",
            put(update::<YouTubeLink>).delete(delete::<YouTubeLink>),
        )
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
}
