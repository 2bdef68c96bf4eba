//! Content admin backend: a chunked image store in SQLite with a metadata
//! ledger, plus admin-guarded content collections.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod size;
pub mod state;
pub mod validation;

use axum::Router;
use state::AppState;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// The full application router with shared state attached.
pub fn build_app(state: AppState) -> Router {
    routes::routes::routes(&state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
