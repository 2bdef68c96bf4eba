//! Shared application state handed to every handler.

use crate::{
    config::AppConfig,
    services::{auth_service::AuthService, content_store::ContentStore, object_service::ObjectService},
};
use axum::extract::FromRef;
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub objects: ObjectService,
    pub content: ContentStore,
    pub auth: AuthService,
    /// Spool directory for multipart uploads.
    pub upload_dir: Arc<PathBuf>,
    pub public_base_url: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, cfg: &AppConfig) -> Self {
        Self {
            objects: ObjectService::new(db.clone(), cfg.objects.clone()),
            content: ContentStore::new(db.clone()),
            auth: AuthService::new(db.clone(), cfg.token_ttl),
            upload_dir: Arc::new(cfg.upload_dir.clone()),
            public_base_url: cfg.public_base_url.as_deref().map(Arc::from),
            db,
        }
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
