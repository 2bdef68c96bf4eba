//! Test server wrapper around the real router.

use content_admin::{
    build_app,
    config::{AppConfig, ObjectStoreConfig},
    db,
    state::AppState,
};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;

/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Small chunks so that test payloads span several of them.
    pub async fn new() -> Self {
        let objects = ObjectStoreConfig::new("image", "/image", "5MB", 1024, 500)
            .expect("valid object store config");
        Self::with_objects(objects).await
    }

    pub async fn with_objects(objects: ObjectStoreConfig) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let upload_dir = temp_dir.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).expect("Failed to create upload directory");

        let database_url = format!("sqlite://{}", temp_dir.path().join("meta/test.db").display());
        let pool = db::connect_to_database(&database_url, 1)
            .await
            .expect("Failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url,
            upload_dir,
            public_base_url: None,
            token_ttl: Duration::from_secs(300),
            objects,
        };

        let state = AppState::new(Arc::new(pool), &config);
        let router = build_app(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Register an admin and return a fresh bearer token.
    pub async fn admin_token(&self) -> String {
        let email = format!("{}@example.com", uuid::Uuid::new_v4());
        self.state
            .auth
            .register(&email, "correct horse", "correct horse")
            .await
            .expect("register admin");
        self.state
            .auth
            .login(&email, "correct horse")
            .await
            .expect("login admin")
    }

    /// Number of files waiting in the spool directory.
    pub fn spooled_files(&self) -> usize {
        std::fs::read_dir(self.state.upload_dir.as_path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
