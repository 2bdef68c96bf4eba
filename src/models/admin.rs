//! Administrator accounts and their bearer-token sessions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, FromRow, Debug)]
pub struct Admin {
    pub id: Uuid,
    pub email: String,

    /// Argon2 PHC string; never serialized.
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

/// The authenticated caller behind a bearer token.
#[derive(Clone, FromRow, Debug, Serialize)]
pub struct Session {
    pub admin_id: Uuid,
    pub expires_at: DateTime<Utc>,
}
