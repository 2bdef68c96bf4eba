//! Admin registration, login and bearer-token sessions.
//!
//! Passwords are stored as Argon2 PHC strings. Tokens are random 32-byte
//! values handed to the client once; only their SHA-256 digest is stored.

use crate::{
    db::is_unique_violation,
    models::admin::{Admin, Session},
};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("admin already exists")]
    AlreadyExists,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidInput(String),
    #[error("missing, invalid or expired token")]
    Unauthorized,
    #[error("token lifetime is out of range")]
    TokenLifetime,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Clone)]
pub struct AuthService {
    db: Arc<SqlitePool>,
    token_ttl: chrono::Duration,
}

impl AuthService {
    pub fn new(db: Arc<SqlitePool>, token_ttl: Duration) -> Self {
        Self {
            db,
            token_ttl: chrono::Duration::from_std(token_ttl).unwrap_or(chrono::Duration::hours(1)),
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> AuthResult<Admin> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput(
                "email and password are required".into(),
            ));
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM admins WHERE email = ?)")
            .bind(email)
            .fetch_one(&*self.db)
            .await?;
        if exists {
            return Err(AuthError::AlreadyExists);
        }
        if password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

        let admin = Admin {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash,
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO admins (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(admin.id)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(admin.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => {
                tracing::info!(admin_id = %admin.id, "registered admin");
                Ok(admin)
            }
            Err(err) if is_unique_violation(&err) => Err(AuthError::AlreadyExists),
            Err(err) => Err(AuthError::Sqlx(err)),
        }
    }

    /// Check credentials and issue a fresh bearer token.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<String> {
        let admin = sqlx::query_as::<_, Admin>(
            "SELECT id, email, password_hash, created_at FROM admins WHERE email = ?",
        )
        .bind(email.trim())
        .fetch_optional(&*self.db)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

        let password = password.to_string();
        let stored = admin.password_hash.clone();
        let matches =
            tokio::task::spawn_blocking(move || verify_password(&password, &stored)).await??;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.token_ttl)
            .ok_or(AuthError::TokenLifetime)?;
        self.prune_sessions(now).await?;

        let token = generate_token();
        sqlx::query(
            "INSERT INTO sessions (token_hash, admin_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(hash_token(&token))
        .bind(admin.id)
        .bind(now)
        .bind(expires_at)
        .execute(&*self.db)
        .await?;

        tracing::info!(admin_id = %admin.id, "admin logged in");
        Ok(token)
    }

    /// Revoke `token`. Returns false when it was unknown or already revoked.
    pub async fn logout(&self, token: &str) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = ? WHERE token_hash = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(hash_token(token))
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop sessions that can no longer authenticate.
    async fn prune_sessions(&self, now: DateTime<Utc>) -> AuthResult<()> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE expires_at <= ? OR revoked_at IS NOT NULL")
                .bind(now)
                .execute(&*self.db)
                .await?;
        if result.rows_affected() > 0 {
            tracing::debug!(pruned = result.rows_affected(), "pruned dead sessions");
        }
        Ok(())
    }

    /// Resolve a bearer token to its live session.
    pub async fn verify(&self, token: &str) -> AuthResult<Session> {
        sqlx::query_as::<_, Session>(
            "SELECT admin_id, expires_at FROM sessions
             WHERE token_hash = ? AND revoked_at IS NULL AND expires_at > ?",
        )
        .bind(hash_token(token))
        .bind(Utc::now())
        .fetch_optional(&*self.db)
        .await?
        .ok_or(AuthError::Unauthorized)
    }
}

fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

fn verify_password(password: &str, stored: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(stored).map_err(|err| AuthError::Hash(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a token for storage lookup.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
