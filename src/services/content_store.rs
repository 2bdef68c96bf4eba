//! Generic CRUD over the `documents` table for the content resources.

use crate::models::document::{Document, Resource};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("stored document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ContentResult<T> = Result<T, ContentError>;

#[derive(Clone)]
pub struct ContentStore {
    db: Arc<SqlitePool>,
}

impl ContentStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn create<R: Resource>(&self, body: R) -> ContentResult<Document<R>> {
        body.check().map_err(ContentError::Invalid)?;
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO documents (id, collection, body, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(R::COLLECTION)
            .bind(serde_json::to_string(&body)?)
            .bind(Utc::now())
            .execute(&*self.db)
            .await?;
        Ok(Document { id, body })
    }

    /// Every document of the collection in insertion order.
    pub async fn list<R: Resource>(&self) -> ContentResult<Vec<Document<R>>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, body FROM documents WHERE collection = ? ORDER BY created_at, rowid",
        )
        .bind(R::COLLECTION)
        .fetch_all(&*self.db)
        .await?;

        rows.into_iter()
            .map(|(id, body)| {
                Ok(Document {
                    id,
                    body: serde_json::from_str(&body)?,
                })
            })
            .collect()
    }

    /// Apply `patch` to the stored document. `None` when the id is unknown.
    pub async fn update<R: Resource>(
        &self,
        id: Uuid,
        patch: R::Patch,
    ) -> ContentResult<Option<Document<R>>> {
        let mut tx = self.db.begin().await?;

        let stored: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? AND id = ?")
                .bind(R::COLLECTION)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(stored) = stored else {
            return Ok(None);
        };

        let mut body: R = serde_json::from_str(&stored)?;
        body.apply(patch);
        body.check().map_err(ContentError::Invalid)?;

        sqlx::query("UPDATE documents SET body = ? WHERE collection = ? AND id = ?")
            .bind(serde_json::to_string(&body)?)
            .bind(R::COLLECTION)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(Document { id, body }))
    }

    /// Returns false when the id is unknown.
    pub async fn delete<R: Resource>(&self, id: Uuid) -> ContentResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(R::COLLECTION)
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
