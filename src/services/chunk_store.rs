//! src/services/chunk_store.rs
//!
//! ChunkStore: durable storage of arbitrary-length payloads in SQLite,
//! split into fixed-size chunks. Each object is one `object_files` row plus
//! `object_chunks` rows numbered from zero. The file row is inserted last, so
//! an object only becomes visible once every chunk has been written.

use crate::models::object::{ObjectMetadata, StoredObject};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut, stream::BoxStream};
use md5::Context;
use sqlx::SqlitePool;
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("chunk {n} of object {file_id} is missing")]
    MissingChunk { file_id: Uuid, n: i64 },
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lazy, finite, non-restartable sequence of an object's chunks in write order.
pub type ChunkStream = BoxStream<'static, StoreResult<Bytes>>;

const FILE_COLUMNS: &str = "id, bucket, filename, length, chunk_size, md5, upload_date, \
                            name, size, content_type, label, url";

#[derive(Clone)]
pub struct ChunkStore {
    /// Shared SQLite connection pool holding both files and chunks.
    db: Arc<SqlitePool>,
}

impl ChunkStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Stream a payload into chunks and finalize it under `path_name`.
    ///
    /// - Buffers at most one chunk of bytes at a time.
    /// - Computes length and MD5 while streaming.
    /// - Inserts the file row only after the last chunk is stored.
    ///
    /// On any failure the chunks written so far are removed best-effort and
    /// the error is returned; no file row is left behind.
    pub async fn write<S>(
        &self,
        bucket: &str,
        path_name: &str,
        stream: S,
        chunk_size: usize,
        metadata: ObjectMetadata,
    ) -> StoreResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        if chunk_size == 0 {
            return Err(StoreError::InvalidChunkSize);
        }

        let id = Uuid::new_v4();
        let (length, md5) = match self.write_chunks(id, stream, chunk_size).await {
            Ok(written) => written,
            Err(err) => {
                self.discard_after_failure(id).await;
                return Err(err);
            }
        };

        let object = StoredObject {
            id,
            bucket: bucket.to_string(),
            filename: path_name.to_string(),
            length,
            chunk_size: chunk_size as i64,
            md5,
            upload_date: Utc::now(),
            metadata,
        };

        let insert_result = sqlx::query(
            r#"
            INSERT INTO object_files (
                id, bucket, filename, length, chunk_size, md5, upload_date,
                name, size, content_type, label, url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(object.id)
        .bind(&object.bucket)
        .bind(&object.filename)
        .bind(object.length)
        .bind(object.chunk_size)
        .bind(&object.md5)
        .bind(object.upload_date)
        .bind(&object.metadata.name)
        .bind(object.metadata.size)
        .bind(&object.metadata.content_type)
        .bind(&object.metadata.label)
        .bind(&object.metadata.url)
        .execute(&*self.db)
        .await;

        match insert_result {
            Ok(_) => {
                debug!(
                    file_id = %object.id,
                    filename = %object.filename,
                    length = object.length,
                    chunks = object.chunk_count(),
                    "stored object"
                );
                Ok(object)
            }
            Err(err) => {
                self.discard_after_failure(id).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    async fn write_chunks<S>(
        &self,
        id: Uuid,
        stream: S,
        chunk_size: usize,
    ) -> StoreResult<(i64, String)>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let mut buffer = BytesMut::with_capacity(chunk_size);
        let mut digest = Context::new();
        let mut length: i64 = 0;
        let mut n: i64 = 0;

        pin_mut!(stream);
        while let Some(piece) = stream.next().await {
            let piece = piece?;
            length += piece.len() as i64;
            digest.consume(&piece);
            buffer.extend_from_slice(&piece);

            while buffer.len() >= chunk_size {
                let chunk = buffer.split_to(chunk_size).freeze();
                self.insert_chunk(id, n, &chunk).await?;
                n += 1;
            }
        }
        if !buffer.is_empty() {
            self.insert_chunk(id, n, &buffer).await?;
        }

        Ok((length, format!("{:x}", digest.compute())))
    }

    async fn insert_chunk(&self, file_id: Uuid, n: i64, data: &[u8]) -> StoreResult<()> {
        sqlx::query("INSERT INTO object_chunks (file_id, n, data, written_at) VALUES (?, ?, ?, ?)")
            .bind(file_id)
            .bind(n)
            .bind(data)
            .bind(Utc::now())
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn discard_after_failure(&self, file_id: Uuid) {
        if let Err(err) = self.discard_chunks(file_id).await {
            warn!(%file_id, error = %err, "could not remove chunks of failed write");
        }
    }

    /// True when a finalized object with this path name exists in `bucket`.
    pub async fn exists(&self, bucket: &str, path_name: &str) -> StoreResult<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM object_files WHERE bucket = ? AND filename = ?)",
        )
        .bind(bucket)
        .bind(path_name)
        .fetch_one(&*self.db)
        .await?;
        Ok(found)
    }

    /// Open an object for streaming by its path name.
    ///
    /// When several objects share a path name the latest upload wins.
    pub async fn read_by_name(
        &self,
        bucket: &str,
        path_name: &str,
    ) -> StoreResult<(StoredObject, ChunkStream)> {
        let object = sqlx::query_as::<_, StoredObject>(&format!(
            "SELECT {FILE_COLUMNS} FROM object_files
             WHERE bucket = ? AND filename = ?
             ORDER BY upload_date DESC, rowid DESC LIMIT 1"
        ))
        .bind(bucket)
        .bind(path_name)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::NotFound(path_name.to_string()))?;

        let chunks = self.chunk_stream(object.id, object.chunk_count());
        Ok((object, chunks))
    }

    /// Each poll fetches one chunk row; nothing is read ahead.
    fn chunk_stream(&self, file_id: Uuid, count: i64) -> ChunkStream {
        let db = self.db.clone();
        futures::stream::try_unfold(0i64, move |n| {
            let db = db.clone();
            async move {
                if n >= count {
                    return Ok(None);
                }
                let data: Vec<u8> = sqlx::query_scalar(
                    "SELECT data FROM object_chunks WHERE file_id = ? AND n = ?",
                )
                .bind(file_id)
                .bind(n)
                .fetch_optional(&*db)
                .await?
                .ok_or(StoreError::MissingChunk { file_id, n })?;
                Ok::<_, StoreError>(Some((Bytes::from(data), n + 1)))
            }
        })
        .boxed()
    }

    pub async fn find_by_id(&self, bucket: &str, id: Uuid) -> StoreResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(&format!(
            "SELECT {FILE_COLUMNS} FROM object_files WHERE bucket = ? AND id = ?"
        ))
        .bind(bucket)
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Rewrite the label embedded in the object's own metadata.
    pub async fn update_label(&self, id: Uuid, label: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE object_files SET label = ? WHERE id = ?")
            .bind(label)
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Remove an object and all of its chunks in one transaction.
    ///
    /// Not idempotent: a second delete returns `NotFound`.
    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query("DELETE FROM object_files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let chunks = sqlx::query("DELETE FROM object_chunks WHERE file_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(file_id = %id, chunks = chunks.rows_affected(), "deleted object");
        Ok(())
    }

    /// All finalized objects in `bucket`, newest upload first.
    pub async fn list(&self, bucket: &str) -> StoreResult<Vec<StoredObject>> {
        let rows = sqlx::query_as::<_, StoredObject>(&format!(
            "SELECT {FILE_COLUMNS} FROM object_files
             WHERE bucket = ?
             ORDER BY upload_date DESC, rowid DESC"
        ))
        .bind(bucket)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Chunk sets with no file row whose newest chunk predates `cutoff`.
    ///
    /// Uploads still in flight write chunks before their file row, so the
    /// cutoff must leave room for the slowest expected upload.
    pub async fn dangling_chunk_sets(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT c.file_id FROM object_chunks c
             WHERE NOT EXISTS (SELECT 1 FROM object_files f WHERE f.id = c.file_id)
             GROUP BY c.file_id
             HAVING MAX(c.written_at) < ?",
        )
        .bind(cutoff)
        .fetch_all(&*self.db)
        .await?;
        Ok(ids)
    }

    /// Delete every chunk belonging to `file_id`, returning how many went.
    pub async fn discard_chunks(&self, file_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM object_chunks WHERE file_id = ?")
            .bind(file_id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
