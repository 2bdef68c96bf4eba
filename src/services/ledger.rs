//! Metadata ledger: the `object_ledger` side table.
//!
//! One record per stored object, keyed by the object's id. The ledger has no
//! invariants of its own; `ObjectService` keeps it in step with the chunk store.

use crate::models::{ledger::LedgerRecord, object::ObjectMetadata};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no ledger record for object {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

const LEDGER_COLUMNS: &str =
    "file_id, bucket, name, size, content_type, label, url, recorded_at";

#[derive(Clone)]
pub struct MetadataLedger {
    db: Arc<SqlitePool>,
}

impl MetadataLedger {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn upsert(
        &self,
        bucket: &str,
        file_id: Uuid,
        metadata: &ObjectMetadata,
    ) -> LedgerResult<LedgerRecord> {
        let record = sqlx::query_as::<_, LedgerRecord>(&format!(
            r#"
            INSERT INTO object_ledger ({LEDGER_COLUMNS})
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                bucket = excluded.bucket,
                name = excluded.name,
                size = excluded.size,
                content_type = excluded.content_type,
                label = excluded.label,
                url = excluded.url,
                recorded_at = excluded.recorded_at
            RETURNING {LEDGER_COLUMNS}
            "#
        ))
        .bind(file_id)
        .bind(bucket)
        .bind(&metadata.name)
        .bind(metadata.size)
        .bind(&metadata.content_type)
        .bind(&metadata.label)
        .bind(&metadata.url)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        Ok(record)
    }

    /// Point the record that described `old_id` at `new_id`, replacing its
    /// fields. Inserts a fresh record when `old_id` had none.
    pub async fn rekey(
        &self,
        bucket: &str,
        old_id: Uuid,
        new_id: Uuid,
        metadata: &ObjectMetadata,
    ) -> LedgerResult<LedgerRecord> {
        let updated = sqlx::query_as::<_, LedgerRecord>(&format!(
            r#"
            UPDATE object_ledger SET
                file_id = ?, name = ?, size = ?, content_type = ?,
                label = ?, url = ?, recorded_at = ?
            WHERE file_id = ?
            RETURNING {LEDGER_COLUMNS}
            "#
        ))
        .bind(new_id)
        .bind(&metadata.name)
        .bind(metadata.size)
        .bind(&metadata.content_type)
        .bind(&metadata.label)
        .bind(&metadata.url)
        .bind(Utc::now())
        .bind(old_id)
        .fetch_optional(&*self.db)
        .await?;

        match updated {
            Some(record) => Ok(record),
            None => {
                tracing::warn!(%old_id, %new_id, "no ledger record to re-key; inserting");
                self.upsert(bucket, new_id, metadata).await
            }
        }
    }

    /// Returns false when no record exists for `file_id`.
    pub async fn update_label(&self, file_id: Uuid, label: &str) -> LedgerResult<bool> {
        let result = sqlx::query("UPDATE object_ledger SET label = ? WHERE file_id = ?")
            .bind(label)
            .bind(file_id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, file_id: Uuid) -> LedgerResult<()> {
        let result = sqlx::query("DELETE FROM object_ledger WHERE file_id = ?")
            .bind(file_id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(file_id));
        }
        Ok(())
    }

    pub async fn find(&self, file_id: Uuid) -> LedgerResult<LedgerRecord> {
        sqlx::query_as::<_, LedgerRecord>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM object_ledger WHERE file_id = ?"
        ))
        .bind(file_id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(LedgerError::NotFound(file_id))
    }

    /// Every record for `bucket`, most recently written first.
    pub async fn list_all(&self, bucket: &str) -> LedgerResult<Vec<LedgerRecord>> {
        let rows = sqlx::query_as::<_, LedgerRecord>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM object_ledger
             WHERE bucket = ?
             ORDER BY recorded_at DESC, rowid DESC"
        ))
        .bind(bucket)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }
}
