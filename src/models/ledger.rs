//! Ledger record tracking a stored object's descriptive fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::object::ObjectMetadata;

/// Side record kept in `object_ledger`, one per live stored object.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    /// Identifier of the stored object this record describes.
    pub file_id: Uuid,

    /// Bucket of the referenced object.
    pub bucket: String,

    #[serde(flatten)]
    #[sqlx(flatten)]
    pub metadata: ObjectMetadata,

    /// When the record was (re)written for its current object.
    pub recorded_at: DateTime<Utc>,
}
