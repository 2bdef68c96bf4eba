//! Represents a chunked object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Descriptive metadata embedded alongside a stored object.
///
/// `label` is the only field that may change while the payload stays the same;
/// everything else is replaced together with the payload.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Original file name as sent by the client.
    pub name: String,

    /// Payload size in bytes.
    pub size: i64,

    /// MIME type of the payload.
    #[serde(rename = "type")]
    pub content_type: String,

    /// Free-form user label.
    pub label: String,

    /// Absolute URL the payload can be fetched from.
    pub url: String,
}

/// A finalized object in the chunk store.
///
/// Only the descriptive row lives here; the bytes sit in `object_chunks`,
/// `ceil(length / chunk_size)` rows numbered from zero.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    /// Store-assigned identifier.
    #[serde(rename = "_id")]
    pub id: Uuid,

    /// Bucket (namespace) the object belongs to.
    pub bucket: String,

    /// Generated path name, `{upload millis}-{original name}`.
    pub filename: String,

    /// Total payload length in bytes.
    pub length: i64,

    /// Chunk size the payload was split with.
    pub chunk_size: i64,

    /// Hex MD5 of the full payload.
    pub md5: String,

    /// When the object was finalized.
    pub upload_date: DateTime<Utc>,

    #[sqlx(flatten)]
    pub metadata: ObjectMetadata,
}

impl StoredObject {
    /// Number of chunk rows backing this object.
    pub fn chunk_count(&self) -> i64 {
        if self.length == 0 || self.chunk_size <= 0 {
            0
        } else {
            (self.length + self.chunk_size - 1) / self.chunk_size
        }
    }
}
