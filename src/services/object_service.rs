//! src/services/object_service.rs
//!
//! ObjectService: upload, replace, relabel, delete, fetch and list for one
//! mounted bucket. It is the only writer of both the chunk store and the
//! metadata ledger. The two are separate writes with no shared transaction:
//!
//! - upload writes the object, then the ledger record; if the ledger write
//!   fails the object is deleted again.
//! - replace deletes the old object before writing the new one and does not
//!   roll back if the new write fails.
//! - anything left half-done is found by `find_orphans` and removed by
//!   `reconcile`.

use crate::{
    config::ObjectStoreConfig,
    models::{
        ledger::LedgerRecord,
        object::{ObjectMetadata, StoredObject},
        upload::UploadedFile,
    },
    services::{
        chunk_store::{ChunkStore, ChunkStream, StoreError},
        ledger::{LedgerError, MetadataLedger},
    },
    validation::{FileValidator, ValidationError},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{collections::HashSet, io, sync::Arc};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Read size used when streaming a spooled upload into the chunk store.
const SPOOL_READ_BUFFER: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("object store failure: {0}")]
    Store(StoreError),
    #[error("ledger failure: {0}")]
    Ledger(LedgerError),
    #[error("reading spooled upload: {0}")]
    Io(#[from] io::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            other => ServiceError::Store(other),
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => ServiceError::NotFound(id.to_string()),
            other => ServiceError::Ledger(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Store objects and ledger records that no longer have a partner.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrphanReport {
    pub objects_without_record: Vec<Uuid>,
    pub records_without_object: Vec<Uuid>,
    pub dangling_chunk_sets: Vec<Uuid>,
}

impl OrphanReport {
    pub fn is_empty(&self) -> bool {
        self.objects_without_record.is_empty()
            && self.records_without_object.is_empty()
            && self.dangling_chunk_sets.is_empty()
    }
}

#[derive(Clone)]
pub struct ObjectService {
    store: ChunkStore,
    ledger: MetadataLedger,
    validator: FileValidator,
    config: Arc<ObjectStoreConfig>,
}

impl ObjectService {
    pub fn new(db: Arc<SqlitePool>, config: ObjectStoreConfig) -> Self {
        let validator = FileValidator::new(
            config.allowed_extensions.iter().cloned(),
            config.max_file_size_bytes,
            config.max_file_size.clone(),
            config.max_label_len,
        );
        Self {
            store: ChunkStore::new(db.clone()),
            ledger: MetadataLedger::new(db),
            validator,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    pub fn validator(&self) -> &FileValidator {
        &self.validator
    }

    fn bucket(&self) -> &str {
        &self.config.bucket_name
    }

    /// Store a new object and its ledger record.
    ///
    /// `origin` is the scheme + authority used to build the retrieval URL.
    pub async fn upload(
        &self,
        file: UploadedFile,
        label: &str,
        origin: &str,
    ) -> ServiceResult<StoredObject> {
        self.validator.validate(&file)?;
        self.validator.validate_label(label)?;

        let path_name = generate_path_name(&file.name);
        let metadata = self.metadata_for(&file, label, origin, &path_name);
        let object = self.write_payload(&file, &path_name, metadata).await?;

        if let Err(err) = self
            .ledger
            .upsert(self.bucket(), object.id, &object.metadata)
            .await
        {
            error!(file_id = %object.id, error = %err, "ledger write failed; removing stored object");
            if let Err(cleanup) = self.store.delete(object.id).await {
                warn!(file_id = %object.id, error = %cleanup, "compensating delete failed; object is orphaned");
            }
            return Err(err.into());
        }

        info!(
            bucket = self.bucket(),
            file_id = %object.id,
            filename = %object.filename,
            size = object.length,
            "uploaded object"
        );
        Ok(object)
    }

    /// Swap the payload of `id` for `file`, keeping the current label.
    ///
    /// The label submitted with the request is length-checked and otherwise
    /// ignored. Returns the new object, which has a new id and path name.
    pub async fn replace(
        &self,
        id: Uuid,
        file: UploadedFile,
        submitted_label: &str,
        origin: &str,
    ) -> ServiceResult<StoredObject> {
        self.validator.validate(&file)?;
        self.validator.validate_label(submitted_label)?;

        let existing = self.store.find_by_id(self.bucket(), id).await?;
        let label = existing.metadata.label.clone();

        self.store.delete(existing.id).await?;

        let path_name = generate_path_name(&file.name);
        let metadata = self.metadata_for(&file, &label, origin, &path_name);
        let object = match self.write_payload(&file, &path_name, metadata).await {
            Ok(object) => object,
            Err(err) => {
                error!(
                    old_file_id = %existing.id,
                    error = %err,
                    "previous payload already deleted and replacement write failed; object lost"
                );
                return Err(err);
            }
        };

        self.ledger
            .rekey(self.bucket(), existing.id, object.id, &object.metadata)
            .await?;

        info!(
            old_file_id = %existing.id,
            file_id = %object.id,
            filename = %object.filename,
            "replaced object payload"
        );
        Ok(object)
    }

    /// Change the label of `id`. An absent or empty label keeps the current one.
    pub async fn relabel(&self, id: Uuid, label: Option<&str>) -> ServiceResult<ObjectMetadata> {
        let existing = self.store.find_by_id(self.bucket(), id).await?;

        let requested = label.filter(|l| !l.is_empty());
        if let Some(label) = requested {
            self.validator.validate_label(label)?;
        }
        let merged = requested
            .map(str::to_string)
            .unwrap_or_else(|| existing.metadata.label.clone());

        self.store.update_label(id, &merged).await?;
        if !self.ledger.update_label(id, &merged).await? {
            warn!(file_id = %id, "relabelled object has no ledger record");
        }

        Ok(ObjectMetadata {
            label: merged,
            ..existing.metadata
        })
    }

    /// Delete an object and then its ledger record.
    ///
    /// A ledger failure after the object is gone is logged, not returned.
    pub async fn delete(&self, id: Uuid) -> ServiceResult<StoredObject> {
        let existing = self.store.find_by_id(self.bucket(), id).await?;
        self.store.delete(id).await?;

        match self.ledger.delete(id).await {
            Ok(()) => {}
            Err(LedgerError::NotFound(_)) => {
                warn!(file_id = %id, "deleted object had no ledger record");
            }
            Err(err) => {
                error!(file_id = %id, error = %err, "object deleted but ledger record remains");
            }
        }

        info!(file_id = %id, filename = %existing.filename, "deleted object");
        Ok(existing)
    }

    pub async fn fetch(&self, path_name: &str) -> ServiceResult<(StoredObject, ChunkStream)> {
        Ok(self.store.read_by_name(self.bucket(), path_name).await?)
    }

    /// Stored objects, newest upload first.
    pub async fn list(&self) -> ServiceResult<Vec<StoredObject>> {
        Ok(self.store.list(self.bucket()).await?)
    }

    /// Ledger records, newest first.
    pub async fn ledger_records(&self) -> ServiceResult<Vec<LedgerRecord>> {
        Ok(self.ledger.list_all(self.bucket()).await?)
    }

    /// Report partial-failure leftovers older than the configured grace period.
    pub async fn find_orphans(&self) -> ServiceResult<OrphanReport> {
        let cutoff = self.orphan_cutoff();
        let objects = self.store.list(self.bucket()).await?;
        let records = self.ledger.list_all(self.bucket()).await?;

        let object_ids: HashSet<Uuid> = objects.iter().map(|o| o.id).collect();
        let record_ids: HashSet<Uuid> = records.iter().map(|r| r.file_id).collect();

        Ok(OrphanReport {
            objects_without_record: objects
                .iter()
                .filter(|o| !record_ids.contains(&o.id) && o.upload_date < cutoff)
                .map(|o| o.id)
                .collect(),
            records_without_object: records
                .iter()
                .filter(|r| !object_ids.contains(&r.file_id) && r.recorded_at < cutoff)
                .map(|r| r.file_id)
                .collect(),
            dangling_chunk_sets: self.store.dangling_chunk_sets(cutoff).await?,
        })
    }

    /// Remove everything `find_orphans` reports and return what was removed.
    pub async fn reconcile(&self) -> ServiceResult<OrphanReport> {
        let report = self.find_orphans().await?;

        for id in &report.objects_without_record {
            match self.store.delete(*id).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        for id in &report.records_without_object {
            match self.ledger.delete(*id).await {
                Ok(()) | Err(LedgerError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        for id in &report.dangling_chunk_sets {
            self.store.discard_chunks(*id).await?;
        }

        if !report.is_empty() {
            info!(
                objects = report.objects_without_record.len(),
                records = report.records_without_object.len(),
                chunk_sets = report.dangling_chunk_sets.len(),
                "reconciled orphans"
            );
        }
        Ok(report)
    }

    fn orphan_cutoff(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.orphan_grace)
            .ok()
            .and_then(|grace| Utc::now().checked_sub_signed(grace))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn metadata_for(
        &self,
        file: &UploadedFile,
        label: &str,
        origin: &str,
        path_name: &str,
    ) -> ObjectMetadata {
        ObjectMetadata {
            name: file.name.clone(),
            size: file.size_bytes as i64,
            content_type: file.mime_type.clone(),
            label: label.to_string(),
            url: format!(
                "{}{}/{}",
                origin.trim_end_matches('/'),
                self.config.route_prefix,
                path_name
            ),
        }
    }

    async fn write_payload(
        &self,
        file: &UploadedFile,
        path_name: &str,
        metadata: ObjectMetadata,
    ) -> ServiceResult<StoredObject> {
        let reader = file.open().await?;
        let stream = ReaderStream::with_capacity(reader, SPOOL_READ_BUFFER);
        let object = self
            .store
            .write(
                self.bucket(),
                path_name,
                stream,
                self.config.chunk_size_bytes,
                metadata,
            )
            .await?;
        Ok(object)
    }
}

/// `{upload millis}-{file name}`, with any client-side directories dropped.
pub fn generate_path_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(file_name);
    format!("{}-{}", Utc::now().timestamp_millis(), base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use bytes::Bytes;
    use futures::{TryStreamExt, stream};
    use std::time::Duration;

    const CHUNK: usize = 1024 * 1024;

    struct Harness {
        service: ObjectService,
        db: Arc<SqlitePool>,
        dir: tempfile::TempDir,
    }

    async fn harness(config: ObjectStoreConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("objects.db").display());
        let pool = Arc::new(db::connect_to_database(&url, 1).await.unwrap());
        db::run_migrations(&pool).await.unwrap();
        Harness {
            service: ObjectService::new(pool.clone(), config),
            db: pool,
            dir,
        }
    }

    impl Harness {
        async fn file(&self, name: &str, data: &[u8]) -> UploadedFile {
            let body = stream::iter(vec![Ok(Bytes::copy_from_slice(data))]);
            UploadedFile::spool(self.dir.path(), name, None, body, u64::MAX)
                .await
                .unwrap()
        }

        async fn fetch_bytes(&self, path_name: &str) -> Vec<u8> {
            let (_, chunks) = self.service.fetch(path_name).await.unwrap();
            let parts: Vec<Bytes> = chunks.try_collect().await.unwrap();
            parts.concat()
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[tokio::test]
    async fn upload_photo_scenario() {
        let h = harness(ObjectStoreConfig::default()).await;
        let data = payload(2 * CHUNK);

        let object = h
            .service
            .upload(h.file("photo.png", &data).await, "cover", "http://localhost:5000")
            .await
            .unwrap();

        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM object_chunks WHERE file_id = ?")
            .bind(object.id)
            .fetch_one(&*h.db)
            .await
            .unwrap();
        assert_eq!(chunks, 2);

        let records = h.service.ledger_records().await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.file_id, object.id);
        assert_eq!(record.metadata.label, "cover");
        assert_eq!(record.metadata.size, 2_097_152);
        assert_eq!(record.metadata.content_type, "image/png");
        assert_eq!(
            record.metadata.url,
            format!("http://localhost:5000/image/{}", object.filename)
        );

        assert!(object.filename.ends_with("-photo.png"));
        assert_eq!(h.fetch_bytes(&object.filename).await, data);
    }

    #[tokio::test]
    async fn invalid_uploads_never_touch_storage() {
        let h = harness(ObjectStoreConfig::new("image", "/image", "10B", 4, 5).unwrap()).await;

        let err = h
            .service
            .upload(h.file("doc.pdf", b"x").await, "", "http://h")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(ValidationError::UnsupportedExtension { .. })));

        let err = h
            .service
            .upload(h.file("big.png", &payload(11)).await, "", "http://h")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(ValidationError::FileTooLarge { .. })));

        let err = h
            .service
            .upload(h.file("a.png", b"x").await, "too long", "http://h")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(ValidationError::LabelTooLong { max: 5 })));

        assert!(h.service.list().await.unwrap().is_empty());
        assert!(h.service.ledger_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_keeps_previous_label() {
        let h = harness(ObjectStoreConfig::new("image", "/image", "5MB", 8, 500).unwrap()).await;
        let old = h
            .service
            .upload(h.file("old.png", b"old bytes").await, "original", "http://h")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2)).await;
        let new = h
            .service
            .replace(old.id, h.file("new.jpg", b"brand new bytes").await, "ignored", "http://h")
            .await
            .unwrap();

        assert_ne!(new.id, old.id);
        assert_eq!(new.metadata.label, "original");
        assert_eq!(new.metadata.content_type, "image/jpeg");
        assert_eq!(h.fetch_bytes(&new.filename).await, b"brand new bytes");
        assert!(matches!(
            h.service.fetch(&old.filename).await,
            Err(ServiceError::NotFound(_))
        ));

        let records = h.service.ledger_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_id, new.id);
        assert_eq!(records[0].metadata.label, "original");
        assert_eq!(records[0].metadata.name, "new.jpg");
    }

    #[tokio::test]
    async fn replace_unknown_id_is_not_found() {
        let h = harness(ObjectStoreConfig::default()).await;
        let err = h
            .service
            .replace(Uuid::new_v4(), h.file("a.png", b"x").await, "", "http://h")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn relabel_merges_with_existing_label() {
        let h = harness(ObjectStoreConfig::default()).await;
        let object = h
            .service
            .upload(h.file("a.png", b"abc").await, "first", "http://h")
            .await
            .unwrap();

        let meta = h.service.relabel(object.id, Some("second")).await.unwrap();
        assert_eq!(meta.label, "second");

        for keep in [None, Some("")] {
            let meta = h.service.relabel(object.id, keep).await.unwrap();
            assert_eq!(meta.label, "second");
        }

        let stored = h.service.list().await.unwrap();
        assert_eq!(stored[0].metadata.label, "second");
        let records = h.service.ledger_records().await.unwrap();
        assert_eq!(records[0].metadata.label, "second");

        assert!(matches!(
            h.service.relabel(Uuid::new_v4(), Some("x")).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_twice_is_not_found() {
        let h = harness(ObjectStoreConfig::default()).await;
        let object = h
            .service
            .upload(h.file("a.png", b"abc").await, "", "http://h")
            .await
            .unwrap();

        let deleted = h.service.delete(object.id).await.unwrap();
        assert_eq!(deleted.id, object.id);
        assert!(matches!(
            h.service.fetch(&object.filename).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(h.service.ledger_records().await.unwrap().is_empty());
        assert!(matches!(
            h.service.delete(object.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ledger_failure_removes_the_uploaded_object() {
        let h = harness(ObjectStoreConfig::default()).await;
        sqlx::query("DROP TABLE object_ledger")
            .execute(&*h.db)
            .await
            .unwrap();

        let err = h
            .service
            .upload(h.file("a.png", b"abc").await, "", "http://h")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Ledger(_)));
        assert!(h.service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_succeeds_when_the_ledger_is_unavailable() {
        let h = harness(ObjectStoreConfig::default()).await;
        let object = h
            .service
            .upload(h.file("a.png", b"abc").await, "", "http://h")
            .await
            .unwrap();
        sqlx::query("DROP TABLE object_ledger")
            .execute(&*h.db)
            .await
            .unwrap();

        let deleted = h.service.delete(object.id).await.unwrap();
        assert_eq!(deleted.id, object.id);
        assert!(matches!(
            h.service.fetch(&object.filename).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_replacement_write_leaves_a_dangling_record() {
        let mut config = ObjectStoreConfig::default();
        config.orphan_grace = Duration::ZERO;
        let h = harness(config).await;
        let old = h
            .service
            .upload(h.file("old.png", b"old bytes").await, "keep", "http://h")
            .await
            .unwrap();

        // deletes still work, new chunks cannot be stored
        sqlx::query(
            "CREATE TRIGGER block_chunk_writes BEFORE INSERT ON object_chunks \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(&*h.db)
        .await
        .unwrap();

        let err = h
            .service
            .replace(old.id, h.file("new.png", b"new bytes").await, "", "http://h")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)), "{err}");

        assert!(matches!(
            h.service.fetch(&old.filename).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(h.service.list().await.unwrap().is_empty());
        let records = h.service.ledger_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_id, old.id);
        assert_eq!(records[0].metadata.label, "keep");

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = h.service.find_orphans().await.unwrap();
        assert_eq!(report.records_without_object, vec![old.id]);
        assert!(report.objects_without_record.is_empty());
    }

    #[tokio::test]
    async fn reconcile_removes_aged_orphans_only() {
        let mut config = ObjectStoreConfig::default();
        config.orphan_grace = Duration::ZERO;
        let h = harness(config).await;

        let kept = h
            .service
            .upload(h.file("kept.png", b"k").await, "", "http://h")
            .await
            .unwrap();
        let orphan = h
            .service
            .upload(h.file("orphan.png", b"o").await, "", "http://h")
            .await
            .unwrap();
        sqlx::query("DELETE FROM object_ledger WHERE file_id = ?")
            .bind(orphan.id)
            .execute(&*h.db)
            .await
            .unwrap();
        let ghost = Uuid::new_v4();
        h.service
            .ledger
            .upsert("image", ghost, &kept.metadata)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let report = h.service.reconcile().await.unwrap();
        assert_eq!(report.objects_without_record, vec![orphan.id]);
        assert_eq!(report.records_without_object, vec![ghost]);

        let remaining: Vec<Uuid> = h.service.list().await.unwrap().iter().map(|o| o.id).collect();
        assert_eq!(remaining, vec![kept.id]);
        assert!(h.service.find_orphans().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_orphans_are_left_alone() {
        let h = harness(ObjectStoreConfig::default()).await;
        let object = h
            .service
            .upload(h.file("a.png", b"abc").await, "", "http://h")
            .await
            .unwrap();
        sqlx::query("DELETE FROM object_ledger")
            .execute(&*h.db)
            .await
            .unwrap();

        assert!(h.service.find_orphans().await.unwrap().is_empty());
        assert!(h.service.reconcile().await.unwrap().is_empty());
        assert_eq!(h.service.list().await.unwrap()[0].id, object.id);
    }

    #[test]
    fn path_name_drops_client_directories() {
        let name = generate_path_name("C:\\Users\\me\\cat.png");
        assert!(name.ends_with("-cat.png"));
        let (millis, rest) = name.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(rest, "cat.png");
        assert!(generate_path_name("dir/sub/dog.gif").ends_with("-dog.gif"));
    }
}
