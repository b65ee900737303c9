//! FileRegistry: the file lifecycle across the object store and the
//! metadata store.
//!
//! The two stores share no transaction. Every operation runs a fixed,
//! ordered sequence of steps and stops at the first failure:
//!
//! - create: object put, then metadata save
//! - fetch:  metadata lookup, then object existence check
//! - delete: metadata lookup, object delete, then metadata delete
//!
//! Nothing is rolled back. A metadata save that fails after the object put
//! leaves an orphaned object; this window is logged and counted in
//! `registry.orphaned_objects`, and `list` (which reads the object store)
//! will still show the key. A record is only handed back
//! to callers after its object has been confirmed present.

use crate::{
    models::file::FileRecord,
    services::{
        metadata_store::{MetadataError, MetadataStore},
        object_store::{DeleteOutcome, ObjectStore, ObjectStoreError},
    },
    telemetry::{self, OperationTimer},
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("object store: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    #[error("metadata store: {0}")]
    Metadata(#[from] MetadataError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Clone)]
pub struct FileRegistry {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl FileRegistry {
    pub fn new(objects: Arc<dyn ObjectStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { objects, metadata }
    }

    /// Store `body` and record it under a freshly generated id.
    pub async fn create(
        &self,
        file_name: Option<String>,
        body: Bytes,
    ) -> RegistryResult<FileRecord> {
        let _timer = OperationTimer::api("upload");
        let record = FileRecord::new(
            Uuid::new_v4().to_string(),
            file_name,
            self.objects.bucket(),
            Utc::now().date_naive(),
        );
        info!(
            id = %record.id,
            key = %record.object_key,
            size = body.len(),
            "uploading file to object store"
        );

        let put = {
            let _timer = OperationTimer::store("upload");
            self.objects.put(&record.object_key, body).await
        };
        if let Err(err) = put {
            error!(
                id = %record.id,
                key = %record.object_key,
                error = %err,
                "object upload failed"
            );
            return Err(err.into());
        }

        if let Err(err) = self.metadata.save(&record).await {
            warn!(
                id = %record.id,
                key = %record.object_key,
                error = %err,
                "metadata save failed after object upload; object left orphaned"
            );
            telemetry::record_orphaned_object();
            return Err(err.into());
        }

        info!(id = %record.id, "file saved to object store and metadata store");
        Ok(record)
    }

    /// `Ok(None)` if either the record or its object is missing.
    pub async fn fetch(&self, id: &str) -> RegistryResult<Option<FileRecord>> {
        let _timer = OperationTimer::api("get");
        let Some(record) = self.metadata.find_by_id(id).await? else {
            warn!(id, "file not found in metadata store");
            return Ok(None);
        };

        let head = {
            let _timer = OperationTimer::store("head");
            self.objects.head_exists(&record.object_key).await
        };
        match head {
            Ok(true) => Ok(Some(record)),
            Ok(false) => {
                warn!(id, key = %record.object_key, "file missing in object store");
                Ok(None)
            }
            Err(err) => {
                error!(
                    id,
                    key = %record.object_key,
                    error = %err,
                    "object existence check failed"
                );
                Err(err.into())
            }
        }
    }

    /// Returns whether a record existed. The record is kept if the object
    /// delete fails for any reason other than absence.
    pub async fn delete(&self, id: &str) -> RegistryResult<bool> {
        let _timer = OperationTimer::api("delete");
        let Some(record) = self.metadata.find_by_id(id).await? else {
            warn!(id, "attempted to delete non-existent file");
            return Ok(false);
        };

        let deleted = {
            let _timer = OperationTimer::store("delete");
            self.objects.delete(&record.object_key).await
        };
        match deleted {
            Ok(DeleteOutcome::Deleted) => {
                info!(id, key = %record.object_key, "file deleted from object store");
            }
            Ok(DeleteOutcome::AlreadyAbsent) => {
                warn!(id, key = %record.object_key, "file already absent from object store");
            }
            Err(err) => {
                error!(id, key = %record.object_key, error = %err, "object delete failed");
                return Err(err.into());
            }
        }

        self.metadata.delete(&record).await?;
        info!(id, "file deleted from metadata store");
        Ok(true)
    }

    /// Keys present in the object store, orphans included.
    pub async fn list(&self) -> RegistryResult<Vec<String>> {
        let _timer = OperationTimer::api("list");
        let keys = self.objects.list_keys().await?;
        info!(count = keys.len(), "listed object store keys");
        Ok(keys)
    }
}
