//! In-memory store fakes with failure injection.

use crate::{
    models::{file::FileRecord, health::HealthCheck},
    services::{
        metadata_store::{MetadataError, MetadataResult, MetadataStore},
        object_store::{DeleteOutcome, ObjectStore, ObjectStoreError, ObjectStoreResult},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDateTime;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    sync::Mutex,
};

pub const TEST_BUCKET: &str = "test-bucket";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectOp {
    Put,
    Head,
    Delete,
    List,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    failing: Mutex<HashSet<ObjectOp>>,
}

impl MemoryObjectStore {
    /// Make every later call of `op` fail with a permission error.
    pub fn fail_on(&self, op: ObjectOp) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Drop an object without going through the registry.
    pub fn remove_out_of_band(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }

    fn check(&self, op: ObjectOp) -> ObjectStoreResult<()> {
        if self.failing.lock().unwrap().contains(&op) {
            return Err(ObjectStoreError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected {:?} failure", op),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        TEST_BUCKET
    }

    async fn put(&self, key: &str, body: Bytes) -> ObjectStoreResult<()> {
        self.check(ObjectOp::Put)?;
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn head_exists(&self, key: &str) -> ObjectStoreResult<bool> {
        self.check(ObjectOp::Head)?;
        Ok(self.contains(key))
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<DeleteOutcome> {
        self.check(ObjectOp::Delete)?;
        Ok(match self.objects.lock().unwrap().remove(key) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::AlreadyAbsent,
        })
    }

    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>> {
        self.check(ObjectOp::List)?;
        Ok(self.objects.lock().unwrap().keys().cloned().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataOp {
    Save,
    Find,
    Delete,
    Probe,
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    records: Mutex<HashMap<String, FileRecord>>,
    probes: Mutex<Vec<NaiveDateTime>>,
    failing: Mutex<HashSet<MetadataOp>>,
}

impl MemoryMetadataStore {
    pub fn fail_on(&self, op: MetadataOp) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn record(&self, id: &str) -> Option<FileRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.lock().unwrap().len()
    }

    fn check(&self, op: MetadataOp) -> MetadataResult<()> {
        if self.failing.lock().unwrap().contains(&op) {
            return Err(MetadataError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn save(&self, record: &FileRecord) -> MetadataResult<()> {
        self.check(MetadataOp::Save)?;
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.id) {
            return Err(MetadataError::DuplicateId(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> MetadataResult<Option<FileRecord>> {
        self.check(MetadataOp::Find)?;
        Ok(self.record(id))
    }

    async fn delete(&self, record: &FileRecord) -> MetadataResult<()> {
        self.check(MetadataOp::Delete)?;
        self.records.lock().unwrap().remove(&record.id);
        Ok(())
    }

    async fn insert_probe(&self, at: NaiveDateTime) -> MetadataResult<HealthCheck> {
        self.check(MetadataOp::Probe)?;
        let mut probes = self.probes.lock().unwrap();
        probes.push(at);
        Ok(HealthCheck {
            check_id: probes.len() as i64,
            datetime: at,
        })
    }
}
