//! DiskObjectStore: object payloads on local disk.
//!
//! Objects live at `base_path/{bucket}/{aa}/{bb}/{digest}`, where `digest`
//! is the hex MD5 of `bucket/key` and `aa`/`bb` are its first two bytes.
//! File names therefore have a fixed length whatever the key looks like.
//!
//! Each object file starts with a header carrying the key so listing can
//! recover it: a big-endian `u32` key length, the key bytes, then the
//! payload.

use crate::services::object_store::{
    DeleteOutcome, ObjectStore, ObjectStoreError, ObjectStoreResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

const TMP_PREFIX: &str = ".tmp-";

#[derive(Clone, Debug)]
pub struct DiskObjectStore {
    base_path: PathBuf,
    bucket: String,
}

impl DiskObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
        }
    }

    fn ensure_key_safe(&self, key: &str) -> ObjectStoreResult<()> {
        if key.is_empty() || u32::try_from(key.len()).is_err() {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", self.bucket, key));
        let mut path = self.bucket_root();
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    async fn write_file(&self, tmp_path: &Path, key: &str, body: &[u8]) -> io::Result<()> {
        let mut file = File::create(tmp_path).await?;
        file.write_u32(key.len() as u32).await?;
        file.write_all(key.as_bytes()).await?;
        file.write_all(body).await?;
        file.flush().await?;
        file.sync_all().await
    }

    /// Write the temp file, recreating `dir` once if a concurrent delete
    /// pruned it after `create_dir_all`.
    async fn write_tmp(&self, dir: &Path, key: &str, body: &[u8]) -> io::Result<PathBuf> {
        let tmp_path = dir.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));
        let written = match self.write_file(&tmp_path, key, body).await {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(dir).await?;
                self.write_file(&tmp_path, key, body).await
            }
            other => other,
        };
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        Ok(tmp_path)
    }

    /// Key stored in an object file's header; `None` for foreign files.
    async fn read_key(path: &Path) -> io::Result<Option<String>> {
        let mut file = File::open(path).await?;
        let total = file.metadata().await?.len();
        let len = match file.read_u32().await {
            Ok(len) => u64::from(len),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        };
        if len == 0 || len + 4 > total {
            return Ok(None);
        }
        let mut raw = vec![0; len as usize];
        file.read_exact(&mut raw).await?;
        Ok(String::from_utf8(raw).ok())
    }

    /// Remove empty shard directories up to (not including) the bucket root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.bucket_root();
        let mut current = start.to_path_buf();
        while current.starts_with(&stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    async fn subdirs(path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut entries = match fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(dirs),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Writes to a temp file, fsyncs, then renames into place so readers
    /// never observe a partially written object.
    async fn put(&self, key: &str, body: Bytes) -> ObjectStoreResult<()> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            io::Error::new(ErrorKind::Other, "object path missing parent directory")
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = self.write_tmp(&parent, key, &body).await?;
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }

        debug!(key, path = %file_path.display(), size = body.len(), "wrote object");
        Ok(())
    }

    async fn head_exists(&self, key: &str) -> ObjectStoreResult<bool> {
        self.ensure_key_safe(key)?;
        match fs::metadata(self.object_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<DeleteOutcome> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let outcome = match fs::remove_file(&file_path).await {
            Ok(_) => {
                debug!("removed physical file {}", file_path.display());
                DeleteOutcome::Deleted
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
                DeleteOutcome::AlreadyAbsent
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }

        Ok(outcome)
    }

    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for shard_a in Self::subdirs(&self.bucket_root()).await? {
            for shard_b in Self::subdirs(&shard_a).await? {
                let mut entries = match fs::read_dir(&shard_b).await {
                    Ok(entries) => entries,
                    // pruned by a concurrent delete
                    Err(err) if err.kind() == ErrorKind::NotFound => continue,
                    Err(err) => return Err(err.into()),
                };
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name();
                    if name.to_string_lossy().starts_with(TMP_PREFIX) {
                        continue;
                    }
                    match Self::read_key(&entry.path()).await {
                        Ok(Some(key)) => keys.push(key),
                        Ok(None) => debug!("skipping foreign file {}", entry.path().display()),
                        // deleted between read_dir and open
                        Err(err) if err.kind() == ErrorKind::NotFound => continue,
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
        Ok(keys)
    }
}
