//! Object store abstraction.
//!
//! The registry only needs four blob operations, keyed by an opaque string.
//! Implementations must be safe to share between concurrent requests.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("invalid object store endpoint `{0}`")]
    InvalidEndpoint(String),
    #[error("object store returned {status} for `{key}`")]
    UnexpectedStatus { status: u16, key: String },
    #[error("malformed listing response: {0}")]
    MalformedListing(String),
    #[error("request signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Result of a delete against the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The key did not exist. Deletes are idempotent, so this is a success.
    AlreadyAbsent,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket the store writes into; used to build display locations.
    fn bucket(&self) -> &str;

    /// Write `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Bytes) -> ObjectStoreResult<()>;

    /// Metadata-only existence check. `Ok(false)` means the key is absent.
    async fn head_exists(&self, key: &str) -> ObjectStoreResult<bool>;

    async fn delete(&self, key: &str) -> ObjectStoreResult<DeleteOutcome>;

    /// Every key currently in the bucket, in the store's native order.
    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>>;
}
