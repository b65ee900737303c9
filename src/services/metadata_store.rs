//! Metadata store: file records and health probes in SQLite.

use crate::models::{file::FileRecord, health::HealthCheck};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Schema applied at startup and by `--migrate`.
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("file record `{0}` already exists")]
    DuplicateId(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save(&self, record: &FileRecord) -> MetadataResult<()>;

    /// `Ok(None)` when no record has this id.
    async fn find_by_id(&self, id: &str) -> MetadataResult<Option<FileRecord>>;

    /// Removing a record that is already gone is not an error.
    async fn delete(&self, record: &FileRecord) -> MetadataResult<()>;

    /// Insert a timestamped probe row.
    async fn insert_probe(&self, at: NaiveDateTime) -> MetadataResult<HealthCheck>;
}

#[derive(Clone)]
pub struct SqliteMetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn save(&self, record: &FileRecord) -> MetadataResult<()> {
        let result = sqlx::query(
            "INSERT INTO files (id, file_name, object_key, url, upload_date)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(record.file_name.as_deref())
        .bind(&record.object_key)
        .bind(&record.url)
        .bind(record.upload_date)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(MetadataError::DuplicateId(record.id.clone()))
            }
            Err(err) => Err(MetadataError::Sqlx(err)),
        }
    }

    async fn find_by_id(&self, id: &str) -> MetadataResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT id, file_name, object_key, url, upload_date FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn delete(&self, record: &FileRecord) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(&record.id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            debug!(id = %record.id, "file record already removed");
        }
        Ok(())
    }

    async fn insert_probe(&self, at: NaiveDateTime) -> MetadataResult<HealthCheck> {
        let row = sqlx::query_as::<_, HealthCheck>(
            "INSERT INTO health_check (datetime) VALUES (?) RETURNING check_id, datetime",
        )
        .bind(at)
        .fetch_one(&*self.db)
        .await?;
        Ok(row)
    }
}

/// Apply the embedded schema statement by statement. Idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<usize, sqlx::Error> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for stmt in &statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(statements.len())
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
