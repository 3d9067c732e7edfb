//! Adapter contracts for the two backends.
//!
//! The metadata database and the binary blob store fail independently; the
//! pipeline composes them through these traits and owns the compensation
//! logic, so adapters stay free of cross-store knowledge. Implementations
//! must be safe for concurrent use — they are shared across requests behind
//! `Arc` and own their connection pooling.

pub mod disk;
pub mod sqlite;

use crate::models::{FileRecord, Metadata, ShortUrlParams};
use crate::query::FilesQuery;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result of a binary write. The caller turns this into 201 vs 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Bytes did not exist under this key before.
    Created,
    /// Identical content already existed; only the write time was refreshed.
    Touched,
}

/// Failure surfaced by either adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record or blob does not exist.
    #[error("file not found")]
    NotFound,

    /// A metadata predicate shape the adapter cannot translate. Fails fast
    /// instead of silently matching everything.
    #[error("unsupported metadata query: {0}")]
    UnsupportedQuery(String),

    /// The backend rejected the operation or could not be reached.
    #[error("{message}")]
    Backend { message: String, retryable: bool },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend { retryable: true, .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StoreError::unreachable(err.to_string()),
            other => StoreError::backend(other.to_string()),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound,
            io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
                StoreError::unreachable(err.to_string())
            }
            _ => StoreError::backend(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// CRUD and query access to per-account file records and their metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Upsert: a fresh pair inserts a full record; an existing pair only
    /// refreshes the updated timestamp. Idempotent under retry.
    async fn insert_record(
        &self,
        account: &str,
        identifier: &str,
        record: &FileRecord,
    ) -> StoreResult<()>;

    /// Remove the record and the metadata set it owns.
    async fn delete_record(&self, account: &str, identifier: &str) -> StoreResult<()>;

    async fn record_exists(&self, account: &str, identifier: &str) -> StoreResult<bool>;

    /// Not-found is a normal outcome here, expressed as `None`.
    async fn load_record(&self, account: &str, identifier: &str)
    -> StoreResult<Option<FileRecord>>;

    /// Full replace of the metadata set; bumps the record's updated time.
    async fn update_metadata(
        &self,
        account: &str,
        identifier: &str,
        metadata: &Metadata,
    ) -> StoreResult<()>;

    async fn load_metadata(&self, account: &str, identifier: &str) -> StoreResult<Metadata>;

    /// Clear the metadata set; bumps the record's updated time.
    async fn delete_metadata(&self, account: &str, identifier: &str) -> StoreResult<()>;

    /// Records matching the descriptor, ordered and paged per descriptor.
    async fn list_records(&self, account: &str, query: &FilesQuery)
    -> StoreResult<Vec<FileRecord>>;

    /// With an identifier: that record's updated time. Without: the newest
    /// updated time across the account, or the current time when the
    /// account owns no records (never an error, never a sentinel epoch).
    async fn last_modified(
        &self,
        account: &str,
        identifier: Option<&str>,
    ) -> StoreResult<DateTime<Utc>>;

    async fn mime_type(&self, account: &str, identifier: &str) -> StoreResult<String>;
}

/// Short URL records; a separate capability so a minimal backend can skip it.
#[async_trait]
pub trait ShortUrlStore: Send + Sync {
    async fn insert_short_url(&self, short_url_id: &str, params: &ShortUrlParams)
    -> StoreResult<()>;

    /// Deterministic lookup: the id previously issued for exactly this
    /// (identifier, extension, normalized query) tuple, if any.
    async fn short_url_id(&self, params: &ShortUrlParams) -> StoreResult<Option<String>>;

    async fn short_url_params(&self, short_url_id: &str) -> StoreResult<Option<ShortUrlParams>>;

    /// Drop every alias pointing at one file record.
    async fn delete_short_urls(&self, account: &str, identifier: &str) -> StoreResult<()>;
}

/// Raw byte blobs keyed by (account, content identifier).
#[async_trait]
pub trait BinaryStore: Send + Sync {
    /// Write bytes, or refresh the write time when identical content is
    /// already present. The outcome distinction is load-bearing: it picks
    /// the response status.
    async fn store(&self, account: &str, identifier: &str, data: &Bytes)
    -> StoreResult<WriteOutcome>;

    async fn delete(&self, account: &str, identifier: &str) -> StoreResult<()>;

    async fn read(&self, account: &str, identifier: &str) -> StoreResult<Bytes>;

    async fn last_modified(&self, account: &str, identifier: &str)
    -> StoreResult<DateTime<Utc>>;

    /// Never fails; unreadable state counts as absent.
    async fn exists(&self, account: &str, identifier: &str) -> bool;

    /// Best-effort connectivity probe; transport errors collapse to `false`.
    async fn health_check(&self) -> bool;
}

/// The adapter pair handed to every request, plus the short URL capability.
#[derive(Clone)]
pub struct Stores {
    pub metadata: Arc<dyn MetadataStore>,
    pub short_urls: Arc<dyn ShortUrlStore>,
    pub binary: Arc<dyn BinaryStore>,
}
