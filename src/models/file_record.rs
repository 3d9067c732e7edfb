//! Represents one stored file within an account namespace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Free-form metadata attached to a file record. Insertion order is
/// preserved end to end (the JSON map is index-backed).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Descriptive record for a stored file.
///
/// Identity is the (account, file_identifier) pair; the identifier doubles
/// as the verified MD5 digest of the stored bytes, so `checksum` always
/// equals `file_identifier` once persisted.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct FileRecord {
    /// Tenant namespace the file belongs to.
    pub account: String,

    /// Hex MD5 digest of the content; the primary lookup key.
    pub file_identifier: String,

    /// Size in bytes.
    pub size: i64,

    /// Digest of the stored bytes. Invariant: equals `file_identifier`.
    pub checksum: String,

    /// Mime type detected from content.
    pub mime: String,

    /// Canonical extension mapped from the mime type.
    pub extension: String,

    /// When the record was first created.
    pub added: DateTime<Utc>,

    /// Last update; bumped on re-upload touches and metadata edits.
    pub updated: DateTime<Utc>,

    /// Attached metadata, populated only when a request asks for it.
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl FileRecord {
    /// A record carrying only path-derived identity. The load pipeline
    /// replaces every other field before the record reaches a formatter.
    pub fn bare(account: &str, file_identifier: &str) -> Self {
        Self {
            account: account.to_string(),
            file_identifier: file_identifier.to_string(),
            size: 0,
            checksum: file_identifier.to_string(),
            mime: String::new(),
            extension: String::new(),
            added: DateTime::UNIX_EPOCH,
            updated: DateTime::UNIX_EPOCH,
            metadata: None,
        }
    }
}
