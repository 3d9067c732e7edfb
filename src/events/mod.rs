//! Named-event, priority-ordered dispatch.
//!
//! Cross-cutting concerns (validation, persistence, formatting, sending)
//! register as listeners against event names instead of being hard-wired
//! into a call chain. Dispatch within one request is synchronous and
//! sequential; listeners observe each other's effects through the shared
//! mutable context.

pub mod listeners;

use crate::errors::ApiResult;
use crate::format::Format;
use crate::identity::PreparedContent;
use crate::models::{FileListing, FileRecord, Metadata};
use crate::store::Stores;
use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Per-request lifecycle, terminal on `Sent` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Validated,
    Persisted,
    Formatted,
    Sent,
    Failed,
}

/// What the request resolved to, before formatting.
#[derive(Debug, Clone)]
pub enum ResponseModel {
    /// A single file; the blob is attached once storage has loaded it.
    File {
        record: FileRecord,
        blob: Option<Bytes>,
    },
    Listing(FileListing),
    Metadata(Metadata),
    /// Small acknowledgement payload for mutating verbs, in render order.
    Ack(Vec<(&'static str, String)>),
}

/// The response being assembled across listeners.
#[derive(Debug)]
pub struct ResponseDraft {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub model: Option<ResponseModel>,
    pub last_modified: Option<DateTime<Utc>>,
    pub format: Option<Format>,
    /// Rendered body, produced by the send stage.
    pub body: Option<Bytes>,
}

impl Default for ResponseDraft {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            model: None,
            last_modified: None,
            format: None,
            body: None,
        }
    }
}

/// Shared mutable state for one request's pipeline run.
pub struct EventContext {
    pub method: Method,
    pub account: String,
    pub file_identifier: Option<String>,
    pub extension: Option<String>,
    pub params: BTreeMap<String, String>,
    pub accept: Option<String>,
    pub body: Bytes,
    /// Set by the validation stage; persistence stages require it.
    pub content: Option<PreparedContent>,
    /// Parsed metadata body for metadata updates.
    pub metadata_input: Option<Metadata>,
    pub stores: Stores,
    pub response: ResponseDraft,
    pub state: RequestState,
    propagation_stopped: bool,
}

impl EventContext {
    pub fn new(method: Method, account: impl Into<String>, stores: Stores) -> Self {
        Self {
            method,
            account: account.into(),
            file_identifier: None,
            extension: None,
            params: BTreeMap::new(),
            accept: None,
            body: Bytes::new(),
            content: None,
            metadata_input: None,
            stores,
            response: ResponseDraft::default(),
            state: RequestState::Received,
            propagation_stopped: false,
        }
    }

    /// Skip the remaining listeners for the event currently dispatching.
    /// Future events triggered by the controller still run.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn advance(&mut self, state: RequestState) {
        debug!(from = ?self.state, to = ?state, "request state transition");
        self.state = state;
    }
}

/// Restricts a registration to a subset of account keys. A listener outside
/// its filter is skipped as if it were not registered.
#[derive(Debug, Clone)]
pub enum AccountFilter {
    Whitelist(HashSet<String>),
    Blacklist(HashSet<String>),
}

impl AccountFilter {
    pub fn whitelist<I: IntoIterator<Item = S>, S: Into<String>>(accounts: I) -> Self {
        AccountFilter::Whitelist(accounts.into_iter().map(Into::into).collect())
    }

    pub fn blacklist<I: IntoIterator<Item = S>, S: Into<String>>(accounts: I) -> Self {
        AccountFilter::Blacklist(accounts.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, account: &str) -> bool {
        match self {
            AccountFilter::Whitelist(accounts) => accounts.contains(account),
            AccountFilter::Blacklist(accounts) => !accounts.contains(account),
        }
    }
}

/// A pipeline participant. One instance may subscribe to many events; the
/// event name is passed back on invocation so it can demultiplex.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn call(&self, event: &str, cx: &mut EventContext) -> ApiResult<()>;
}

struct Entry {
    priority: i32,
    seq: usize,
    filter: Option<AccountFilter>,
    listener: Arc<dyn Listener>,
}

/// Ordered listener registry. Built once at startup, then shared read-only.
#[derive(Default)]
pub struct EventManager {
    listeners: HashMap<String, Vec<Entry>>,
    seq: usize,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one listener for several events, each with its own
    /// priority. Higher priorities run first; ties run in registration
    /// order; negative priorities run after the built-ins at 0 and 1.
    pub fn subscribe(
        &mut self,
        events: &[(&str, i32)],
        listener: Arc<dyn Listener>,
        filter: Option<AccountFilter>,
    ) {
        for (event, priority) in events {
            let seq = self.seq;
            self.seq += 1;

            let entries = self.listeners.entry((*event).to_string()).or_default();
            entries.push(Entry {
                priority: *priority,
                seq,
                filter: filter.clone(),
                listener: Arc::clone(&listener),
            });
            entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        }
    }

    /// Invoke every listener registered for `event`, highest priority
    /// first. A listener error aborts the rest of this event and
    /// propagates; stop-propagation skips the rest silently.
    pub async fn trigger(&self, event: &str, cx: &mut EventContext) -> ApiResult<()> {
        cx.propagation_stopped = false;

        let Some(entries) = self.listeners.get(event) else {
            debug!(event, "no listeners registered");
            return Ok(());
        };

        for entry in entries {
            if let Some(filter) = &entry.filter {
                if !filter.allows(&cx.account) {
                    continue;
                }
            }

            entry.listener.call(event, cx).await?;

            if cx.propagation_stopped {
                debug!(event, "propagation stopped");
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::disk::DiskBinaryStore;
    use crate::store::sqlite::SqliteMetadataStore;
    use sqlx::sqlite::SqlitePoolOptions;

    /// In-memory SQLite plus a temp-dir blob store, migrated and ready.
    pub async fn stores() -> (Stores, tempfile::TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        for statement in include_str!("../../migrations/0001_init.sql")
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }

        let metadata = Arc::new(SqliteMetadataStore::new(Arc::new(pool)));
        let dir = tempfile::tempdir().unwrap();
        let binary = Arc::new(DiskBinaryStore::new(dir.path()));

        (
            Stores {
                metadata: metadata.clone(),
                short_urls: metadata,
                binary,
            },
            dir,
        )
    }

    pub async fn context(account: &str) -> (EventContext, tempfile::TempDir) {
        let (stores, dir) = stores().await;
        (EventContext::new(Method::GET, account, stores), dir)
    }
}
