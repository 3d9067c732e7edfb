//! Built-in pipeline listeners and the default registration set.

use crate::errors::{ApiError, ApiResult};
use crate::events::{EventContext, EventManager, Listener, RequestState, ResponseModel};
use crate::format;
use crate::identity::ContentValidator;
use crate::models::{FileListing, FileRecord, ShortUrlParams};
use crate::query::FilesQuery;
use crate::store::{BinaryStore, MetadataStore, ShortUrlStore, WriteOutcome};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_TOKEN_ATTEMPTS: u32 = 8;

static SHORT_URL_HEADER: HeaderName = HeaderName::from_static("x-imbo-shorturl");
static FILE_IDENTIFIER_HEADER: HeaderName = HeaderName::from_static("x-imbo-fileidentifier");

/// Wire up the built-in listeners at their canonical priorities.
///
/// Deployments append their own registrations (optionally account-filtered)
/// after this; negative priorities slot in behind the built-ins.
pub fn default_pipeline(validator: Arc<ContentValidator>) -> EventManager {
    let mut manager = EventManager::new();

    manager.subscribe(
        &[("content.validate", 50)],
        Arc::new(ContentPreparation::new(validator)),
        None,
    );
    manager.subscribe(
        &[
            ("db.record.insert", 1),
            ("db.record.delete", 1),
            ("db.record.load", 1),
            ("db.records.load", 1),
            ("db.metadata.load", 1),
            ("db.metadata.update", 1),
            ("db.metadata.delete", 1),
        ],
        Arc::new(DatabaseOperations),
        None,
    );
    manager.subscribe(
        &[
            ("storage.content.insert", 1),
            ("storage.content.load", 1),
            ("storage.content.delete", 1),
        ],
        Arc::new(StorageOperations),
        None,
    );
    manager.subscribe(&[("response.negotiate", 1)], Arc::new(FormatNegotiation), None);
    manager.subscribe(&[("response.send", 0)], Arc::new(ResponseSender), None);
    manager.subscribe(
        &[("storage.content.load", -10), ("db.record.delete", -10)],
        Arc::new(ShortUrls),
        None,
    );

    manager
}

/// Admission gate: digests, verifies and sniffs the uploaded bytes before
/// anything touches a store.
pub struct ContentPreparation {
    validator: Arc<ContentValidator>,
}

impl ContentPreparation {
    pub fn new(validator: Arc<ContentValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait::async_trait]
impl Listener for ContentPreparation {
    async fn call(&self, _event: &str, cx: &mut EventContext) -> ApiResult<()> {
        let asserted = cx
            .file_identifier
            .clone()
            .ok_or(ApiError::InvalidIdentifier)?;

        let prepared = self.validator.prepare(cx.body.clone(), &asserted)?;
        debug!(
            account = %cx.account,
            identifier = %prepared.checksum,
            mime = %prepared.mime,
            "content admitted"
        );

        cx.content = Some(prepared);
        cx.advance(RequestState::Validated);
        Ok(())
    }
}

/// Metadata-database side of every flow.
pub struct DatabaseOperations;

#[async_trait::async_trait]
impl Listener for DatabaseOperations {
    async fn call(&self, event: &str, cx: &mut EventContext) -> ApiResult<()> {
        match event {
            "db.record.insert" => {
                let content = cx
                    .content
                    .as_ref()
                    .ok_or(ApiError::Internal("record insert without validated content"))?;
                let now = Utc::now();
                let record = FileRecord {
                    account: cx.account.clone(),
                    file_identifier: content.checksum.clone(),
                    size: content.size,
                    checksum: content.checksum.clone(),
                    mime: content.mime.clone(),
                    extension: content.extension.clone(),
                    added: now,
                    updated: now,
                    metadata: None,
                };

                cx.stores
                    .metadata
                    .insert_record(&cx.account, &content.checksum, &record)
                    .await?;
            }
            "db.record.delete" => {
                let identifier = require_identifier(cx)?;
                cx.stores
                    .metadata
                    .delete_record(&cx.account, &identifier)
                    .await?;
            }
            "db.record.load" => {
                let identifier = require_identifier(cx)?;
                let record = cx
                    .stores
                    .metadata
                    .load_record(&cx.account, &identifier)
                    .await?
                    .ok_or(ApiError::NotFound("File not found"))?;

                cx.response.last_modified = Some(record.updated);
                cx.response.model = Some(ResponseModel::File { record, blob: None });
            }
            "db.records.load" => {
                let query = FilesQuery::from_params(&cx.params)?;
                let files = cx.stores.metadata.list_records(&cx.account, &query).await?;
                let last_modified = cx.stores.metadata.last_modified(&cx.account, None).await?;

                cx.response.last_modified = Some(last_modified);
                cx.response.model = Some(ResponseModel::Listing(FileListing {
                    files,
                    fields: query.fields.clone(),
                }));
            }
            "db.metadata.load" => {
                let identifier = require_identifier(cx)?;
                if !cx
                    .stores
                    .metadata
                    .record_exists(&cx.account, &identifier)
                    .await?
                {
                    return Err(ApiError::NotFound("File not found"));
                }

                let metadata = cx
                    .stores
                    .metadata
                    .load_metadata(&cx.account, &identifier)
                    .await?;
                let last_modified = cx
                    .stores
                    .metadata
                    .last_modified(&cx.account, Some(&identifier))
                    .await?;

                cx.response.last_modified = Some(last_modified);
                cx.response.model = Some(ResponseModel::Metadata(metadata));
            }
            "db.metadata.update" => {
                let identifier = require_identifier(cx)?;
                let metadata = cx
                    .metadata_input
                    .as_ref()
                    .ok_or(ApiError::InvalidMetadata)?;

                cx.stores
                    .metadata
                    .update_metadata(&cx.account, &identifier, metadata)
                    .await?;
            }
            "db.metadata.delete" => {
                let identifier = require_identifier(cx)?;
                cx.stores
                    .metadata
                    .delete_metadata(&cx.account, &identifier)
                    .await?;
            }
            _ => {}
        }

        Ok(())
    }
}

/// Binary-store side of every flow, including the compensating metadata
/// delete when a fresh insert loses its bytes.
pub struct StorageOperations;

#[async_trait::async_trait]
impl Listener for StorageOperations {
    async fn call(&self, event: &str, cx: &mut EventContext) -> ApiResult<()> {
        match event {
            "storage.content.insert" => {
                let content = cx
                    .content
                    .as_ref()
                    .ok_or(ApiError::Internal("content insert without validated content"))?;

                match cx
                    .stores
                    .binary
                    .store(&cx.account, &content.checksum, &content.blob)
                    .await
                {
                    Ok(outcome) => {
                        cx.response.status = match outcome {
                            WriteOutcome::Created => StatusCode::CREATED,
                            WriteOutcome::Touched => StatusCode::OK,
                        };
                        cx.advance(RequestState::Persisted);
                    }
                    Err(err) => {
                        // The record was inserted one event earlier; take it
                        // back out so no metadata points at absent bytes.
                        warn!(
                            account = %cx.account,
                            identifier = %content.checksum,
                            error = %err,
                            "binary write failed, removing metadata record"
                        );
                        if let Err(cleanup) = cx
                            .stores
                            .metadata
                            .delete_record(&cx.account, &content.checksum)
                            .await
                        {
                            warn!(error = %cleanup, "compensating metadata delete failed");
                        }
                        return Err(err.into());
                    }
                }
            }
            "storage.content.load" => {
                let identifier = require_identifier(cx)?;
                let blob = cx.stores.binary.read(&cx.account, &identifier).await?;
                let last_modified = cx
                    .stores
                    .binary
                    .last_modified(&cx.account, &identifier)
                    .await?;

                cx.response.last_modified = Some(last_modified);
                match &mut cx.response.model {
                    Some(ResponseModel::File { blob: slot, .. }) => *slot = Some(blob),
                    _ => return Err(ApiError::Internal("content load without a file model")),
                }
            }
            "storage.content.delete" => {
                let identifier = require_identifier(cx)?;
                cx.stores.binary.delete(&cx.account, &identifier).await?;
            }
            _ => {}
        }

        Ok(())
    }
}

/// Picks the response representation.
pub struct FormatNegotiation;

#[async_trait::async_trait]
impl Listener for FormatNegotiation {
    async fn call(&self, _event: &str, cx: &mut EventContext) -> ApiResult<()> {
        let format = format::negotiate(cx);
        cx.response.format = Some(format);
        cx.advance(RequestState::Formatted);
        Ok(())
    }
}

/// Renders the model and finalizes headers. Runs last; flows that skip
/// explicit negotiation (DELETE) get the default negotiation here.
pub struct ResponseSender;

#[async_trait::async_trait]
impl Listener for ResponseSender {
    async fn call(&self, _event: &str, cx: &mut EventContext) -> ApiResult<()> {
        let format = match cx.response.format {
            Some(format) => format,
            None => format::negotiate(cx),
        };

        let (body, content_type) = match &cx.response.model {
            Some(model) => format::render(model, format, &cx.params),
            None => (bytes::Bytes::new(), "application/json".to_string()),
        };

        if let Ok(value) = HeaderValue::from_str(&content_type) {
            cx.response.headers.insert(header::CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&body.len().to_string()) {
            cx.response.headers.insert(header::CONTENT_LENGTH, value);
        }

        if let Some(last_modified) = cx.response.last_modified {
            if let Ok(value) = HeaderValue::from_str(&format::http_date(&last_modified)) {
                cx.response.headers.insert(header::LAST_MODIFIED, value);
            }
        }

        // Echo the content identifier: a freshly added file's verified
        // checksum wins over the raw path identifier.
        let identifier = cx
            .content
            .as_ref()
            .map(|content| content.checksum.clone())
            .or_else(|| cx.file_identifier.clone());
        if let Some(identifier) = identifier {
            if let Ok(value) = HeaderValue::from_str(&identifier) {
                cx.response
                    .headers
                    .insert(FILE_IDENTIFIER_HEADER.clone(), value);
            }
        }

        // HEAD keeps every header, including the computed length, but
        // carries no body.
        cx.response.body = if cx.method == axum::http::Method::HEAD {
            Some(bytes::Bytes::new())
        } else {
            Some(body)
        };

        cx.advance(RequestState::Sent);
        Ok(())
    }
}

/// Short URL maintenance: mints/echoes an alias when file content is
/// served, and cascades alias deletion behind record deletion.
pub struct ShortUrls;

impl ShortUrls {
    async fn issue(cx: &EventContext, params: &ShortUrlParams) -> ApiResult<String> {
        let mut last_err = None;

        for attempt in 0..MAX_TOKEN_ATTEMPTS {
            let token = params.token(attempt);
            match cx.stores.short_urls.insert_short_url(&token, params).await {
                Ok(()) => return Ok(token),
                Err(err) => {
                    // Either the tuple was inserted concurrently (reuse the
                    // winner) or the token collided with another tuple
                    // (salt and retry).
                    if let Some(existing) = cx.stores.short_urls.short_url_id(params).await? {
                        return Ok(existing);
                    }
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) => Err(err.into()),
            None => Err(ApiError::Internal("short url issuing exhausted attempts")),
        }
    }
}

#[async_trait::async_trait]
impl Listener for ShortUrls {
    async fn call(&self, event: &str, cx: &mut EventContext) -> ApiResult<()> {
        match event {
            "storage.content.load" => {
                let identifier = require_identifier(cx)?;
                let params = ShortUrlParams {
                    account: cx.account.clone(),
                    file_identifier: identifier,
                    extension: cx.extension.clone(),
                    query: cx.params.clone(),
                };

                let id = match cx.stores.short_urls.short_url_id(&params).await? {
                    Some(id) => id,
                    None => Self::issue(cx, &params).await?,
                };

                if let Ok(value) = HeaderValue::from_str(&format!("/s/{id}")) {
                    cx.response.headers.insert(SHORT_URL_HEADER.clone(), value);
                }
            }
            "db.record.delete" => {
                let identifier = require_identifier(cx)?;
                cx.stores
                    .short_urls
                    .delete_short_urls(&cx.account, &identifier)
                    .await?;
            }
            _ => {}
        }

        Ok(())
    }
}

fn require_identifier(cx: &EventContext) -> ApiResult<String> {
    cx.file_identifier
        .clone()
        .ok_or(ApiError::InvalidIdentifier)
}
