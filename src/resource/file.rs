//! The single-file resource: PUT, GET/HEAD and DELETE on one identifier.

use crate::errors::{ApiError, ApiResult};
use crate::events::{EventContext, EventManager, ResponseModel};
use crate::models::FileRecord;
use axum::http::HeaderValue;

pub struct FileResource;

impl FileResource {
    /// `content.validate` → `db.record.insert` → `storage.content.insert`
    /// → `response.negotiate` → `response.send`.
    ///
    /// The storage stage picks 201 or 200; the ack echoes the verified
    /// identifier and the mapped extension.
    pub async fn put(manager: &EventManager, cx: &mut EventContext) -> ApiResult<()> {
        manager.trigger("content.validate", cx).await?;
        manager.trigger("db.record.insert", cx).await?;
        manager.trigger("storage.content.insert", cx).await?;

        let content = cx
            .content
            .as_ref()
            .ok_or(ApiError::Internal("put completed without validated content"))?;
        cx.response.model = Some(ResponseModel::Ack(vec![
            ("fileIdentifier", content.checksum.clone()),
            ("extension", content.extension.clone()),
        ]));

        manager.trigger("response.negotiate", cx).await?;
        manager.trigger("response.send", cx).await
    }

    /// `db.record.load` → `storage.content.load` → `response.negotiate` →
    /// `response.send`, seeded with a record carrying only path identity.
    pub async fn get(manager: &EventManager, cx: &mut EventContext) -> ApiResult<()> {
        let identifier = cx
            .file_identifier
            .clone()
            .ok_or(ApiError::InvalidIdentifier)?;

        cx.response.model = Some(ResponseModel::File {
            record: FileRecord::bare(&cx.account, &identifier),
            blob: None,
        });

        manager.trigger("db.record.load", cx).await?;
        manager.trigger("storage.content.load", cx).await?;

        set_original_headers(cx);

        manager.trigger("response.negotiate", cx).await?;
        manager.trigger("response.send", cx).await
    }

    /// `db.record.delete` → `storage.content.delete` → `response.send`.
    ///
    /// The database delete runs first so a storage failure cannot leave
    /// metadata pointing at bytes that are about to disappear; orphaned
    /// bytes after a failed storage delete are left for offline collection.
    pub async fn delete(manager: &EventManager, cx: &mut EventContext) -> ApiResult<()> {
        let identifier = cx
            .file_identifier
            .clone()
            .ok_or(ApiError::InvalidIdentifier)?;

        manager.trigger("db.record.delete", cx).await?;
        manager.trigger("storage.content.delete", cx).await?;

        cx.response.model = Some(ResponseModel::Ack(vec![("fileIdentifier", identifier)]));

        manager.trigger("response.send", cx).await
    }
}

/// Descriptive headers about the stored original, set once the record is
/// loaded.
fn set_original_headers(cx: &mut EventContext) {
    let EventContext { response, .. } = cx;
    if let Some(ResponseModel::File { record, .. }) = &response.model {
        let pairs = [
            ("x-imbo-originalmimetype", record.mime.clone()),
            ("x-imbo-originalfilesize", record.size.to_string()),
            ("x-imbo-originalextension", record.extension.clone()),
        ];
        for (name, value) in pairs {
            if let Ok(value) = HeaderValue::from_str(&value) {
                response.headers.insert(name, value);
            }
        }
    }
}
