//! Metadata CRUD on one existing file record.

use crate::errors::{ApiError, ApiResult};
use crate::events::{EventContext, EventManager, ResponseModel};
use crate::models::Metadata;

pub struct MetadataResource;

impl MetadataResource {
    /// `db.metadata.load` → `response.negotiate` → `response.send`.
    pub async fn get(manager: &EventManager, cx: &mut EventContext) -> ApiResult<()> {
        manager.trigger("db.metadata.load", cx).await?;
        manager.trigger("response.negotiate", cx).await?;
        manager.trigger("response.send", cx).await
    }

    /// Replace the whole metadata set from the request body.
    ///
    /// The body must be a JSON object; anything else is a 400 before any
    /// store is touched.
    pub async fn put(manager: &EventManager, cx: &mut EventContext) -> ApiResult<()> {
        let metadata: Metadata =
            serde_json::from_slice(&cx.body).map_err(|_| ApiError::InvalidMetadata)?;
        cx.metadata_input = Some(metadata);

        manager.trigger("db.metadata.update", cx).await?;

        ack_identifier(cx)?;
        manager.trigger("response.negotiate", cx).await?;
        manager.trigger("response.send", cx).await
    }

    /// Clear the metadata set.
    pub async fn delete(manager: &EventManager, cx: &mut EventContext) -> ApiResult<()> {
        manager.trigger("db.metadata.delete", cx).await?;

        ack_identifier(cx)?;
        manager.trigger("response.negotiate", cx).await?;
        manager.trigger("response.send", cx).await
    }
}

fn ack_identifier(cx: &mut EventContext) -> ApiResult<()> {
    let identifier = cx
        .file_identifier
        .clone()
        .ok_or(ApiError::InvalidIdentifier)?;
    cx.response.model = Some(ResponseModel::Ack(vec![("fileIdentifier", identifier)]));
    Ok(())
}
