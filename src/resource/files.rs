//! The listing resource: GET/HEAD over an account's files.

use crate::errors::ApiResult;
use crate::events::{EventContext, EventManager};

pub struct FilesResource;

impl FilesResource {
    /// `db.records.load` → `response.negotiate` → `response.send`. The
    /// query descriptor is built from the request parameters inside the
    /// load listener.
    pub async fn get(manager: &EventManager, cx: &mut EventContext) -> ApiResult<()> {
        manager.trigger("db.records.load", cx).await?;
        manager.trigger("response.negotiate", cx).await?;
        manager.trigger("response.send", cx).await
    }
}
