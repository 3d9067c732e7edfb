//! Route table for the file service.
//!
//! ## Structure
//! - **Listing endpoints**
//!   - `GET    /users/{account}/files[.json|.xml]` — filtered, paged listing
//!
//! - **File endpoints**
//!   - `PUT    /users/{account}/files/{identifier}` — ingest content
//!   - `GET    /users/{account}/files/{identifier}[.ext]` — raw content
//!   - `HEAD   /users/{account}/files/{identifier}[.ext]` — headers only
//!   - `DELETE /users/{account}/files/{identifier}` — remove record + bytes
//!
//! - **Metadata endpoints**
//!   - `GET|PUT|DELETE /users/{account}/files/{identifier}/metadata[.json|.xml]`
//!
//! - **Short URLs**
//!   - `GET    /s/{shortUrlId}` — alias resolution to the file GET flow
//!
//! The `{identifier}` capture may carry a known content extension suffix
//! (e.g. `…/{digest}.pdf`); the handlers split and vet it.

use crate::handlers::{
    AppState,
    file_handlers::{
        delete_file, get_file, list_files, list_files_json, list_files_xml, metadata,
        metadata_json, metadata_xml, put_file, resolve_short_url,
    },
    health_handlers::{healthz, readyz},
};
use axum::{
    Router,
    routing::{get, put},
};

/// Build the router for every endpoint. The router carries the shared
/// `AppState` (pipeline, stores, validator) into all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // short URL resolution
        .route("/s/{short_url_id}", get(resolve_short_url))
        // listing
        .route("/users/{account}/files", get(list_files))
        .route("/users/{account}/files.json", get(list_files_json))
        .route("/users/{account}/files.xml", get(list_files_xml))
        // single file
        .route(
            "/users/{account}/files/{identifier}",
            put(put_file).get(get_file).delete(delete_file),
        )
        // metadata
        .route(
            "/users/{account}/files/{identifier}/metadata",
            get(metadata).put(metadata).delete(metadata),
        )
        .route(
            "/users/{account}/files/{identifier}/metadata.json",
            get(metadata_json).put(metadata_json).delete(metadata_json),
        )
        .route(
            "/users/{account}/files/{identifier}/metadata.xml",
            get(metadata_xml).put(metadata_xml).delete(metadata_xml),
        )
}
