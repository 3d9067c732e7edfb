//! Handlers for the file, listing, metadata and short-URL endpoints.
//!
//! Each handler parses the path identity, builds an `EventContext`, hands
//! control to the matching resource, and converts the finished response
//! draft (or the failure) back into an axum response.

use crate::errors::{ApiError, ApiResult};
use crate::events::{EventContext, RequestState};
use crate::format::{self, Format};
use crate::handlers::AppState;
use crate::identity::ContentValidator;
use crate::resource::{FileResource, FilesResource, MetadataResource};
use crate::store::ShortUrlStore;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, header},
    response::Response,
};
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::debug;

/// `PUT /users/{account}/files/{identifier}`
pub async fn put_file(
    State(state): State<AppState>,
    Path((account, identifier)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut cx = EventContext::new(Method::PUT, account, state.stores.clone());
    cx.params = params;
    cx.accept = accept_header(&headers);
    cx.body = body;

    let result = match parse_file_segment(&identifier, &state.validator) {
        Ok((identifier, extension)) => {
            cx.file_identifier = Some(identifier);
            cx.extension = extension;
            FileResource::put(&state.manager, &mut cx).await
        }
        Err(err) => Err(err),
    };

    finish(cx, result)
}

/// `GET|HEAD /users/{account}/files/{identifier}[.ext]`
pub async fn get_file(
    State(state): State<AppState>,
    Path((account, identifier)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let mut cx = EventContext::new(method, account, state.stores.clone());
    cx.params = params;
    cx.accept = accept_header(&headers);

    let result = match parse_file_segment(&identifier, &state.validator) {
        Ok((identifier, extension)) => {
            cx.file_identifier = Some(identifier);
            cx.extension = extension;
            FileResource::get(&state.manager, &mut cx).await
        }
        Err(err) => Err(err),
    };

    finish(cx, result)
}

/// `DELETE /users/{account}/files/{identifier}`
pub async fn delete_file(
    State(state): State<AppState>,
    Path((account, identifier)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut cx = EventContext::new(Method::DELETE, account, state.stores.clone());
    cx.params = params;
    cx.accept = accept_header(&headers);

    let result = match parse_file_segment(&identifier, &state.validator) {
        Ok((identifier, extension)) => {
            cx.file_identifier = Some(identifier);
            cx.extension = extension;
            FileResource::delete(&state.manager, &mut cx).await
        }
        Err(err) => Err(err),
    };

    finish(cx, result)
}

/// `GET|HEAD /users/{account}/files[.json|.xml]`
pub async fn list_files(
    State(state): State<AppState>,
    Path(account): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    list_files_as(state, account, params, method, headers, None).await
}

pub async fn list_files_json(
    State(state): State<AppState>,
    Path(account): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    list_files_as(state, account, params, method, headers, Some("json")).await
}

pub async fn list_files_xml(
    State(state): State<AppState>,
    Path(account): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    list_files_as(state, account, params, method, headers, Some("xml")).await
}

async fn list_files_as(
    state: AppState,
    account: String,
    params: BTreeMap<String, String>,
    method: Method,
    headers: HeaderMap,
    extension: Option<&str>,
) -> Response {
    let mut cx = EventContext::new(method, account, state.stores.clone());
    cx.params = params;
    cx.accept = accept_header(&headers);
    cx.extension = extension.map(str::to_string);

    let result = FilesResource::get(&state.manager, &mut cx).await;
    finish(cx, result)
}

/// `GET|PUT|DELETE /users/{account}/files/{identifier}/metadata[.json|.xml]`
pub async fn metadata(
    State(state): State<AppState>,
    Path((account, identifier)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    metadata_as(state, account, identifier, params, method, headers, body, None).await
}

pub async fn metadata_json(
    State(state): State<AppState>,
    Path((account, identifier)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    metadata_as(
        state,
        account,
        identifier,
        params,
        method,
        headers,
        body,
        Some("json"),
    )
    .await
}

pub async fn metadata_xml(
    State(state): State<AppState>,
    Path((account, identifier)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    metadata_as(
        state,
        account,
        identifier,
        params,
        method,
        headers,
        body,
        Some("xml"),
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn metadata_as(
    state: AppState,
    account: String,
    identifier: String,
    params: BTreeMap<String, String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
    extension: Option<&str>,
) -> Response {
    let mut cx = EventContext::new(method.clone(), account, state.stores.clone());
    cx.params = params;
    cx.accept = accept_header(&headers);
    cx.body = body;
    cx.extension = extension.map(str::to_string);

    let result = if is_valid_identifier(&identifier) {
        cx.file_identifier = Some(identifier);
        match method {
            Method::PUT => MetadataResource::put(&state.manager, &mut cx).await,
            Method::DELETE => MetadataResource::delete(&state.manager, &mut cx).await,
            _ => MetadataResource::get(&state.manager, &mut cx).await,
        }
    } else {
        Err(ApiError::InvalidIdentifier)
    };

    finish(cx, result)
}

/// `GET|HEAD /s/{shortUrlId}` — resolve an alias and serve the file it
/// points at, with the frozen parameters it was issued for.
pub async fn resolve_short_url(
    State(state): State<AppState>,
    Path(short_url_id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let params = match state.stores.short_urls.short_url_params(&short_url_id).await {
        Ok(Some(params)) => params,
        Ok(None) => {
            let mut cx = EventContext::new(method, "", state.stores.clone());
            cx.accept = accept_header(&headers);
            return finish(cx, Err(ApiError::NotFound("Short URL not found")));
        }
        Err(err) => {
            let mut cx = EventContext::new(method, "", state.stores.clone());
            cx.accept = accept_header(&headers);
            return finish(cx, Err(err.into()));
        }
    };

    let mut cx = EventContext::new(method, params.account, state.stores.clone());
    cx.accept = accept_header(&headers);
    cx.file_identifier = Some(params.file_identifier);
    cx.extension = params.extension;
    cx.params = params.query;

    let result = FileResource::get(&state.manager, &mut cx).await;
    finish(cx, result)
}

/// Split a `{identifier}[.ext]` path segment and vet both halves. An
/// extension outside the mime table means the route cannot exist: 404.
fn parse_file_segment(
    segment: &str,
    validator: &ContentValidator,
) -> ApiResult<(String, Option<String>)> {
    let (identifier, extension) = match segment.split_once('.') {
        Some((identifier, extension)) => (identifier, Some(extension)),
        None => (segment, None),
    };

    if !is_valid_identifier(identifier) {
        return Err(ApiError::InvalidIdentifier);
    }

    if let Some(extension) = extension {
        if !validator.known_extension(extension) {
            return Err(ApiError::NotFound("File not found"));
        }
    }

    Ok((identifier.to_string(), extension.map(str::to_string)))
}

fn is_valid_identifier(identifier: &str) -> bool {
    identifier.len() == 32
        && identifier
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

fn accept_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Convert the finished pipeline context, or a failure, into a response.
fn finish(mut cx: EventContext, result: ApiResult<()>) -> Response {
    match result {
        Ok(()) => {
            let mut response = Response::new(Body::from(cx.response.body.unwrap_or_default()));
            *response.status_mut() = cx.response.status;
            *response.headers_mut() = cx.response.headers;
            response
        }
        Err(err) => {
            cx.advance(RequestState::Failed);
            debug!(error = %err, "request failed");

            // Honor an explicit .json/.xml path choice for the error body.
            let format = match cx.extension.as_deref() {
                Some("xml") => Format::Xml,
                _ => Format::Json,
            };
            let (body, content_type) = format::error_body(format, &err);

            let mut response = Response::new(Body::from(body));
            *response.status_mut() = err.status();
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
    }
}
