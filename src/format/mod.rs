//! Response representation: negotiation plus the JSON/XML renderers.

pub mod json;
pub mod xml;

use crate::errors::ApiError;
use crate::events::{EventContext, ResponseModel};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Renderable fields of a listing entry, in output order.
pub const LISTING_FIELDS: &[&str] = &[
    "account",
    "fileIdentifier",
    "checksum",
    "mime",
    "extension",
    "added",
    "updated",
    "size",
    "metadata",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
    Binary,
}

/// Pick the output representation for the drafted response.
///
/// A single-file result is always the raw bytes — structured formatting is
/// bypassed entirely. Otherwise the path extension wins over the Accept
/// header, and JSON is the default.
pub fn negotiate(cx: &EventContext) -> Format {
    if let Some(ResponseModel::File { .. }) = cx.response.model {
        return Format::Binary;
    }

    match cx.extension.as_deref() {
        Some("json") => return Format::Json,
        Some("xml") => return Format::Xml,
        _ => {}
    }

    if let Some(accept) = &cx.accept {
        if accept.contains("application/xml") || accept.contains("text/xml") {
            return Format::Xml;
        }
    }

    Format::Json
}

/// HTTP-date rendering used for timestamps in bodies and headers.
pub fn http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Render a model into (body, content type).
pub fn render(
    model: &ResponseModel,
    format: Format,
    params: &BTreeMap<String, String>,
) -> (Bytes, String) {
    match format {
        Format::Binary => match model {
            ResponseModel::File { record, blob } => {
                let mime = if record.mime.is_empty() {
                    "application/octet-stream".to_string()
                } else {
                    record.mime.clone()
                };
                (blob.clone().unwrap_or_default(), mime)
            }
            // Structured models never negotiate to Binary; render as JSON
            // so a misrouted model still produces a parseable body.
            other => json::render(other, params),
        },
        Format::Json => json::render(model, params),
        Format::Xml => xml::render(model),
    }
}

/// Render an error into (body, content type) for the negotiated format.
/// Binary requests fall back to JSON: an error never has raw content.
pub fn error_body(format: Format, err: &ApiError) -> (Bytes, String) {
    match format {
        Format::Xml => xml::error(err),
        _ => json::error(err),
    }
}

/// Resolve a JSONP callback name from the request parameters.
pub fn jsonp_callback(params: &BTreeMap<String, String>) -> Option<&str> {
    ["callback", "jsonp", "json"]
        .iter()
        .find_map(|name| params.get(*name))
        .map(String::as_str)
}
