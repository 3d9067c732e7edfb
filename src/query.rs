//! Listing query descriptor and the parameter parsing behind it.
//!
//! A `FilesQuery` is built once per listing request and handed to the
//! metadata adapter by value; the adapter translates it into backend SQL and
//! never mutates it.

use crate::errors::{ApiError, ApiResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Sortable record attributes. A closed set: anything else in the `sort`
/// parameter is refused up front rather than passed through to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Added,
    Updated,
    Size,
    Mime,
    Extension,
    Checksum,
    FileIdentifier,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::Added => "added",
            SortField::Updated => "updated",
            SortField::Size => "size",
            SortField::Mime => "mime",
            SortField::Extension => "extension",
            SortField::Checksum => "checksum",
            SortField::FileIdentifier => "identifier",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "added" => Some(SortField::Added),
            "updated" => Some(SortField::Updated),
            "size" => Some(SortField::Size),
            "mime" => Some(SortField::Mime),
            "extension" => Some(SortField::Extension),
            "checksum" => Some(SortField::Checksum),
            "fileIdentifier" => Some(SortField::FileIdentifier),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub descending: bool,
}

impl Default for Sort {
    /// Newest first.
    fn default() -> Self {
        Sort {
            field: SortField::Added,
            descending: true,
        }
    }
}

/// Backend-agnostic description of one listing request.
#[derive(Debug, Clone)]
pub struct FilesQuery {
    /// 1-based page number.
    pub page: u32,

    /// Page size; `None` leaves the choice to the adapter.
    pub limit: Option<u32>,

    /// Whether metadata is loaded into the results and whether the metadata
    /// predicate applies at all.
    pub include_metadata: bool,

    /// Inclusive lower bound on the added timestamp.
    pub from: Option<DateTime<Utc>>,

    /// Inclusive upper bound on the added timestamp.
    pub to: Option<DateTime<Utc>>,

    pub sort: Sort,

    /// Restrict results to these identifiers; empty means no restriction.
    pub identifiers: Vec<String>,

    /// Structured metadata predicate, kept as parsed JSON; the adapter
    /// decides which shapes it can translate.
    pub predicate: Option<serde_json::Value>,

    /// Field projection forwarded to the formatters.
    pub fields: Option<Vec<String>>,
}

impl Default for FilesQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: None,
            include_metadata: false,
            from: None,
            to: None,
            sort: Sort::default(),
            identifiers: Vec::new(),
            predicate: None,
            fields: None,
        }
    }
}

impl FilesQuery {
    /// Build a descriptor from raw request parameters.
    ///
    /// Unknown parameters are ignored. A `query` value that is not valid
    /// JSON is dropped silently; an unknown `sort` field is a hard error.
    /// Numeric parameters that fail to parse fall back to their defaults.
    pub fn from_params(params: &BTreeMap<String, String>) -> ApiResult<Self> {
        let mut query = FilesQuery::default();

        if let Some(page) = params.get("page") {
            if let Ok(page) = page.parse::<u32>() {
                query.page = page.max(1);
            }
        }

        if let Some(limit) = params.get("limit") {
            query.limit = limit.parse::<u32>().ok();
        }

        if let Some(metadata) = params.get("metadata") {
            query.include_metadata = matches!(metadata.as_str(), "1" | "true");
        }

        if let Some(from) = params.get("from") {
            query.from = parse_timestamp(from);
        }

        if let Some(to) = params.get("to") {
            query.to = parse_timestamp(to);
        }

        if let Some(sort) = params.get("sort") {
            query.sort = parse_sort(sort)?;
        }

        if query.include_metadata {
            if let Some(raw) = params.get("query") {
                // Malformed JSON is documented leniency: the predicate is
                // simply omitted.
                if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(raw) {
                    query.predicate = Some(value);
                }
            }
        }

        if let Some(identifiers) = params.get("fileIdentifiers") {
            query.identifiers = parse_csv(identifiers);
        }

        if let Some(fields) = params.get("fields") {
            let fields = parse_csv(fields);
            if !fields.is_empty() {
                query.fields = Some(fields);
            }
        }

        Ok(query)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn parse_sort(raw: &str) -> ApiResult<Sort> {
    let (field, direction) = match raw.split_once(':') {
        Some((field, direction)) => (field, Some(direction)),
        None => (raw, None),
    };

    let field = SortField::parse(field)
        .ok_or_else(|| ApiError::UnsupportedQuery(format!("unknown sort field `{field}`")))?;

    let descending = match direction {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(other) => {
            return Err(ApiError::UnsupportedQuery(format!(
                "unknown sort direction `{other}`"
            )));
        }
    };

    Ok(Sort { field, descending })
}

fn parse_csv(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
