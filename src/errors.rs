use crate::store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Request-level error taxonomy. Every variant maps to an HTTP status and an
/// application error code that is echoed in the structured error body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// PUT with an empty request body.
    #[error("No file attached")]
    EmptyBody,

    /// The identifier asserted in the path does not match the digest of the
    /// bytes that were actually sent.
    #[error("Hash mismatch")]
    IdentityMismatch,

    /// The sniffed mime type has no entry in the extension table.
    #[error("Unsupported file type: {0}")]
    UnsupportedMediaType(String),

    /// A listing parameter (sort field, metadata predicate shape) that the
    /// query layer refuses rather than silently ignoring.
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Path identifier is not a 32-character lowercase hex string.
    #[error("Invalid file identifier")]
    InvalidIdentifier,

    /// Metadata body is not a JSON object.
    #[error("Invalid metadata")]
    InvalidMetadata,

    #[error("{0}")]
    NotFound(&'static str),

    /// Invariant breach inside the pipeline (e.g. a persistence listener ran
    /// without a validated content attached).
    #[error("{0}")]
    Internal(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::EmptyBody
            | ApiError::IdentityMismatch
            | ApiError::UnsupportedQuery(_)
            | ApiError::InvalidIdentifier
            | ApiError::InvalidMetadata => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(err) => match err {
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::UnsupportedQuery(_) => StatusCode::BAD_REQUEST,
                StoreError::Backend { retryable, .. } => {
                    if *retryable {
                        StatusCode::BAD_GATEWAY
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }
            },
        }
    }

    /// Application-level error code carried in the response body alongside
    /// the HTTP status.
    pub fn error_code(&self) -> u16 {
        match self {
            ApiError::Internal(_) => 100,
            ApiError::EmptyBody => 201,
            ApiError::IdentityMismatch => 202,
            ApiError::UnsupportedMediaType(_) => 203,
            ApiError::UnsupportedQuery(_) => 204,
            ApiError::InvalidIdentifier => 205,
            ApiError::InvalidMetadata => 206,
            ApiError::NotFound(_) => 301,
            ApiError::Store(err) => match err {
                StoreError::NotFound => 301,
                StoreError::UnsupportedQuery(_) => 204,
                StoreError::Backend { retryable: true, .. } => 502,
                StoreError::Backend { .. } => 501,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "date": crate::format::http_date(&Utc::now()),
                "errorCode": self.error_code(),
            }
        }));

        (status, body).into_response()
    }
}
