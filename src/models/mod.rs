//! Core data models for the file service.
//!
//! These entities map to database rows via `sqlx::FromRow` and serialize
//! naturally via `serde`; the response formatters control their wire layout.

pub mod file_record;
pub mod listing;
pub mod short_url;

pub use file_record::{FileRecord, Metadata};
pub use listing::FileListing;
pub use short_url::ShortUrlParams;
