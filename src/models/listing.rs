//! Result of a file listing query.

use crate::models::FileRecord;
use serde::Serialize;

/// Ordered listing result plus the field projection the formatters apply.
///
/// Record order is the query's sort order; an empty projection means every
/// field (metadata included) is rendered.
#[derive(Serialize, Clone, Debug, Default)]
pub struct FileListing {
    pub files: Vec<FileRecord>,

    /// Requested projection; `None` renders all known fields.
    pub fields: Option<Vec<String>>,
}
