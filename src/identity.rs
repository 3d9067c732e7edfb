//! Content identity and admission checks.
//!
//! Pure functions over the uploaded bytes: digest computation, digest
//! verification against the path-asserted identifier, magic-byte mime
//! sniffing and the closed mime-to-extension mapping. No I/O happens here;
//! this stage must pass before either store is touched.

use crate::errors::{ApiError, ApiResult};
use bytes::Bytes;

/// Supported mime types and their canonical extensions.
///
/// The table is closed: content sniffing to a type outside this list is a
/// 415, never a pass-through.
pub const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
    ("application/vnd.rar", "rar"),
    ("application/x-rar-compressed", "rar"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    ("application/vnd.ms-excel", "xls"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
    ("application/vnd.ms-powerpoint", "ppt"),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
    ("text/csv", "csv"),
    ("text/plain", "txt"),
    ("image/gif", "gif"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("video/mp4", "mp4"),
    ("audio/mp4", "mp4"),
];

/// Outcome of a successful admission check. The blob travels with its
/// derived identity so persistence listeners never recompute it.
#[derive(Debug, Clone)]
pub struct PreparedContent {
    pub checksum: String,
    pub mime: String,
    pub extension: String,
    pub size: i64,
    pub blob: Bytes,
}

/// Validates uploaded content and derives its identity.
///
/// Holds the mime table it was constructed with; the table is injected once
/// at startup rather than read as ambient state.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    mime_map: &'static [(&'static str, &'static str)],
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(MIME_EXTENSIONS)
    }
}

impl ContentValidator {
    pub fn new(mime_map: &'static [(&'static str, &'static str)]) -> Self {
        Self { mime_map }
    }

    /// Canonical extension for a mime type, or None when unsupported.
    pub fn extension_for(&self, mime: &str) -> Option<&'static str> {
        self.mime_map
            .iter()
            .find(|(m, _)| *m == mime)
            .map(|(_, ext)| *ext)
    }

    /// Whether an extension appears anywhere in the mapping. Used to vet
    /// extension suffixes on request paths.
    pub fn known_extension(&self, extension: &str) -> bool {
        self.mime_map.iter().any(|(_, ext)| *ext == extension)
    }

    /// Admission gate: digest, verify, sniff, map.
    ///
    /// Runs in a fixed order so the client always sees the earliest failure:
    /// empty body, then digest mismatch, then unsupported type.
    pub fn prepare(&self, blob: Bytes, asserted_identifier: &str) -> ApiResult<PreparedContent> {
        if blob.is_empty() {
            return Err(ApiError::EmptyBody);
        }

        let checksum = format!("{:x}", md5::compute(&blob[..]));

        if checksum != asserted_identifier {
            return Err(ApiError::IdentityMismatch);
        }

        let mime = sniff_mime(&blob);
        let extension = self
            .extension_for(&mime)
            .ok_or_else(|| ApiError::UnsupportedMediaType(mime.clone()))?;

        Ok(PreparedContent {
            checksum,
            mime,
            extension: extension.to_string(),
            size: blob.len() as i64,
            blob,
        })
    }
}

/// Mime type from content inspection, never from client headers.
///
/// Magic-byte detection first; bytes that carry no signature but decode as
/// printable UTF-8 count as plain text.
fn sniff_mime(data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    if looks_textual(data) {
        return "text/plain".to_string();
    }

    "application/octet-stream".to_string()
}

fn looks_textual(data: &[u8]) -> bool {
    match std::str::from_utf8(data) {
        Ok(text) => !text
            .chars()
            .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t'),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
        0x52,
    ];

    fn digest_of(data: &[u8]) -> String {
        format!("{:x}", md5::compute(data))
    }

    #[test]
    fn digest_is_deterministic() {
        let validator = ContentValidator::default();
        let body = Bytes::from_static(b"some stable content");
        let id = digest_of(&body);

        let first = validator.prepare(body.clone(), &id).unwrap();
        let second = validator.prepare(body, &id).unwrap();

        assert_eq!(first.checksum, second.checksum);
        assert_eq!(first.checksum, id);
        assert_eq!(first.checksum.len(), 32);
    }

    #[test]
    fn empty_body_is_rejected_before_digest_comparison() {
        let validator = ContentValidator::default();
        // Even asserting the digest of the empty string does not help.
        let empty_digest = digest_of(b"");

        let err = validator.prepare(Bytes::new(), &empty_digest).unwrap_err();

        assert!(matches!(err, ApiError::EmptyBody));
    }

    #[test]
    fn identifier_mismatch_is_rejected() {
        let validator = ContentValidator::default();

        let err = validator
            .prepare(
                Bytes::from_static(b"hello"),
                "00000000000000000000000000000000",
            )
            .unwrap_err();

        assert!(matches!(err, ApiError::IdentityMismatch));
    }

    #[test]
    fn png_maps_to_png_extension() {
        let validator = ContentValidator::default();
        let body = Bytes::from_static(PNG);
        let id = digest_of(PNG);

        let prepared = validator.prepare(body, &id).unwrap();

        assert_eq!(prepared.mime, "image/png");
        assert_eq!(prepared.extension, "png");
        assert_eq!(prepared.size, PNG.len() as i64);
    }

    #[test]
    fn plain_text_falls_back_to_txt() {
        let validator = ContentValidator::default();
        let body = Bytes::from_static(b"plain old text\nwith two lines\n");
        let id = digest_of(&body);

        let prepared = validator.prepare(body, &id).unwrap();

        assert_eq!(prepared.mime, "text/plain");
        assert_eq!(prepared.extension, "txt");
    }

    #[test]
    fn unidentified_binary_is_unsupported() {
        let validator = ContentValidator::default();
        let body = Bytes::from_static(&[0x00, 0x01, 0x02, 0x03, 0xfe, 0xff, 0x00, 0x10]);
        let id = digest_of(&body);

        let err = validator.prepare(body, &id).unwrap_err();

        assert!(matches!(err, ApiError::UnsupportedMediaType(_)));
    }

    #[test]
    fn known_extension_lookup() {
        let validator = ContentValidator::default();

        assert!(validator.known_extension("pdf"));
        assert!(validator.known_extension("jpg"));
        assert!(!validator.known_extension("exe"));
    }
}
