//! Short URL aliases for stored files.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use std::collections::BTreeMap;

/// Length of an issued short URL token.
pub const TOKEN_LEN: usize = 7;

/// The tuple a short URL resolves back to.
///
/// Short URLs are weak references: many may point at one file record, and
/// deleting the record cascades over them, but a leftover alias never keeps
/// a record alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortUrlParams {
    pub account: String,
    pub file_identifier: String,
    pub extension: Option<String>,
    /// Query parameters frozen into the alias, normalized by key order.
    pub query: BTreeMap<String, String>,
}

impl ShortUrlParams {
    pub fn new(account: &str, file_identifier: &str) -> Self {
        Self {
            account: account.to_string(),
            file_identifier: file_identifier.to_string(),
            extension: None,
            query: BTreeMap::new(),
        }
    }

    /// Canonical form of the frozen query, used for deterministic lookups.
    pub fn normalized_query(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Parse a normalized query string back into its map form.
    pub fn parse_query(raw: &str) -> BTreeMap<String, String> {
        raw.split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Derive the token for this tuple.
    ///
    /// Deterministic over the tuple so the same alias can be regenerated;
    /// `attempt` salts the derivation when a token collides with one issued
    /// for a different tuple.
    pub fn token(&self, attempt: u32) -> String {
        let seed = format!(
            "{}|{}|{}|{}|{}",
            self.account,
            self.file_identifier,
            self.extension.as_deref().unwrap_or(""),
            self.normalized_query(),
            attempt
        );
        let digest = md5::compute(seed.as_bytes());
        let encoded = URL_SAFE_NO_PAD.encode(digest.0);

        encoded[..TOKEN_LEN].to_string()
    }
}
