//! Magnet link parsing.
//!
//! Links arrive from a protocol handler, i.e. from untrusted input, so the
//! URI is checked against a strict character whitelist before anything is
//! extracted from it.

use std::fmt;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;

static VALID_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^magnet:\?[a-zA-Z0-9:?&=%\-_.~+]+$").unwrap());

static INFO_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"xt=urn:btih:([a-fA-F0-9]{40}|[a-zA-Z0-9]{32})").unwrap());

static DISPLAY_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"dn=([^&]+)").unwrap());

/// Name used when a link carries no `dn` parameter.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Errors that can occur while parsing a magnet link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MagnetError {
    #[error("Invalid magnet URI format")]
    InvalidUri,

    #[error("Could not extract info hash from magnet URI")]
    MissingHash,
}

/// A validated magnet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// The URI as received, minus surrounding quotes.
    pub uri: String,
    /// Info hash, lowercased.
    pub hash: String,
    /// Decoded display name, or [`UNKNOWN_NAME`].
    pub name: String,
}

impl MagnetLink {
    /// Validate `uri` and extract its hash and display name.
    pub fn parse(uri: &str) -> Result<Self, MagnetError> {
        let uri = uri.trim().trim_matches(|c| c == '"' || c == '\'');
        if !is_valid_uri(uri) {
            return Err(MagnetError::InvalidUri);
        }
        let hash = extract_hash(uri).ok_or(MagnetError::MissingHash)?;
        Ok(Self {
            uri: uri.to_string(),
            hash,
            name: extract_name(uri),
        })
    }

    /// Minimal link for a bare info hash.
    pub fn from_hash(hash: &str) -> Self {
        let hash = hash.to_lowercase();
        Self {
            uri: uri_for_hash(&hash),
            hash,
            name: UNKNOWN_NAME.to_string(),
        }
    }
}

impl fmt::Display for MagnetLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.hash)
    }
}

/// `magnet:?xt=urn:btih:<hash>`
pub fn uri_for_hash(hash: &str) -> String {
    format!("magnet:?xt=urn:btih:{}", hash)
}

/// Whitelist check: `magnet:?` prefix, safe characters only, and an `xt` btih parameter.
pub fn is_valid_uri(uri: &str) -> bool {
    VALID_URI.is_match(uri) && uri.contains("xt=urn:btih:")
}

/// Lowercased info hash (40 hex or 32 base32 characters), if present.
pub fn extract_hash(uri: &str) -> Option<String> {
    INFO_HASH
        .captures(uri)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Decoded `dn` parameter, or [`UNKNOWN_NAME`].
pub fn extract_name(uri: &str) -> String {
    let Some(raw) = DISPLAY_NAME
        .captures(uri)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace('+', " "))
    else {
        return UNKNOWN_NAME.to_string();
    };

    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
    }
}
