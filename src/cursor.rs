// src/cursor.rs
//! Opaque pagination cursor: a small JSON record encoded as URL-safe,
//! padding-stripped base64. Malformed tokens decode to "no cursor" — the
//! caller then falls back to the explicit offset parameter.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which ranking strategy produced the page this cursor continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    Vector,
    Topics,
    Fresh,
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeedMode::Vector => "vector",
            FeedMode::Topics => "topics",
            FeedMode::Fresh => "fresh",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub mode: FeedMode,
    pub offset: usize,
}

/// Encode a cursor as an opaque token.
pub fn encode(cursor: &Cursor) -> String {
    // Serializing a two-field struct of plain types cannot fail.
    let raw = serde_json::to_vec(cursor).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(raw)
}

/// Decode a token. Any failure — empty input, bad base64, wrong shape —
/// yields `None` rather than an error.
pub fn decode(token: &str) -> Option<Cursor> {
    let trimmed = token.trim().trim_end_matches('=');
    if trimmed.is_empty() {
        return None;
    }
    let raw = URL_SAFE_NO_PAD.decode(trimmed.as_bytes()).ok()?;
    serde_json::from_slice(&raw).ok()
}
