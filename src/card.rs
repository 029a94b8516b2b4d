// src/card.rs
//! Card model: the normalized content unit the ranking core operates on.
//!
//! Cards come from the ingestion side (Telegram/RSS/Wikipedia fetchers, LLM
//! generation) and are immutable here, except for the transient `similarity`
//! attached during a single ranking call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type CardId = i64;
pub type UserId = i64;

/// Per-user topic interest weights. Absence of a tag implies weight 0.
pub type TopicWeights = HashMap<String, f64>;

/// Where a card originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Telegram,
    Rss,
    Wikipedia,
    Llm,
    /// Forward-compat: anything the store sends that we don't know yet.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::Telegram => "telegram",
            SourceType::Rss => "rss",
            SourceType::Wikipedia => "wikipedia",
            SourceType::Llm => "llm",
            SourceType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Tags as stored: either a proper array or a delimiter-joined string
/// (legacy rows carry things like `"['tech','business']"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagField {
    List(Vec<String>),
    Joined(String),
}

impl Default for TagField {
    fn default() -> Self {
        TagField::List(Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: TagField,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_importance")]
    pub importance_score: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub source_type: SourceType,
    /// Dense embedding, present only when the store was asked for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Transient ranking state; populated on cards emitted by `build_feed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

fn default_importance() -> f64 {
    0.5
}

fn default_active() -> bool {
    true
}

impl Card {
    /// Normalized tag list: trimmed, non-empty, bracket/quote noise removed.
    /// Total over any input shape.
    pub fn clean_tags(&self) -> Vec<String> {
        match &self.tags {
            TagField::List(v) => v
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            TagField::Joined(s) => split_joined_tags(s),
        }
    }
}

/// Split a joined tag string, stripping stray brackets and quotes first.
/// Accepts `"tech,business"` as well as `"['tech','business']"`.
fn split_joined_tags(raw: &str) -> Vec<String> {
    let mut s = raw.trim().to_string();
    for ch in ['[', ']', '"', '\''] {
        s = s.replace(ch, "");
    }
    s.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use chrono::TimeZone;

    /// Minimal card fixture for unit tests.
    pub fn card(id: CardId, tags: &[&str], source: SourceType) -> Card {
        Card {
            id,
            title: format!("card {id}"),
            body: String::new(),
            tags: TagField::List(tags.iter().map(|t| t.to_string()).collect()),
            language: Some("en".into()),
            importance_score: 0.5,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(id),
            is_active: true,
            source_type: source,
            embedding: None,
            similarity: None,
        }
    }
}
