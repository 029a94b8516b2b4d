// src/config.rs
//! Feed configuration: retrieval windows and pool sizes, loaded from TOML
//! with env overrides. Falls back to compiled defaults on any load error.
//!
//! The ranking constants themselves (0.3 max-weight bonus, 80/20 blend
//! split, 5x oversizing) are fixed design constants and deliberately NOT
//! configurable here.

use serde::Deserialize;
use std::{fs, path::Path};

pub const DEFAULT_FEED_CONFIG_PATH: &str = "config/feed.toml";
pub const ENV_FEED_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const ENV_FEED_CARDS_LIMIT: &str = "FEED_CARDS_LIMIT";
pub const ENV_FEED_FRESH_HOURS: &str = "FEED_FRESH_HOURS";

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Page size when the request doesn't specify one.
    #[serde(default = "d_default_limit")]
    pub default_limit: usize,
    /// Hard cap on requested page size.
    #[serde(default = "d_max_limit")]
    pub max_limit: usize,
    /// Vector-arm pool size pulled from similarity search.
    #[serde(default = "d_vector_candidates")]
    pub vector_candidates: usize,
    /// Age window for the vector arm (90 days).
    #[serde(default = "d_vector_max_age_hours")]
    pub vector_max_age_hours: i64,
    /// Fresh-arm pool size.
    #[serde(default = "d_fresh_candidates")]
    pub fresh_candidates: usize,
    /// Age window for the fresh arm.
    #[serde(default = "d_fresh_hours")]
    pub fresh_hours: i64,
    /// Lookback for positive interactions feeding the cold-start embedding.
    #[serde(default = "d_positive_days")]
    pub positive_days: i64,
    #[serde(default = "d_positive_limit")]
    pub positive_limit: usize,
    /// Below this many positive interactions no embedding is built.
    #[serde(default = "d_min_interactions")]
    pub min_interactions: usize,
    /// Max consecutive cards sharing a source type.
    #[serde(default = "d_max_source_run")]
    pub max_source_run: usize,
    /// Model tag recorded alongside derived user embeddings.
    #[serde(default = "d_embedding_model_tag")]
    pub embedding_model_tag: String,
}

fn d_default_limit() -> usize {
    20
}
fn d_max_limit() -> usize {
    50
}
fn d_vector_candidates() -> usize {
    250
}
fn d_vector_max_age_hours() -> i64 {
    2160
}
fn d_fresh_candidates() -> usize {
    200
}
fn d_fresh_hours() -> i64 {
    48
}
fn d_positive_days() -> i64 {
    14
}
fn d_positive_limit() -> usize {
    200
}
fn d_min_interactions() -> usize {
    3
}
fn d_max_source_run() -> usize {
    2
}
fn d_embedding_model_tag() -> String {
    "derived:cards-mean-v1".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        // An empty TOML document deserializes to all serde defaults.
        toml::from_str("").expect("defaults deserialize")
    }
}

impl FeedConfig {
    /// Load from `FEED_CONFIG_PATH` (or the default path), then apply env
    /// overrides. Any read/parse failure falls back to defaults.
    pub fn load() -> Self {
        let path = std::env::var(ENV_FEED_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_FEED_CONFIG_PATH.to_string());
        let mut cfg = Self::load_from_file(path);
        cfg.apply_env_overrides();
        cfg
    }

    /// Load configuration from a TOML file, defaulting on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => toml::from_str(&s).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_env_usize(ENV_FEED_CARDS_LIMIT) {
            self.default_limit = v.clamp(1, self.max_limit);
        }
        if let Some(v) = parse_env_i64(ENV_FEED_FRESH_HOURS) {
            self.fresh_hours = v.max(1);
        }
    }

    /// Clamp a requested page size into `1..=max_limit`, defaulting when 0.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            None | Some(0) => self.default_limit.clamp(1, self.max_limit),
            Some(n) => n.clamp(1, self.max_limit),
        }
    }
}

fn parse_env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn parse_env_i64(name: &str) -> Option<i64> {
    std::env::var(name).ok()?.trim().parse().ok()
}
