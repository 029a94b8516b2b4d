// src/feed.rs
//! Feed orchestrator: candidate retrieval, blending, diversification, and
//! cursor-based pagination behind one entry point.
//!
//! Pagination note: both candidate arms are re-sliced from the cursor
//! offset on every call, and seen-marking races between concurrent requests
//! of the same user are tolerated. Pages may overlap or skip cards under
//! concurrency — accepted imprecision, not a linearizable contract.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::blend::{merge_arms, resort_by_similarity};
use crate::card::{Card, CardId, TopicWeights, UserId};
use crate::config::FeedConfig;
use crate::cursor::{self, Cursor, FeedMode};
use crate::diversity::diversify;
use crate::profile::build_user_embedding;
use crate::scheduler;
use crate::store::CardStore;

/// Pagination envelope returned with every page.
#[derive(Debug, Clone, Serialize)]
pub struct CursorMeta {
    pub mode: FeedMode,
    pub limit: usize,
    pub offset: usize,
    pub next_offset: usize,
    pub cursor: Option<String>,
    pub next_cursor: String,
    pub has_more: bool,
}

/// Diagnostic counters; never affects correctness.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedDebug {
    pub mode: Option<FeedMode>,
    pub cursor_bad: bool,
    pub user_embedding_available: bool,
    pub user_embedding_built_now: bool,
    pub vector_candidates: usize,
    pub fresh_candidates: usize,
    pub merged: usize,
    pub returned: usize,
    pub seen_marked: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_similarity: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<Card>,
    pub debug: FeedDebug,
    pub cursor: CursorMeta,
}

/// The ranking engine. Holds its collaborators explicitly so tests can
/// inject an in-memory store.
pub struct FeedRanker {
    store: Arc<dyn CardStore>,
    config: FeedConfig,
}

impl FeedRanker {
    pub fn new(store: Arc<dyn CardStore>, config: FeedConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Build one feed page.
    ///
    /// A decodable cursor whose mode matches the mode chosen for this
    /// request overrides `offset`; anything else falls back to the explicit
    /// offset. Store failures abort the whole call.
    pub async fn build_feed(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        offset: usize,
        cursor_token: Option<&str>,
    ) -> Result<FeedPage> {
        let limit = self.config.clamp_limit(limit);
        let mut dbg = FeedDebug::default();

        let weights = self.store.topic_weights(user_id).await?;
        let embedding = self.resolve_embedding(user_id, &mut dbg).await?;

        let mode = if embedding.is_some() {
            FeedMode::Vector
        } else if !weights.is_empty() {
            FeedMode::Topics
        } else {
            FeedMode::Fresh
        };
        dbg.mode = Some(mode);

        let offset = match cursor_token {
            Some(token) => match cursor::decode(token) {
                Some(cur) if cur.mode == mode => cur.offset,
                Some(_) => offset, // mode changed since the cursor was cut
                None => {
                    dbg.cursor_bad = true;
                    offset
                }
            },
            None => offset,
        };

        let items = match mode {
            FeedMode::Vector => {
                self.vector_page(user_id, &embedding.unwrap_or_default(), offset, limit, &mut dbg)
                    .await?
            }
            FeedMode::Topics => {
                self.topics_page(user_id, &weights, offset, limit, &mut dbg)
                    .await?
            }
            FeedMode::Fresh => self.fresh_page(user_id, offset, limit, &mut dbg).await?,
        };

        let emitted: Vec<CardId> = items.iter().map(|c| c.id).collect();
        self.store.mark_seen(user_id, &emitted).await?;
        dbg.seen_marked = emitted.len();
        dbg.returned = items.len();
        similarity_stats(&items, &mut dbg);

        let k = items.len();
        let next_offset = offset + k;
        let has_more = k >= limit;
        let next_cursor = cursor::encode(&Cursor {
            mode,
            offset: next_offset,
        });

        info!(
            user = %anon_user(user_id),
            mode = %mode,
            returned = k,
            offset,
            has_more,
            "feed page built"
        );

        Ok(FeedPage {
            items,
            debug: dbg,
            cursor: CursorMeta {
                mode,
                limit,
                offset,
                next_offset,
                cursor: cursor_token.map(str::to_string),
                next_cursor,
                has_more,
            },
        })
    }

    /// Profile embedding, or a cold-start build persisted as a side effect.
    async fn resolve_embedding(
        &self,
        user_id: UserId,
        dbg: &mut FeedDebug,
    ) -> Result<Option<Vec<f32>>> {
        let profile = self.store.get_user_profile(user_id).await?;
        if let Some(emb) = profile.and_then(|p| p.embedding).filter(|e| !e.is_empty()) {
            dbg.user_embedding_available = true;
            return Ok(Some(emb));
        }

        match build_user_embedding(self.store.as_ref(), user_id, &self.config).await? {
            Some(emb) => {
                self.store
                    .upsert_user_embedding(user_id, &emb, &self.config.embedding_model_tag)
                    .await?;
                dbg.user_embedding_available = true;
                dbg.user_embedding_built_now = true;
                Ok(Some(emb))
            }
            None => Ok(None),
        }
    }

    async fn vector_page(
        &self,
        user_id: UserId,
        embedding: &[f32],
        offset: usize,
        limit: usize,
        dbg: &mut FeedDebug,
    ) -> Result<Vec<Card>> {
        let sims = self
            .store
            .similarity_search(
                embedding,
                self.config.vector_candidates,
                self.config.vector_max_age_hours,
                true,
            )
            .await?;
        let fresh = self
            .store
            .freshness_search(user_id, self.config.fresh_candidates, self.config.fresh_hours, true)
            .await?;
        dbg.vector_candidates = sims.len();
        dbg.fresh_candidates = fresh.len();

        // Cold topics / empty index: serve the fresh arm directly.
        if sims.is_empty() {
            dbg.fallback = Some("fresh_only");
            return self.fresh_window(&fresh, offset, limit).await;
        }

        let vector_ids: Vec<CardId> = sims.iter().map(|(id, _)| *id).collect();
        let sim_by_id: HashMap<CardId, f64> = sims.into_iter().collect();

        let merged = merge_arms(&vector_ids, &fresh, offset, limit);
        dbg.merged = merged.len();

        let cards_by_id = self.fetch_active(&merged).await?;
        let ordered = resort_by_similarity(&merged, &sim_by_id, &cards_by_id);
        let chosen = diversify(&ordered, &cards_by_id, limit, self.config.max_source_run);

        Ok(chosen
            .iter()
            .filter_map(|cid| cards_by_id.get(cid))
            .map(|c| {
                let mut c = c.clone();
                c.similarity = sim_by_id.get(&c.id).copied();
                c
            })
            .collect())
    }

    async fn topics_page(
        &self,
        user_id: UserId,
        weights: &TopicWeights,
        offset: usize,
        limit: usize,
        dbg: &mut FeedDebug,
    ) -> Result<Vec<Card>> {
        let fresh = self
            .store
            .freshness_search(user_id, self.config.fresh_candidates, self.config.fresh_hours, true)
            .await?;
        dbg.fresh_candidates = fresh.len();

        let cards_by_id = self.fetch_active(&fresh).await?;
        let pool: Vec<Card> = fresh
            .iter()
            .filter_map(|cid| cards_by_id.get(cid).cloned())
            .collect();

        let ranked = scheduler::rank(&pool, weights);
        let ordered: Vec<CardId> = ranked.iter().map(|c| c.id).collect();
        dbg.merged = ordered.len();

        let start = offset.min(ordered.len());
        let chosen = diversify(&ordered[start..], &cards_by_id, limit, self.config.max_source_run);

        Ok(chosen
            .iter()
            .filter_map(|cid| cards_by_id.get(cid).cloned())
            .collect())
    }

    async fn fresh_page(
        &self,
        user_id: UserId,
        offset: usize,
        limit: usize,
        dbg: &mut FeedDebug,
    ) -> Result<Vec<Card>> {
        let fresh = self
            .store
            .freshness_search(user_id, self.config.fresh_candidates, self.config.fresh_hours, true)
            .await?;
        dbg.fresh_candidates = fresh.len();
        dbg.fallback = Some("fresh_only");
        self.fresh_window(&fresh, offset, limit).await
    }

    /// The pure fresh-arm window `[offset, offset + limit)`, store order.
    async fn fresh_window(&self, fresh: &[CardId], offset: usize, limit: usize) -> Result<Vec<Card>> {
        let start = offset.min(fresh.len());
        let end = (start + limit).min(fresh.len());
        let chosen = &fresh[start..end];

        let cards_by_id = self.fetch_active(chosen).await?;
        Ok(chosen
            .iter()
            .filter_map(|cid| cards_by_id.get(cid).cloned())
            .collect())
    }

    /// Fetch cards and drop inactive rows, whatever the store claims.
    async fn fetch_active(&self, ids: &[CardId]) -> Result<HashMap<CardId, Card>> {
        let mut cards = self.store.fetch_cards_by_ids(ids).await?;
        let before = cards.len();
        cards.retain(|_, c| c.is_active);
        if cards.len() < before {
            debug!(dropped = before - cards.len(), "dropped inactive cards after fetch");
        }
        Ok(cards)
    }
}

fn similarity_stats(items: &[Card], dbg: &mut FeedDebug) {
    let sims: Vec<f64> = items.iter().filter_map(|c| c.similarity).collect();
    if sims.is_empty() {
        return;
    }
    let sum: f64 = sims.iter().sum();
    dbg.avg_similarity = Some(sum / sims.len() as f64);
    dbg.min_similarity = sims.iter().copied().reduce(f64::min);
    dbg.max_similarity = sims.iter().copied().reduce(f64::max);
}

/// Short anonymized user handle for logs; raw ids stay out of log sinks.
pub(crate) fn anon_user(user_id: UserId) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(user_id.to_le_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_user_is_stable_and_short() {
        assert_eq!(anon_user(42), anon_user(42));
        assert_ne!(anon_user(42), anon_user(43));
        assert_eq!(anon_user(42).len(), 12);
    }

    #[test]
    fn similarity_stats_cover_page() {
        use crate::card::testutil::card;
        use crate::card::SourceType;
        let mut a = card(1, &[], SourceType::Rss);
        a.similarity = Some(0.9);
        let mut b = card(2, &[], SourceType::Rss);
        b.similarity = Some(0.5);
        let c = card(3, &[], SourceType::Rss); // fresh-only, no similarity

        let mut dbg = FeedDebug::default();
        similarity_stats(&[a, b, c], &mut dbg);
        assert_eq!(dbg.min_similarity, Some(0.5));
        assert_eq!(dbg.max_similarity, Some(0.9));
        assert!((dbg.avg_similarity.unwrap() - 0.7).abs() < 1e-9);
    }
}
