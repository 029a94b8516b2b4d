// src/store.rs
//! Card Store Gateway: the interface boundary to persistent storage.
//!
//! The ranking core only ever talks to this trait. Failures here are fatal
//! for the current `build_feed` call — a half-built ranking would be
//! misleading — while *partial* results (missing ids) are fine and get
//! skipped downstream.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::card::{Card, CardId, TopicWeights, UserId};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub embedding_updated_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait CardStore: Send + Sync {
    /// Bulk fetch; partial results allowed, missing ids simply absent.
    async fn fetch_cards_by_ids(&self, ids: &[CardId]) -> Result<HashMap<CardId, Card>>;

    /// Ordered `(id, similarity)` pairs, best first.
    async fn similarity_search(
        &self,
        embedding: &[f32],
        limit: usize,
        max_age_hours: i64,
        only_active: bool,
    ) -> Result<Vec<(CardId, f64)>>;

    /// Ordered ids by the store's freshness heuristic, newest first.
    async fn freshness_search(
        &self,
        user_id: UserId,
        limit: usize,
        hours: i64,
        only_active: bool,
    ) -> Result<Vec<CardId>>;

    async fn get_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>>;

    async fn upsert_user_embedding(
        &self,
        user_id: UserId,
        embedding: &[f32],
        model_tag: &str,
    ) -> Result<()>;

    /// Idempotent bulk upsert keyed by (user, card).
    async fn mark_seen(&self, user_id: UserId, card_ids: &[CardId]) -> Result<()>;

    /// Learned interest weights; users without rows get an empty map.
    async fn topic_weights(&self, user_id: UserId) -> Result<TopicWeights>;

    /// Recent positive interactions as `(card_id, weight)` pairs.
    async fn positive_interactions(
        &self,
        user_id: UserId,
        days: i64,
        limit: usize,
    ) -> Result<Vec<(CardId, f64)>>;
}

/// In-memory store: deterministic, used by tests and as the wiring fallback
/// when no PostgREST endpoint is configured.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    cards: HashMap<CardId, Card>,
    profiles: HashMap<UserId, UserProfile>,
    weights: HashMap<UserId, TopicWeights>,
    positives: HashMap<UserId, Vec<(CardId, f64)>>,
    seen: HashMap<(UserId, CardId), DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_card(&self, card: Card) {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        g.cards.insert(card.id, card);
    }

    pub fn insert_cards(&self, cards: impl IntoIterator<Item = Card>) {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        for c in cards {
            g.cards.insert(c.id, c);
        }
    }

    pub fn set_topic_weights(&self, user_id: UserId, weights: TopicWeights) {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        g.weights.insert(user_id, weights);
    }

    pub fn set_profile(&self, profile: UserProfile) {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        g.profiles.insert(profile.user_id, profile);
    }

    pub fn set_positive_interactions(&self, user_id: UserId, rows: Vec<(CardId, f64)>) {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        g.positives.insert(user_id, rows);
    }

    /// Number of distinct (user, card) seen records.
    pub fn seen_count(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").seen.len()
    }

    pub fn seen_ids_for(&self, user_id: UserId) -> Vec<CardId> {
        let g = self.inner.lock().expect("store mutex poisoned");
        let mut ids: Vec<CardId> = g
            .seen
            .keys()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, c)| *c)
            .collect();
        ids.sort_unstable();
        ids
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        na += (*x as f64) * (*x as f64);
        nb += (*y as f64) * (*y as f64);
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        0.0
    } else {
        dot / denom
    }
}

#[async_trait::async_trait]
impl CardStore for MemoryStore {
    async fn fetch_cards_by_ids(&self, ids: &[CardId]) -> Result<HashMap<CardId, Card>> {
        let g = self.inner.lock().expect("store mutex poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| g.cards.get(id).map(|c| (*id, c.clone())))
            .collect())
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        limit: usize,
        max_age_hours: i64,
        only_active: bool,
    ) -> Result<Vec<(CardId, f64)>> {
        let g = self.inner.lock().expect("store mutex poisoned");
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let mut scored: Vec<(CardId, f64)> = g
            .cards
            .values()
            .filter(|c| !only_active || c.is_active)
            .filter(|c| c.created_at >= cutoff)
            .filter_map(|c| {
                c.embedding
                    .as_ref()
                    .map(|e| (c.id, cosine(embedding, e)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn freshness_search(
        &self,
        _user_id: UserId,
        limit: usize,
        hours: i64,
        only_active: bool,
    ) -> Result<Vec<CardId>> {
        let g = self.inner.lock().expect("store mutex poisoned");
        let cutoff = Utc::now() - Duration::hours(hours);
        let mut fresh: Vec<&Card> = g
            .cards
            .values()
            .filter(|c| !only_active || c.is_active)
            .filter(|c| c.created_at >= cutoff)
            .collect();
        fresh.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(fresh.into_iter().take(limit).map(|c| c.id).collect())
    }

    async fn get_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let g = self.inner.lock().expect("store mutex poisoned");
        Ok(g.profiles.get(&user_id).cloned())
    }

    async fn upsert_user_embedding(
        &self,
        user_id: UserId,
        embedding: &[f32],
        model_tag: &str,
    ) -> Result<()> {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        let profile = g.profiles.entry(user_id).or_insert_with(|| UserProfile {
            user_id,
            embedding: None,
            embedding_model: None,
            embedding_updated_at: None,
        });
        profile.embedding = Some(embedding.to_vec());
        profile.embedding_model = Some(model_tag.to_string());
        profile.embedding_updated_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_seen(&self, user_id: UserId, card_ids: &[CardId]) -> Result<()> {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        let now = Utc::now();
        for &cid in card_ids {
            // Upsert: repeated marks refresh the timestamp, never duplicate.
            g.seen.insert((user_id, cid), now);
        }
        Ok(())
    }

    async fn topic_weights(&self, user_id: UserId) -> Result<TopicWeights> {
        let g = self.inner.lock().expect("store mutex poisoned");
        Ok(g.weights.get(&user_id).cloned().unwrap_or_default())
    }

    async fn positive_interactions(
        &self,
        user_id: UserId,
        _days: i64,
        limit: usize,
    ) -> Result<Vec<(CardId, f64)>> {
        let g = self.inner.lock().expect("store mutex poisoned");
        let mut rows = g.positives.get(&user_id).cloned().unwrap_or_default();
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::testutil::card;
    use crate::card::SourceType;
    use chrono::Utc;

    fn recent_card(id: CardId, embedding: Option<Vec<f32>>) -> Card {
        let mut c = card(id, &["tech"], SourceType::Rss);
        c.created_at = Utc::now() - Duration::minutes(id);
        c.embedding = embedding;
        c
    }

    #[tokio::test]
    async fn fetch_returns_partial_results() {
        let store = MemoryStore::new();
        store.insert_card(recent_card(1, None));
        let got = store.fetch_cards_by_ids(&[1, 2]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert!(got.contains_key(&1));
    }

    #[tokio::test]
    async fn similarity_search_orders_by_cosine() {
        let store = MemoryStore::new();
        store.insert_card(recent_card(1, Some(vec![1.0, 0.0])));
        store.insert_card(recent_card(2, Some(vec![0.0, 1.0])));
        store.insert_card(recent_card(3, Some(vec![0.7, 0.7])));
        let got = store
            .similarity_search(&[1.0, 0.0], 10, 48, true)
            .await
            .unwrap();
        let ids: Vec<CardId> = got.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert!(got[0].1 > got[1].1 && got[1].1 > got[2].1);
    }

    #[tokio::test]
    async fn inactive_cards_excluded_when_only_active() {
        let store = MemoryStore::new();
        let mut dead = recent_card(1, Some(vec![1.0]));
        dead.is_active = false;
        store.insert_card(dead);
        store.insert_card(recent_card(2, Some(vec![1.0])));

        let sims = store.similarity_search(&[1.0], 10, 48, true).await.unwrap();
        assert_eq!(sims.len(), 1);
        assert_eq!(sims[0].0, 2);

        let fresh = store.freshness_search(7, 10, 48, true).await.unwrap();
        assert_eq!(fresh, vec![2]);
    }

    #[tokio::test]
    async fn freshness_search_newest_first() {
        let store = MemoryStore::new();
        for id in 1..=3 {
            store.insert_card(recent_card(id, None));
        }
        // created_at = now - id minutes, so id 1 is newest.
        let got = store.freshness_search(7, 10, 48, true).await.unwrap();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn mark_seen_is_idempotent() {
        let store = MemoryStore::new();
        store.mark_seen(7, &[1, 2, 3]).await.unwrap();
        store.mark_seen(7, &[1, 2, 3]).await.unwrap();
        assert_eq!(store.seen_count(), 3);
        assert_eq!(store.seen_ids_for(7), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn upsert_embedding_creates_profile() {
        let store = MemoryStore::new();
        store
            .upsert_user_embedding(7, &[0.6, 0.8], "derived:cards-mean-v1")
            .await
            .unwrap();
        let p = store.get_user_profile(7).await.unwrap().unwrap();
        assert_eq!(p.embedding.as_deref(), Some(&[0.6f32, 0.8][..]));
        assert_eq!(p.embedding_model.as_deref(), Some("derived:cards-mean-v1"));
    }
}
