// src/rest.rs
//! PostgREST-backed card store (Supabase-compatible).
//!
//! Thin blocking-style round-trips, no retry/timeout policy of its own:
//! failures surface to the caller and abort the feed request. Embeddings
//! cross the wire in the pgvector `"[x1,x2,...]"` string form, and may come
//! back either as that string or as a JSON array depending on how the RPC
//! is declared — both are accepted.
//!
//! Expected RPC surface:
//!   - `search_cards_for_user(p_query, p_limit, p_max_age_hours, p_only_active)`
//!   - `fresh_cards_for_user(p_user_id, p_limit, p_hours, p_only_active)`
//!   - `user_positive_cards(p_tg_id, p_days, p_limit)`
//!
//! The similarity RPC takes no user id: per-user seen filtering is not part
//! of this ranking core, so a deployment whose function still carries a
//! `p_user_id` argument must drop it or give it a default.

use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::card::{Card, CardId, TopicWeights, UserId};
use crate::store::{CardStore, UserProfile};

const CARD_FIELDS: &str =
    "id,source_type,title,body,tags,language,importance_score,created_at,is_active,embedding";

pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    /// `base_url` is the project root (no trailing `/rest/v1`).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("building HTTP client for card store")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Wire from `FEED_STORE_URL` / `FEED_STORE_API_KEY`; `None` when unset.
    pub fn from_env() -> Result<Option<Self>> {
        let (Ok(url), Ok(key)) = (
            std::env::var("FEED_STORE_URL"),
            std::env::var("FEED_STORE_API_KEY"),
        ) else {
            return Ok(None);
        };
        Ok(Some(Self::new(url, key)?))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn rpc_url(&self, func: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, func)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn rpc<T: serde::de::DeserializeOwned>(&self, func: &str, args: Value) -> Result<T> {
        let resp = self
            .post(&self.rpc_url(func))
            .json(&args)
            .send()
            .await
            .with_context(|| format!("rpc {func}: request failed"))?
            .error_for_status()
            .with_context(|| format!("rpc {func}: error status"))?;
        resp.json()
            .await
            .with_context(|| format!("rpc {func}: bad response body"))
    }
}

/// pgvector rows arrive either as a JSON array or as the `"[...]"` string.
fn parse_embedding(v: &Value) -> Option<Vec<f32>> {
    match v {
        Value::Array(items) => items
            .iter()
            .map(|x| x.as_f64().map(|f| f as f32))
            .collect(),
        Value::String(s) => {
            let inner = s.trim().strip_prefix('[')?.strip_suffix(']')?;
            inner
                .split(',')
                .map(|p| p.trim().parse::<f32>().ok())
                .collect()
        }
        _ => None,
    }
}

fn vec_to_pg(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[derive(Deserialize)]
struct CardRow {
    #[serde(flatten)]
    card: Card,
    // Card::embedding only tolerates arrays; capture the raw column here.
    #[serde(default, rename = "embedding")]
    raw_embedding: Option<Value>,
}

impl CardRow {
    fn into_card(self) -> Card {
        let mut card = self.card;
        if card.embedding.is_none() {
            card.embedding = self.raw_embedding.as_ref().and_then(parse_embedding);
        }
        card
    }
}

#[derive(Deserialize)]
struct SimilarityRow {
    id: CardId,
    #[serde(default)]
    similarity: f64,
}

#[derive(Deserialize)]
struct IdRow {
    id: CardId,
}

#[derive(Deserialize)]
struct WeightRow {
    tag: String,
    #[serde(default)]
    weight: f64,
}

#[derive(Deserialize)]
struct PositiveRow {
    card_id: CardId,
    #[serde(default)]
    weight: f64,
}

#[derive(Deserialize)]
struct ProfileRow {
    user_id: UserId,
    #[serde(default)]
    embedding: Option<Value>,
    #[serde(default)]
    embedding_model: Option<String>,
    #[serde(default)]
    embedding_updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait::async_trait]
impl CardStore for RestStore {
    async fn fetch_cards_by_ids(&self, ids: &[CardId]) -> Result<HashMap<CardId, Card>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let id_list: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        let id_filter = format!("in.({})", id_list.join(","));
        let rows: Vec<CardRow> = self
            .get(&self.table_url("cards"))
            .query(&[("select", CARD_FIELDS), ("id", id_filter.as_str())])
            .send()
            .await
            .context("cards fetch: request failed")?
            .error_for_status()
            .context("cards fetch: error status")?
            .json()
            .await
            .context("cards fetch: bad response body")?;

        Ok(rows
            .into_iter()
            .map(CardRow::into_card)
            .map(|c| (c.id, c))
            .collect())
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        limit: usize,
        max_age_hours: i64,
        only_active: bool,
    ) -> Result<Vec<(CardId, f64)>> {
        let rows: Vec<SimilarityRow> = self
            .rpc(
                "search_cards_for_user",
                json!({
                    "p_query": vec_to_pg(embedding),
                    "p_limit": limit,
                    "p_max_age_hours": max_age_hours,
                    "p_only_active": only_active,
                }),
            )
            .await?;
        Ok(rows.into_iter().map(|r| (r.id, r.similarity)).collect())
    }

    async fn freshness_search(
        &self,
        user_id: UserId,
        limit: usize,
        hours: i64,
        only_active: bool,
    ) -> Result<Vec<CardId>> {
        let rows: Vec<IdRow> = self
            .rpc(
                "fresh_cards_for_user",
                json!({
                    "p_user_id": user_id,
                    "p_limit": limit,
                    "p_hours": hours,
                    "p_only_active": only_active,
                }),
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn get_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let user_filter = format!("eq.{user_id}");
        let rows: Vec<ProfileRow> = self
            .get(&self.table_url("user_profiles"))
            .query(&[
                ("select", "user_id,embedding,embedding_model,embedding_updated_at"),
                ("user_id", user_filter.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await
            .context("profile fetch: request failed")?
            .error_for_status()
            .context("profile fetch: error status")?
            .json()
            .await
            .context("profile fetch: bad response body")?;

        Ok(rows.into_iter().next().map(|r| UserProfile {
            user_id: r.user_id,
            embedding: r.embedding.as_ref().and_then(parse_embedding),
            embedding_model: r.embedding_model,
            embedding_updated_at: r.embedding_updated_at,
        }))
    }

    async fn upsert_user_embedding(
        &self,
        user_id: UserId,
        embedding: &[f32],
        model_tag: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now();
        self.post(&self.table_url("user_profiles"))
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({
                "user_id": user_id,
                "embedding": vec_to_pg(embedding),
                "embedding_model": model_tag,
                "embedding_updated_at": now,
                "updated_at": now,
            }))
            .send()
            .await
            .context("embedding upsert: request failed")?
            .error_for_status()
            .context("embedding upsert: error status")?;
        Ok(())
    }

    async fn mark_seen(&self, user_id: UserId, card_ids: &[CardId]) -> Result<()> {
        if card_ids.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now();
        let rows: Vec<Value> = card_ids
            .iter()
            .map(|cid| json!({"user_id": user_id, "card_id": cid, "seen_at": now}))
            .collect();
        self.post(&self.table_url("user_seen_cards"))
            .query(&[("on_conflict", "user_id,card_id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&rows)
            .send()
            .await
            .context("seen upsert: request failed")?
            .error_for_status()
            .context("seen upsert: error status")?;
        Ok(())
    }

    async fn topic_weights(&self, user_id: UserId) -> Result<TopicWeights> {
        let user_filter = format!("eq.{user_id}");
        let rows: Vec<WeightRow> = self
            .get(&self.table_url("user_topic_weights"))
            .query(&[("select", "tag,weight"), ("tg_id", user_filter.as_str())])
            .send()
            .await
            .context("topic weights: request failed")?
            .error_for_status()
            .context("topic weights: error status")?
            .json()
            .await
            .context("topic weights: bad response body")?;

        Ok(rows
            .into_iter()
            .filter(|r| !r.tag.trim().is_empty())
            .map(|r| (r.tag, r.weight))
            .collect())
    }

    async fn positive_interactions(
        &self,
        user_id: UserId,
        days: i64,
        limit: usize,
    ) -> Result<Vec<(CardId, f64)>> {
        let rows: Vec<PositiveRow> = self
            .rpc(
                "user_positive_cards",
                json!({
                    "p_tg_id": user_id,
                    "p_days": days,
                    "p_limit": limit,
                }),
            )
            .await?;
        Ok(rows.into_iter().map(|r| (r.card_id, r.weight)).collect())
    }
}
