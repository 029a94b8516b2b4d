// src/profile.rs
//! User Signal Provider: the user-side inputs to ranking.
//!
//! Topic weights are read as-is from the store. The interest embedding is a
//! unit-norm weighted mean over cards the user positively interacted with;
//! when it is missing, the first vector-mode request may build and persist
//! it here (the only write the ranking core triggers besides seen-marking).

use anyhow::Result;
use tracing::debug;

use crate::card::UserId;
use crate::config::FeedConfig;
use crate::store::CardStore;

/// Scale a vector to unit norm. Zero or non-finite norms leave the input
/// unchanged, mirroring how the store treats degenerate pgvector rows.
pub fn unit_normalize(vec: &mut [f32]) {
    let norm: f64 = vec.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if !norm.is_finite() || norm <= 0.0 {
        return;
    }
    for x in vec.iter_mut() {
        *x = (*x as f64 / norm) as f32;
    }
}

/// Build a user's interest embedding from recent positive interactions.
///
/// Returns `Ok(None)` below the minimum-interaction threshold or when none
/// of the interacted cards carry embeddings — cold start is not an error.
pub async fn build_user_embedding(
    store: &dyn CardStore,
    user_id: UserId,
    config: &FeedConfig,
) -> Result<Option<Vec<f32>>> {
    let rows = store
        .positive_interactions(user_id, config.positive_days, config.positive_limit)
        .await?;
    if rows.len() < config.min_interactions {
        debug!(
            rows = rows.len(),
            needed = config.min_interactions,
            "not enough positive signal for an embedding"
        );
        return Ok(None);
    }

    let ids: Vec<_> = rows.iter().map(|(id, _)| *id).collect();
    let cards = store.fetch_cards_by_ids(&ids).await?;

    let mut acc: Option<Vec<f64>> = None;
    let mut weight_sum = 0.0f64;

    for (cid, weight) in &rows {
        let w = weight.max(0.0);
        if w <= 0.0 {
            continue;
        }
        let Some(emb) = cards.get(cid).and_then(|c| c.embedding.as_ref()) else {
            continue;
        };
        let acc = acc.get_or_insert_with(|| vec![0.0; emb.len()]);
        if acc.len() != emb.len() {
            // Mixed embedding dimensions in the store; skip the odd one out.
            continue;
        }
        for (slot, v) in acc.iter_mut().zip(emb.iter()) {
            *slot += w * (*v as f64);
        }
        weight_sum += w;
    }

    let Some(acc) = acc else {
        return Ok(None);
    };
    if weight_sum <= 0.0 {
        return Ok(None);
    }

    let mut mean: Vec<f32> = acc.iter().map(|x| (x / weight_sum) as f32).collect();
    unit_normalize(&mut mean);
    Ok(Some(mean))
}
