// src/blend.rs
//! Vector Blender: merges the similarity-ranked arm with the fresh arm into
//! one ordered candidate stream.
//!
//! The vector arm is exploit (continuous relevance in [0,1] from the store's
//! similarity search); the fresh arm is explore, guaranteeing new users and
//! cold topics still get content. The 80/20 split is a fixed ratio, not
//! adaptively tuned.

use std::collections::{HashMap, HashSet};

use crate::card::{Card, CardId};

/// Minimum absolute take from the vector arm.
const MIN_VECTOR_TAKE: usize = 10;
/// Minimum absolute take from the fresh arm.
const MIN_FRESH_TAKE: usize = 5;
/// Oversizing factor per arm, leaving headroom for dedup + diversity.
const SLICE_FACTOR: usize = 5;

/// Per-arm slice targets for a page of `limit` cards.
pub fn arm_targets(limit: usize) -> (usize, usize) {
    let take_v = MIN_VECTOR_TAKE.max((limit as f64 * 0.8).ceil() as usize);
    let take_f = MIN_FRESH_TAKE.max(limit.saturating_sub(take_v));
    (take_v, take_f)
}

/// Merge oversized windows of both arms starting at `offset`, vector arm
/// first. First occurrence wins on id collision, so the vector arm has
/// placement priority.
pub fn merge_arms(
    vector_ids: &[CardId],
    fresh_ids: &[CardId],
    offset: usize,
    limit: usize,
) -> Vec<CardId> {
    let (take_v, take_f) = arm_targets(limit);

    let v_slice = window(vector_ids, offset, take_v * SLICE_FACTOR);
    let f_slice = window(fresh_ids, offset, take_f * SLICE_FACTOR);

    let mut merged: Vec<CardId> = Vec::with_capacity(v_slice.len() + f_slice.len());
    let mut used: HashSet<CardId> = HashSet::with_capacity(merged.capacity());

    for &cid in v_slice.iter().chain(f_slice.iter()) {
        if used.insert(cid) {
            merged.push(cid);
        }
    }
    merged
}

/// Re-sort merged ids by `(similarity-if-known, created_at)` descending.
///
/// Fresh-only ids carry no similarity and compare as 0.0, so they sort by
/// recency among themselves after all scored cards of equal or higher
/// similarity. Ids absent from `cards_by_id` are dropped (partial store
/// results are never fatal).
pub fn resort_by_similarity(
    merged: &[CardId],
    similarities: &HashMap<CardId, f64>,
    cards_by_id: &HashMap<CardId, Card>,
) -> Vec<CardId> {
    let mut known: Vec<CardId> = merged
        .iter()
        .copied()
        .filter(|cid| cards_by_id.contains_key(cid))
        .collect();

    known.sort_by(|a, b| {
        let sa = similarities.get(a).copied().unwrap_or(0.0);
        let sb = similarities.get(b).copied().unwrap_or(0.0);
        sb.total_cmp(&sa)
            .then_with(|| cards_by_id[b].created_at.cmp(&cards_by_id[a].created_at))
    });
    known
}

fn window(ids: &[CardId], offset: usize, len: usize) -> &[CardId] {
    let start = offset.min(ids.len());
    let end = (start + len).min(ids.len());
    &ids[start..end]
}
