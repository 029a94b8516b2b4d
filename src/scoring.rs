// src/scoring.rs
//! Score Engine: pure mapping from (card, topic weights) to a scalar score
//! and the card's primary topic.
//!
//! `score = sum(tag weights) + 0.3 * max(tag weights)` — the bonus biases
//! strongly-matched single-topic cards above diffusely-tagged cards with the
//! same total weight. The multiplier is a fixed design constant.

use crate::card::{Card, TopicWeights};

/// Fixed bonus applied to the strongest tag weight.
const MAX_WEIGHT_BONUS: f64 = 0.3;

/// Score a card against the user's topic weights.
///
/// Returns `(0.0, None)` for cards without tags. On weight ties the first
/// tag in card order wins as primary topic. Total over any input.
pub fn score_card(card: &Card, weights: &TopicWeights) -> (f64, Option<String>) {
    let tags = card.clean_tags();
    if tags.is_empty() {
        return (0.0, None);
    }

    let tag_weights: Vec<f64> = tags
        .iter()
        .map(|t| weights.get(t).copied().unwrap_or(0.0))
        .collect();

    let mut max_w = f64::NEG_INFINITY;
    let mut max_idx = 0usize;
    let mut sum_w = 0.0;
    for (i, &w) in tag_weights.iter().enumerate() {
        sum_w += w;
        if w > max_w {
            max_w = w;
            max_idx = i;
        }
    }

    let score = sum_w + MAX_WEIGHT_BONUS * max_w;
    (score, Some(tags[max_idx].clone()))
}
