// src/scheduler.rs
//! Topic Scheduler: pure, testable reordering of a candidate pool by user
//! topic affinity. No I/O, suitable for unit tests and offline evaluation.
//!
//! Cards are grouped by primary topic, sorted inside each bucket, and then
//! interleaved round-robin across topics so each topic's best card surfaces
//! before any topic's second-best. Tagless/neutral cards trail the result.

use std::collections::HashMap;

use tracing::warn;

use crate::card::{Card, TopicWeights};
use crate::scoring::score_card;

/// Rank `cards` for a user described by `weights`.
///
/// Identity when `cards` or `weights` is empty — no weight signal means no
/// reordering. Always returns a permutation of the input; if bookkeeping
/// ever broke that, the original order is returned instead of a corrupted
/// result.
pub fn rank(cards: &[Card], weights: &TopicWeights) -> Vec<Card> {
    if cards.is_empty() || weights.is_empty() {
        return cards.to_vec();
    }

    // Bucket indices by primary topic; keep input order inside buckets so
    // the descending sort below stays stable for equal scores.
    let mut buckets: HashMap<String, Vec<(f64, usize)>> = HashMap::new();
    let mut neutral: Vec<(f64, usize)> = Vec::new();

    for (idx, card) in cards.iter().enumerate() {
        let (score, primary) = score_card(card, weights);
        match primary {
            Some(topic) => buckets.entry(topic).or_default().push((score, idx)),
            None => neutral.push((score, idx)),
        }
    }

    for bucket in buckets.values_mut() {
        bucket.sort_by(|a, b| b.0.total_cmp(&a.0));
    }
    neutral.sort_by(|a, b| b.0.total_cmp(&a.0));

    // Topic priority: user weight first, best card score as tie-break.
    let mut topics: Vec<&String> = buckets.keys().collect();
    topics.sort_by(|a, b| {
        let wa = weights.get(*a).copied().unwrap_or(0.0);
        let wb = weights.get(*b).copied().unwrap_or(0.0);
        let ba = buckets[*a].first().map(|x| x.0).unwrap_or(f64::NEG_INFINITY);
        let bb = buckets[*b].first().map(|x| x.0).unwrap_or(f64::NEG_INFINITY);
        wb.total_cmp(&wa).then(bb.total_cmp(&ba))
    });

    // Round-robin interleave with an index cursor per topic instead of
    // destructive pops, so the buckets stay a pure function of the input.
    let ordered: Vec<&Vec<(f64, usize)>> = topics.iter().map(|t| &buckets[*t]).collect();
    let mut cursors = vec![0usize; ordered.len()];
    let total_tagged: usize = ordered.iter().map(|b| b.len()).sum();

    let mut result_idx: Vec<usize> = Vec::with_capacity(cards.len());
    while result_idx.len() < total_tagged {
        let mut advanced = false;
        for (ti, bucket) in ordered.iter().enumerate() {
            if cursors[ti] < bucket.len() {
                result_idx.push(bucket[cursors[ti]].1);
                cursors[ti] += 1;
                advanced = true;
            }
        }
        if !advanced {
            break;
        }
    }

    result_idx.extend(neutral.iter().map(|&(_, idx)| idx));

    // Post-condition: output must be a permutation of the input. Discard the
    // reordering rather than emit a corrupted feed.
    if result_idx.len() != cards.len() {
        warn!(
            input = cards.len(),
            output = result_idx.len(),
            "topic scheduler length mismatch; keeping original order"
        );
        return cards.to_vec();
    }

    result_idx.into_iter().map(|i| cards[i].clone()).collect()
}
