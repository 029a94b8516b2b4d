// src/diversity.rs
//! Diversity Filter: caps how many consecutive cards may share a source
//! type. Violators are dropped for this page, never reordered — a later
//! page recomputes and can re-admit them.

use std::collections::HashMap;

use crate::card::{Card, CardId};

/// Default run-length cap per source type.
pub const DEFAULT_MAX_RUN: usize = 2;

/// Walk `ordered` once, accepting at most `max_run` consecutive cards of the
/// same source type, until `limit` cards are collected or input ends. Ids
/// missing from `cards_by_id` are skipped.
pub fn diversify(
    ordered: &[CardId],
    cards_by_id: &HashMap<CardId, Card>,
    limit: usize,
    max_run: usize,
) -> Vec<CardId> {
    let mut out: Vec<CardId> = Vec::with_capacity(limit.min(ordered.len()));
    let mut last_source = None;
    let mut streak = 0usize;

    for &cid in ordered {
        let Some(card) = cards_by_id.get(&cid) else {
            continue;
        };
        let src = card.source_type;

        if last_source == Some(src) {
            if streak >= max_run {
                continue;
            }
            streak += 1;
        } else {
            last_source = Some(src);
            streak = 1;
        }

        out.push(cid);
        if out.len() >= limit {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::testutil::card;
    use crate::card::SourceType;

    fn lookup(specs: &[(CardId, SourceType)]) -> HashMap<CardId, Card> {
        specs
            .iter()
            .map(|&(id, src)| (id, card(id, &[], src)))
            .collect()
    }

    #[test]
    fn caps_runs_and_readmits_after_break() {
        // Scenario: six rss cards in a row, then telegram, then more rss.
        let cards = lookup(&[
            (1, SourceType::Rss),
            (2, SourceType::Rss),
            (3, SourceType::Rss),
            (4, SourceType::Rss),
            (5, SourceType::Telegram),
            (6, SourceType::Rss),
            (7, SourceType::Rss),
        ]);
        let out = diversify(&[1, 2, 3, 4, 5, 6, 7], &cards, 10, 2);
        // 3 and 4 dropped; telegram resets the streak; 6 and 7 re-admitted.
        assert_eq!(out, vec![1, 2, 5, 6, 7]);
    }

    #[test]
    fn run_length_property_holds() {
        let specs: Vec<(CardId, SourceType)> = (1..=30)
            .map(|i| {
                let src = match i % 3 {
                    0 => SourceType::Rss,
                    1 => SourceType::Rss, // bias toward rss runs
                    _ => SourceType::Wikipedia,
                };
                (i, src)
            })
            .collect();
        let cards = lookup(&specs);
        let ordered: Vec<CardId> = (1..=30).collect();
        let out = diversify(&ordered, &cards, 30, 2);

        let mut streak = 0usize;
        let mut last = None;
        for cid in &out {
            let src = cards[cid].source_type;
            if last == Some(src) {
                streak += 1;
            } else {
                last = Some(src);
                streak = 1;
            }
            assert!(streak <= 2, "run-length constraint violated at id {cid}");
        }
    }

    #[test]
    fn stops_at_limit() {
        let cards = lookup(&[
            (1, SourceType::Rss),
            (2, SourceType::Telegram),
            (3, SourceType::Rss),
        ]);
        let out = diversify(&[1, 2, 3], &cards, 2, 2);
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn missing_ids_are_skipped() {
        let cards = lookup(&[(1, SourceType::Rss), (3, SourceType::Telegram)]);
        let out = diversify(&[1, 99, 3], &cards, 10, 2);
        assert_eq!(out, vec![1, 3]);
    }
}
