//! Score merging and per-source diversification, adapted from the multi-
//! signal fusion pattern down to this ranker's single-signal max-merge.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::RankedHit;

/// Wraps an item with the score it accumulates across subqueries.
#[derive(Clone, Debug)]
pub struct Scored<T> {
    pub item: T,
    pub score: f64,
}

/// Merges `incoming` into `target` keyed by chunk id, keeping the maximum
/// score seen for each id across queries (spec step 4: "keeping the maximum
/// score per chunkId").
pub fn merge_max_by_id(target: &mut HashMap<String, Scored<RankedHit>>, incoming: Vec<Scored<RankedHit>>) {
    for scored in incoming {
        let id = scored.item.id.clone();
        target
            .entry(id)
            .and_modify(|existing| {
                if scored.score > existing.score {
                    existing.score = scored.score;
                    existing.item = scored.item.clone();
                }
            })
            .or_insert(scored);
    }
}

pub fn sort_by_score_desc(items: &mut [Scored<RankedHit>]) {
    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.item.id.cmp(&b.item.id)));
}

/// Walks `sorted` (already score-descending) capping at `per_source_limit`
/// hits per source; once every hit has had a chance at a slot, fills any
/// remaining room up to `cap` from the hits that were skipped by the cap,
/// still in score order.
pub fn diversify_by_source(sorted: Vec<RankedHit>, cap: usize, per_source_limit: usize) -> Vec<RankedHit> {
    let mut per_source: HashMap<String, usize> = HashMap::new();
    let mut chosen = Vec::with_capacity(cap.min(sorted.len()));
    let mut remainder = Vec::new();

    for hit in sorted {
        if chosen.len() >= cap {
            remainder.push(hit);
            continue;
        }
        let count = per_source.entry(hit.source_id.clone()).or_insert(0);
        if *count < per_source_limit {
            *count += 1;
            chosen.push(hit);
        } else {
            remainder.push(hit);
        }
    }

    if chosen.len() < cap {
        for hit in remainder {
            if chosen.len() >= cap {
                break;
            }
            chosen.push(hit);
        }
    }

    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, source_id: &str, score: f64) -> RankedHit {
        RankedHit {
            id: id.to_string(),
            source_id: source_id.to_string(),
            text: "text".to_string(),
            score,
            bm25: None,
            snippet: None,
        }
    }

    #[test]
    fn merge_keeps_max_score_across_queries() {
        let mut target = HashMap::new();
        merge_max_by_id(&mut target, vec![Scored { item: hit("c1", "s1", 0.3), score: 0.3 }]);
        merge_max_by_id(&mut target, vec![Scored { item: hit("c1", "s1", 0.8), score: 0.8 }]);
        assert_eq!(target["c1"].score, 0.8);
    }

    #[test]
    fn diversify_caps_hits_per_source_then_fills_remainder() {
        let sorted = vec![
            hit("c1", "s1", 0.9),
            hit("c2", "s1", 0.8),
            hit("c3", "s1", 0.7),
            hit("c4", "s1", 0.6),
            hit("c5", "s2", 0.5),
        ];
        let chosen = diversify_by_source(sorted, 4, 2);
        assert_eq!(chosen.len(), 4);
        let from_s1 = chosen.iter().filter(|h| h.source_id == "s1").count();
        assert_eq!(from_s1, 3); // 2 under the cap + 1 backfilled from remainder
        assert!(chosen.iter().any(|h| h.source_id == "s2"));
    }

    #[test]
    fn diversify_never_exceeds_cap() {
        let sorted: Vec<RankedHit> = (0..10).map(|i| hit(&format!("c{i}"), "s1", 1.0 - i as f64 * 0.01)).collect();
        let chosen = diversify_by_source(sorted, 3, 10);
        assert_eq!(chosen.len(), 3);
    }
}
