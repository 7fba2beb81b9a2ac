//! Hybrid ranker: per-subquery BM25 over `chunks_fts`, optional
//! cross-encoder rerank, per-query max-merge, and per-source
//! diversification, with an FTS-backfill and `LIKE`-fallback safety net.

pub mod query;
pub mod reranker;
pub mod scoring;
pub mod types;

use std::collections::HashMap;

use tracing::{info, instrument, warn};
use verity_common::error::AppError;
use verity_storage::Db;

pub use reranker::{Reranker, RerankerPool};
pub use types::{RankOptions, RankedHit};

use query::{build_match_expression, tokenize_for_like};
use scoring::{diversify_by_source, merge_max_by_id, sort_by_score_desc, Scored};
use types::snippet_of;

/// Converts SQLite FTS5's raw `bm25()` score (lower is better, often
/// negative) into a normalized `(0,1]` relevance score where higher is
/// better.
fn normalize_bm25(bm25: f64) -> f64 {
    if bm25 > 0.0 {
        1.0 / (1.0 + bm25)
    } else {
        0.5
    }
}

/// Runs the full ranking algorithm across `queries` (typically
/// `[question, ...subqueries]`), returning a diversified, score-descending
/// list of chunk hits capped at `opts.cap`.
#[instrument(skip(db, reranker, queries), fields(n_queries = queries.len()))]
pub async fn rank_for_queries(
    db: &Db,
    queries: &[String],
    reranker: Option<&dyn Reranker>,
    opts: RankOptions,
) -> Result<Vec<RankedHit>, AppError> {
    let mut merged: HashMap<String, Scored<RankedHit>> = HashMap::new();

    for query in queries {
        let expr = build_match_expression(query);
        let hits = db.search_chunks_fts(expr, None, opts.per_query_take).await?;

        if hits.is_empty() {
            continue;
        }

        let ranked: Vec<RankedHit> = hits
            .iter()
            .map(|h| RankedHit {
                id: h.chunk.id.clone(),
                source_id: h.chunk.source_id.clone(),
                text: h.chunk.text.clone(),
                score: normalize_bm25(h.bm25),
                bm25: Some(h.bm25),
                snippet: snippet_of(&h.chunk.text),
            })
            .collect();

        let scored = if opts.enable_rerank {
            match rerank_hits(reranker, query, ranked.clone()).await {
                Ok(reranked) => reranked,
                Err(err) => {
                    warn!(error = %err, "rerank failed, falling back to BM25 order");
                    ranked.into_iter().map(|item| Scored { score: item.score, item }).collect()
                }
            }
        } else {
            ranked.into_iter().map(|item| Scored { score: item.score, item }).collect()
        };

        merge_max_by_id(&mut merged, scored);
    }

    if merged.is_empty() {
        return fts_backfill_then_like(db, queries, opts).await;
    }

    Ok(finish(merged, opts))
}

async fn rerank_hits(
    reranker: Option<&dyn Reranker>,
    query: &str,
    ranked: Vec<RankedHit>,
) -> Result<Vec<Scored<RankedHit>>, AppError> {
    let Some(reranker) = reranker else {
        return Err(AppError::Internal("no reranker configured".into()));
    };
    let documents: Vec<String> = ranked.iter().map(|h| h.text.clone()).collect();
    let relevance = reranker.rerank(query, documents).await?;
    Ok(ranked
        .into_iter()
        .zip(relevance)
        .map(|(item, score)| Scored { item, score: score as f64 })
        .collect())
}

fn finish(merged: HashMap<String, Scored<RankedHit>>, opts: RankOptions) -> Vec<RankedHit> {
    let mut scored: Vec<Scored<RankedHit>> = merged.into_values().collect();
    sort_by_score_desc(&mut scored);
    let sorted: Vec<RankedHit> = scored.into_iter().map(|s| s.item).collect();
    diversify_by_source(sorted, opts.cap, opts.per_source_limit)
}

/// If FTS produced nothing (e.g. chunks were bulk-inserted before a
/// rebuild ran), backfill `chunks_fts` and retry once; if still empty,
/// fall back to a tokenized `LIKE` scan over recent sources.
async fn fts_backfill_then_like(db: &Db, queries: &[String], opts: RankOptions) -> Result<Vec<RankedHit>, AppError> {
    info!("FTS returned nothing across all queries, rebuilding index and retrying");
    db.rebuild_fts().await?;

    let mut merged: HashMap<String, Scored<RankedHit>> = HashMap::new();
    for query in queries {
        let expr = build_match_expression(query);
        let hits = db.search_chunks_fts(expr, None, opts.per_query_take).await?;
        let scored: Vec<Scored<RankedHit>> = hits
            .into_iter()
            .map(|h| {
                let score = normalize_bm25(h.bm25);
                Scored {
                    item: RankedHit {
                        id: h.chunk.id.clone(),
                        source_id: h.chunk.source_id.clone(),
                        text: h.chunk.text.clone(),
                        score,
                        bm25: Some(h.bm25),
                        snippet: snippet_of(&h.chunk.text),
                    },
                    score,
                }
            })
            .collect();
        merge_max_by_id(&mut merged, scored);
    }

    if !merged.is_empty() {
        return Ok(finish(merged, opts));
    }

    warn!("FTS still empty after rebuild, falling back to LIKE retrieval");
    let mut terms = Vec::new();
    for query in queries {
        terms.extend(tokenize_for_like(query));
    }
    terms.sort();
    terms.dedup();

    let chunks = db.search_chunks_like(terms, opts.cap as i64).await?;
    let hits: Vec<RankedHit> = chunks
        .into_iter()
        .map(|c| RankedHit {
            id: c.id,
            source_id: c.source_id,
            text: c.text.clone(),
            score: 0.5,
            bm25: None,
            snippet: snippet_of(&c.text),
        })
        .collect();
    Ok(diversify_by_source(hits, opts.cap, opts.per_source_limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use verity_storage::types::SourceStatus;

    async fn seeded_db() -> Db {
        let db = Db::in_memory().await.unwrap();
        let source = db
            .insert_source("https://example.com/a".into(), "example.com".into(), SourceStatus::Ready, 1)
            .await
            .unwrap();
        db.insert_chunks(
            source.id.clone(),
            vec![
                (0, 0, 40, "NASA announced the Artemis II crew in 2024.".into(), 9),
                (1, 40, 80, "The mission will orbit the moon without landing.".into(), 9),
            ],
            1,
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn ranks_and_diversifies_across_queries() {
        let db = seeded_db().await;
        let queries = vec!["Artemis II NASA".to_string(), "moon orbit mission".to_string()];
        let hits = rank_for_queries(&db, &queries, None, RankOptions::default()).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[tokio::test]
    async fn falls_back_to_like_when_fts_finds_nothing() {
        let db = seeded_db().await;
        let queries = vec!["zzzzzzz nonsense term xxxxxx".to_string()];
        let hits = rank_for_queries(&db, &queries, None, RankOptions::default()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn empty_db_returns_empty_ranking() {
        let db = Db::in_memory().await.unwrap();
        let queries = vec!["anything".to_string()];
        let hits = rank_for_queries(&db, &queries, None, RankOptions::default()).await.unwrap();
        assert!(hits.is_empty());
    }
}
