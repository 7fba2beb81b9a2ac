//! The seven stages of one research run, each a typed state transition over
//! `ResearchRunMachine`: one `async fn` per stage, taking the machine plus
//! a mutable context and returning the next machine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use state_machines::core::GuardError;
use tracing::{instrument, warn};
use verity_common::error::AppError;
use verity_common::text::estimate_tokens;
use verity_budget::{shrink_chunk_text, trim_chunks_to_budget, BudgetChunk};
use verity_ingest::{IngestOptions, IngestStatus};
use verity_llm::gateway::{LlmRequest, ModelAlias};
use verity_llm::prompts::{answer_prompt, plan_prompt};
use verity_ranker::{rank_for_queries, RankOptions};
use verity_search::types::{SearchOptions, TimeRange};
use verity_storage::types::MessageRole;
use verity_verify::{verify as run_verify, SnippetRef, VerifiedClaim, VerifyInput, VerifyOptions};

use crate::context::RunContext;
use crate::events::{RunEvent, SourceRef};
use crate::state::{
    Answered, Planned, Ranked, Read, ResearchRunMachine, Ready, Searched, Verified,
};

const NO_SOURCES_ANSWER: &str = "I could not find suitable sources for this question.";

fn map_guard_error(stage: &'static str, err: GuardError) -> AppError {
    AppError::Internal(format!(
        "state machine guard '{stage}' failed: guard={}, event={}, kind={:?}",
        err.guard, err.event, err.kind
    ))
}

fn check_cancelled(ctx: &RunContext) -> Result<(), AppError> {
    if ctx.cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }
    Ok(())
}

#[derive(Deserialize, Default)]
struct RawPlan {
    #[serde(default)]
    subqueries: Vec<String>,
}

fn dedupe_subqueries(question: &str, mut subqueries: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(question.trim().to_ascii_lowercase());
    subqueries.retain(|q| {
        let trimmed = q.trim();
        if trimmed.is_empty() {
            return false;
        }
        seen.insert(trimmed.to_ascii_lowercase())
    });
    subqueries.truncate(cap);
    if subqueries.is_empty() {
        subqueries.push(question.to_string());
    }
    subqueries
}

/// Decomposes the question into focused subqueries via the planning model,
/// falling back to the raw question on any parse or provider failure (spec
/// §4.10 step 1, §7: planner failures are non-fatal).
#[instrument(skip(machine, ctx))]
pub async fn plan(
    machine: ResearchRunMachine<(), Ready>,
    ctx: &mut RunContext,
) -> Result<ResearchRunMachine<(), Planned>, AppError> {
    check_cancelled(ctx)?;
    ctx.emit(RunEvent::progress("plan", "Planning search strategy")).await;

    let max_subqueries = ctx.request.depth.max_subqueries();
    let prompt = plan_prompt(
        &ctx.request.question,
        ctx.request.depth.as_str(),
        max_subqueries,
        &ctx.request.time_from,
        &ctx.request.time_to,
        ctx.request.region.as_deref(),
        &ctx.request.allowed_domains,
        &ctx.request.disallowed_domains,
    );

    let raw = ctx
        .collaborators
        .llm
        .generate(
            ModelAlias::Plan,
            LlmRequest::with_prompt(prompt.system, prompt.user),
            ctx.cancel.clone(),
        )
        .await;

    let subqueries = match raw {
        Ok(text) => verity_verify::json_extract::extract_json_object(&text)
            .and_then(|v| serde_json::from_value::<RawPlan>(v).ok())
            .map(|plan| plan.subqueries)
            .unwrap_or_default(),
        Err(AppError::Cancelled) => return Err(AppError::Cancelled),
        Err(err) => {
            warn!(error = %err, "plan stage LLM call failed, falling back to the raw question");
            Vec::new()
        }
    };

    ctx.subqueries = dedupe_subqueries(&ctx.request.question, subqueries, max_subqueries);

    machine.plan().map_err(|e| map_guard_error("plan", e))
}

/// Runs one search per subquery concurrently, merging results into a
/// first-seen-order, deduped URL list.
#[instrument(skip(machine, ctx))]
pub async fn search(
    machine: ResearchRunMachine<(), Planned>,
    ctx: &mut RunContext,
) -> Result<ResearchRunMachine<(), Searched>, AppError> {
    check_cancelled(ctx)?;
    ctx.emit(RunEvent::progress("search", "Searching the web")).await;

    let time_range = match (&ctx.request.time_from, &ctx.request.time_to) {
        (None, None) => None,
        (from, to) => Some(TimeRange {
            from: from.clone(),
            to: to.clone(),
        }),
    };
    let opts = SearchOptions {
        time_range,
        allowed_domains: ctx.request.allowed_domains.clone(),
        disallowed_domains: ctx.request.disallowed_domains.clone(),
        region: ctx.request.region.clone(),
        timeout_ms: ctx.config.request_timeout_ms,
        ..SearchOptions::default()
    };

    let search = ctx.collaborators.search.clone();
    let subqueries = ctx.subqueries.clone();
    let cancel = ctx.cancel.clone();
    let results = verity_common::concurrency::map_limit(
        subqueries,
        ctx.config.search_concurrency.max(1),
        move |subquery| {
            let search = search.clone();
            let opts = opts.clone();
            let cancel = cancel.clone();
            async move {
                search
                    .search(&subquery, &opts, cancel)
                    .await
                    .unwrap_or_else(|err| {
                        warn!(error = %err, subquery, "subquery search failed, treating as empty");
                        Vec::new()
                    })
            }
        },
    )
    .await;

    let mut seen = HashSet::new();
    let mut unique_urls = Vec::new();
    for batch in results {
        for hit in batch {
            if seen.insert(hit.url.clone()) {
                unique_urls.push(hit.url);
            }
        }
    }
    ctx.unique_urls = unique_urls;

    ctx.emit(RunEvent::progress(
        "search",
        format!("Found {} unique source URLs", ctx.unique_urls.len()),
    ))
    .await;

    machine.search().map_err(|e| map_guard_error("search", e))
}

/// Reads up to `inline_cap` of the searched URLs, persisting chunks for
/// each, and emits a progress update every second completion plus one at
/// the end.
#[instrument(skip(machine, ctx))]
pub async fn read(
    machine: ResearchRunMachine<(), Searched>,
    ctx: &mut RunContext,
) -> Result<ResearchRunMachine<(), Read>, AppError> {
    check_cancelled(ctx)?;

    let take = ctx.unique_urls.len().min(ctx.config.inline_cap);
    let selected: Vec<String> = ctx.unique_urls[..take].to_vec();
    let total = selected.len();

    ctx.emit(RunEvent::progress("read", format!("Reading {total} sources"))).await;

    let ingestor = ctx.collaborators.ingestor.clone();
    let cancel = ctx.cancel.clone();
    let events = ctx.events.clone();
    let completed = Arc::new(AtomicUsize::new(0));

    let outcomes = verity_common::concurrency::map_limit(
        selected,
        ctx.config.read_concurrency.max(1),
        move |url| {
            let ingestor = ingestor.clone();
            let cancel = cancel.clone();
            let events = events.clone();
            let completed = completed.clone();
            async move {
                let outcome = ingestor.ingest(&url, IngestOptions::default(), cancel).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if done % 2 == 0 || done == total {
                    let _ = events
                        .send(RunEvent::progress("read", format!("Read {done}/{total}")))
                        .await;
                }
                outcome
            }
        },
    )
    .await;

    ctx.ingested_source_ids = outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            Ok(o) if matches!(o.status, IngestStatus::Ok | IngestStatus::Exists) => o.source_id,
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "read stage failed to ingest one source");
                None
            }
        })
        .collect();

    machine.read().map_err(|e| map_guard_error("read", e))
}

/// Ranks chunks across `[question, ...subqueries]`, diversified by source,
/// delegating to `verity_ranker::rank_for_queries`.
#[instrument(skip(machine, ctx))]
pub async fn rank(
    machine: ResearchRunMachine<(), Read>,
    ctx: &mut RunContext,
) -> Result<ResearchRunMachine<(), Ranked>, AppError> {
    check_cancelled(ctx)?;
    ctx.emit(RunEvent::progress("rank", "Ranking retrieved passages")).await;

    let mut queries = vec![ctx.request.question.clone()];
    queries.extend(ctx.subqueries.clone());

    let opts = RankOptions {
        cap: ctx.config.rank_cap,
        per_query_take: ctx.config.rank_per_query_take,
        per_source_limit: ctx.config.rank_per_source_limit,
        enable_rerank: ctx.config.enable_rerank,
        timeout_ms: ctx.config.request_timeout_ms,
    };
    let reranker = ctx.collaborators.reranker.as_deref();
    ctx.ranked_hits = rank_for_queries(&ctx.collaborators.db, &queries, reranker, opts).await?;

    ctx.emit(RunEvent::progress(
        "rank",
        format!("Selected {} candidate snippets", ctx.ranked_hits.len()),
    ))
    .await;

    machine.rank().map_err(|e| map_guard_error("rank", e))
}

struct SourceAssignment {
    refs: Vec<SourceRef>,
    index_by_source: HashMap<String, usize>,
}

async fn assign_source_indices(
    ctx: &RunContext,
    chunks: &[BudgetChunk],
) -> Result<SourceAssignment, AppError> {
    let mut index_by_source = HashMap::new();
    let mut refs = Vec::new();
    for chunk in chunks {
        if index_by_source.contains_key(&chunk.source_id) {
            continue;
        }
        let index = refs.len() + 1;
        let source = ctx
            .collaborators
            .db
            .get_source_by_id(chunk.source_id.clone())
            .await?;
        let (url, title, domain) = match source {
            Some(s) => (s.url, s.title, Some(s.domain)),
            None => (String::new(), None, None),
        };
        index_by_source.insert(chunk.source_id.clone(), index);
        refs.push(SourceRef {
            id: chunk.source_id.clone(),
            url,
            title,
            domain,
            index,
        });
    }
    Ok(SourceAssignment { refs, index_by_source })
}

/// Budgets ranked chunks to the answer token budget, streams the answer
/// completion, and persists the assistant message.
/// Falls back to a canned no-sources answer when nothing survived ranking.
#[instrument(skip(machine, ctx))]
pub async fn answer(
    machine: ResearchRunMachine<(), Ranked>,
    ctx: &mut RunContext,
) -> Result<ResearchRunMachine<(), Answered>, AppError> {
    check_cancelled(ctx)?;
    ctx.emit(RunEvent::progress("answer", "Composing the answer")).await;

    let shrunk: Vec<BudgetChunk> = ctx
        .ranked_hits
        .iter()
        .map(|h| BudgetChunk {
            id: h.id.clone(),
            source_id: h.source_id.clone(),
            text: shrink_chunk_text(&h.text, ctx.config.answer_max_chars_per_chunk),
        })
        .collect();
    let mut budgeted = trim_chunks_to_budget(
        shrunk,
        ctx.config.answer_input_budget_tokens,
        ctx.config.answer_prompt_overhead_tokens,
    );

    if budgeted.is_empty() {
        ctx.emit(RunEvent::Sources(Vec::new())).await;
        ctx.answer_text = NO_SOURCES_ANSWER.to_string();
        ctx.cited_chunks = Vec::new();
        ctx.emit(RunEvent::Answer {
            text: ctx.answer_text.clone(),
        })
        .await;
        let stored = ctx
            .collaborators
            .db
            .insert_message(
                ctx.thread_id.clone(),
                MessageRole::Assistant,
                ctx.answer_text.clone(),
                chrono::Utc::now().timestamp_millis(),
            )
            .await?;
        ctx.assistant_message_id = stored.id;
        return machine.answer().map_err(|e| map_guard_error("answer", e));
    }

    let assignment = assign_source_indices(ctx, &budgeted).await?;
    ctx.emit(RunEvent::Sources(assignment.refs.clone())).await;

    let snippets: Vec<(usize, String, String, String)> = budgeted
        .iter()
        .map(|chunk| {
            let index = assignment.index_by_source[&chunk.source_id];
            let url = assignment
                .refs
                .iter()
                .find(|r| r.id == chunk.source_id)
                .map(|r| r.url.clone())
                .unwrap_or_default();
            (index, chunk.source_id.clone(), url, chunk.text.clone())
        })
        .collect();

    let prompt = answer_prompt(&ctx.request.question, &snippets);

    let mut emitted_any_token = false;
    let mut full_text = match stream_answer(ctx, &prompt, None, &mut emitted_any_token).await {
        Ok(text) => text,
        Err(AppError::LlmBudgetExceeded(_)) if !emitted_any_token => {
            ctx.answer_hit_budget_error = true;
            warn!("answer stage hit the provider's token budget, retrying with half the budget");
            let halved_tokens = ctx.config.answer_input_budget_tokens / 2;
            budgeted = trim_chunks_to_budget(
                budgeted,
                halved_tokens,
                ctx.config.answer_prompt_overhead_tokens,
            );
            let retry_snippets: Vec<(usize, String, String, String)> = budgeted
                .iter()
                .map(|chunk| {
                    let index = assignment.index_by_source[&chunk.source_id];
                    let url = assignment
                        .refs
                        .iter()
                        .find(|r| r.id == chunk.source_id)
                        .map(|r| r.url.clone())
                        .unwrap_or_default();
                    (index, chunk.source_id.clone(), url, chunk.text.clone())
                })
                .collect();
            let retry_prompt = answer_prompt(&ctx.request.question, &retry_snippets);
            stream_answer(ctx, &retry_prompt, None, &mut emitted_any_token).await?
        }
        Err(AppError::LlmBudgetExceeded(msg)) => {
            ctx.answer_hit_budget_error = true;
            return Err(AppError::LlmBudgetExceeded(msg));
        }
        Err(err) => return Err(err),
    };

    if full_text.trim().is_empty() {
        full_text = NO_SOURCES_ANSWER.to_string();
    }
    ctx.answer_text = full_text.clone();
    ctx.emit(RunEvent::Answer { text: full_text.clone() }).await;

    ctx.cited_chunks = budgeted
        .into_iter()
        .map(|chunk| (chunk.source_id, chunk.id, chunk.text))
        .collect();

    let stored = ctx
        .collaborators
        .db
        .insert_message(
            ctx.thread_id.clone(),
            MessageRole::Assistant,
            full_text,
            chrono::Utc::now().timestamp_millis(),
        )
        .await?;
    ctx.assistant_message_id = stored.id;

    machine.answer().map_err(|e| map_guard_error("answer", e))
}

async fn stream_answer(
    ctx: &RunContext,
    prompt: &verity_llm::prompts::Prompt,
    max_output_tokens: Option<u32>,
    emitted_any_token: &mut bool,
) -> Result<String, AppError> {
    let mut req = LlmRequest::with_prompt(prompt.system.clone(), prompt.user.clone());
    req.max_output_tokens = max_output_tokens;
    let mut stream = ctx
        .collaborators
        .llm
        .stream(ModelAlias::Answer, req, ctx.cancel.clone())
        .await?;

    let mut full_text = String::new();
    while let Some(item) = stream.next().await {
        let delta = item?;
        if delta.is_empty() {
            continue;
        }
        *emitted_any_token = true;
        full_text.push_str(&delta);
        ctx.emit(RunEvent::Token(delta)).await;
    }
    Ok(full_text)
}

/// Extracts and binds claims against the cited chunks, skipping entirely
/// (with an empty claims list, no DB writes) when there is nothing to
/// verify, the estimated prompt would blow the hard ceiling, or the answer
/// stage already hit a token budget error.
#[instrument(skip(machine, ctx))]
pub async fn verify(
    machine: ResearchRunMachine<(), Answered>,
    ctx: &mut RunContext,
) -> Result<ResearchRunMachine<(), Verified>, AppError> {
    check_cancelled(ctx)?;

    if ctx.cited_chunks.is_empty() {
        ctx.emit(RunEvent::Claims { claims: Vec::new() }).await;
        return machine.verify().map_err(|e| map_guard_error("verify", e));
    }

    if ctx.config.skip_verify_on_tpm && ctx.answer_hit_budget_error {
        ctx.emit(RunEvent::Claims { claims: Vec::new() }).await;
        return machine.verify().map_err(|e| map_guard_error("verify", e));
    }

    ctx.emit(RunEvent::progress("verify", "Verifying claims against sources")).await;

    let shrunk: Vec<BudgetChunk> = ctx
        .cited_chunks
        .iter()
        .map(|(source_id, chunk_id, text)| BudgetChunk {
            id: chunk_id.clone(),
            source_id: source_id.clone(),
            text: shrink_chunk_text(text, ctx.config.verify_max_chars_per_chunk),
        })
        .collect();
    let budgeted = trim_chunks_to_budget(
        shrunk,
        ctx.config.verify_input_budget_tokens,
        ctx.config.verify_prompt_overhead_tokens,
    );

    let estimated_total: usize = budgeted.iter().map(|c| estimate_tokens(&c.text)).sum::<usize>()
        + ctx.config.verify_prompt_overhead_tokens
        + estimate_tokens(&ctx.answer_text);
    if estimated_total > ctx.config.verify_hard_ceiling_tokens {
        warn!(estimated_total, "verify prompt would exceed the hard ceiling, skipping verify");
        ctx.emit(RunEvent::Claims { claims: Vec::new() }).await;
        return machine.verify().map_err(|e| map_guard_error("verify", e));
    }

    let snippets: Vec<SnippetRef> = budgeted
        .into_iter()
        .map(|chunk| SnippetRef {
            source_id: chunk.source_id,
            chunk_id: Some(chunk.id),
            text: chunk.text,
        })
        .collect();

    let input = VerifyInput {
        answer_markdown: ctx.answer_text.clone(),
        snippets,
    };
    let claims = run_verify(
        &ctx.collaborators.llm,
        input,
        VerifyOptions::default(),
        ctx.cancel.clone(),
    )
    .await?;

    persist_claims(ctx, &claims).await?;
    ctx.emit(RunEvent::Claims { claims }).await;

    machine.verify().map_err(|e| map_guard_error("verify", e))
}

async fn persist_claims(ctx: &RunContext, claims: &[VerifiedClaim]) -> Result<(), AppError> {
    for claim in claims {
        let stored = ctx
            .collaborators
            .db
            .insert_claim(
                ctx.assistant_message_id.clone(),
                claim.text.clone(),
                claim.claim_type.clone(),
                claim.support_score,
                claim.contradicted,
                claim.uncertainty_reason.clone(),
            )
            .await?;
        for evidence in &claim.evidence {
            ctx.collaborators
                .db
                .insert_claim_evidence(
                    stored.id.clone(),
                    evidence.source_id.clone(),
                    evidence.chunk_id.clone().unwrap_or_default(),
                    evidence.quote.clone(),
                    evidence.char_start.unwrap_or(0),
                    evidence.char_end.unwrap_or(0),
                    None,
                )
                .await?;
        }
    }
    Ok(())
}

/// Terminal stage: emits `done` with the thread id clients use to fetch
/// the persisted transcript afterwards.
#[instrument(skip(machine, ctx))]
pub async fn finish(
    machine: ResearchRunMachine<(), Verified>,
    ctx: &mut RunContext,
) -> Result<(), AppError> {
    machine.finish().map_err(|e| map_guard_error("finish", e))?;
    ctx.emit(RunEvent::Done {
        thread_id: ctx.thread_id.clone(),
    })
    .await;
    Ok(())
}
