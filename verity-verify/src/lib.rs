//! Claim extraction and evidence binding for generated answers: one LLM
//! call extracts atomic claims, each claim's evidence is validated against
//! the active snippet set via a tolerant JSON layer, with an optional NLI
//! contradiction pass on top.

pub mod json_extract;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use verity_common::error::AppError;
use verity_common::text::{find_quote_offsets, QuoteMatchOptions};
use verity_llm::gateway::{LlmGateway, LlmRequest, ModelAlias};
use verity_llm::prompts::{nli_prompt, verify_prompt};

/// One evidence quote backing a claim, with its location resolved (when
/// possible) back into the source chunk's character offsets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VerifiedEvidence {
    pub source_id: String,
    pub chunk_id: Option<String>,
    pub quote: String,
    pub char_start: Option<i64>,
    pub char_end: Option<i64>,
}

/// One atomic claim extracted from the answer, with its supporting
/// evidence and a support score in `[0, 1]`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VerifiedClaim {
    pub text: String,
    pub claim_type: Option<String>,
    pub support_score: f64,
    pub contradicted: bool,
    pub uncertainty_reason: Option<String>,
    pub evidence: Vec<VerifiedEvidence>,
}

/// A snippet the answer was allowed to cite, used both to build the
/// verify-stage prompt and to validate the model's evidence references.
#[derive(Clone, Debug)]
pub struct SnippetRef {
    pub source_id: String,
    pub chunk_id: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct VerifyInput {
    pub answer_markdown: String,
    pub snippets: Vec<SnippetRef>,
}

#[derive(Clone, Debug)]
pub struct VerifyOptions {
    pub max_claims: usize,
    pub bind_offsets: bool,
    pub nli_contradiction_check: bool,
    pub nli_max_pairs_per_claim: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            max_claims: 12,
            bind_offsets: true,
            nli_contradiction_check: true,
            nli_max_pairs_per_claim: 2,
        }
    }
}

/// Raw shapes the verify-stage completion is expected to produce, before
/// validation against the active snippet set.
#[derive(Deserialize)]
struct RawVerifyResponse {
    #[serde(default)]
    claims: Vec<RawClaim>,
}

#[derive(Deserialize)]
struct RawClaim {
    text: String,
    #[serde(default, rename = "claimType")]
    claim_type: Option<String>,
    #[serde(default, rename = "supportScore")]
    support_score: Option<f64>,
    #[serde(default)]
    contradicted: bool,
    #[serde(default, rename = "uncertaintyReason")]
    uncertainty_reason: Option<String>,
    #[serde(default)]
    evidence: Vec<RawEvidence>,
}

#[derive(Deserialize)]
struct RawEvidence {
    #[serde(rename = "sourceId")]
    source_id: String,
    #[serde(default, rename = "chunkId")]
    chunk_id: Option<String>,
    quote: String,
}

#[derive(Deserialize)]
struct RawNliResponse {
    label: String,
}

/// Extracts claims from `input.answer_markdown`, binds each claim's
/// evidence to the snippets it was allowed to cite, and (optionally)
/// downgrades claims whose evidence items disagree per a pairwise NLI
/// check. Evidence referencing a `(sourceId, chunkId)` pair outside the
/// active snippet set is dropped rather than trusted; a claim left with
/// no evidence after validation is dropped entirely.
pub async fn verify(
    gateway: &LlmGateway,
    input: VerifyInput,
    opts: VerifyOptions,
    cancel: CancellationToken,
) -> Result<Vec<VerifiedClaim>, AppError> {
    if input.snippets.is_empty() || input.answer_markdown.trim().is_empty() {
        return Ok(Vec::new());
    }

    let valid_refs: HashSet<(String, Option<String>)> = input
        .snippets
        .iter()
        .map(|s| (s.source_id.clone(), s.chunk_id.clone()))
        .collect();
    let chunk_text: HashMap<(String, Option<String>), &str> = input
        .snippets
        .iter()
        .map(|s| ((s.source_id.clone(), s.chunk_id.clone()), s.text.as_str()))
        .collect();

    let snippet_tuples: Vec<(String, Option<String>, String)> = input
        .snippets
        .iter()
        .map(|s| (s.source_id.clone(), s.chunk_id.clone(), s.text.clone()))
        .collect();
    let prompt = verify_prompt(&input.answer_markdown, &snippet_tuples, opts.max_claims);

    let raw_completion = gateway
        .generate(
            ModelAlias::Verify,
            LlmRequest::with_prompt(prompt.system, prompt.user),
            cancel.clone(),
        )
        .await?;

    let parsed = match json_extract::extract_json_object(&raw_completion) {
        Some(value) => serde_json::from_value::<RawVerifyResponse>(value).unwrap_or_else(|e| {
            warn!(error = %e, "verify completion did not match expected schema, dropping claims");
            RawVerifyResponse { claims: Vec::new() }
        }),
        None => {
            warn!("verify completion was not parseable JSON, dropping claims");
            RawVerifyResponse { claims: Vec::new() }
        }
    };

    let mut claims: Vec<VerifiedClaim> = Vec::new();
    for raw in parsed.claims.into_iter().take(opts.max_claims) {
        if raw.text.trim().is_empty() {
            continue;
        }
        let mut evidence = Vec::new();
        for raw_ev in raw.evidence {
            if raw_ev.quote.trim().is_empty() {
                continue;
            }
            let key = (raw_ev.source_id.clone(), raw_ev.chunk_id.clone());
            if !valid_refs.contains(&key) {
                continue;
            }
            let (char_start, char_end) = if opts.bind_offsets {
                chunk_text
                    .get(&key)
                    .and_then(|text| find_quote_offsets(text, &raw_ev.quote, QuoteMatchOptions::default()))
                    .map(|span| (Some(span.start as i64), Some(span.end as i64)))
                    .unwrap_or((None, None))
            } else {
                (None, None)
            };
            evidence.push(VerifiedEvidence {
                source_id: raw_ev.source_id,
                chunk_id: raw_ev.chunk_id,
                quote: raw_ev.quote,
                char_start,
                char_end,
            });
        }
        if evidence.is_empty() {
            continue;
        }
        let support_score = raw.support_score.unwrap_or(0.5).clamp(0.0, 1.0);
        claims.push(VerifiedClaim {
            text: raw.text,
            claim_type: raw.claim_type,
            support_score,
            contradicted: raw.contradicted,
            uncertainty_reason: raw.uncertainty_reason,
            evidence,
        });
    }

    if opts.nli_contradiction_check {
        for claim in &mut claims {
            run_nli_check(gateway, claim, opts.nli_max_pairs_per_claim, cancel.clone()).await?;
        }
    }

    Ok(claims)
}

/// Compares evidence quotes from distinct sources on the same claim,
/// pairwise up to `max_pairs`. Any "contradict" verdict marks the claim
/// contradicted and knocks 0.15 off its support score.
async fn run_nli_check(
    gateway: &LlmGateway,
    claim: &mut VerifiedClaim,
    max_pairs: usize,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let mut pairs = Vec::new();
    for i in 0..claim.evidence.len() {
        for j in (i + 1)..claim.evidence.len() {
            if claim.evidence[i].source_id != claim.evidence[j].source_id {
                pairs.push((i, j));
            }
        }
    }
    pairs.truncate(max_pairs);
    if pairs.is_empty() {
        return Ok(());
    }

    for (i, j) in pairs {
        let prompt = nli_prompt(&claim.text, &claim.evidence[i].quote, &claim.evidence[j].quote);
        let raw_completion = match gateway
            .generate(
                ModelAlias::Verify,
                LlmRequest::with_prompt(prompt.system, prompt.user),
                cancel.clone(),
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "NLI check call failed, skipping pair");
                continue;
            }
        };

        let label = json_extract::extract_json_object(&raw_completion)
            .and_then(|v| serde_json::from_value::<RawNliResponse>(v).ok())
            .map(|r| r.label);

        if let Some(label) = label {
            if label.eq_ignore_ascii_case("contradict") {
                claim.contradicted = true;
                claim.support_score = (claim.support_score - 0.15).clamp(0.0, 1.0);
                if claim.uncertainty_reason.is_none() {
                    claim.uncertainty_reason =
                        Some("conflicting evidence across sources".to_string());
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(source_id: &str, chunk_id: &str, text: &str) -> SnippetRef {
        SnippetRef {
            source_id: source_id.to_string(),
            chunk_id: Some(chunk_id.to_string()),
            text: text.to_string(),
        }
    }

    #[test]
    fn verify_options_default_matches_spec_limits() {
        let opts = VerifyOptions::default();
        assert_eq!(opts.max_claims, 12);
        assert!(opts.bind_offsets);
        assert_eq!(opts.nli_max_pairs_per_claim, 2);
    }

    #[tokio::test]
    async fn verify_returns_empty_for_empty_snippets() {
        let input = VerifyInput {
            answer_markdown: "The sky is blue [1].".to_string(),
            snippets: Vec::new(),
        };
        // No gateway call should happen; construct one that would panic if
        // dialed out to, but since snippets are empty we short-circuit.
        let models = verity_llm::gateway::ModelConfig::default();
        let gateway = LlmGateway::new("test-key", "http://127.0.0.1:1", models);
        let result = verify(&gateway, input, VerifyOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn dangling_evidence_reference_is_filtered_by_valid_ref_set() {
        let snippets = vec![snippet("src-1", "chunk-1", "Marie Curie discovered radium.")];
        let valid_refs: HashSet<(String, Option<String>)> = snippets
            .iter()
            .map(|s| (s.source_id.clone(), s.chunk_id.clone()))
            .collect();
        let dangling = ("src-2".to_string(), Some("chunk-9".to_string()));
        assert!(!valid_refs.contains(&dangling));
    }

    #[test]
    fn offsets_bind_against_chunk_text_when_quote_present() {
        let text = "Marie Curie discovered radium in 1898.";
        let span = find_quote_offsets(text, "discovered radium", QuoteMatchOptions::default());
        assert!(span.is_some());
    }

    #[test]
    fn nli_pairs_only_span_distinct_sources() {
        let evidence = vec![
            VerifiedEvidence {
                source_id: "a".into(),
                chunk_id: None,
                quote: "x".into(),
                char_start: None,
                char_end: None,
            },
            VerifiedEvidence {
                source_id: "a".into(),
                chunk_id: None,
                quote: "y".into(),
                char_start: None,
                char_end: None,
            },
            VerifiedEvidence {
                source_id: "b".into(),
                chunk_id: None,
                quote: "z".into(),
                char_start: None,
                char_end: None,
            },
        ];
        let mut pairs = Vec::new();
        for i in 0..evidence.len() {
            for j in (i + 1)..evidence.len() {
                if evidence[i].source_id != evidence[j].source_id {
                    pairs.push((i, j));
                }
            }
        }
        assert_eq!(pairs, vec![(0, 2), (1, 2)]);
    }
}
