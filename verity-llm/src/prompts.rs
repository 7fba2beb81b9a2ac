//! `{system, user}` prompt builders for plan, answer, verify, NLI, and
//! source-trust tasks: a fixed system preamble plus a templated user body
//! per task.

use serde::Serialize;

#[derive(Clone, Debug)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const PLAN_SYSTEM: &str = r#"You are the planning stage of a research pipeline. Given a question \
and constraints, decompose it into focused web search subqueries. Respond with ONLY a JSON object \
matching this shape, no prose, no code fences:
{"intent": string, "subqueries": string[], "focus": string[], "constraints": object}
Subqueries must be concrete, independently searchable, and non-redundant."#;

#[derive(Serialize)]
struct PlanConstraints<'a> {
    depth: &'a str,
    max_subqueries: usize,
    time_range: Option<(&'a Option<String>, &'a Option<String>)>,
    region: Option<&'a str>,
    allowed_domains: &'a [String],
    disallowed_domains: &'a [String],
}

/// Builds the plan-stage prompt. `max_subqueries` is the depth-derived cap
/// (quick:3, normal:4, deep:6).
#[allow(clippy::too_many_arguments)]
pub fn plan_prompt(
    question: &str,
    depth: &str,
    max_subqueries: usize,
    time_from: &Option<String>,
    time_to: &Option<String>,
    region: Option<&str>,
    allowed_domains: &[String],
    disallowed_domains: &[String],
) -> Prompt {
    let constraints = PlanConstraints {
        depth,
        max_subqueries,
        time_range: Some((time_from, time_to)),
        region,
        allowed_domains,
        disallowed_domains,
    };
    let user = format!(
        "Question:\n{question}\n\nConstraints:\n{}",
        serde_json::to_string_pretty(&constraints).unwrap_or_default()
    );
    Prompt {
        system: PLAN_SYSTEM.to_string(),
        user,
    }
}

const ANSWER_SYSTEM: &str = r#"You are the answer stage of a research pipeline. Write a concise, \
accurate answer to the user's question using ONLY the numbered source snippets provided. Every \
factual sentence must carry an inline numeric citation like [1] or [2][3] that maps to the numbered \
sources list. Use markdown for structure (headings, lists) but never fabricate a bibliography \
section - the numbered citations ARE the bibliography. Do not speculate beyond what the snippets \
support. If the snippets do not answer the question, say so plainly."#;

#[derive(Serialize)]
struct AnswerSnippet<'a> {
    index: usize,
    source_id: &'a str,
    url: &'a str,
    text: &'a str,
}

/// Builds the answer-stage prompt from the budgeted, numbered snippet list.
pub fn answer_prompt(question: &str, snippets: &[(usize, String, String, String)]) -> Prompt {
    let rendered: Vec<AnswerSnippet> = snippets
        .iter()
        .map(|(index, source_id, url, text)| AnswerSnippet {
            index: *index,
            source_id,
            url,
            text,
        })
        .collect();
    let user = format!(
        "Question:\n{question}\n\nNumbered sources:\n{}",
        serde_json::to_string_pretty(&rendered).unwrap_or_default()
    );
    Prompt {
        system: ANSWER_SYSTEM.to_string(),
        user,
    }
}

const VERIFY_SYSTEM: &str = r#"You extract atomic, verifiable claims from an answer and bind each \
to verbatim evidence quotes. Respond with ONLY a JSON object, no prose, no code fences, matching:
{"claims": [{"text": string, "claimType": string|null, "supportScore": number in [0,1], \
"contradicted": boolean, "uncertaintyReason": string|null, "evidence": [{"sourceId": string, \
"chunkId": string|null, "quote": string}]}]}
Each claim must be a single atomic factual statement. Each evidence quote must be copied verbatim \
from the provided chunk text (not paraphrased) so it can be located by substring search."#;

#[derive(Serialize)]
struct VerifySnippet<'a> {
    source_id: &'a str,
    chunk_id: Option<&'a str>,
    text: &'a str,
}

/// Builds the verify-stage prompt. `max_claims` bounds how many claims the
/// model should extract.
pub fn verify_prompt(answer_markdown: &str, snippets: &[(String, Option<String>, String)], max_claims: usize) -> Prompt {
    let rendered: Vec<VerifySnippet> = snippets
        .iter()
        .map(|(source_id, chunk_id, text)| VerifySnippet {
            source_id,
            chunk_id: chunk_id.as_deref(),
            text,
        })
        .collect();
    let user = format!(
        "Extract at most {max_claims} claims.\n\nAnswer:\n{answer_markdown}\n\nSnippets:\n{}",
        serde_json::to_string_pretty(&rendered).unwrap_or_default()
    );
    Prompt {
        system: VERIFY_SYSTEM.to_string(),
        user,
    }
}

const NLI_SYSTEM: &str = r#"You perform natural language inference between two evidence quotes \
that both claim to support the same statement. Respond with ONLY a JSON object, no prose, no code \
fences, matching: {"label": "entail" | "contradict" | "neutral", "rationale": string}."#;

/// Builds an NLI check prompt comparing two evidence quotes cited in
/// support of the same claim.
pub fn nli_prompt(claim_text: &str, quote_a: &str, quote_b: &str) -> Prompt {
    let user = format!(
        "Claim:\n{claim_text}\n\nEvidence A:\n{quote_a}\n\nEvidence B:\n{quote_b}\n\nDo A and B \
agree, conflict, or say nothing about each other with respect to the claim?"
    );
    Prompt {
        system: NLI_SYSTEM.to_string(),
        user,
    }
}

const SOURCE_TRUST_SYSTEM: &str = r#"You assess how much an automated research pipeline should \
trust a web source for factual claims. Respond with ONLY a JSON object, no prose, no code fences, \
matching: {"trust": number in [0,1], "rationale": string}."#;

/// Builds a source-trust assessment prompt for a candidate domain/title.
pub fn source_trust_prompt(domain: &str, title: Option<&str>) -> Prompt {
    let user = format!(
        "Domain: {domain}\nTitle: {}",
        title.unwrap_or("(no title)")
    );
    Prompt {
        system: SOURCE_TRUST_SYSTEM.to_string(),
        user,
    }
}
