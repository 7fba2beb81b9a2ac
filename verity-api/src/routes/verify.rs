//! `POST /verify`: runs claim extraction and offset binding against a
//! caller-supplied set of snippets, outside of any orchestrated run (spec
//! §6).

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use verity_verify::{verify as run_verify, SnippetRef, VerifiedClaim, VerifyInput, VerifyOptions};

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetBody {
    source_id: String,
    #[serde(default)]
    chunk_id: Option<String>,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequestBody {
    answer_markdown: String,
    snippets: Vec<SnippetBody>,
    #[serde(default)]
    max_claims: Option<usize>,
    #[serde(default = "default_true")]
    bind_offsets: bool,
    #[serde(default)]
    nli_contradiction_check: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct VerifyResponseBody {
    claims: Vec<VerifiedClaim>,
}

pub async fn verify(
    State(state): State<ApiState>,
    Json(body): Json<VerifyRequestBody>,
) -> Result<Json<VerifyResponseBody>, ApiError> {
    let input = VerifyInput {
        answer_markdown: body.answer_markdown,
        snippets: body
            .snippets
            .into_iter()
            .map(|s| SnippetRef {
                source_id: s.source_id,
                chunk_id: s.chunk_id,
                text: s.text,
            })
            .collect(),
    };

    let mut opts = VerifyOptions {
        bind_offsets: body.bind_offsets,
        nli_contradiction_check: body.nli_contradiction_check,
        ..VerifyOptions::default()
    };
    if let Some(max_claims) = body.max_claims {
        opts.max_claims = max_claims;
    }

    let claims = run_verify(&state.llm, input, opts, CancellationToken::new()).await?;

    Ok(Json(VerifyResponseBody { claims }))
}
