//! `POST /ingest`: ingests up to 32 URLs through a bounded pool (spec
//! §4.5, §6).

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use verity_common::concurrency::map_limit;
use verity_ingest::{IngestOptions, IngestOutcome, DEFAULT_CONCURRENCY};

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequestBody {
    urls: Vec<String>,
    #[serde(default = "default_immediate")]
    immediate: bool,
    #[serde(default)]
    priority: i64,
}

fn default_immediate() -> bool {
    true
}

#[derive(Serialize)]
pub struct IngestResponseBody {
    results: Vec<IngestOutcome>,
    #[serde(rename = "sourceIds")]
    source_ids: Vec<String>,
}

pub async fn ingest(
    State(state): State<ApiState>,
    Json(body): Json<IngestRequestBody>,
) -> Result<Json<IngestResponseBody>, ApiError> {
    if body.urls.is_empty() || body.urls.len() > 32 {
        return Err(ApiError::Validation(
            "urls must contain between 1 and 32 entries".to_string(),
        ));
    }
    if !(-10..=10).contains(&body.priority) {
        return Err(ApiError::Validation("priority must be within [-10,10]".to_string()));
    }

    let opts = IngestOptions {
        immediate: body.immediate,
        priority: body.priority,
    };

    let ingestor = state.ingestor.clone();
    let results = map_limit(body.urls, DEFAULT_CONCURRENCY, move |url| {
        let ingestor = ingestor.clone();
        let opts = opts.clone();
        async move {
            match ingestor.ingest(&url, opts, CancellationToken::new()).await {
                Ok(outcome) => outcome,
                Err(err) => IngestOutcome {
                    url,
                    status: verity_ingest::IngestStatus::Error,
                    source_id: None,
                    message: Some(err.to_string()),
                },
            }
        }
    })
    .await;

    let source_ids = results.iter().filter_map(|r| r.source_id.clone()).collect();

    Ok(Json(IngestResponseBody { results, source_ids }))
}
