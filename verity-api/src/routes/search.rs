//! `POST /search`: a single search-adapter call, exposed directly for
//! callers that want to drive their own ranking/ingestion.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use verity_search::types::{SearchOptions, SearchResult, TimeRange};

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequestBody {
    query: String,
    #[serde(default)]
    size: Option<usize>,
    #[serde(default)]
    time_range: Option<TimeRange>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    allowed_domains: Option<Vec<String>>,
    #[serde(default)]
    disallowed_domains: Option<Vec<String>>,
    #[serde(default)]
    thread_id: Option<String>,
}

pub async fn search(
    State(state): State<ApiState>,
    Json(body): Json<SearchRequestBody>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    if body.query.trim().chars().count() < 2 {
        return Err(ApiError::Validation("query must be at least 2 characters".to_string()));
    }

    let mut opts = SearchOptions {
        timeout_ms: state.config.request_timeout_ms,
        ..SearchOptions::default()
    };
    if let Some(size) = body.size {
        opts.size = size;
    }
    opts.time_range = body.time_range;
    opts.region = body.region;
    opts.allowed_domains = body.allowed_domains.unwrap_or_default();
    opts.disallowed_domains = body.disallowed_domains.unwrap_or_default();

    let results = state
        .search
        .search(&body.query, &opts, CancellationToken::new())
        .await?;

    let results_json = serde_json::to_string(&results).unwrap_or_default();
    let now = chrono::Utc::now().timestamp_millis();
    let _ = state
        .db
        .insert_search_event(body.thread_id, body.query, results_json, now)
        .await;

    Ok(Json(results))
}
