//! `POST /research`: streams one orchestrator run as Server-Sent Events -
//! spawn the producer, bridge it to an SSE body, return immediately.

use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use verity_orchestrator::config::{Depth, OrchestratorConfig};
use verity_orchestrator::context::RunRequest;
use verity_stream::{default_heartbeat, forward_run_events, into_sse_response_cancel_on_drop, SseWriter};

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Deserialize)]
struct TimeRangeBody {
    from: Option<String>,
    to: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    question: String,
    #[serde(default)]
    depth: Option<Depth>,
    #[serde(default)]
    time_range: Option<TimeRangeBody>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    allowed_domains: Option<Vec<String>>,
    #[serde(default)]
    disallowed_domains: Option<Vec<String>>,
}

/// Kicks off a research run in the background and returns the SSE body
/// bridging its event channel immediately; validation errors never reach
/// the orchestrator.
pub async fn research(
    State(state): State<ApiState>,
    Json(body): Json<ResearchRequest>,
) -> Result<Response, ApiError> {
    if body.question.trim().chars().count() < 8 {
        return Err(ApiError::Validation(
            "question must be at least 8 characters".to_string(),
        ));
    }

    let request = RunRequest {
        question: body.question,
        depth: body.depth.unwrap_or_default(),
        time_from: body.time_range.as_ref().and_then(|t| t.from.clone()),
        time_to: body.time_range.as_ref().and_then(|t| t.to.clone()),
        region: body.region,
        allowed_domains: body.allowed_domains.unwrap_or_default(),
        disallowed_domains: body.disallowed_domains.unwrap_or_default(),
        visitor_id: None,
    };

    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(8);
    let (writer, frame_rx) = SseWriter::channel();

    let config = OrchestratorConfig::from_app_config(&state.config);
    let collaborators = state.collaborators();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = verity_orchestrator::run(request, config, collaborators, events_tx, run_cancel).await;
    });
    tokio::spawn(async move {
        forward_run_events(events_rx, &writer).await;
        writer.close(None).await;
    });

    let mut response =
        into_sse_response_cancel_on_drop(frame_rx, default_heartbeat(), cancel).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_body_defaults_are_both_none() {
        let body: ResearchRequest =
            serde_json::from_str(r#"{"question":"what happened"}"#).unwrap();
        assert!(body.time_range.is_none());
        assert!(body.depth.is_none());
    }
}
