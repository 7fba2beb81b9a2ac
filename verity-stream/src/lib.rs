//! SSE protocol encoder/decoder for `POST /research`.
//!
//! Server side is built on `axum::response::sse`, with one named frame per
//! `progress`/`token`/`sources`/`answer`/`claims`/`error`/`done` event.
//! Client side (the decoder) is a line-accumulating parser matched to the
//! wire format the writer emits below.

pub mod client;
pub mod writer;

pub use client::{SseClientEvent, SseDecoded, SseDecoder, StreamWatchdog};
pub use writer::{
    default_heartbeat, into_sse_response, into_sse_response_cancel_on_drop, EventStream, SendOpts,
    SseFrame, SseResponse, SseWriter,
};

use serde::Serialize;
use verity_orchestrator::events::RunEvent;

/// Drains `rx` and writes each `RunEvent` to `writer` as the matching named
/// SSE frame, until the orchestrator drops its sender (normal end of run).
/// `verity-api` spawns the orchestrator's `run()` future and this forwarder
/// concurrently, bridging the typed event channel to the wire protocol.
pub async fn forward_run_events(mut rx: tokio::sync::mpsc::Receiver<RunEvent>, writer: &SseWriter) {
    while let Some(event) = rx.recv().await {
        let result = match event {
            RunEvent::Progress { stage, message, meta } => {
                writer
                    .send("progress", &ProgressPayload { stage, message, meta })
                    .await
            }
            RunEvent::Sources(sources) => writer.send("sources", &sources).await,
            RunEvent::Token(delta) => {
                writer.send_raw("token", delta).await;
                Ok(())
            }
            RunEvent::Answer { text } => writer.send("answer", &AnswerPayload { text }).await,
            RunEvent::Claims { claims } => writer.send("claims", &ClaimsPayload { claims }).await,
            RunEvent::Error { message } => writer.send("error", &ErrorPayload { message }).await,
            RunEvent::Done { thread_id } => writer.send("done", &DonePayload { thread_id }).await,
        };
        if result.is_err() {
            tracing::warn!("failed to encode SSE frame, dropping event");
        }
    }
}

#[derive(Serialize)]
struct ProgressPayload {
    stage: &'static str,
    message: Option<String>,
    meta: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct AnswerPayload {
    text: String,
}

#[derive(Serialize)]
struct ClaimsPayload {
    claims: Vec<verity_verify::VerifiedClaim>,
}

#[derive(Serialize)]
struct ErrorPayload {
    message: String,
}

#[derive(Serialize)]
struct DonePayload {
    #[serde(rename = "threadId")]
    thread_id: String,
}
