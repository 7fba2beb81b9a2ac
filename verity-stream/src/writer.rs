//! Server-side half of the protocol: a backpressured writer plus the glue
//! that turns its frames into an axum SSE response, built the way the
//! teacher's `html_router::routes::chat::message_response_stream` builds
//! its `EventStream`/`SseResponse` and `sse_with_keep_alive` helper.

use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream};
use axum::response::Sse;
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc::{channel, Receiver, Sender};

use verity_common::error::AppError;

/// Default heartbeat comment interval: every 20s, tunable.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 20;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, axum::Error>> + Send>>;
pub type SseResponse = Sse<KeepAliveStream<EventStream>>;

/// One outgoing frame. Event names are the system's fixed vocabulary:
/// `progress`, `token`, `sources`, `answer`, `claims`, `error`, `done`.
/// `token` frames carry a raw string delta (`raw = true`); every other
/// named event carries a JSON-encoded payload.
#[derive(Clone, Debug)]
pub struct SseFrame {
    pub event: Option<&'static str>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
    pub raw: bool,
}

impl SseFrame {
    fn comment(text: impl Into<String>) -> Self {
        Self {
            event: None,
            data: text.into(),
            id: None,
            retry: None,
            raw: true,
        }
    }
}

/// Optional per-send fields beyond `event`/`data`, per the writer contract
/// `send(data, {event,id,retry,raw})`.
#[derive(Clone, Debug, Default)]
pub struct SendOpts {
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// Sends SSE frames to a single subscriber over a capacity-1 channel, so a
/// slow client's backpressure propagates all the way to the producer
/// instead of the server buffering unbounded LLM deltas in memory (spec
/// §5: "the server must not buffer more than one LLM delta at a time").
#[derive(Clone)]
pub struct SseWriter {
    tx: Sender<SseFrame>,
}

impl SseWriter {
    /// Builds a writer/receiver pair; the receiver becomes the HTTP
    /// response body via [`into_sse_response`].
    pub fn channel() -> (Self, Receiver<SseFrame>) {
        let (tx, rx) = channel(1);
        (Self { tx }, rx)
    }

    /// Sends a named event whose data is the JSON encoding of `payload`.
    pub async fn send(&self, event: &'static str, payload: &impl Serialize) -> Result<(), AppError> {
        self.send_with(event, payload, SendOpts::default()).await
    }

    /// Like [`send`](Self::send) but with an explicit `id`/`retry`.
    pub async fn send_with(
        &self,
        event: &'static str,
        payload: &impl Serialize,
        opts: SendOpts,
    ) -> Result<(), AppError> {
        let data = serde_json::to_string(payload)?;
        self.send_frame(SseFrame {
            event: Some(event),
            data,
            id: opts.id,
            retry: opts.retry,
            raw: false,
        })
        .await;
        Ok(())
    }

    /// Sends a named event carrying an already-formed string, used for the
    /// `token` event (a raw delta, never JSON-wrapped).
    pub async fn send_raw(&self, event: &'static str, data: impl Into<String>) {
        self.send_frame(SseFrame {
            event: Some(event),
            data: data.into(),
            id: None,
            retry: None,
            raw: true,
        })
        .await;
    }

    /// Sends a bare SSE comment line (`: ...`).
    pub async fn comment(&self, text: impl Into<String>) {
        self.send_frame(SseFrame::comment(text)).await;
    }

    /// Convenience heartbeat comment; `axum`'s `KeepAlive` already injects
    /// its own idle-timeout comment, so callers rarely need this directly.
    pub async fn ping(&self) {
        self.comment("ping").await;
    }

    /// Drops the sender, ending the stream. `reason` is currently only for
    /// caller-side logging; the client learns the run ended from `done` or
    /// `error`, not from the connection closing.
    pub async fn close(self, reason: Option<&str>) {
        if let Some(reason) = reason {
            tracing::debug!(reason, "closing SSE writer");
        }
    }

    async fn send_frame(&self, frame: SseFrame) {
        let _ = self.tx.send(frame).await;
    }
}

fn frame_to_event(frame: SseFrame) -> Event {
    let mut event = Event::default();
    if let Some(name) = frame.event {
        event = event.event(name);
    }
    if let Some(id) = frame.id {
        event = event.id(id);
    }
    if let Some(retry) = frame.retry {
        event = event.retry(Duration::from_millis(retry));
    }
    event.data(frame.data)
}

/// Converts a stream of outgoing frames into the axum SSE response,
/// injecting a heartbeat comment on the given interval.
pub fn into_sse_response(rx: Receiver<SseFrame>, heartbeat: Duration) -> SseResponse {
    let frame_stream = stream! {
        let mut rx = rx;
        while let Some(frame) = rx.recv().await {
            yield Ok(frame_to_event(frame));
        }
    };
    Sse::new(Box::pin(frame_stream) as EventStream)
        .keep_alive(KeepAlive::new().interval(heartbeat).text("keep-alive"))
}

pub fn default_heartbeat() -> Duration {
    Duration::from_secs(DEFAULT_HEARTBEAT_SECS)
}

/// Cancels its token when dropped. Held inside the response body stream so
/// a client disconnect - which drops that stream without ever polling it
/// to completion - reaches the run's `CancellationToken`.
struct CancelOnDrop(tokio_util::sync::CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Like [`into_sse_response`], but cancels `cancel` as soon as the
/// response body stream is dropped rather than only at normal end of run.
pub fn into_sse_response_cancel_on_drop(
    rx: Receiver<SseFrame>,
    heartbeat: Duration,
    cancel: tokio_util::sync::CancellationToken,
) -> SseResponse {
    let frame_stream = stream! {
        let _guard = CancelOnDrop(cancel);
        let mut rx = rx;
        while let Some(frame) = rx.recv().await {
            yield Ok(frame_to_event(frame));
        }
    };
    Sse::new(Box::pin(frame_stream) as EventStream)
        .keep_alive(KeepAlive::new().interval(heartbeat).text("keep-alive"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_encodes_json_payload() {
        let (writer, mut rx) = SseWriter::channel();
        #[derive(Serialize)]
        struct Payload {
            thread_id: String,
        }
        writer
            .send("done", &Payload { thread_id: "t1".to_string() })
            .await
            .unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.event, Some("done"));
        assert_eq!(frame.data, r#"{"thread_id":"t1"}"#);
        assert!(!frame.raw);
    }

    #[tokio::test]
    async fn send_raw_carries_the_string_verbatim() {
        let (writer, mut rx) = SseWriter::channel();
        writer.send_raw("token", "partial answer").await;
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.event, Some("token"));
        assert_eq!(frame.data, "partial answer");
        assert!(frame.raw);
    }

    #[tokio::test]
    async fn comment_has_no_event_name() {
        let (writer, mut rx) = SseWriter::channel();
        writer.ping().await;
        let frame = rx.recv().await.unwrap();
        assert!(frame.event.is_none());
        assert_eq!(frame.data, "ping");
    }
}
