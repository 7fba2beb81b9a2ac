//! The application-level event vocabulary a run emits
//! `verity-stream`/`verity-api` translate these into SSE frames; this crate
//! only knows the typed payloads, not the wire format.

use serde::Serialize;
use verity_verify::VerifiedClaim;

#[derive(Clone, Debug, Serialize)]
pub struct SourceRef {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    pub domain: Option<String>,
    pub index: usize,
}

#[derive(Clone, Debug)]
pub enum RunEvent {
    Progress {
        stage: &'static str,
        message: Option<String>,
        meta: Option<serde_json::Value>,
    },
    Sources(Vec<SourceRef>),
    Token(String),
    Answer {
        text: String,
    },
    Claims {
        claims: Vec<VerifiedClaim>,
    },
    Error {
        message: String,
    },
    Done {
        thread_id: String,
    },
}

impl RunEvent {
    pub fn progress(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Progress {
            stage,
            message: Some(message.into()),
            meta: None,
        }
    }
}
