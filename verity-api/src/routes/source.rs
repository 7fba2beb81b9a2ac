//! `GET /source/:id`: source metadata plus optional content snippet and
//! chunk previews.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use verity_common::text::{char_len, char_slice};
use verity_storage::types::{Chunk, Source};

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Deserialize)]
pub struct SourceQueryParams {
    #[serde(default)]
    include: Option<String>,
    #[serde(default)]
    chunk_limit: Option<usize>,
    #[serde(default)]
    snippet_chars: Option<usize>,
    #[serde(default)]
    full_content: Option<u8>,
}

#[derive(Serialize)]
pub struct ChunkPreview {
    id: String,
    pos: i64,
    #[serde(rename = "charStart")]
    char_start: i64,
    #[serde(rename = "charEnd")]
    char_end: i64,
    tokens: i64,
    snippet: String,
}

#[derive(Serialize)]
pub struct ContentPreview {
    text: String,
    truncated: bool,
    html: Option<String>,
}

#[derive(Serialize)]
pub struct SourceResponse {
    #[serde(flatten)]
    source: Source,
    content: Option<ContentPreview>,
    chunks: Option<Vec<ChunkPreview>>,
}

pub async fn get_source(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<SourceQueryParams>,
) -> Result<Json<SourceResponse>, ApiError> {
    let source = state
        .db
        .get_source_by_id(id.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("source {id} not found")))?;

    let include: Vec<&str> = params.include.as_deref().unwrap_or("").split(',').collect();
    let want_content = include.contains(&"content");
    let want_chunks = include.contains(&"chunks");

    let content = if want_content {
        match state.db.get_source_content(id.clone()).await? {
            Some(row) => {
                let snippet_chars = params.snippet_chars.unwrap_or(500).clamp(100, 8000);
                let full = params.full_content.unwrap_or(0) == 1;
                let len = char_len(&row.text);
                let (text, truncated) = if full || len <= snippet_chars {
                    (row.text.clone(), false)
                } else {
                    (char_slice(&row.text, 0, snippet_chars).to_string(), true)
                };
                Some(ContentPreview { text, truncated, html: row.html })
            }
            None => None,
        }
    } else {
        None
    };

    let chunks = if want_chunks {
        let limit = params.chunk_limit.unwrap_or(20).clamp(1, 50);
        let all: Vec<Chunk> = state.db.list_chunks_by_source(id).await?;
        Some(
            all.into_iter()
                .take(limit)
                .map(|c| ChunkPreview {
                    id: c.id,
                    pos: c.pos,
                    char_start: c.char_start,
                    char_end: c.char_end,
                    tokens: c.tokens,
                    snippet: char_slice(&c.text, 0, char_len(&c.text).min(240)).to_string(),
                })
                .collect(),
        )
    } else {
        None
    };

    Ok(Json(SourceResponse { source, content, chunks }))
}
