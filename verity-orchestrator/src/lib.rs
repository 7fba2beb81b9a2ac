//! Drives one research run end-to-end: creates the thread, persists the
//! user message, runs the seven pipeline stages in order over
//! `ResearchRunMachine`, and guarantees exactly one terminal `done`/`error`
//! event

pub mod config;
pub mod context;
pub mod events;
pub mod stages;
pub mod state;

use tracing::{instrument, warn};
use verity_common::error::AppError;

use crate::context::{Collaborators, RunContext, RunRequest};
use crate::events::RunEvent;

/// Runs one research run to completion, emitting every `RunEvent` through
/// `ctx.events` as it goes. Always emits exactly one of `Done`/`Error`,
/// unless the run was cancelled before either could be sent -
/// cancellation semantics, a cancelled run emits no further application
/// events at all.
#[instrument(skip(collaborators, config), fields(question = %request.question))]
pub async fn run(
    request: RunRequest,
    config: config::OrchestratorConfig,
    collaborators: Collaborators,
    events: tokio::sync::mpsc::Sender<RunEvent>,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<String, AppError> {
    let now = chrono::Utc::now().timestamp_millis();
    let thread = collaborators
        .db
        .create_thread(Some(title_from_question(&request.question)), request.visitor_id.clone(), now)
        .await?;
    let user_message = collaborators
        .db
        .insert_message(
            thread.id.clone(),
            verity_storage::types::MessageRole::User,
            request.question.clone(),
            now,
        )
        .await?;

    let mut ctx = RunContext {
        request,
        config,
        collaborators,
        events,
        cancel: cancel.clone(),
        thread_id: thread.id.clone(),
        user_message_id: user_message.id,
        assistant_message_id: String::new(),
        subqueries: Vec::new(),
        unique_urls: Vec::new(),
        ingested_source_ids: Vec::new(),
        ranked_hits: Vec::new(),
        answer_text: String::new(),
        cited_chunks: Vec::new(),
        answer_hit_budget_error: false,
    };

    let result = run_stages(&mut ctx).await;

    if cancel.is_cancelled() {
        // No further application events per §5; the caller's writer closes
        // on its own once the connection tears down.
        return Err(AppError::Cancelled);
    }

    match result {
        Ok(()) => Ok(ctx.thread_id),
        Err(err) => {
            warn!(error = %err, "research run failed");
            ctx.emit(RunEvent::Error { message: err.to_string() }).await;
            Err(err)
        }
    }
}

async fn run_stages(ctx: &mut RunContext) -> Result<(), AppError> {
    let machine = state::ready();
    let machine = stages::plan(machine, ctx).await?;
    let machine = stages::search(machine, ctx).await?;
    let machine = stages::read(machine, ctx).await?;
    let machine = stages::rank(machine, ctx).await?;
    let machine = stages::answer(machine, ctx).await?;
    let machine = stages::verify(machine, ctx).await?;
    stages::finish(machine, ctx).await
}

/// Derives a short thread title from the question, for display in a
/// thread list; truncated to a sane length rather than the full question.
fn title_from_question(question: &str) -> String {
    const MAX_LEN: usize = 120;
    let trimmed = question.trim();
    if trimmed.chars().count() <= MAX_LEN {
        trimmed.to_string()
    } else {
        let truncated: String = trimmed.chars().take(MAX_LEN).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_truncates_long_questions() {
        let question = "a".repeat(200);
        let title = title_from_question(&question);
        assert!(title.ends_with("..."));
        assert!(title.len() < question.len());
    }

    #[test]
    fn title_keeps_short_questions_verbatim() {
        assert_eq!(title_from_question("  What is Rust?  "), "What is Rust?");
    }
}
