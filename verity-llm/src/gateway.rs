//! Unified streaming/non-streaming LLM interface built on `async-openai`,
//! with four aliased model presets (plan/answer/verify/reasoning) plus a
//! streaming path.

use std::pin::Pin;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use verity_common::error::AppError;

/// Which preset this call should use. Aliases map to concrete model
/// identifiers via `ModelConfig`; the identifiers themselves are provider
/// configuration, not part of this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelAlias {
    Plan,
    Answer,
    Verify,
    Reasoning,
}

#[derive(Clone, Debug)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Concrete model identifiers behind each alias, loaded from configuration.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub plan_model: String,
    pub answer_model: String,
    pub verify_model: String,
    pub reasoning_model: String,
}

impl ModelConfig {
    fn resolve(&self, alias: ModelAlias) -> &str {
        match alias {
            ModelAlias::Plan => &self.plan_model,
            ModelAlias::Answer => &self.answer_model,
            ModelAlias::Verify => &self.verify_model,
            ModelAlias::Reasoning => &self.reasoning_model,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            plan_model: "gpt-4o-mini".to_string(),
            answer_model: "gpt-4o-mini".to_string(),
            verify_model: "gpt-4o-mini".to_string(),
            reasoning_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Request accepted by both `generate` and `stream`. `system` plus either
/// `prompt` (a single user turn) or `messages` (multi-turn) build the
/// final request; `messages` wins if both are set.
#[derive(Clone, Debug, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: Option<String>,
    pub messages: Vec<ChatTurn>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Forces `response_format: json_object`; set automatically for the
    /// `verify` alias preset but overridable.
    pub json_mode: bool,
}

impl LlmRequest {
    pub fn with_prompt(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }
}

/// Per-alias defaults: plan/verify are deterministic,
/// answer streams at low temperature, reasoning runs low-temperature with
/// (when the provider supports it) a hidden chain of thought.
fn preset_defaults(alias: ModelAlias) -> (f32, bool) {
    match alias {
        ModelAlias::Plan => (0.0, false),
        ModelAlias::Answer => (0.2, true),
        ModelAlias::Verify => (0.0, false),
        ModelAlias::Reasoning => (0.2, false),
    }
}

pub struct LlmGateway {
    client: Client<OpenAIConfig>,
    models: ModelConfig,
}

impl LlmGateway {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, models: ModelConfig) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key).with_api_base(base_url);
        Self {
            client: Client::with_config(config),
            models,
        }
    }

    fn build_messages(req: &LlmRequest) -> Result<Vec<ChatCompletionRequestMessage>, AppError> {
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system.clone())
                    .build()
                    .map_err(|e| AppError::Llm(e.to_string()))?
                    .into(),
            );
        }
        if !req.messages.is_empty() {
            for turn in &req.messages {
                let message = match turn.role {
                    ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(turn.content.clone())
                        .build()
                        .map_err(|e| AppError::Llm(e.to_string()))?
                        .into(),
                    ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.content.clone())
                        .build()
                        .map_err(|e| AppError::Llm(e.to_string()))?
                        .into(),
                    ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.content.clone())
                        .build()
                        .map_err(|e| AppError::Llm(e.to_string()))?
                        .into(),
                };
                messages.push(message);
            }
        } else if let Some(prompt) = &req.prompt {
            messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.clone())
                    .build()
                    .map_err(|e| AppError::Llm(e.to_string()))?
                    .into(),
            );
        }
        if messages.is_empty() {
            return Err(AppError::Validation("LLM request has neither prompt nor messages".into()));
        }
        Ok(messages)
    }

    /// Single non-streaming completion.
    pub async fn generate(
        &self,
        alias: ModelAlias,
        req: LlmRequest,
        cancel: CancellationToken,
    ) -> Result<String, AppError> {
        let (default_temp, _) = preset_defaults(alias);
        let messages = Self::build_messages(&req)?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(self.models.resolve(alias))
            .messages(messages)
            .temperature(req.temperature.unwrap_or(default_temp));
        if let Some(max_tokens) = req.max_output_tokens {
            builder.max_tokens(max_tokens);
        }
        if req.json_mode || matches!(alias, ModelAlias::Verify) {
            builder.response_format(ResponseFormat::JsonObject);
        }
        let request = builder.build().map_err(|e| AppError::Llm(e.to_string()))?;

        let response = tokio::select! {
            res = self.client.chat().create(request) => res.map_err(classify_openai_error)?,
            () = cancel.cancelled() => return Err(AppError::Cancelled),
        };

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LlmParsing("LLM response had no content".into()))
    }

    /// Streams text deltas. Cancellation drops the stream; the caller sees
    /// no further items after that point.
    pub async fn stream(
        &self,
        alias: ModelAlias,
        req: LlmRequest,
        cancel: CancellationToken,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>, AppError> {
        let (default_temp, _) = preset_defaults(alias);
        let messages = Self::build_messages(&req)?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(self.models.resolve(alias))
            .messages(messages)
            .temperature(req.temperature.unwrap_or(default_temp))
            .stream(true);
        if let Some(max_tokens) = req.max_output_tokens {
            builder.max_tokens(max_tokens);
        }
        let request = builder.build().map_err(|e| AppError::Llm(e.to_string()))?;

        let raw_stream = tokio::select! {
            res = self.client.chat().create_stream(request) => res.map_err(classify_openai_error)?,
            () = cancel.cancelled() => return Err(AppError::Cancelled),
        };

        let cancel_for_stream = cancel.clone();
        let mapped = raw_stream.take_while(move |_| {
            let cancelled = cancel_for_stream.is_cancelled();
            async move { !cancelled }
        }).map(|item| {
            item.map_err(classify_openai_error).map(|response| {
                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .unwrap_or_default()
            })
        }).filter(|item| {
            let keep = !matches!(item, Ok(s) if s.is_empty());
            async move { keep }
        });

        Ok(Box::pin(mapped))
    }
}

/// Classifies provider errors so the orchestrator can pattern-match on
/// `AppError::LlmBudgetExceeded` for its budget-recovery branch (spec
/// §4.10 step 5, §7) versus a generic `AppError::Llm` surfaced straight
/// to the caller.
fn classify_openai_error(err: OpenAIError) -> AppError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    match &err {
        OpenAIError::Reqwest(reqwest_err) if reqwest_err.is_timeout() => {
            AppError::Timeout(std::time::Duration::from_millis(0))
        }
        OpenAIError::Reqwest(_) => AppError::UpstreamTransient(message),
        _ if lower.contains("rate limit")
            || lower.contains("rate_limit")
            || lower.contains("context_length")
            || lower.contains("maximum context length")
            || lower.contains("too large")
            || lower.contains("tokens per min") =>
        {
            AppError::LlmBudgetExceeded(message)
        }
        other => {
            warn!(error = %other, "unclassified LLM provider error");
            AppError::Llm(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_defaults_match_spec_temperatures() {
        assert_eq!(preset_defaults(ModelAlias::Plan).0, 0.0);
        assert_eq!(preset_defaults(ModelAlias::Answer).0, 0.2);
        assert_eq!(preset_defaults(ModelAlias::Verify).0, 0.0);
        assert!(preset_defaults(ModelAlias::Answer).1);
    }

    #[test]
    fn build_messages_requires_some_content() {
        let req = LlmRequest::default();
        let result = LlmGateway::build_messages(&req);
        assert!(result.is_err());
    }

    #[test]
    fn build_messages_accepts_system_plus_prompt() {
        let req = LlmRequest::with_prompt("system text", "user text");
        let messages = LlmGateway::build_messages(&req).unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn resolves_model_per_alias() {
        let models = ModelConfig {
            plan_model: "plan-model".into(),
            answer_model: "answer-model".into(),
            verify_model: "verify-model".into(),
            reasoning_model: "reasoning-model".into(),
        };
        assert_eq!(models.resolve(ModelAlias::Plan), "plan-model");
        assert_eq!(models.resolve(ModelAlias::Verify), "verify-model");
    }
}
