//! Unified LLM gateway (streaming + non-streaming, model aliases) and
//! prompt builders for the plan/answer/verify/NLI/source-trust tasks.

pub mod gateway;
pub mod prompts;

pub use gateway::{ChatRole, ChatTurn, LlmGateway, LlmRequest, ModelAlias, ModelConfig};
