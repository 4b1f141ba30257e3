//! Hosted chat-completion providers used for query understanding.

use anyhow::Result;

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::{OpenAiProvider, GITHUB_MODELS_BASE_URL, OPENAI_BASE_URL};

/// Trait implemented by concrete LLM providers.
pub trait LlmProvider: Send + Sync {
    /// Sends one system + user exchange and returns the assistant text.
    fn complete(&self, request: &LlmRequest<'_>) -> Result<String>;
}

/// Request envelope shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmRequest<'a> {
    /// Instruction placed in the system slot.
    pub system: &'a str,
    /// User turn.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: usize,
}
