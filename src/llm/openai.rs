use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{LlmProvider, LlmRequest};

/// Default OpenAI API root.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// OpenAI-compatible inference endpoint that accepts a GitHub token.
pub const GITHUB_MODELS_BASE_URL: &str = "https://models.inference.ai.azure.com";

/// Chat completions client for OpenAI-compatible endpoints.
pub struct OpenAiProvider {
    endpoint: String,
    model: String,
    client: Client,
}

impl OpenAiProvider {
    /// Builds a client against `base_url` (e.g. [`OPENAI_BASE_URL`]).
    pub fn new(api_key: String, base_url: &str, model: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing chat completion API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing chat model name");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
            client,
        })
    }

    /// Full chat completions URL this client posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl LlmProvider for OpenAiProvider {
    fn complete(&self, request: &LlmRequest<'_>) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .context("failed to call chat completions")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("chat completions returned {}: {}", status, text);
        }
        let parsed: ChatResponse = resp
            .json()
            .context("failed to parse chat completions response")?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .context("chat completions response missing message content")
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
