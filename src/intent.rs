//! Structured hiring intent extracted from a free-text query by a hosted LLM.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::{LlmProvider, LlmRequest};

const SYSTEM_PROMPT: &str = "You extract structured hiring intent.";
const MAX_COMPLETION_TOKENS: usize = 512;

/// Seniority level mentioned in the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    /// Graduate / junior roles.
    Entry,
    /// Mid-level roles.
    Mid,
    /// Senior, lead and principal roles.
    Senior,
    /// Not stated or not recognized.
    #[default]
    Unknown,
}

impl Seniority {
    /// Lenient parse: anything unrecognized is [`Seniority::Unknown`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "entry" => Self::Entry,
            "mid" => Self::Mid,
            "senior" => Self::Senior,
            _ => Self::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for Seniority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Entry => "entry",
            Self::Mid => "mid",
            Self::Senior => "senior",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Fields pulled out of a hiring query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Hard skills, tools and languages.
    #[serde(default)]
    pub technical_skills: Vec<String>,
    /// Soft skills and personality traits.
    #[serde(default)]
    pub behavioral_skills: Vec<String>,
    /// Role titles and domain keywords.
    #[serde(default)]
    pub role_keywords: Vec<String>,
    /// Requested seniority.
    #[serde(default)]
    pub seniority: Seniority,
}

impl Intent {
    /// Empty intent used whenever extraction fails.
    pub fn fallback() -> Self {
        Self::default()
    }

    /// Whether any behavioral skill was extracted.
    pub fn has_behavioral(&self) -> bool {
        !self.behavioral_skills.is_empty()
    }
}

/// Turns queries into [`Intent`] records through an [`LlmProvider`].
#[derive(Clone)]
pub struct IntentExtractor {
    provider: Arc<dyn LlmProvider>,
}

impl IntentExtractor {
    /// Wraps a provider.
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Extracts intent; any failure yields [`Intent::fallback`]. Blocking.
    pub fn extract(&self, query: &str) -> Intent {
        match self.try_extract(query) {
            Ok(intent) => {
                debug!(?intent, "extracted query intent");
                intent
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "intent extraction failed; using empty intent");
                Intent::fallback()
            }
        }
    }

    fn try_extract(&self, query: &str) -> Result<Intent> {
        let prompt = build_prompt(query);
        let request = LlmRequest {
            system: SYSTEM_PROMPT,
            prompt: &prompt,
            temperature: 0.0,
            max_tokens: MAX_COMPLETION_TOKENS,
        };
        let content = self.provider.complete(&request)?;
        parse_intent(&content)
    }
}

/// Instruction prompt sent as the user turn.
pub fn build_prompt(query: &str) -> String {
    format!(
        "You are an assistant helping recommend hiring assessments.\n\n\
         Extract structured intent from the input.\n\n\
         Return ONLY valid JSON with:\n\
         - technical_skills: list of strings\n\
         - behavioral_skills: list of strings\n\
         - role_keywords: list of strings\n\
         - seniority: one of [entry, mid, senior, unknown]\n\n\
         Rules:\n\
         - Do not hallucinate skills\n\
         - Be concise\n\
         - If not mentioned, return empty lists\n\n\
         Input:\n{query}\n"
    )
}

/// Parses the model reply, tolerating a surrounding Markdown code fence.
pub fn parse_intent(content: &str) -> Result<Intent> {
    let body = strip_code_fence(content);
    serde_json::from_str(body).context("model reply is not a valid intent JSON object")
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.split_once('\n') {
        Some((tag, body)) if !tag.trim_start().starts_with('{') => body,
        _ => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
