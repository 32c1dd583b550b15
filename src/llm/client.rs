//! Chat-completion client used by the translator
//!
//! Talks to either the Anthropic messages API or any OpenAI-compatible
//! chat endpoint, picked from the URL. The model only produces operation
//! JSON; it never touches the project API itself.

use crate::core::error::{SprintdeskError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Characters of an error body kept in the error message
const ERROR_BODY_LIMIT: usize = 200;

/// Anything that can answer a system + user prompt pair
#[async_trait]
pub trait Complete: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Wire dialect of the completion endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAiCompatible,
}

impl Provider {
    pub fn for_url(url: &str) -> Self {
        if url.contains("anthropic.com") {
            Self::Anthropic
        } else {
            Self::OpenAiCompatible
        }
    }
}

/// Connection and sampling settings
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl LlmSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.into(),
            model: DEFAULT_MODEL.into(),
            max_tokens: 4096,
            timeout_secs: 60,
        }
    }

    /// `LLM_API_KEY` (required), `LLM_API_URL` and `LLM_MODEL` (optional)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| SprintdeskError::LlmError("LLM_API_KEY not set".into()))?;
        let mut settings = Self::new(api_key);
        if let Ok(url) = std::env::var("LLM_API_URL") {
            settings.api_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            settings.model = model;
        }
        Ok(settings)
    }
}

pub struct LlmClient {
    http: Client,
    settings: LlmSettings,
    provider: Provider,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| SprintdeskError::LlmError(e.to_string()))?;
        Ok(Self {
            provider: Provider::for_url(&settings.api_url),
            http,
            settings,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LlmSettings::from_env()?)
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn request(&self, system: &str, user: &str) -> RequestBuilder {
        let s = &self.settings;
        let builder = self.http.post(&s.api_url);
        match self.provider {
            Provider::Anthropic => builder
                .header("x-api-key", &s.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&MessagesRequest {
                    model: &s.model,
                    max_tokens: s.max_tokens,
                    temperature: 0.0,
                    system,
                    messages: vec![Turn::user(user)],
                }),
            Provider::OpenAiCompatible => builder.bearer_auth(&s.api_key).json(&ChatRequest {
                model: &s.model,
                max_tokens: s.max_tokens,
                temperature: 0.0,
                messages: vec![
                    Turn {
                        role: "system",
                        content: system,
                    },
                    Turn::user(user),
                ],
            }),
        }
    }
}

#[async_trait]
impl Complete for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        tracing::debug!("Requesting completion from {} ({:?})", self.model(), self.provider);

        let response = self
            .request(system, user)
            .send()
            .await
            .map_err(|e| SprintdeskError::LlmError(format!("request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SprintdeskError::LlmError(e.to_string()))?;

        if !status.is_success() {
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(SprintdeskError::LlmError(format!("HTTP {}: {}", status.as_u16(), excerpt)));
        }

        let text = reply_text(self.provider, &body)?;
        tracing::debug!("{} replied with {} chars", self.model(), text.len());
        Ok(text)
    }
}

/// Pull the generated text out of a successful response body
fn reply_text(provider: Provider, body: &str) -> Result<String> {
    let malformed = |e: serde_json::Error| SprintdeskError::LlmError(format!("malformed reply: {}", e));
    let text = match provider {
        Provider::Anthropic => {
            let reply: MessagesReply = serde_json::from_str(body).map_err(malformed)?;
            reply
                .content
                .into_iter()
                .filter(|block| block.kind == "text")
                .filter_map(|block| block.text)
                .collect::<Vec<_>>()
                .join("")
        }
        Provider::OpenAiCompatible => {
            let reply: ChatReply = serde_json::from_str(body).map_err(malformed)?;
            reply
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default()
        }
    };

    if text.trim().is_empty() {
        return Err(SprintdeskError::LlmError("model returned no text".into()));
    }
    Ok(text)
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'a str,
    content: &'a str,
}

impl<'a> Turn<'a> {
    fn user(content: &'a str) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Turn<'a>>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Turn<'a>>,
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ChatReply {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
