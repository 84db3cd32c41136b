//! Completion backends.
//!
//! [`LlmProvider`] is the seam the extractor and the evidence checker call
//! through. Credentials are held as [`ApiCredential`]s and never logged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialLookup, CredentialSource};

#[cfg(feature = "openai")]
pub use openai::{OpenAiEmbedder, OpenAiProvider, OpenAiProviderFactory};

/// Completion backend failures.
///
/// Every variant is recoverable from the pipeline's point of view: callers
/// log it and move to their next degradation step.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request to completion service failed: {0}")]
    HttpError(String),

    #[error("completion service rate limited the request (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("completion service returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("unreadable completion service response: {0}")]
    ParseError(String),

    #[error("completion service rejected the credential")]
    AuthError,

    #[error("no completion within {0:?}")]
    Timeout(Duration),

    #[error("completion provider unavailable: {0}")]
    NotConfigured(String),
}

/// Output format requested from the completion service.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseFormat {
    /// Free text
    #[default]
    Text,

    /// Any JSON object
    JsonObject,

    /// JSON conforming to the given schema
    JsonSchema { name: String, schema: JsonValue },
}

impl ResponseFormat {
    /// Structured output constrained by `schema`.
    pub fn json_schema(name: impl Into<String>, schema: JsonValue) -> Self {
        Self::JsonSchema {
            name: name.into(),
            schema,
        }
    }

    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// Settings for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,

    /// Completion token cap
    pub max_tokens: u32,

    pub temperature: f32,

    /// Per-request deadline
    pub timeout: Duration,

    /// Requested output format
    pub response_format: ResponseFormat,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.0,
            timeout: Duration::from_secs(30),
            response_format: ResponseFormat::Text,
        }
    }
}

impl CompletionConfig {
    /// Copy of this config requesting a different output format.
    pub fn with_format(&self, response_format: ResponseFormat) -> Self {
        Self {
            response_format,
            ..self.clone()
        }
    }
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A completed chat turn.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// Generated content. Structured output arrives here as serialized JSON.
    pub content: String,

    /// Per-token log probabilities, when the backend reports them
    pub logprobs: Vec<f64>,

    pub usage: TokenUsage,

    /// Model that served the request
    pub model: String,
}

impl CompletionResponse {
    /// Plain response with no usage data.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Token counts reported for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A chat completion backend.
///
/// Responses are untrusted text; callers parse them with a fallback.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Cheap reachability check.
    async fn health_check(&self) -> bool;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Rough prompt size, four bytes per token.
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.len() / 4) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roles_serialize_lowercase() {
        let message = ChatMessage::system("You are a factual compliance analysis assistant.");
        assert_eq!(serde_json::to_value(&message).unwrap()["role"], "system");
        assert_eq!(ChatMessage::user("Extract claims.").role, Role::User);

        let parsed: ChatMessage = serde_json::from_value(json!({"role": "assistant", "content": "[]"})).unwrap();
        assert_eq!(parsed.role, Role::Assistant);
    }

    #[test]
    fn test_with_format_keeps_other_settings() {
        let base = CompletionConfig {
            model: "verifier".to_string(),
            max_tokens: 900,
            ..Default::default()
        };
        let structured = base.with_format(ResponseFormat::json_schema("verification", json!({})));

        assert_eq!(structured.model, "verifier");
        assert_eq!(structured.max_tokens, 900);
        assert!(structured.response_format.is_structured());
        assert!(!base.response_format.is_structured());
    }
}
