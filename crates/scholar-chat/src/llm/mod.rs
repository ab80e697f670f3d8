//! LLM Module - completion capabilities consumed by the chat pipeline
//!
//! Two capabilities are needed: a one-shot completion constrained to a JSON
//! schema (query interpretation) and a token stream (batch summaries).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod external;
pub mod streaming;

pub use external::ExternalProvider;
pub use streaming::TokenStream;

/// External API providers speaking the OpenAI chat-completions protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    OpenAI,
    OpenRouter,
    Together,
    Ollama,
    Custom { endpoint: String },
}

impl ApiProvider {
    pub fn endpoint(&self) -> String {
        match self {
            ApiProvider::OpenAI => "https://api.openai.com/v1/chat/completions".to_string(),
            ApiProvider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions".to_string(),
            ApiProvider::Together => "https://api.together.xyz/v1/chat/completions".to_string(),
            ApiProvider::Ollama => "http://localhost:11434/v1/chat/completions".to_string(),
            ApiProvider::Custom { endpoint } => endpoint.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApiProvider::OpenAI => "OpenAI",
            ApiProvider::OpenRouter => "OpenRouter",
            ApiProvider::Together => "Together",
            ApiProvider::Ollama => "Ollama",
            ApiProvider::Custom { .. } => "Custom",
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: ApiProvider,
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: ApiProvider::OpenAI,
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            connect_timeout_secs: 15,
            request_timeout_secs: 300,
        }
    }
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl From<&LLMConfig> for GenerationConfig {
    fn from(config: &LLMConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// Named JSON schema the completion must conform to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: JsonValue,
}

/// Provider information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub supports_streaming: bool,
    pub supports_structured_output: bool,
}

/// Core trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// One-shot completion constrained to `schema`; returns the raw JSON text.
    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        schema: &ResponseSchema,
        config: &GenerationConfig,
    ) -> Result<String>;

    /// Streaming completion.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<TokenStream>;

    /// Get provider info
    fn info(&self) -> ProviderInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_config_default() {
        let config = LLMConfig::default();
        assert_eq!(config.provider, ApiProvider::OpenAI);
        assert_eq!(config.max_tokens, 1024);
    }

    #[test]
    fn test_provider_serde_names() {
        let provider: ApiProvider = serde_json::from_str(r#""openrouter""#).unwrap();
        assert_eq!(provider, ApiProvider::OpenRouter);

        let custom: ApiProvider =
            serde_json::from_str(r#"{"custom":{"endpoint":"http://localhost:1234/v1/chat/completions"}}"#)
                .unwrap();
        assert_eq!(custom.endpoint(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn test_chat_message_roles_serialize_lowercase() {
        let msg = ChatMessage::system("rules");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "rules");
    }
}
