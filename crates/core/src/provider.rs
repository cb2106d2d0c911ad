//! LLM provider boundary.
//!
//! The tool-call loop only ever sees [`Provider`]: one non-streaming
//! `complete` call per round-trip, and an optional `embed` used for memory
//! writes and similarity lookups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::agent::AgentConfig;
use crate::error::ProviderError;
use crate::message::Message;

// ── Completion ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Capabilities the model may call, by id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingOptions>,

    /// Never set by the runtime
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

/// Extended reasoning budget, forwarded as-is to models that support it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingOptions {
    pub enabled: bool,
    pub budget_tokens: u32,
}

impl ProviderRequest {
    /// A non-streaming request using the agent's model settings.
    pub fn for_agent(config: &AgentConfig, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            model: config.model.clone(),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            tools,
            thinking: config.thinking.clone(),
            stream: false,
        }
    }
}

/// The function schema advertised to the model. `name` is the capability id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Carries `tool_calls` when the model wants capabilities run
    pub message: Message,
    pub usage: Option<Usage>,
    /// The model that answered, which may differ from the one requested
    pub model: String,
}

impl ProviderResponse {
    pub fn wants_tools(&self) -> bool {
        !self.message.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ── Embeddings ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub inputs: Vec<String>,
}

impl EmbeddingRequest {
    pub fn single(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            inputs: vec![input.into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// One vector per input, in input order
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
}

impl EmbeddingResponse {
    /// The first vector, unless it is missing or empty.
    pub fn into_first(self) -> Option<Vec<f32>> {
        self.embeddings.into_iter().next().filter(|e| !e.is_empty())
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Provider: Send + Sync {
    /// Short backend name used in logs ("openrouter", "openai", ...).
    fn name(&self) -> &str;

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Embed text. Backends without an embeddings endpoint keep this
    /// default, and the runtime then stores memories without vectors.
    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "provider '{}' has no embeddings endpoint",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageToolCall;

    #[test]
    fn request_defaults_when_deserialized() {
        let req: ProviderRequest = serde_json::from_str(r#"{"model":"gpt-4o","messages":[]}"#).unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!req.stream);
        assert!(req.thinking.is_none());
        assert!(req.tools.is_empty());
    }

    #[test]
    fn request_for_agent_copies_model_settings() {
        let config = AgentConfig {
            model: "gpt-4o-mini".into(),
            temperature: 0.2,
            max_tokens: Some(512),
            thinking: Some(ThinkingOptions {
                enabled: true,
                budget_tokens: 1024,
            }),
            ..AgentConfig::default()
        };
        let req = ProviderRequest::for_agent(&config, vec![Message::user("hi")], Vec::new());
        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(req.max_tokens, Some(512));
        assert_eq!(req.thinking.unwrap().budget_tokens, 1024);
        assert!(!req.stream);
    }

    #[test]
    fn response_reports_tool_calls() {
        let mut message = Message::assistant("");
        let plain = ProviderResponse {
            message: message.clone(),
            usage: None,
            model: "m".into(),
        };
        assert!(!plain.wants_tools());

        message.tool_calls.push(MessageToolCall {
            id: "c1".into(),
            name: "create_plan".into(),
            arguments: "{}".into(),
        });
        let with_tools = ProviderResponse { message, ..plain };
        assert!(with_tools.wants_tools());
    }

    #[test]
    fn empty_embedding_is_treated_as_missing() {
        let empty = EmbeddingResponse {
            embeddings: vec![Vec::new()],
            model: "e".into(),
        };
        assert_eq!(empty.into_first(), None);

        let one = EmbeddingResponse {
            embeddings: vec![vec![0.5, 0.5]],
            model: "e".into(),
        };
        assert_eq!(one.into_first(), Some(vec![0.5, 0.5]));
    }
}
