//! Agent configuration, per-request context, reasoning and response types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::capability::CapabilityDescriptor;
use crate::error::ErrorKind;
use crate::memory::MemoryContext;
use crate::message::ConversationMessage;
use crate::provider::ThinkingOptions;

/// Configuration for the agent's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name used in the persona prompt
    #[serde(default = "default_name")]
    pub name: String,

    /// Persona description placed at the top of the system prompt
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Extra standing instructions, one per line in the prompt
    #[serde(default)]
    pub instructions: Vec<String>,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model; `None` disables embeddings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    #[serde(default = "default_temp")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingOptions>,

    /// Upper bound on turns kept per session
    #[serde(default = "default_max_history")]
    pub max_conversation_history: usize,

    /// Deadline for one whole request
    #[serde(default = "default_max_processing_time_ms")]
    pub max_processing_time_ms: u64,

    /// User id used when the caller does not supply one
    #[serde(default = "default_user_id")]
    pub default_user_id: String,

    /// Upper bound on concurrently tracked sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Entity/relationship results requested per memory query
    #[serde(default = "default_query_limit")]
    pub memory_query_limit: usize,

    /// Contextual memories pulled per request
    #[serde(default = "default_contextual_window")]
    pub contextual_window: usize,
}

fn default_name() -> String {
    "MindThread".into()
}
fn default_persona() -> String {
    "You are a helpful assistant with a long-term memory of past conversations.".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temp() -> f32 {
    0.7
}
fn default_max_history() -> usize {
    50
}
fn default_max_processing_time_ms() -> u64 {
    60_000
}
fn default_user_id() -> String {
    "default_user".into()
}
fn default_max_sessions() -> usize {
    256
}
fn default_query_limit() -> usize {
    10
}
fn default_contextual_window() -> usize {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            persona: default_persona(),
            instructions: Vec::new(),
            model: default_model(),
            embedding_model: None,
            temperature: default_temp(),
            max_tokens: None,
            thinking: None,
            max_conversation_history: default_max_history(),
            max_processing_time_ms: default_max_processing_time_ms(),
            default_user_id: default_user_id(),
            max_sessions: default_max_sessions(),
            memory_query_limit: default_query_limit(),
            contextual_window: default_contextual_window(),
        }
    }
}

impl AgentConfig {
    /// The persona system prompt sent at the head of every request.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}. {}", self.name, self.persona);
        if !self.instructions.is_empty() {
            prompt.push_str("\n\nInstructions:\n");
            for line in &self.instructions {
                prompt.push_str("- ");
                prompt.push_str(line);
                prompt.push('\n');
            }
        }
        prompt
    }
}

// ── Request input ─────────────────────────────────────────────────────────

/// One user turn as handed to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentInput {
    Text(String),
    Audio(PathBuf),
}

impl From<&str> for AgentInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AgentInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Caller-supplied fields merged over the defaults when building an
/// [`AgentContext`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub relevant_entities: Vec<String>,
    /// Synthesize the reply to audio when a speech engine is available
    #[serde(default)]
    pub synthesize_audio: bool,
}

impl PartialContext {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }
}

// ── Working memory ────────────────────────────────────────────────────────

/// Per-session scratch map shared between requests and capabilities.
///
/// Cloning yields another handle to the same map. Guards are never held
/// across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct WorkingMemory {
    inner: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Insert a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) -> Option<serde_json::Value> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An owned copy of the current contents.
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

// ── Request context ───────────────────────────────────────────────────────

/// Per-request snapshot handed to the loop and to every capability.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub user_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub relevant_entities: Vec<String>,
    /// "text" or "audio" unless the caller says otherwise
    pub source: String,
    /// Most-recent-last, includes the current user turn
    pub conversation_history: Vec<ConversationMessage>,
    pub capabilities: Vec<CapabilityDescriptor>,
    pub working_memory: WorkingMemory,
    pub config: Arc<AgentConfig>,
}

impl AgentContext {
    /// The subset of the context the memory engine needs.
    pub fn memory_context(&self) -> MemoryContext {
        MemoryContext {
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            source: self.source.clone(),
            timestamp: self.timestamp,
        }
    }

    /// A context with defaults and no history, for direct capability calls.
    pub fn detached(config: Arc<AgentConfig>) -> Self {
        Self {
            user_id: config.default_user_id.clone(),
            session_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            relevant_entities: Vec::new(),
            source: "text".into(),
            conversation_history: Vec::new(),
            capabilities: Vec::new(),
            working_memory: WorkingMemory::new(),
            config,
        }
    }
}

// ── Reasoning trace ───────────────────────────────────────────────────────

/// The stage of processing a reasoning step records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Observation,
    Analysis,
    Planning,
    Execution,
    Reflection,
    Error,
}

/// One recorded stage of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub id: String,
    pub step_type: StepType,
    pub description: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    /// Always within `[0, 1]`
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl ReasoningStep {
    pub fn new(
        step_type: StepType,
        description: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
        confidence: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step_type,
            description: description.into(),
            input,
            output,
            confidence: clamp_confidence(confidence),
            timestamp: Utc::now(),
        }
    }

    /// An `error` step, always with confidence 0.
    pub fn error(description: impl Into<String>, input: serde_json::Value) -> Self {
        Self::new(StepType::Error, description, input, serde_json::Value::Null, 0.0)
    }
}

/// Clamp into `[0, 1]`, mapping NaN to 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

// ── Response ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub session_id: String,
    pub user_id: String,
    pub processing_time_ms: u64,
    /// LLM round-trips performed
    pub iterations: u32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// The structured result of one `process_request` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub id: String,
    pub content: String,
    pub reasoning: Vec<ReasoningStep>,
    pub confidence: f32,
    pub capabilities_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    pub metadata: ResponseMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_step_clamps_confidence() {
        let high = ReasoningStep::new(StepType::Analysis, "x", serde_json::Value::Null, serde_json::Value::Null, 1.7);
        assert_eq!(high.confidence, 1.0);
        let low = ReasoningStep::new(StepType::Analysis, "x", serde_json::Value::Null, serde_json::Value::Null, -0.2);
        assert_eq!(low.confidence, 0.0);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn error_step_has_zero_confidence() {
        let step = ReasoningStep::error("memory engine unavailable", serde_json::json!({}));
        assert_eq!(step.step_type, StepType::Error);
        assert_eq!(step.confidence, 0.0);
    }

    #[test]
    fn working_memory_handles_share_state() {
        let a = WorkingMemory::new();
        let b = a.clone();
        a.set("plan", serde_json::json!(["step"]));
        assert_eq!(b.len(), 1);
        assert_eq!(b.get("plan").unwrap(), serde_json::json!(["step"]));
        assert!(b.remove("plan").is_some());
        assert!(a.is_empty());
    }

    #[test]
    fn system_prompt_lists_instructions() {
        let config = AgentConfig {
            name: "Ada".into(),
            instructions: vec!["Be brief".into(), "Cite memories".into()],
            ..AgentConfig::default()
        };
        let prompt = config.system_prompt();
        assert!(prompt.starts_with("You are Ada."));
        assert!(prompt.contains("- Be brief\n"));
        assert!(prompt.contains("- Cite memories\n"));
    }

    #[test]
    fn input_from_str_is_text() {
        assert_eq!(AgentInput::from("hi"), AgentInput::Text("hi".into()));
    }

    #[test]
    fn agent_config_deserializes_with_defaults() {
        let config: AgentConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_conversation_history, 50);
        assert_eq!(config.default_user_id, "default_user");
        assert_eq!(config.max_processing_time_ms, 60_000);
    }
}
