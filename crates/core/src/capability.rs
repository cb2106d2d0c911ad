//! Capability trait — the one interface the tool-call loop depends on.
//!
//! Every action the agent can take (a file operation, a memory query, a
//! planning stub) is exposed uniformly as
//! `execute(params, context) -> CapabilityResult`. Failures are data:
//! a capability never returns an error, it returns `success = false`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::agent::{AgentContext, clamp_confidence};
use crate::error::CapabilityError;
use crate::provider::ToolDefinition;

/// Which family of behavior a capability belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Memory,
    Planning,
}

/// Static description of a registered capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: CapabilityKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityMetadata {
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Outcome of a capability execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: CapabilityMetadata,
}

impl CapabilityResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: CapabilityMetadata::default(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: CapabilityMetadata::default(),
        }
    }

    /// Set the confidence, clamped into `[0, 1]`.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.metadata.confidence = Some(clamp_confidence(confidence));
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }
}

/// The core Capability trait.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Stable, unique id. Also the function name shown to the LLM.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// What this capability does (sent to the LLM).
    fn description(&self) -> &str;

    fn kind(&self) -> CapabilityKind;

    /// JSON Schema describing the parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the capability. Report bad input as a failure result; a panic is
    /// contained by the tool loop but loses the result.
    async fn execute(&self, params: serde_json::Value, context: &AgentContext) -> CapabilityResult;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            id: self.id().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            kind: self.kind(),
        }
    }

    /// Convert into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.id().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of capabilities keyed by id.
///
/// Registered once at startup and read-only afterwards; share it behind an
/// `Arc`. Iteration order is by id so the tool catalog is stable.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. A second registration with the same id is
    /// rejected and the first one stays in place.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), CapabilityError> {
        let id = capability.id().to_string();
        if self.capabilities.contains_key(&id) {
            return Err(CapabilityError::Duplicate(id));
        }
        self.capabilities.insert(id, capability);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.capabilities.contains_key(id)
    }

    /// Tool definitions for every capability (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.capabilities.values().map(|c| c.to_definition()).collect()
    }

    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.capabilities.values().map(|c| c.descriptor()).collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.capabilities.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Execute a capability by id, stamping the measured execution time.
    pub async fn execute(
        &self,
        id: &str,
        params: serde_json::Value,
        context: &AgentContext,
    ) -> Result<CapabilityResult, CapabilityError> {
        let capability = self
            .get(id)
            .ok_or_else(|| CapabilityError::NotFound(id.to_string()))?;
        let start = Instant::now();
        let mut result = capability.execute(params, context).await;
        result.metadata.execution_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;

    /// A simple test capability for unit tests.
    struct EchoCapability {
        id: &'static str,
    }

    #[async_trait]
    impl Capability for EchoCapability {
        fn id(&self) -> &str { self.id }
        fn name(&self) -> &str { "Echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn kind(&self) -> CapabilityKind { CapabilityKind::Tool }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, params: serde_json::Value, _context: &AgentContext) -> CapabilityResult {
            match params["text"].as_str() {
                Some(text) => CapabilityResult::ok(serde_json::json!(text)).with_confidence(1.0),
                None => CapabilityResult::failure("missing 'text'"),
            }
        }
    }

    fn context() -> AgentContext {
        AgentContext::detached(Arc::new(AgentConfig::default()))
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoCapability { id: "echo" })).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected_and_first_kept() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoCapability { id: "echo" })).unwrap();
        let err = registry
            .register(Arc::new(EchoCapability { id: "echo" }))
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Duplicate(ref id) if id == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn definitions_use_ids_in_stable_order() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoCapability { id: "zeta" })).unwrap();
        registry.register(Arc::new(EchoCapability { id: "alpha" })).unwrap();
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(registry.descriptors()[0].kind, CapabilityKind::Tool);
    }

    #[tokio::test]
    async fn execute_success_and_failure_are_data() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoCapability { id: "echo" })).unwrap();
        let ctx = context();

        let ok = registry
            .execute("echo", serde_json::json!({"text": "hello"}), &ctx)
            .await
            .unwrap();
        assert!(ok.success);
        assert_eq!(ok.data.unwrap(), "hello");
        assert_eq!(ok.metadata.confidence, Some(1.0));

        let bad = registry.execute("echo", serde_json::json!({}), &ctx).await.unwrap();
        assert!(!bad.success);
        assert!(bad.error.unwrap().contains("text"));
    }

    #[tokio::test]
    async fn execute_missing_capability() {
        let registry = CapabilityRegistry::new();
        let err = registry
            .execute("nonexistent", serde_json::json!({}), &context())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::NotFound(_)));
    }

    #[test]
    fn result_confidence_is_clamped() {
        let r = CapabilityResult::ok(serde_json::Value::Null).with_confidence(3.0);
        assert_eq!(r.metadata.confidence, Some(1.0));
    }
}
