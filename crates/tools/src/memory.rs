//! Memory-backed capabilities — let the agent consult its long-term memory
//! on demand, on top of the enrichment the runtime already performs.

use std::sync::Arc;
use async_trait::async_trait;
use mindthread_core::agent::AgentContext;
use mindthread_core::capability::{Capability, CapabilityKind, CapabilityResult};
use mindthread_core::memory::{MemoryEngine, QueryOptions};

const MAX_LIMIT: usize = 50;

fn limit_param(params: &serde_json::Value, default: usize) -> usize {
    params["limit"]
        .as_u64()
        .map(|n| (n as usize).clamp(1, MAX_LIMIT))
        .unwrap_or(default)
}

/// Look up entities and relationships related to a query.
pub struct MemoryQueryCapability {
    engine: Arc<dyn MemoryEngine>,
}

impl MemoryQueryCapability {
    pub fn new(engine: Arc<dyn MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Capability for MemoryQueryCapability {
    fn id(&self) -> &str {
        "memory_query"
    }

    fn name(&self) -> &str {
        "Memory query"
    }

    fn description(&self) -> &str {
        "Search long-term memory for people, places, and things related to a query, \
         including how they relate to each other."
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Memory
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look up"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results (default: the agent's query limit)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value, context: &AgentContext) -> CapabilityResult {
        let Some(query) = params["query"].as_str().filter(|q| !q.trim().is_empty()) else {
            return CapabilityResult::failure("Missing 'query' argument");
        };

        let options = QueryOptions {
            embedding: None,
            limit: limit_param(&params, context.config.memory_query_limit),
        };

        match self
            .engine
            .query_memory(query, &context.memory_context(), options)
            .await
        {
            Ok(result) => {
                let confidence = if result.entities.is_empty() {
                    0.0
                } else {
                    result.entities.iter().map(|e| e.score).sum::<f32>() / result.entities.len() as f32
                };
                match serde_json::to_value(&result) {
                    Ok(data) => CapabilityResult::ok(data)
                        .with_confidence(confidence)
                        .with_source(self.engine.name()),
                    Err(e) => CapabilityResult::failure(e.to_string()),
                }
            }
            Err(e) => CapabilityResult::failure(e.to_string()).with_source(self.engine.name()),
        }
    }
}

/// Recall stored memories relevant to the current conversation.
pub struct MemoryRecallCapability {
    engine: Arc<dyn MemoryEngine>,
}

impl MemoryRecallCapability {
    pub fn new(engine: Arc<dyn MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Capability for MemoryRecallCapability {
    fn id(&self) -> &str {
        "memory_recall"
    }

    fn name(&self) -> &str {
        "Memory recall"
    }

    fn description(&self) -> &str {
        "Recall earlier memories that relate to the recent conversation."
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Memory
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of memories to return"
                }
            }
        })
    }

    async fn execute(&self, params: serde_json::Value, context: &AgentContext) -> CapabilityResult {
        let limit = limit_param(&params, context.config.contextual_window);
        let history = &context.conversation_history;
        let recent = &history[history.len().saturating_sub(3)..];

        match self.engine.get_contextual_memories(recent, limit).await {
            Ok(nodes) => {
                let memories: Vec<serde_json::Value> = nodes
                    .iter()
                    .map(|n| {
                        serde_json::json!({
                            "id": n.id,
                            "content": n.content,
                            "created_at": n.created_at,
                            "score": n.score,
                        })
                    })
                    .collect();
                let confidence = nodes.iter().map(|n| n.score).fold(0.0f32, f32::max);
                CapabilityResult::ok(serde_json::json!({ "memories": memories }))
                    .with_confidence(confidence)
                    .with_source(self.engine.name())
            }
            Err(e) => CapabilityResult::failure(e.to_string()).with_source(self.engine.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindthread_core::agent::AgentConfig;
    use mindthread_core::memory::{AddMemoryOptions, MemoryEngineConfig};
    use mindthread_core::message::ConversationMessage;
    use mindthread_memory::InMemoryGraph;

    async fn engine() -> Arc<dyn MemoryEngine> {
        let graph = InMemoryGraph::new();
        graph.initialize(&MemoryEngineConfig::default()).await.unwrap();
        Arc::new(graph)
    }

    fn ctx() -> AgentContext {
        AgentContext::detached(Arc::new(AgentConfig::default()))
    }

    #[tokio::test]
    async fn query_returns_entities() {
        let engine = engine().await;
        let context = ctx();
        engine
            .add_memory("Grace founded Hopper Labs", &context.memory_context(), AddMemoryOptions::default())
            .await
            .unwrap();

        let cap = MemoryQueryCapability::new(engine);
        let result = cap.execute(serde_json::json!({"query": "grace"}), &context).await;
        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["entities"][0]["name"], "Grace");
        assert!(result.metadata.confidence.unwrap() > 0.0);
        assert_eq!(result.metadata.source.as_deref(), Some("in_memory_graph"));
    }

    #[tokio::test]
    async fn query_without_text_fails_as_data() {
        let cap = MemoryQueryCapability::new(engine().await);
        let result = cap.execute(serde_json::json!({"query": "  "}), &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("query"));
    }

    #[tokio::test]
    async fn engine_errors_become_failures() {
        let cap = MemoryQueryCapability::new(Arc::new(InMemoryGraph::new()));
        let result = cap.execute(serde_json::json!({"query": "x"}), &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not initialized"));
    }

    #[tokio::test]
    async fn recall_uses_recent_history() {
        let engine = engine().await;
        let mut context = ctx();
        engine
            .add_memory("booked flights to Lisbon for the conference", &context.memory_context(), AddMemoryOptions::default())
            .await
            .unwrap();
        context.conversation_history = vec![ConversationMessage::user("any updates about the conference?")];

        let cap = MemoryRecallCapability::new(engine);
        let result = cap.execute(serde_json::json!({}), &context).await;
        assert!(result.success);
        let memories = result.data.unwrap()["memories"].as_array().unwrap().clone();
        assert_eq!(memories.len(), 1);
        assert!(memories[0]["content"].as_str().unwrap().contains("Lisbon"));
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(limit_param(&serde_json::json!({"limit": 500}), 5), MAX_LIMIT);
        assert_eq!(limit_param(&serde_json::json!({"limit": 0}), 5), 1);
        assert_eq!(limit_param(&serde_json::json!({}), 5), 5);
    }
}
