//! Adapter exposing any [`Tool`] as a [`Capability`].

use std::sync::Arc;
use async_trait::async_trait;
use mindthread_core::agent::AgentContext;
use mindthread_core::capability::{Capability, CapabilityKind, CapabilityResult};
use mindthread_core::tool::Tool;
use tracing::debug;

/// Wraps a tool so the loop can dispatch to it by capability id.
pub struct ToolCapability {
    tool: Arc<dyn Tool>,
}

impl ToolCapability {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl Capability for ToolCapability {
    fn id(&self) -> &str {
        self.tool.name()
    }

    fn name(&self) -> &str {
        self.tool.name()
    }

    fn description(&self) -> &str {
        self.tool.description()
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Tool
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.tool.parameters_schema()
    }

    async fn execute(&self, params: serde_json::Value, context: &AgentContext) -> CapabilityResult {
        debug!(tool = %self.tool.name(), session_id = %context.session_id, "Executing tool");

        let source = format!("tool:{}", self.tool.name());
        match self.tool.execute(params).await {
            Ok(result) if result.success => CapabilityResult::ok(serde_json::json!({
                "output": result.output,
                "data": result.data,
            }))
            .with_confidence(1.0)
            .with_source(source),
            Ok(result) => CapabilityResult::failure(result.output).with_source(source),
            Err(e) => CapabilityResult::failure(e.to_string()).with_source(source),
        }
    }
}
