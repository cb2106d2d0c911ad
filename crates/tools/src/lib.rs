//! Built-in capabilities for MindThread.
//!
//! Capabilities give the agent the ability to act: read and write files in
//! a workspace, consult long-term memory, and record multi-step plans.
//! Every one of them is dispatched through the same
//! `execute(params, context)` interface.

pub mod file_read;
pub mod file_write;
pub mod memory;
pub mod path;
pub mod planning;
pub mod tool_capability;

use std::path::PathBuf;
use std::sync::Arc;
use mindthread_core::capability::CapabilityRegistry;
use mindthread_core::error::CapabilityError;
use mindthread_core::memory::MemoryEngine;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use memory::{MemoryQueryCapability, MemoryRecallCapability};
pub use planning::{PLAN_KEY, PlanningCapability};
pub use tool_capability::ToolCapability;

/// Create a registry with all built-in capabilities.
///
/// File tools are confined to `workspace` when one is given. Memory
/// capabilities are only registered when an engine is available.
pub fn default_registry(
    memory: Option<Arc<dyn MemoryEngine>>,
    workspace: Option<PathBuf>,
) -> Result<CapabilityRegistry, CapabilityError> {
    let mut registry = CapabilityRegistry::new();

    let (read, write) = match workspace {
        Some(root) => (FileReadTool::in_workspace(&root), FileWriteTool::in_workspace(root)),
        None => (FileReadTool::new(), FileWriteTool::new()),
    };
    registry.register(Arc::new(ToolCapability::new(Arc::new(read))))?;
    registry.register(Arc::new(ToolCapability::new(Arc::new(write))))?;
    registry.register(Arc::new(PlanningCapability))?;

    if let Some(engine) = memory {
        registry.register(Arc::new(MemoryQueryCapability::new(Arc::clone(&engine))))?;
        registry.register(Arc::new(MemoryRecallCapability::new(engine)))?;
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindthread_memory::InMemoryGraph;

    #[test]
    fn registry_without_memory() {
        let registry = default_registry(None, None).unwrap();
        assert_eq!(registry.ids(), vec!["create_plan", "file_read", "file_write"]);
    }

    #[test]
    fn registry_with_memory() {
        let registry = default_registry(Some(Arc::new(InMemoryGraph::new())), None).unwrap();
        assert_eq!(registry.len(), 5);
        assert!(registry.contains("memory_query"));
        assert!(registry.contains("memory_recall"));
    }
}
