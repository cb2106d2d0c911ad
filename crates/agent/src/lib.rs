//! The MindThread request runtime.
//!
//! A request flows through one fixed pipeline:
//!
//! 1. **Normalize** the input (audio is transcribed)
//! 2. **Record** the user turn in the session's bounded conversation log
//! 3. **Remember**: embed and store the turn in long-term memory
//! 4. **Analyze** it against memory (entities, contextual memories, clusters)
//! 5. **Answer** through the tool-call loop, at most five LLM round-trips
//! 6. **Report**: record the reply, update metrics, return a structured response
//!
//! [`AgentRuntime`] owns the collaborators and sessions; the other modules
//! are the stages it composes.

pub mod analysis;
pub mod clustering;
pub mod conversation;
pub mod runtime;
pub mod tool_loop;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use analysis::{AnalysisResult, InputAnalysis, Intent, Level};
pub use clustering::{
    ClusteringCoordinator, ClusteringFailurePolicy, ClusteringOptions, ClusteringState,
    RefreshOutcome,
};
pub use conversation::ConversationManager;
pub use runtime::{AgentRuntime, AgentState, Lifecycle, SessionSummary};
pub use tool_loop::{LoopOutcome, MAX_ITERATIONS, ToolCallLoop};
