//! # MindThread Core
//!
//! Domain types, traits, and error definitions for the MindThread request
//! core. This crate has **no framework dependencies** — it defines the
//! contracts every other crate implements against.
//!
//! ## Design
//!
//! Every external collaborator (LLM provider, memory engine, speech engine,
//! capabilities) is a trait here. Implementations live in their own crates,
//! which keeps the runtime testable with scripted mocks.

pub mod agent;
pub mod capability;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod speech;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{
    AgentConfig, AgentContext, AgentInput, AgentResponse, PartialContext, ReasoningStep,
    ResponseMetadata, StepType, WorkingMemory,
};
pub use capability::{
    Capability, CapabilityDescriptor, CapabilityKind, CapabilityMetadata, CapabilityRegistry,
    CapabilityResult,
};
pub use error::{Error, ErrorKind, Result};
pub use memory::{Cluster, ClusteringConfig, MemoryEngine, MemoryNode, MemoryQueryResult};
pub use message::{ConversationMessage, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ThinkingOptions, ToolDefinition};
pub use speech::SpeechEngine;
pub use tool::{Tool, ToolResult};
