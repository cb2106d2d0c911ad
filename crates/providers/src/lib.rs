//! LLM provider and speech engine implementations for MindThread.
//!
//! All LLM providers implement the `mindthread_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod router;
pub mod speech;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config, default_from_config};
pub use speech::CommandSpeechEngine;
