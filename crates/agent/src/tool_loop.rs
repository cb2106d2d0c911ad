//! The bounded tool-call loop.
//!
//! ```text
//! messages = [system prompt, last 10 turns, analysis summary?]
//! loop (at most 5 times):
//!     response = provider.complete(messages, capability catalog)
//!     no tool calls  → return the text
//!     tool calls     → run each capability, append results, continue
//! out of iterations  → fixed fallback reply
//! ```
//!
//! Capability failures (unknown id, bad arguments, failed execution, a
//! panic inside `execute`) are fed back to the model as data. Only provider
//! errors end the loop early.

use std::sync::Arc;
use mindthread_core::agent::{AgentContext, ReasoningStep, StepType};
use mindthread_core::capability::CapabilityRegistry;
use mindthread_core::error::{CapabilityError, ProviderError};
use mindthread_core::message::{Message, MessageToolCall, Role};
use mindthread_core::provider::{Provider, ProviderRequest};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// LLM round-trips allowed per request.
pub const MAX_ITERATIONS: u32 = 5;

/// Conversation turns sent with each request.
pub const HISTORY_WINDOW: usize = 10;

/// Reply used when the loop runs out of iterations.
pub const FALLBACK_RESPONSE: &str = "I wasn't able to complete that request within the allowed \
     number of steps. Could you rephrase or narrow it down?";

const FINAL_CONFIDENCE: f32 = 0.95;
const FALLBACK_CONFIDENCE: f32 = 0.3;

/// What one run of the loop produced.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub text: String,
    pub reasoning_step: ReasoningStep,
    /// Provider calls made, `1..=MAX_ITERATIONS`
    pub iterations: u32,
    /// Registered capabilities dispatched, in call order, repeats included
    pub capabilities_used: Vec<String>,
    /// `false` when the fallback reply was used
    pub completed: bool,
    /// Calls that came back as failures, recovered and fed to the model
    pub failures: Vec<CapabilityError>,
}

pub struct ToolCallLoop {
    provider: Arc<dyn Provider>,
    registry: Arc<CapabilityRegistry>,
}

impl ToolCallLoop {
    pub fn new(provider: Arc<dyn Provider>, registry: Arc<CapabilityRegistry>) -> Self {
        Self { provider, registry }
    }

    /// The initial message list for a request.
    pub fn build_messages(context: &AgentContext, analysis_summary: Option<&str>) -> Vec<Message> {
        let mut messages = vec![Message::system(context.config.system_prompt())];

        let turns: Vec<&_> = context
            .conversation_history
            .iter()
            .filter(|m| matches!(m.role(), Role::User | Role::Assistant))
            .collect();
        let start = turns.len().saturating_sub(HISTORY_WINDOW);
        messages.extend(turns[start..].iter().map(|m| m.to_message()));

        if let Some(summary) = analysis_summary {
            messages.push(Message::system(summary));
        }
        messages
    }

    /// Run the loop for `context`, whose history already holds the current
    /// user turn.
    pub async fn run(
        &self,
        context: &AgentContext,
        analysis_summary: Option<&str>,
    ) -> Result<LoopOutcome, ProviderError> {
        let mut messages = Self::build_messages(context, analysis_summary);
        let tools = self.registry.definitions();
        let mut capabilities_used = Vec::new();
        let mut failures = Vec::new();
        let mut tool_calls_made = 0usize;

        for iteration in 1..=MAX_ITERATIONS {
            let request = ProviderRequest::for_agent(&context.config, messages.clone(), tools.clone());

            debug!(iteration, messages = messages.len(), "Calling provider");
            let response = self.provider.complete(request).await?;
            let final_answer = !response.wants_tools();

            let mut reply = response.message;
            reply.role = Role::Assistant;
            for call in &mut reply.tool_calls {
                call.id = format!("call_{}", Uuid::new_v4().simple());
            }

            if final_answer {
                info!(iteration, tool_calls = tool_calls_made, "Loop produced final answer");
                let text = reply.content;
                return Ok(LoopOutcome {
                    reasoning_step: ReasoningStep::new(
                        StepType::Reflection,
                        "Produced final answer",
                        serde_json::json!({ "iterations": iteration, "tool_calls": tool_calls_made }),
                        serde_json::json!({ "response": text }),
                        FINAL_CONFIDENCE,
                    ),
                    text,
                    iterations: iteration,
                    capabilities_used,
                    completed: true,
                    failures,
                });
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in &calls {
                tool_calls_made += 1;
                let (output, failure) = self.dispatch(call, context, &mut capabilities_used).await;
                failures.extend(failure);
                messages.push(Message::tool_result(&call.id, output));
            }
        }

        warn!(max = MAX_ITERATIONS, tool_calls = tool_calls_made, "Loop hit the iteration limit");
        Ok(LoopOutcome {
            text: FALLBACK_RESPONSE.to_string(),
            reasoning_step: ReasoningStep::new(
                StepType::Reflection,
                "Stopped at the iteration limit without a final answer",
                serde_json::json!({ "iterations": MAX_ITERATIONS, "tool_calls": tool_calls_made }),
                serde_json::json!({ "response": FALLBACK_RESPONSE }),
                FALLBACK_CONFIDENCE,
            ),
            iterations: MAX_ITERATIONS,
            capabilities_used,
            completed: false,
            failures,
        })
    }

    /// Run one tool call. Returns the tool message body, plus the failure
    /// when the call did not succeed.
    async fn dispatch(
        &self,
        call: &MessageToolCall,
        context: &AgentContext,
        capabilities_used: &mut Vec<String>,
    ) -> (String, Option<CapabilityError>) {
        let params = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str::<serde_json::Value>(&call.arguments) {
                Ok(params) => params,
                Err(e) => {
                    warn!(capability = %call.name, error = %e, "Unparseable tool arguments");
                    let err = CapabilityError::InvalidArguments(e.to_string());
                    return (failure_json(&err.to_string()), Some(err));
                }
            }
        };

        // A panicking capability takes down only its own task
        let registry = Arc::clone(&self.registry);
        let (id, task_context) = (call.name.clone(), context.clone());
        let mut task = AbortOnDrop(tokio::spawn(async move {
            registry.execute(&id, params, &task_context).await
        }));
        let result = match (&mut task.0).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(capability = %call.name, error = %e, "Capability dispatch failed");
                return (failure_json(&e.to_string()), Some(e));
            }
            Err(join) => {
                let err = CapabilityError::Failed {
                    id: call.name.clone(),
                    reason: if join.is_panic() {
                        "capability panicked".into()
                    } else {
                        "capability task was cancelled".into()
                    },
                };
                error!(capability = %call.name, error = %err, "Capability task died");
                return (failure_json(&err.to_string()), Some(err));
            }
        };

        capabilities_used.push(call.name.clone());
        debug!(
            capability = %call.name,
            success = result.success,
            ms = result.metadata.execution_time_ms,
            "Capability executed"
        );
        let failure = (!result.success).then(|| CapabilityError::Failed {
            id: call.name.clone(),
            reason: result.error.clone().unwrap_or_default(),
        });
        let body = serde_json::to_string(&result).unwrap_or_else(|e| failure_json(&e.to_string()));
        (body, failure)
    }
}

/// Aborts the task when the loop is dropped, e.g. at the request deadline.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn failure_json(error: &str) -> String {
    serde_json::json!({ "success": false, "error": error }).to_string()
}
