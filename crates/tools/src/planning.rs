//! Planning stub — records a step list in the session's working memory.
//!
//! No reasoning happens here. The LLM supplies the steps (or a goal that is
//! split on sequencing words) and later turns can read the plan back.

use async_trait::async_trait;
use chrono::Utc;
use mindthread_core::agent::AgentContext;
use mindthread_core::capability::{Capability, CapabilityKind, CapabilityResult};

/// Working-memory key the current plan is stored under.
pub const PLAN_KEY: &str = "plan";

pub struct PlanningCapability;

/// Split a free-form goal into steps on common sequencing separators.
fn split_goal(goal: &str) -> Vec<String> {
    let mut steps = vec![goal.to_string()];
    for sep in [";", " and then ", " then ", "\n"] {
        steps = steps
            .iter()
            .flat_map(|s| s.split(sep))
            .map(|s| s.trim().trim_end_matches('.').trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    steps
}

#[async_trait]
impl Capability for PlanningCapability {
    fn id(&self) -> &str {
        "create_plan"
    }

    fn name(&self) -> &str {
        "Create plan"
    }

    fn description(&self) -> &str {
        "Record a step-by-step plan for a multi-step goal so it can be followed across turns. \
         Pass explicit steps, or a goal whose parts are separated by 'then' or ';'."
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Planning
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "goal": {
                    "type": "string",
                    "description": "The overall goal"
                },
                "steps": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Ordered steps; derived from the goal when omitted"
                }
            },
            "required": ["goal"]
        })
    }

    async fn execute(&self, params: serde_json::Value, context: &AgentContext) -> CapabilityResult {
        let Some(goal) = params["goal"].as_str().map(str::trim).filter(|g| !g.is_empty()) else {
            return CapabilityResult::failure("Missing 'goal' argument");
        };

        let explicit: Vec<String> = params["steps"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|s| s.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let derived = explicit.is_empty();
        let steps = if derived { split_goal(goal) } else { explicit };

        let plan = serde_json::json!({
            "goal": goal,
            "steps": steps,
            "created_at": Utc::now(),
        });
        let replaced = context.working_memory.set(PLAN_KEY, plan.clone()).is_some();

        // Derived steps are a guess; explicit ones come from the model.
        let confidence = if derived { 0.5 } else { 0.8 };
        CapabilityResult::ok(serde_json::json!({
            "plan": plan,
            "replaced_previous": replaced,
        }))
        .with_confidence(confidence)
        .with_source("planning_stub")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use mindthread_core::agent::AgentConfig;

    fn ctx() -> AgentContext {
        AgentContext::detached(Arc::new(AgentConfig::default()))
    }

    #[test]
    fn goal_is_split_on_sequencing_words() {
        let steps = split_goal("book a table; invite Sam and then send the address. Then confirm");
        assert_eq!(steps, vec!["book a table", "invite Sam", "send the address. Then confirm"]);
        assert_eq!(split_goal("just one thing."), vec!["just one thing"]);
    }

    #[tokio::test]
    async fn plan_is_written_to_working_memory() {
        let context = ctx();
        let result = PlanningCapability
            .execute(
                serde_json::json!({"goal": "ship release", "steps": ["tag", "build", "publish"]}),
                &context,
            )
            .await;
        assert!(result.success);
        assert_eq!(result.metadata.confidence, Some(0.8));

        let stored = context.working_memory.get(PLAN_KEY).unwrap();
        assert_eq!(stored["goal"], "ship release");
        assert_eq!(stored["steps"], serde_json::json!(["tag", "build", "publish"]));
    }

    #[tokio::test]
    async fn second_plan_replaces_first() {
        let context = ctx();
        PlanningCapability
            .execute(serde_json::json!({"goal": "a then b"}), &context)
            .await;
        let result = PlanningCapability
            .execute(serde_json::json!({"goal": "c"}), &context)
            .await;
        assert_eq!(result.data.unwrap()["replaced_previous"], true);
        assert_eq!(context.working_memory.get(PLAN_KEY).unwrap()["steps"], serde_json::json!(["c"]));
    }

    #[tokio::test]
    async fn missing_goal_fails_as_data() {
        let result = PlanningCapability.execute(serde_json::json!({}), &ctx()).await;
        assert!(!result.success);
    }
}
