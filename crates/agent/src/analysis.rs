//! Input analysis — cheap heuristics over the user's text plus memory
//! enrichment (entities, contextual memories, related clusters).
//!
//! Enrichment is best-effort: each memory lookup that fails is logged and
//! treated as empty so the request can still be answered.

use std::fmt::Write as _;
use mindthread_core::agent::AgentContext;
use mindthread_core::memory::{Cluster, MemoryEngine, MemoryNode, MemoryQueryResult, QueryOptions};
use mindthread_core::message::Role;
use mindthread_memory::text;
use serde::Serialize;
use tracing::{debug, warn};
use crate::clustering::ClusteringCoordinator;

/// Turns of history handed to the contextual-memory lookup.
pub const CONTEXT_TURNS: usize = 3;
/// Related clusters attached to an analysis.
pub const RELATED_CLUSTERS: usize = 3;
const MAX_TOPICS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Question,
    Command,
    Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

/// What the text itself says, before any memory is consulted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputAnalysis {
    pub intent: Intent,
    pub complexity: Level,
    pub urgency: Level,
    pub topics: Vec<String>,
}

const GREETINGS: &[&str] = &["hi", "hello", "hey", "greetings", "morning", "evening", "yo"];
const QUESTION_OPENERS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "which", "is", "are", "can", "could", "do",
    "does", "did", "will", "would", "should", "have", "has",
];
const COMMAND_OPENERS: &[&str] = &[
    "please", "write", "create", "make", "show", "list", "find", "tell", "remind", "schedule",
    "read", "open", "send", "set", "add", "delete", "remove", "update", "explain", "summarize",
    "plan", "save", "remember",
];
const URGENT: &[&str] = &["urgent", "urgently", "asap", "immediately", "emergency", "critical"];
const SOON: &[&str] = &["soon", "today", "quickly", "deadline", "tonight"];

fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Classify intent, complexity, urgency, and topics of `input`.
pub fn analyze_text(input: &str) -> InputAnalysis {
    let words = words(input);
    let first = words.first().map(String::as_str).unwrap_or_default();
    let trimmed = input.trim_end();

    let intent = if words.len() <= 4 && GREETINGS.contains(&first) {
        Intent::Greeting
    } else if trimmed.ends_with('?') || QUESTION_OPENERS.contains(&first) {
        Intent::Question
    } else if COMMAND_OPENERS.contains(&first) {
        Intent::Command
    } else {
        Intent::Statement
    };

    let sentences = input
        .split(['.', '?', '!', '\n'])
        .filter(|s| !s.trim().is_empty())
        .count();
    let complexity = if words.len() >= 25 || sentences >= 3 {
        Level::High
    } else if words.len() >= 8 || input.contains(" then ") {
        Level::Medium
    } else {
        Level::Low
    };

    let has = |list: &[&str]| words.iter().any(|w| list.contains(&w.as_str()));
    let urgency = if has(URGENT) || input.contains("!!") || input.to_lowercase().contains("right now") {
        Level::High
    } else if has(SOON) {
        Level::Medium
    } else {
        Level::Low
    };

    let mut topics: Vec<String> = text::terms(input).into_iter().collect();
    topics.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    topics.truncate(MAX_TOPICS);

    InputAnalysis {
        intent,
        complexity,
        urgency,
        topics,
    }
}

/// Heuristics plus everything memory had to say about the input.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub input: InputAnalysis,
    pub memory: MemoryQueryResult,
    pub contextual_memories: Vec<MemoryNode>,
    pub related_clusters: Vec<Cluster>,
    pub used_embedding: bool,
}

impl AnalysisResult {
    /// Whether the analysis is worth showing to the model.
    pub fn is_noteworthy(&self) -> bool {
        !self.memory.entities.is_empty()
            || !self.memory.relationships.is_empty()
            || !self.contextual_memories.is_empty()
            || !self.related_clusters.is_empty()
            || self.input.urgency == Level::High
    }

    /// Grows with the amount of memory context found.
    pub fn confidence(&self) -> f32 {
        let mut confidence = 0.4;
        if !self.memory.entities.is_empty() {
            confidence += 0.2;
        }
        if !self.memory.relationships.is_empty() {
            confidence += 0.1;
        }
        if !self.contextual_memories.is_empty() {
            confidence += 0.2;
        }
        if !self.related_clusters.is_empty() {
            confidence += 0.1;
        }
        f32::min(confidence, 1.0)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.memory.entities.iter().map(|e| e.name.as_str())
    }

    /// A system message describing the analysis, if it is noteworthy.
    pub fn summary(&self) -> Option<String> {
        if !self.is_noteworthy() {
            return None;
        }

        let mut out = String::from("Context from memory for the latest message:\n");
        let _ = writeln!(
            out,
            "- Intent: {:?}, complexity: {:?}, urgency: {:?}",
            self.input.intent, self.input.complexity, self.input.urgency
        );
        if self.input.urgency == Level::High {
            out.push_str("- The user marked this as urgent; answer directly.\n");
        }
        if !self.memory.entities.is_empty() {
            let names: Vec<&str> = self.entity_names().collect();
            let _ = writeln!(out, "- Known entities: {}", names.join(", "));
        }
        for rel in &self.memory.relationships {
            let _ = writeln!(out, "- {} {} {}", rel.source, rel.relation, rel.target);
        }
        if !self.contextual_memories.is_empty() {
            out.push_str("- Related memories:\n");
            for node in &self.contextual_memories {
                let _ = writeln!(out, "  - {}", node.content);
            }
        }
        if !self.related_clusters.is_empty() {
            let labels: Vec<&str> = self.related_clusters.iter().map(|c| c.label.as_str()).collect();
            let _ = writeln!(out, "- Related topics: {}", labels.join(", "));
        }
        Some(out)
    }
}

/// Run the heuristics and query memory for the current turn.
pub async fn analyze(
    engine: &dyn MemoryEngine,
    clustering: Option<&ClusteringCoordinator>,
    input: &str,
    embedding: Option<&[f32]>,
    context: &AgentContext,
) -> AnalysisResult {
    let heuristics = analyze_text(input);
    let memory_context = context.memory_context();

    let options = QueryOptions {
        embedding: embedding.map(<[f32]>::to_vec),
        limit: context.config.memory_query_limit,
    };
    let memory = engine
        .query_memory(input, &memory_context, options)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Memory query failed; continuing without entities");
            MemoryQueryResult::default()
        });

    let history: Vec<_> = context
        .conversation_history
        .iter()
        .filter(|m| matches!(m.role(), Role::User | Role::Assistant))
        .cloned()
        .collect();
    let recent = &history[history.len().saturating_sub(CONTEXT_TURNS)..];
    let contextual_memories = engine
        .get_contextual_memories(recent, context.config.contextual_window)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Contextual memory lookup failed");
            Vec::new()
        });

    let related_clusters = match (clustering, embedding) {
        (Some(coordinator), Some(embedding)) => coordinator
            .related_clusters(embedding, RELATED_CLUSTERS)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Related cluster lookup failed");
                Vec::new()
            }),
        _ => Vec::new(),
    };

    debug!(
        entities = memory.entities.len(),
        contextual = contextual_memories.len(),
        clusters = related_clusters.len(),
        "Input analyzed"
    );

    AnalysisResult {
        input: heuristics,
        memory,
        contextual_memories,
        related_clusters,
        used_embedding: embedding.is_some(),
    }
}
