//! Memory engine trait — the knowledge store the runtime reads and writes.
//!
//! The engine itself (entity extraction, graph construction, clustering) is
//! an external collaborator. This module fixes the narrow contract the
//! request core depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;
use crate::message::ConversationMessage;

/// Settings passed to [`MemoryEngine::initialize`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryEngineConfig {
    /// Where a persistent engine keeps its data. `None` = in-process only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,

    /// Logical namespace, usually the agent name.
    #[serde(default)]
    pub namespace: String,
}

/// Who and where a memory operation is performed for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryContext {
    pub user_id: String,
    pub session_id: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Options for [`MemoryEngine::add_memory`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddMemoryOptions {
    /// Precomputed embedding for the content, if one could be produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Outcome of storing a memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddMemoryResult {
    pub node_id: String,
    pub entities_extracted: usize,
    pub relationships_extracted: usize,
}

/// Options for [`MemoryEngine::query_memory`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            embedding: None,
            limit: default_limit(),
        }
    }
}

/// A named thing known to the memory graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: String,
    /// Relevance to the query that returned it
    #[serde(default)]
    pub score: f32,
}

/// A directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub relation: String,
    #[serde(default)]
    pub weight: f32,
}

/// Result of a memory query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryQueryResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub metadata: QueryMetadata,
}

impl MemoryQueryResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub nodes_searched: usize,
    pub used_embedding: bool,
}

/// A stored memory node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,

    /// Relevance score (set by retrieval operations)
    #[serde(default)]
    pub score: f32,

    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// A group of semantically similar memory nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub label: String,
    pub member_ids: Vec<String>,
    pub centroid: Vec<f32>,
    /// Mean similarity of members to the centroid
    #[serde(default)]
    pub coherence: f32,
}

/// Clustering algorithm selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    #[default]
    KMeans,
}

/// Parameters for [`MemoryEngine::create_clusters`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub similarity_threshold: f32,
    pub max_clusters: usize,
    pub min_cluster_size: usize,
    #[serde(default)]
    pub algorithm: ClusterAlgorithm,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            max_clusters: 10,
            min_cluster_size: 2,
            algorithm: ClusterAlgorithm::KMeans,
        }
    }
}

/// Engine-wide counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub nodes: usize,
    pub entities: usize,
    pub relationships: usize,
    pub embedded_nodes: usize,
}

/// The memory engine contract.
///
/// Implementations: the in-process graph in `mindthread-memory`, or any
/// external knowledge store wrapped behind this trait.
#[async_trait]
pub trait MemoryEngine: Send + Sync {
    /// The engine name (e.g., "in_memory_graph").
    fn name(&self) -> &str;

    /// Prepare the engine for use. Called once by the runtime.
    async fn initialize(&self, config: &MemoryEngineConfig) -> Result<(), MemoryError>;

    /// Store a piece of content and extract what the engine can from it.
    async fn add_memory(
        &self,
        content: &str,
        context: &MemoryContext,
        options: AddMemoryOptions,
    ) -> Result<AddMemoryResult, MemoryError>;

    /// Find entities and relationships related to `query`.
    async fn query_memory(
        &self,
        query: &str,
        context: &MemoryContext,
        options: QueryOptions,
    ) -> Result<MemoryQueryResult, MemoryError>;

    /// Build a fresh clustering over all stored memories.
    async fn create_clusters(&self, config: &ClusteringConfig) -> Result<Vec<Cluster>, MemoryError>;

    /// Pick the `k` clusters closest to `embedding`.
    async fn find_related_clusters(
        &self,
        embedding: &[f32],
        clusters: &[Cluster],
        k: usize,
    ) -> Result<Vec<Cluster>, MemoryError>;

    /// Memories relevant to the given recent turns.
    async fn get_contextual_memories(
        &self,
        history: &[ConversationMessage],
        k: usize,
    ) -> Result<Vec<MemoryNode>, MemoryError>;

    /// Engine-wide counters.
    async fn stats(&self) -> Result<MemoryStats, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clustering_config_defaults() {
        let config = ClusteringConfig::default();
        assert!((config.similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.max_clusters, 10);
        assert_eq!(config.min_cluster_size, 2);
        assert_eq!(config.algorithm, ClusterAlgorithm::KMeans);
    }

    #[test]
    fn query_options_default_limit() {
        let opts: QueryOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.limit, 10);
        assert!(opts.embedding.is_none());
    }

    #[test]
    fn empty_query_result() {
        assert!(MemoryQueryResult::default().is_empty());
    }
}
