//! In-process memory graph — a small, dependency-free `MemoryEngine`.
//!
//! Stores memory nodes with optional embeddings, tags capitalized terms as
//! entities, links entities that co-occur in one memory, and clusters
//! embedded nodes greedily around running centroids. Suitable for the CLI
//! and for tests; nothing is persisted.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mindthread_core::error::MemoryError;
use mindthread_core::memory::*;
use mindthread_core::message::ConversationMessage;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;
use crate::text;
use crate::vector::{centroid, cosine_similarity};

const CO_OCCURRENCE: &str = "mentioned_with";

#[derive(Debug, Clone)]
struct StoredNode {
    id: String,
    content: String,
    user_id: String,
    created_at: DateTime<Utc>,
    embedding: Option<Vec<f32>>,
    terms: BTreeSet<String>,
    entity_keys: Vec<String>,
}

impl StoredNode {
    fn to_node(&self, score: f32) -> MemoryNode {
        MemoryNode {
            id: self.id.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
            score,
            embedding: self.embedding.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct EntityRecord {
    id: String,
    name: String,
    mentions: usize,
}

#[derive(Debug, Default)]
struct GraphState {
    initialized: bool,
    namespace: String,
    nodes: Vec<StoredNode>,
    /// Keyed by lowercased name
    entities: BTreeMap<String, EntityRecord>,
    /// Keyed by the ordered pair of entity keys
    relationships: HashMap<(String, String), f32>,
}

impl GraphState {
    fn entity(&self, key: &str, score: f32) -> Option<Entity> {
        self.entities.get(key).map(|e| Entity {
            id: e.id.clone(),
            name: e.name.clone(),
            kind: "concept".into(),
            score,
        })
    }
}

/// The in-process memory graph.
#[derive(Default)]
pub struct InMemoryGraph {
    state: RwLock<GraphState>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ready(&self) -> Result<tokio::sync::RwLockReadGuard<'_, GraphState>, MemoryError> {
        let state = self.state.read().await;
        if !state.initialized {
            return Err(MemoryError::NotInitialized);
        }
        Ok(state)
    }
}

#[async_trait]
impl MemoryEngine for InMemoryGraph {
    fn name(&self) -> &str {
        "in_memory_graph"
    }

    async fn initialize(&self, config: &MemoryEngineConfig) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        if config.storage_path.is_some() {
            debug!("in_memory_graph ignores storage_path; memories live for the process lifetime");
        }
        state.namespace = config.namespace.clone();
        state.initialized = true;
        info!(namespace = %state.namespace, "Memory graph initialized");
        Ok(())
    }

    async fn add_memory(
        &self,
        content: &str,
        context: &MemoryContext,
        options: AddMemoryOptions,
    ) -> Result<AddMemoryResult, MemoryError> {
        let mut state = self.state.write().await;
        if !state.initialized {
            return Err(MemoryError::NotInitialized);
        }
        if content.trim().is_empty() {
            return Err(MemoryError::Storage("refusing to store empty content".into()));
        }

        // Keep embedding dimensions consistent across the store
        if let Some(emb) = &options.embedding {
            let existing = state.nodes.iter().find_map(|n| n.embedding.as_ref().map(Vec::len));
            if existing.is_some_and(|dim| dim != emb.len()) {
                return Err(MemoryError::Storage(format!(
                    "embedding dimension {} does not match store",
                    emb.len()
                )));
            }
        }

        let names = text::capitalized_terms(content);
        let mut entity_keys = Vec::with_capacity(names.len());
        for name in &names {
            let key = name.to_lowercase();
            state
                .entities
                .entry(key.clone())
                .and_modify(|e| e.mentions += 1)
                .or_insert_with(|| EntityRecord {
                    id: format!("entity:{key}"),
                    name: name.clone(),
                    mentions: 1,
                });
            entity_keys.push(key);
        }

        let mut relationships_extracted = 0;
        for (i, a) in entity_keys.iter().enumerate() {
            for b in &entity_keys[i + 1..] {
                let pair = if a <= b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
                *state.relationships.entry(pair).or_insert(0.0) += 1.0;
                relationships_extracted += 1;
            }
        }

        let id = Uuid::new_v4().to_string();
        state.nodes.push(StoredNode {
            id: id.clone(),
            content: content.to_string(),
            user_id: context.user_id.clone(),
            created_at: context.timestamp,
            embedding: options.embedding,
            terms: text::terms(content),
            entity_keys,
        });

        debug!(
            node_id = %id,
            entities = names.len(),
            relationships = relationships_extracted,
            "Memory stored"
        );

        Ok(AddMemoryResult {
            node_id: id,
            entities_extracted: names.len(),
            relationships_extracted,
        })
    }

    async fn query_memory(
        &self,
        query: &str,
        context: &MemoryContext,
        options: QueryOptions,
    ) -> Result<MemoryQueryResult, MemoryError> {
        let state = self.ready().await?;
        let query_terms = text::terms(query);
        let query_words = text::words(query);

        let user_nodes: Vec<&StoredNode> =
            state.nodes.iter().filter(|n| n.user_id == context.user_id).collect();
        let user_entities: BTreeSet<&str> = user_nodes
            .iter()
            .flat_map(|n| n.entity_keys.iter().map(String::as_str))
            .collect();

        let mut scores: HashMap<String, f32> = HashMap::new();

        // Entities this user has mentioned, named as whole words in the query
        for key in user_entities.iter().filter(|k| query_words.contains(**k)) {
            scores.insert(key.to_string(), 1.0);
        }

        // Entities carried by nodes that match the query
        let nodes_searched = user_nodes.len();
        for node in &user_nodes {
            let keyword = text::overlap(&query_terms, &node.terms);
            let semantic = match (&options.embedding, &node.embedding) {
                (Some(q), Some(e)) => cosine_similarity(q, e).max(0.0),
                _ => 0.0,
            };
            let score = keyword.max(semantic);
            if score <= 0.0 {
                continue;
            }
            for key in &node.entity_keys {
                let entry = scores.entry(key.clone()).or_insert(0.0);
                *entry = entry.max(score);
            }
        }

        let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(options.limit);

        let selected: BTreeSet<&str> = ranked.iter().map(|(k, _)| k.as_str()).collect();
        let entities: Vec<Entity> = ranked
            .iter()
            .filter_map(|(key, score)| state.entity(key, *score))
            .collect();

        let mut relationships: Vec<Relationship> = state
            .relationships
            .iter()
            .filter(|((a, b), _)| selected.contains(a.as_str()) || selected.contains(b.as_str()))
            .filter(|((a, b), _)| user_entities.contains(a.as_str()) && user_entities.contains(b.as_str()))
            .filter_map(|((a, b), weight)| {
                Some(Relationship {
                    source: state.entities.get(a)?.id.clone(),
                    target: state.entities.get(b)?.id.clone(),
                    relation: CO_OCCURRENCE.into(),
                    weight: *weight,
                })
            })
            .collect();
        relationships.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.target.cmp(&b.target))
        });
        relationships.truncate(options.limit);

        Ok(MemoryQueryResult {
            entities,
            relationships,
            metadata: QueryMetadata {
                nodes_searched,
                used_embedding: options.embedding.is_some(),
            },
        })
    }

    async fn create_clusters(&self, config: &ClusteringConfig) -> Result<Vec<Cluster>, MemoryError> {
        let state = self.ready().await?;
        if config.max_clusters == 0 {
            return Err(MemoryError::ClusteringFailed("max_clusters must be > 0".into()));
        }

        struct Group<'a> {
            members: Vec<&'a StoredNode>,
            centroid: Vec<f32>,
        }

        let mut groups: Vec<Group<'_>> = Vec::new();
        for node in &state.nodes {
            let Some(emb) = node.embedding.as_deref() else {
                continue;
            };

            let best = groups
                .iter()
                .enumerate()
                .map(|(i, g)| (i, cosine_similarity(&g.centroid, emb)))
                .filter(|(_, sim)| *sim >= config.similarity_threshold)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            match best {
                Some((i, _)) => {
                    let group = &mut groups[i];
                    group.members.push(node);
                    if let Some(c) = centroid(
                        group.members.iter().filter_map(|m| m.embedding.as_deref()),
                    ) {
                        group.centroid = c;
                    }
                }
                None if groups.len() < config.max_clusters => groups.push(Group {
                    members: vec![node],
                    centroid: emb.to_vec(),
                }),
                None => {}
            }
        }

        let clusters: Vec<Cluster> = groups
            .into_iter()
            .filter(|g| g.members.len() >= config.min_cluster_size)
            .map(|g| {
                let coherence = g
                    .members
                    .iter()
                    .filter_map(|m| m.embedding.as_deref())
                    .map(|e| cosine_similarity(&g.centroid, e))
                    .sum::<f32>()
                    / g.members.len() as f32;
                Cluster {
                    id: Uuid::new_v4().to_string(),
                    label: text::label(g.members.iter().map(|m| m.content.as_str())),
                    member_ids: g.members.iter().map(|m| m.id.clone()).collect(),
                    centroid: g.centroid,
                    coherence: coherence.clamp(0.0, 1.0),
                }
            })
            .collect();

        info!(clusters = clusters.len(), "Clustering complete");
        Ok(clusters)
    }

    async fn find_related_clusters(
        &self,
        embedding: &[f32],
        clusters: &[Cluster],
        k: usize,
    ) -> Result<Vec<Cluster>, MemoryError> {
        if embedding.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &Cluster)> = clusters
            .iter()
            .map(|c| (cosine_similarity(&c.centroid, embedding), c))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored.into_iter().take(k).map(|(_, c)| c.clone()).collect())
    }

    async fn get_contextual_memories(
        &self,
        history: &[ConversationMessage],
        k: usize,
    ) -> Result<Vec<MemoryNode>, MemoryError> {
        let state = self.ready().await?;

        let recent_terms: BTreeSet<String> = history
            .iter()
            .flat_map(|m| text::terms(m.content()))
            .collect();
        let recent_contents: BTreeSet<&str> = history.iter().map(|m| m.content()).collect();

        let mut scored: Vec<MemoryNode> = state
            .nodes
            .iter()
            .filter(|n| !recent_contents.contains(n.content.as_str()))
            .filter_map(|n| {
                let score = text::overlap(&recent_terms, &n.terms);
                (score > 0.0).then(|| n.to_node(score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn stats(&self) -> Result<MemoryStats, MemoryError> {
        let state = self.ready().await?;
        Ok(MemoryStats {
            nodes: state.nodes.len(),
            entities: state.entities.len(),
            relationships: state.relationships.len(),
            embedded_nodes: state.nodes.iter().filter(|n| n.embedding.is_some()).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(user: &str) -> MemoryContext {
        MemoryContext {
            user_id: user.into(),
            session_id: "s1".into(),
            source: "text".into(),
            timestamp: Utc::now(),
        }
    }

    async fn ready_graph() -> InMemoryGraph {
        let graph = InMemoryGraph::new();
        graph
            .initialize(&MemoryEngineConfig {
                storage_path: None,
                namespace: "test".into(),
            })
            .await
            .unwrap();
        graph
    }

    fn with_embedding(v: Vec<f32>) -> AddMemoryOptions {
        AddMemoryOptions {
            embedding: Some(v),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn operations_require_initialization() {
        let graph = InMemoryGraph::new();
        let err = graph
            .add_memory("Alice met Bob", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotInitialized));
        assert!(graph.stats().await.is_err());
    }

    #[tokio::test]
    async fn add_extracts_entities_and_relationships() {
        let graph = ready_graph().await;
        let result = graph
            .add_memory("Alice met Bob in Paris", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap();
        assert_eq!(result.entities_extracted, 3);
        assert_eq!(result.relationships_extracted, 3);

        let stats = graph.stats().await.unwrap();
        assert_eq!(stats.nodes, 1);
        assert_eq!(stats.entities, 3);
        assert_eq!(stats.relationships, 3);
        assert_eq!(stats.embedded_nodes, 0);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let graph = ready_graph().await;
        let err = graph
            .add_memory("   ", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Storage(_)));
    }

    #[tokio::test]
    async fn mismatched_embedding_dimension_is_rejected() {
        let graph = ready_graph().await;
        graph
            .add_memory("first note", &ctx("u"), with_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();
        let err = graph
            .add_memory("second note", &ctx("u"), with_embedding(vec![1.0, 0.0, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Storage(_)));
    }

    #[tokio::test]
    async fn query_finds_named_and_related_entities() {
        let graph = ready_graph().await;
        graph
            .add_memory("Alice works with Bob on the Atlas project", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap();
        graph
            .add_memory("Carol likes gardening", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap();

        let result = graph
            .query_memory("what is alice doing?", &ctx("u"), QueryOptions::default())
            .await
            .unwrap();
        let names: Vec<&str> = result.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names[0], "Alice");
        assert!(names.contains(&"Atlas"));
        assert!(!names.contains(&"Carol"));
        assert!(!result.relationships.is_empty());
        assert!(result.relationships.iter().all(|r| r.relation == CO_OCCURRENCE));
        assert_eq!(result.metadata.nodes_searched, 2);
        assert!(!result.metadata.used_embedding);
    }

    #[tokio::test]
    async fn query_uses_embeddings_when_present() {
        let graph = ready_graph().await;
        graph
            .add_memory("Dinner with Dana", &ctx("u"), with_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();
        graph
            .add_memory("Meeting with Evan", &ctx("u"), with_embedding(vec![0.0, 1.0]))
            .await
            .unwrap();

        let result = graph
            .query_memory(
                "food plans",
                &ctx("u"),
                QueryOptions {
                    embedding: Some(vec![0.9, 0.1]),
                    limit: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].name, "Dana");
        assert!(result.metadata.used_embedding);
    }

    #[tokio::test]
    async fn query_is_scoped_to_user() {
        let graph = ready_graph().await;
        graph
            .add_memory("Frank moved to Berlin", &ctx("someone_else"), AddMemoryOptions::default())
            .await
            .unwrap();
        let result = graph
            .query_memory("moved houses", &ctx("u"), QueryOptions::default())
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.metadata.nodes_searched, 0);
    }

    #[tokio::test]
    async fn names_match_whole_words_of_the_users_own_entities() {
        let graph = ready_graph().await;
        graph
            .add_memory("Al fixed the boiler", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap();
        graph
            .add_memory("Greta runs the bakery", &ctx("someone_else"), AddMemoryOptions::default())
            .await
            .unwrap();

        // "al" is inside "alice" but is not a word of the query
        let result = graph
            .query_memory("ask alice", &ctx("u"), QueryOptions::default())
            .await
            .unwrap();
        assert!(result.entities.is_empty());

        // Another user's entity is invisible even when named
        let result = graph
            .query_memory("is Greta open?", &ctx("u"), QueryOptions::default())
            .await
            .unwrap();
        assert!(result.entities.is_empty());

        let result = graph
            .query_memory("did Al call?", &ctx("u"), QueryOptions::default())
            .await
            .unwrap();
        let names: Vec<&str> = result.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Al"]);
    }

    #[tokio::test]
    async fn clustering_groups_similar_embeddings() {
        let graph = ready_graph().await;
        for (content, emb) in [
            ("rust borrow checker", vec![1.0, 0.0]),
            ("rust lifetimes", vec![0.95, 0.05]),
            ("garden tomatoes", vec![0.0, 1.0]),
            ("garden compost", vec![0.05, 0.95]),
            ("lonely thought", vec![-1.0, 0.0]),
        ] {
            graph.add_memory(content, &ctx("u"), with_embedding(emb)).await.unwrap();
        }
        graph
            .add_memory("no embedding here", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap();

        let clusters = graph.create_clusters(&ClusteringConfig::default()).await.unwrap();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.member_ids.len() == 2));
        assert!(clusters.iter().any(|c| c.label.contains("Rust")));
        assert!(clusters.iter().all(|c| c.coherence > 0.9));
    }

    #[tokio::test]
    async fn clustering_respects_max_clusters() {
        let graph = ready_graph().await;
        for emb in [vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 1.0]] {
            graph.add_memory("note", &ctx("u"), with_embedding(emb)).await.unwrap();
        }
        let config = ClusteringConfig {
            max_clusters: 1,
            ..ClusteringConfig::default()
        };
        let clusters = graph.create_clusters(&config).await.unwrap();
        assert_eq!(clusters.len(), 1);
    }

    #[tokio::test]
    async fn related_clusters_are_ranked_by_centroid() {
        let graph = ready_graph().await;
        let clusters = vec![
            Cluster {
                id: "far".into(),
                label: "Far".into(),
                member_ids: vec![],
                centroid: vec![0.0, 1.0],
                coherence: 1.0,
            },
            Cluster {
                id: "near".into(),
                label: "Near".into(),
                member_ids: vec![],
                centroid: vec![1.0, 0.0],
                coherence: 1.0,
            },
        ];
        let related = graph.find_related_clusters(&[1.0, 0.1], &clusters, 1).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, "near");
        assert!(graph.find_related_clusters(&[], &clusters, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn contextual_memories_skip_the_turns_themselves() {
        let graph = ready_graph().await;
        graph
            .add_memory("planning a hiking trip to the mountains", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap();
        graph
            .add_memory("bought new hiking boots", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap();
        graph
            .add_memory("tax paperwork", &ctx("u"), AddMemoryOptions::default())
            .await
            .unwrap();

        let history = vec![ConversationMessage::user("planning a hiking trip to the mountains")];
        let memories = graph.get_contextual_memories(&history, 5).await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].content, "bought new hiking boots");
        assert!(memories[0].score > 0.0);
    }
}
