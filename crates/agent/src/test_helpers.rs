//! Shared test doubles for the runtime, loop, and clustering tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use mindthread_core::error::{MemoryError, ProviderError, SpeechError};
use mindthread_core::memory::{
    AddMemoryOptions, AddMemoryResult, Cluster, ClusteringConfig, Entity, MemoryContext,
    MemoryEngine, MemoryEngineConfig, MemoryNode, MemoryQueryResult, MemoryStats, QueryOptions,
};
use mindthread_core::message::{ConversationMessage, Message, MessageToolCall};
use mindthread_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use mindthread_core::speech::SpeechEngine;

// ── Provider ──────────────────────────────────────────────────────────────

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue. When
/// built with [`repeating`](Self::repeating) the last response is served
/// forever; otherwise running out of responses panics.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
    repeat_last: bool,
    delay: Option<Duration>,
    failure: Option<ProviderError>,
    embedding: Option<Vec<f32>>,
    embed_calls: AtomicUsize,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
            repeat_last: false,
            delay: None,
            failure: None,
            embedding: None,
            embed_calls: AtomicUsize::new(0),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    /// Serve `response` on every call.
    pub fn repeating(response: ProviderResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![response])
        }
    }

    /// Fail every completion with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            *self.call_count.lock().unwrap() += 1;
            return Err(error.clone());
        }

        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();

        let index = if self.repeat_last {
            (*count).min(responses.len().saturating_sub(1))
        } else {
            *count
        };
        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                *count,
                responses.len()
            );
        }

        let response = responses[index].clone();
        *count += 1;
        Ok(response)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        match &self.embedding {
            Some(embedding) => Ok(EmbeddingResponse {
                embeddings: request.inputs.iter().map(|_| embedding.clone()).collect(),
                model: request.model,
            }),
            None => Err(ProviderError::NotConfigured("no embeddings in mock".into())),
        }
    }
}

fn mock_usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut msg = Message::assistant(thought);
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

// ── Memory engine ─────────────────────────────────────────────────────────

/// A scriptable memory engine that counts calls and records what it stored.
#[derive(Default)]
pub struct MockMemoryEngine {
    fail_init: bool,
    fail_add_with_embedding: bool,
    fail_add_always: bool,
    fail_clusters: bool,
    cluster_delay: Option<Duration>,
    entities: Vec<Entity>,
    contextual: Vec<MemoryNode>,
    init_calls: AtomicUsize,
    cluster_calls: AtomicUsize,
    /// One entry per `add_memory` call: (content, had embedding)
    adds: Mutex<Vec<(String, bool)>>,
    queries: Mutex<Vec<QueryOptions>>,
}

impl MockMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Reject writes that carry an embedding; plain writes succeed.
    pub fn with_embedding_write_failure(mut self) -> Self {
        self.fail_add_with_embedding = true;
        self
    }

    pub fn with_failing_writes(mut self) -> Self {
        self.fail_add_always = true;
        self
    }

    pub fn with_failing_clusters(mut self) -> Self {
        self.fail_clusters = true;
        self
    }

    pub fn with_cluster_delay(mut self, delay: Duration) -> Self {
        self.cluster_delay = Some(delay);
        self
    }

    pub fn with_entity(mut self, name: &str) -> Self {
        self.entities.push(Entity {
            id: format!("entity:{}", name.to_lowercase()),
            name: name.to_string(),
            kind: "concept".into(),
            score: 0.9,
        });
        self
    }

    pub fn with_contextual_memory(mut self, content: &str) -> Self {
        self.contextual.push(MemoryNode {
            id: format!("node-{}", self.contextual.len()),
            content: content.to_string(),
            created_at: Utc::now(),
            score: 0.8,
            embedding: None,
        });
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn cluster_calls(&self) -> usize {
        self.cluster_calls.load(Ordering::SeqCst)
    }

    pub fn adds(&self) -> Vec<(String, bool)> {
        self.adds.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<QueryOptions> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryEngine for MockMemoryEngine {
    fn name(&self) -> &str {
        "mock_memory"
    }

    async fn initialize(&self, _config: &MemoryEngineConfig) -> Result<(), MemoryError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(MemoryError::InitializationFailed("mock refused".into()));
        }
        Ok(())
    }

    async fn add_memory(
        &self,
        content: &str,
        _context: &MemoryContext,
        options: AddMemoryOptions,
    ) -> Result<AddMemoryResult, MemoryError> {
        let with_embedding = options.embedding.is_some();
        self.adds.lock().unwrap().push((content.to_string(), with_embedding));
        if self.fail_add_always || (self.fail_add_with_embedding && with_embedding) {
            return Err(MemoryError::Storage("mock write failure".into()));
        }
        Ok(AddMemoryResult {
            node_id: format!("node-{content}"),
            ..AddMemoryResult::default()
        })
    }

    async fn query_memory(
        &self,
        _query: &str,
        _context: &MemoryContext,
        options: QueryOptions,
    ) -> Result<MemoryQueryResult, MemoryError> {
        let limit = options.limit;
        self.queries.lock().unwrap().push(options);
        Ok(MemoryQueryResult {
            entities: self.entities.iter().take(limit).cloned().collect(),
            ..MemoryQueryResult::default()
        })
    }

    async fn create_clusters(&self, _config: &ClusteringConfig) -> Result<Vec<Cluster>, MemoryError> {
        self.cluster_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.cluster_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_clusters {
            return Err(MemoryError::ClusteringFailed("mock clustering failure".into()));
        }
        Ok(vec![Cluster {
            id: "cluster-0".into(),
            label: "projects".into(),
            member_ids: vec!["node-a".into(), "node-b".into()],
            centroid: vec![1.0, 0.0],
            coherence: 0.9,
        }])
    }

    async fn find_related_clusters(
        &self,
        _embedding: &[f32],
        clusters: &[Cluster],
        k: usize,
    ) -> Result<Vec<Cluster>, MemoryError> {
        Ok(clusters.iter().take(k).cloned().collect())
    }

    async fn get_contextual_memories(
        &self,
        _history: &[ConversationMessage],
        k: usize,
    ) -> Result<Vec<MemoryNode>, MemoryError> {
        Ok(self.contextual.iter().take(k).cloned().collect())
    }

    async fn stats(&self) -> Result<MemoryStats, MemoryError> {
        Ok(MemoryStats {
            nodes: self.adds.lock().unwrap().len(),
            ..MemoryStats::default()
        })
    }
}

// ── Speech engine ─────────────────────────────────────────────────────────

/// Speech engine with a fixed transcript and output path.
pub struct MockSpeechEngine {
    transcript: Option<String>,
    output: PathBuf,
    transcribe_calls: AtomicUsize,
}

impl MockSpeechEngine {
    pub fn transcribing(text: &str) -> Self {
        Self {
            transcript: Some(text.to_string()),
            output: PathBuf::from("/tmp/mindthread-mock-reply.wav"),
            transcribe_calls: AtomicUsize::new(0),
        }
    }

    /// Every transcription fails.
    pub fn broken() -> Self {
        Self {
            transcript: None,
            output: PathBuf::from("/tmp/mindthread-mock-reply.wav"),
            transcribe_calls: AtomicUsize::new(0),
        }
    }

    pub fn transcribe_calls(&self) -> usize {
        self.transcribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechEngine for MockSpeechEngine {
    fn name(&self) -> &str {
        "mock_speech"
    }

    async fn transcribe(&self, _audio_path: &Path) -> Result<String, SpeechError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        self.transcript
            .clone()
            .ok_or_else(|| SpeechError::TranscriptionFailed("mock decoder crashed".into()))
    }

    async fn synthesize(&self, _text: &str) -> Result<PathBuf, SpeechError> {
        Ok(self.output.clone())
    }
}
