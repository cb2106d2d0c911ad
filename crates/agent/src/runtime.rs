//! The agent runtime — owns the collaborators and runs every request
//! through a fixed pipeline.
//!
//! ```text
//! process_request(input, partial context)
//!   ├─ normalize input (transcribe audio)
//!   ├─ ensure one-time initialization
//!   ├─ lock the session, record the user turn
//!   ├─ embed (optional) → store memory (best-effort) → refresh clusters
//!   ├─ analyze against memory
//!   ├─ bounded tool-call loop
//!   └─ record the reply, synthesize audio (optional), update metrics
//! ```
//!
//! The whole pipeline runs under the configured deadline. Any error in it
//! becomes an apology response; `process_request` itself never fails.
//!
//! Requests for different sessions run concurrently. Requests for the same
//! session are serialized by a per-session lock held for the whole request.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use mindthread_config::AppConfig;
use mindthread_core::agent::{
    AgentConfig, AgentContext, AgentInput, AgentResponse, PartialContext, ReasoningStep,
    ResponseMetadata, StepType, WorkingMemory,
};
use mindthread_core::capability::CapabilityRegistry;
use mindthread_core::error::{Error, ErrorKind, Result, SpeechError};
use mindthread_core::memory::{AddMemoryOptions, MemoryEngine, MemoryEngineConfig};
use mindthread_core::message::ConversationMessage;
use mindthread_core::provider::{EmbeddingRequest, Provider};
use mindthread_core::speech::SpeechEngine;
use mindthread_telemetry::{AgentMetrics, MetricsTracker};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use crate::analysis;
use crate::clustering::{ClusteringCoordinator, ClusteringOptions, ClusteringState};
use crate::conversation::ConversationManager;
use crate::tool_loop::ToolCallLoop;

/// Reply sent when a request fails or runs past its deadline.
pub const APOLOGY_RESPONSE: &str =
    "I'm sorry, I ran into a problem while handling that. Please try again.";

/// Reply sent when no memory engine is attached.
pub const NO_MEMORY_RESPONSE: &str =
    "I can't handle requests right now because my memory system is unavailable.";

/// Stands in for the user's words when audio cannot be transcribed.
pub const TRANSCRIPTION_FAILED: &str = "[Audio transcription failed]";

// ── State reporting ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turns: usize,
    pub working_memory_entries: usize,
    pub last_active: DateTime<Utc>,
}

/// Point-in-time view of the runtime.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub lifecycle: Lifecycle,
    /// Requests currently inside `process_request`
    pub active_requests: usize,
    /// Most recently active first
    pub sessions: Vec<SessionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustering: Option<ClusteringState>,
    pub metrics: AgentMetrics,
}

// ── Sessions ──────────────────────────────────────────────────────────────

struct Session {
    conversation: tokio::sync::Mutex<ConversationManager>,
    working_memory: WorkingMemory,
    /// Mirror of the conversation length, readable without the lock
    turns: AtomicUsize,
}

impl Session {
    fn new(max_history: usize) -> Self {
        Self {
            conversation: tokio::sync::Mutex::new(ConversationManager::new(max_history)),
            working_memory: WorkingMemory::new(),
            turns: AtomicUsize::new(0),
        }
    }
}

struct SessionEntry {
    session: Arc<Session>,
    last_used: u64,
    last_active: DateTime<Utc>,
}

/// Sessions keyed by id, bounded with least-recently-used eviction.
#[derive(Default)]
struct SessionTable {
    entries: HashMap<String, SessionEntry>,
    clock: u64,
}

impl SessionTable {
    fn checkout(&mut self, id: &str, max_history: usize, max_sessions: usize) -> Arc<Session> {
        self.clock += 1;
        let tick = self.clock;

        if let Some(entry) = self.entries.get_mut(id) {
            entry.last_used = tick;
            entry.last_active = Utc::now();
            return Arc::clone(&entry.session);
        }

        while self.entries.len() >= max_sessions.max(1) {
            if !self.evict_one() {
                break;
            }
        }

        let session = Arc::new(Session::new(max_history));
        self.entries.insert(
            id.to_string(),
            SessionEntry {
                session: Arc::clone(&session),
                last_used: tick,
                last_active: Utc::now(),
            },
        );
        session
    }

    /// Drop the least recently used idle session. Sessions a request still
    /// holds are never evicted, so the table may briefly exceed its cap.
    fn evict_one(&mut self) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|(_, e)| Arc::strong_count(&e.session) == 1)
            .min_by_key(|(_, e)| e.last_used)
            .map(|(id, _)| id.clone());
        match victim {
            Some(id) => {
                self.entries.remove(&id);
                debug!(session_id = %id, "Evicted least recently used session");
                true
            }
            None => false,
        }
    }

    fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.entries.get(id).map(|e| Arc::clone(&e.session))
    }
}

/// Counts a request as active for as long as it lives.
struct ActiveRequest<'a>(&'a AtomicUsize);

impl<'a> ActiveRequest<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveRequest<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What a pipeline run that did not error hands back.
struct Completed {
    content: String,
    confidence: f32,
    capability_calls: Vec<String>,
    iterations: u32,
    audio_path: Option<PathBuf>,
    success: bool,
    error_kind: Option<ErrorKind>,
}

// ── Runtime ───────────────────────────────────────────────────────────────

pub struct AgentRuntime {
    config: Arc<AgentConfig>,
    provider: Arc<dyn Provider>,
    registry: Arc<CapabilityRegistry>,
    memory: Option<Arc<dyn MemoryEngine>>,
    speech: Option<Arc<dyn SpeechEngine>>,
    clustering_options: ClusteringOptions,
    clustering: Option<ClusteringCoordinator>,
    memory_config: MemoryEngineConfig,
    metrics: MetricsTracker,
    init: OnceCell<()>,
    lifecycle: RwLock<Lifecycle>,
    sessions: Mutex<SessionTable>,
    active_requests: AtomicUsize,
}

impl AgentRuntime {
    pub fn new(provider: Arc<dyn Provider>, config: AgentConfig) -> Self {
        let memory_config = MemoryEngineConfig {
            storage_path: None,
            namespace: config.name.to_lowercase(),
        };
        Self {
            config: Arc::new(config),
            provider,
            registry: Arc::new(CapabilityRegistry::new()),
            memory: None,
            speech: None,
            clustering_options: ClusteringOptions::default(),
            clustering: None,
            memory_config,
            metrics: MetricsTracker::new(),
            init: OnceCell::new(),
            lifecycle: RwLock::new(Lifecycle::Uninitialized),
            sessions: Mutex::new(SessionTable::default()),
            active_requests: AtomicUsize::new(0),
        }
    }

    /// A runtime configured from the application config. Collaborators
    /// (memory, speech, capabilities) are attached with the `with_*` methods.
    pub fn from_config(app: &AppConfig, provider: Arc<dyn Provider>) -> Self {
        Self::new(provider, app.to_agent_config())
            .with_memory_config(app.memory_engine_config())
            .with_clustering(ClusteringOptions::from_app_config(app))
    }

    pub fn with_memory(mut self, engine: Arc<dyn MemoryEngine>) -> Self {
        self.clustering = Some(ClusteringCoordinator::new(
            Arc::clone(&engine),
            self.clustering_options.clone(),
        ));
        self.memory = Some(engine);
        self
    }

    pub fn with_speech(mut self, engine: Arc<dyn SpeechEngine>) -> Self {
        self.speech = Some(engine);
        self
    }

    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_clustering(mut self, options: ClusteringOptions) -> Self {
        if let Some(engine) = &self.memory {
            self.clustering = Some(ClusteringCoordinator::new(Arc::clone(engine), options.clone()));
        }
        self.clustering_options = options;
        self
    }

    pub fn with_memory_config(mut self, config: MemoryEngineConfig) -> Self {
        self.memory_config = config;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn memory_engine(&self) -> Option<&Arc<dyn MemoryEngine>> {
        self.memory.as_ref()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Initialize the memory engine and bootstrap clustering. Runs at most
    /// once successfully; concurrent callers wait for the same attempt, and
    /// a failed attempt is retried by the next caller.
    pub async fn initialize(&self) -> Result<()> {
        self.init
            .get_or_try_init(|| self.run_initialization())
            .await
            .map(|_| ())
    }

    async fn run_initialization(&self) -> Result<()> {
        self.set_lifecycle(Lifecycle::Initializing);
        let result = self.initialize_collaborators().await;
        self.set_lifecycle(if result.is_ok() {
            Lifecycle::Ready
        } else {
            Lifecycle::Uninitialized
        });
        result
    }

    async fn initialize_collaborators(&self) -> Result<()> {
        match &self.memory {
            Some(engine) => {
                engine.initialize(&self.memory_config).await.map_err(|e| {
                    Error::config(format!("memory engine '{}' failed to initialize: {e}", engine.name()))
                })?;
                info!(engine = engine.name(), "Memory engine initialized");
            }
            None => warn!("No memory engine attached; requests cannot be analyzed"),
        }

        if let Some(coordinator) = &self.clustering {
            let outcome = coordinator.bootstrap(Utc::now()).await;
            debug!(?outcome, "Initial clustering");
        }

        info!(
            agent = %self.config.name,
            capabilities = self.registry.len(),
            speech = self.speech.is_some(),
            "Agent runtime ready"
        );
        Ok(())
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *self.lifecycle.write().unwrap_or_else(PoisonError::into_inner) = lifecycle;
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Requests ──────────────────────────────────────────────────────────

    /// Handle one user turn. Always returns a response; failures are
    /// reported through `metadata.success` and `metadata.error_kind`.
    pub async fn process_request(
        &self,
        input: impl Into<AgentInput>,
        partial: PartialContext,
    ) -> AgentResponse {
        let start = Instant::now();
        let _active = ActiveRequest::enter(&self.active_requests);

        let user_id = partial
            .user_id
            .clone()
            .unwrap_or_else(|| self.config.default_user_id.clone());
        let session_id = partial
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = self.checkout_session(&session_id);

        let mut reasoning = Vec::new();
        let deadline = Duration::from_millis(self.config.max_processing_time_ms);
        let pipeline = self.run_pipeline(input.into(), &partial, &user_id, &session_id, &session, &mut reasoning);
        let result = match tokio::time::timeout(deadline, pipeline).await {
            Ok(result) => result,
            Err(_) => Err(Error::Processing(format!(
                "request exceeded the {}ms deadline",
                deadline.as_millis()
            ))),
        };

        let processing_time_ms = start.elapsed().as_millis() as u64;
        let conversation_length = session.turns.load(Ordering::SeqCst);
        let working_memory_size = session.working_memory.len();

        match result {
            Ok(done) => {
                for id in &done.capability_calls {
                    self.metrics.record_capability_use(id);
                }
                if let Some(kind) = done.error_kind {
                    self.metrics.record_error(kind);
                }
                self.metrics
                    .update_metrics(processing_time_ms, done.success, conversation_length, working_memory_size);

                let mut capabilities_used = Vec::new();
                for id in done.capability_calls {
                    if !capabilities_used.contains(&id) {
                        capabilities_used.push(id);
                    }
                }

                info!(
                    session_id = %session_id,
                    ms = processing_time_ms,
                    iterations = done.iterations,
                    success = done.success,
                    "Request handled"
                );
                AgentResponse {
                    id: Uuid::new_v4().to_string(),
                    content: done.content,
                    reasoning,
                    confidence: done.confidence,
                    capabilities_used,
                    audio_path: done.audio_path,
                    metadata: ResponseMetadata {
                        session_id,
                        user_id,
                        processing_time_ms,
                        iterations: done.iterations,
                        success: done.success,
                        error_kind: done.error_kind,
                    },
                }
            }
            Err(e) => {
                let kind = e.kind();
                error!(session_id = %session_id, kind = %kind, error = %e, "Request failed");
                reasoning.push(ReasoningStep::error(
                    e.to_string(),
                    serde_json::json!({ "kind": kind }),
                ));
                self.metrics.record_error(kind);
                self.metrics
                    .update_metrics(processing_time_ms, false, conversation_length, working_memory_size);

                AgentResponse {
                    id: Uuid::new_v4().to_string(),
                    content: APOLOGY_RESPONSE.to_string(),
                    reasoning,
                    confidence: 0.0,
                    capabilities_used: Vec::new(),
                    audio_path: None,
                    metadata: ResponseMetadata {
                        session_id,
                        user_id,
                        processing_time_ms,
                        iterations: 0,
                        success: false,
                        error_kind: Some(kind),
                    },
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        input: AgentInput,
        partial: &PartialContext,
        user_id: &str,
        session_id: &str,
        session: &Session,
        reasoning: &mut Vec<ReasoningStep>,
    ) -> Result<Completed> {
        self.initialize().await?;

        let (raw, default_source, input_confidence) = self.normalize_input(input).await;
        let content = raw.trim().to_string();
        if content.is_empty() {
            return Err(Error::Validation("input is empty".into()));
        }
        let source = partial.source.clone().unwrap_or_else(|| default_source.to_string());
        reasoning.push(ReasoningStep::new(
            StepType::Observation,
            "Received user input",
            serde_json::json!({ "source": source }),
            serde_json::json!({ "content": content }),
            input_confidence,
        ));

        let mut conversation = session.conversation.lock().await;
        conversation.add_message(
            ConversationMessage::user(content.clone()).with_metadata("source", serde_json::json!(source)),
        );
        session.turns.store(conversation.len(), Ordering::SeqCst);

        let mut context = AgentContext {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            relevant_entities: partial.relevant_entities.clone(),
            source,
            conversation_history: conversation.history().to_vec(),
            capabilities: self.registry.descriptors(),
            working_memory: session.working_memory.clone(),
            config: Arc::clone(&self.config),
        };

        let Some(engine) = self.memory.as_deref() else {
            warn!(session_id, "No memory engine; request cannot be analyzed");
            reasoning.push(ReasoningStep::error(
                "No memory engine available to analyze the request",
                serde_json::json!({ "stage": "analysis" }),
            ));
            return Ok(Completed {
                content: NO_MEMORY_RESPONSE.to_string(),
                confidence: 0.0,
                capability_calls: Vec::new(),
                iterations: 0,
                audio_path: None,
                success: false,
                error_kind: Some(ErrorKind::Memory),
            });
        };

        let embedding = self.embed(&content).await;
        self.store_memory(engine, &content, &context, embedding.as_deref()).await;
        if let Some(coordinator) = &self.clustering {
            coordinator.maybe_refresh(Utc::now()).await;
        }

        let analysis =
            analysis::analyze(engine, self.clustering.as_ref(), &content, embedding.as_deref(), &context).await;
        reasoning.push(ReasoningStep::new(
            StepType::Analysis,
            "Analyzed input against memory",
            serde_json::json!({ "content": content, "used_embedding": analysis.used_embedding }),
            serde_json::to_value(&analysis)?,
            analysis.confidence(),
        ));
        for name in analysis.entity_names() {
            if !context.relevant_entities.iter().any(|e| e == name) {
                context.relevant_entities.push(name.to_string());
            }
        }

        let summary = analysis.summary();
        reasoning.push(ReasoningStep::new(
            StepType::Planning,
            "Prepared model request",
            serde_json::json!({
                "capabilities": self.registry.ids(),
                "relevant_entities": context.relevant_entities,
            }),
            serde_json::json!({ "analysis_summary": summary.is_some() }),
            analysis.confidence(),
        ));

        let tool_loop = ToolCallLoop::new(Arc::clone(&self.provider), Arc::clone(&self.registry));
        let outcome = tool_loop.run(&context, summary.as_deref()).await?;
        for failure in &outcome.failures {
            self.record_recovered(failure.clone());
        }
        if !outcome.capabilities_used.is_empty() {
            reasoning.push(ReasoningStep::new(
                StepType::Execution,
                "Executed capabilities",
                serde_json::json!({ "calls": outcome.capabilities_used }),
                serde_json::json!({ "iterations": outcome.iterations }),
                outcome.reasoning_step.confidence,
            ));
        }
        reasoning.push(outcome.reasoning_step.clone());

        conversation.add_message(ConversationMessage::assistant(outcome.text.clone()));
        session.turns.store(conversation.len(), Ordering::SeqCst);

        let audio_path = if partial.synthesize_audio {
            self.synthesize(&outcome.text).await
        } else {
            None
        };

        Ok(Completed {
            confidence: outcome.reasoning_step.confidence,
            content: outcome.text,
            capability_calls: outcome.capabilities_used,
            iterations: outcome.iterations,
            audio_path,
            success: true,
            error_kind: None,
        })
    }

    /// Text for the turn, its default source tag, and how much to trust it.
    async fn normalize_input(&self, input: AgentInput) -> (String, &'static str, f32) {
        match input {
            AgentInput::Text(text) => (text, "text", 1.0),
            AgentInput::Audio(path) => {
                let transcript = match &self.speech {
                    Some(engine) => engine.transcribe(&path).await,
                    None => Err(SpeechError::NotConfigured),
                };
                match transcript {
                    Ok(text) => (text, "audio", 0.8),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Transcription failed");
                        self.record_recovered(e);
                        (TRANSCRIPTION_FAILED.to_string(), "audio", 0.0)
                    }
                }
            }
        }
    }

    async fn embed(&self, content: &str) -> Option<Vec<f32>> {
        let model = self.config.embedding_model.clone()?;
        match self.provider.embed(EmbeddingRequest::single(model, content)).await {
            Ok(response) => response.into_first(),
            Err(e) => {
                warn!(error = %e, "Embedding failed; continuing without one");
                self.record_recovered(e);
                None
            }
        }
    }

    /// Best-effort write. A failed write that carried an embedding is
    /// retried once without it.
    async fn store_memory(
        &self,
        engine: &dyn MemoryEngine,
        content: &str,
        context: &AgentContext,
        embedding: Option<&[f32]>,
    ) {
        let memory_context = context.memory_context();
        let tags = vec!["conversation".to_string(), context.source.clone()];
        let options = AddMemoryOptions {
            embedding: embedding.map(<[f32]>::to_vec),
            tags: tags.clone(),
        };

        let err = match engine.add_memory(content, &memory_context, options).await {
            Ok(stored) => {
                debug!(node_id = %stored.node_id, entities = stored.entities_extracted, "Memory stored");
                return;
            }
            Err(e) => e,
        };

        if embedding.is_none() {
            warn!(error = %err, "Memory write failed");
            self.record_recovered(err);
            return;
        }

        warn!(error = %err, "Memory write with embedding failed; retrying without");
        let retry = AddMemoryOptions { embedding: None, tags };
        match engine.add_memory(content, &memory_context, retry).await {
            Ok(stored) => debug!(node_id = %stored.node_id, "Memory stored without embedding"),
            Err(e) => {
                warn!(error = %e, "Memory write failed after retry");
                self.record_recovered(e);
            }
        }
    }

    async fn synthesize(&self, text: &str) -> Option<PathBuf> {
        let Some(engine) = &self.speech else {
            debug!("Audio reply requested but no speech engine attached");
            return None;
        };
        match engine.synthesize(text).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "Speech synthesis failed");
                self.record_recovered(e);
                None
            }
        }
    }

    /// Count a failure the request absorbed without failing.
    fn record_recovered(&self, err: impl Into<Error>) {
        self.metrics.record_error(err.into().kind());
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn metrics(&self) -> AgentMetrics {
        self.metrics.metrics()
    }

    pub fn state(&self) -> AgentState {
        let mut sessions: Vec<SessionSummary> = {
            let table = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            table
                .entries
                .iter()
                .map(|(id, entry)| SessionSummary {
                    session_id: id.clone(),
                    turns: entry.session.turns.load(Ordering::SeqCst),
                    working_memory_entries: entry.session.working_memory.len(),
                    last_active: entry.last_active,
                })
                .collect()
        };
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active));

        AgentState {
            lifecycle: self.lifecycle(),
            active_requests: self.active_requests.load(Ordering::SeqCst),
            sessions,
            clustering: self.clustering.as_ref().map(ClusteringCoordinator::state),
            metrics: self.metrics(),
        }
    }

    /// The retained turns of a session, oldest first. Waits for any
    /// in-flight request on that session.
    pub async fn session_history(&self, session_id: &str) -> Option<Vec<ConversationMessage>> {
        let session = self.find_session(session_id)?;
        let conversation = session.conversation.lock().await;
        Some(conversation.history().to_vec())
    }

    pub fn working_memory(&self, session_id: &str) -> Option<WorkingMemory> {
        self.find_session(session_id).map(|s| s.working_memory.clone())
    }

    /// Forget a session's turns and working memory. Returns `false` for an
    /// unknown session.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        let Some(session) = self.find_session(session_id) else {
            return false;
        };
        let mut conversation = session.conversation.lock().await;
        conversation.clear();
        session.turns.store(0, Ordering::SeqCst);
        for key in session.working_memory.snapshot().into_keys() {
            session.working_memory.remove(&key);
        }
        info!(session_id, "Session cleared");
        true
    }

    fn checkout_session(&self, session_id: &str) -> Arc<Session> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .checkout(session_id, self.config.max_conversation_history, self.config.max_sessions)
    }

    fn find_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
    }
}
