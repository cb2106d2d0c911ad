//! Thread-safe metrics tracker. Aggregates online and never stores raw
//! samples.

use crate::model::*;
use mindthread_core::ErrorKind;
use std::sync::{PoisonError, RwLock};

/// Weight of the newest sample in the processing-time average.
pub const EMA_ALPHA: f64 = 0.1;

/// The core metrics tracker.
///
/// Thread-safe via `RwLock`. Guards are taken and released inside each
/// method, never across an `.await`.
#[derive(Debug, Default)]
pub struct MetricsTracker {
    inner: RwLock<AgentMetrics>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished request into the running statistics.
    pub fn update_metrics(
        &self,
        processing_time_ms: u64,
        success: bool,
        conversation_length: usize,
        working_memory_size: usize,
    ) {
        let mut m = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        m.total_requests += 1;
        let n = m.total_requests as f64;

        m.average_processing_time =
            EMA_ALPHA * processing_time_ms as f64 + (1.0 - EMA_ALPHA) * m.average_processing_time;

        let outcome = if success { 1.0 } else { 0.0 };
        m.success_rate = (m.success_rate * (n - 1.0) + outcome) / n;

        m.memory_usage = MemoryUsage {
            conversation_history: conversation_length,
            working_memory: working_memory_size,
            total: conversation_length + working_memory_size,
        };

        tracing::debug!(
            total_requests = m.total_requests,
            avg_ms = m.average_processing_time,
            success_rate = m.success_rate,
            "Metrics updated"
        );
    }

    /// Count one invocation of a capability.
    pub fn record_capability_use(&self, capability_id: &str) {
        let mut m = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *m.capability_usage.entry(capability_id.to_string()).or_insert(0) += 1;
    }

    pub fn record_error(&self, kind: ErrorKind) {
        let mut m = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        m.errors.total += 1;
        *m.errors.by_type.entry(kind).or_insert(0) += 1;
    }

    /// An owned snapshot; later updates do not affect it.
    pub fn metrics(&self) -> AgentMetrics {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
