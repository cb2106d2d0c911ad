//! Data model for the agent's streaming statistics.

use std::collections::BTreeMap;
use mindthread_core::ErrorKind;
use serde::{Deserialize, Serialize};

// ── Memory usage ──────────────────────────────────────────────────────────

/// Sizes observed at the end of the most recent request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Turns in the session's conversation log.
    pub conversation_history: usize,
    /// Entries in the session's working memory.
    pub working_memory: usize,
    /// Sum of the two.
    pub total: usize,
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total: u64,
    pub by_type: BTreeMap<ErrorKind, u64>,
}

impl ErrorStats {
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.by_type.get(&kind).copied().unwrap_or(0)
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────

/// An owned snapshot of the tracker's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub total_requests: u64,
    /// Exponential moving average in milliseconds.
    pub average_processing_time: f64,
    /// Running mean of request outcomes, in `[0, 1]`.
    pub success_rate: f64,
    pub capability_usage: BTreeMap<String, u64>,
    pub memory_usage: MemoryUsage,
    pub errors: ErrorStats,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            average_processing_time: 0.0,
            success_rate: 1.0,
            capability_usage: BTreeMap::new(),
            memory_usage: MemoryUsage::default(),
            errors: ErrorStats::default(),
        }
    }
}

impl AgentMetrics {
    /// One-line human summary, used by the CLI.
    pub fn summary(&self) -> String {
        format!(
            "{} requests | avg {:.1}ms | success {:.0}% | {} errors",
            self.total_requests,
            self.average_processing_time,
            self.success_rate * 100.0,
            self.errors.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_seeded() {
        let m = AgentMetrics::default();
        assert_eq!(m.total_requests, 0);
        assert_eq!(m.average_processing_time, 0.0);
        assert_eq!(m.success_rate, 1.0);
        assert_eq!(m.errors.count(ErrorKind::Memory), 0);
    }

    #[test]
    fn error_kinds_serialize_as_map_keys() {
        let mut stats = ErrorStats::default();
        stats.by_type.insert(ErrorKind::Network, 2);
        stats.total = 2;
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"network\":2"));
    }

    #[test]
    fn summary_formats_percentages() {
        let m = AgentMetrics {
            total_requests: 4,
            average_processing_time: 12.34,
            success_rate: 0.75,
            ..AgentMetrics::default()
        };
        assert_eq!(m.summary(), "4 requests | avg 12.3ms | success 75% | 0 errors");
    }
}
