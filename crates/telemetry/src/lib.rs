//! Streaming request metrics for MindThread.
//!
//! Tracks request counts, an exponential moving average of processing
//! time, the running success rate, per-capability usage, and error counts
//! by kind. Everything is aggregated online; no raw samples are kept.

pub mod engine;
pub mod model;

pub use engine::{EMA_ALPHA, MetricsTracker};
pub use model::{AgentMetrics, ErrorStats, MemoryUsage};
