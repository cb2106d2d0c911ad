//! Clustering coordinator — keeps a cached clustering of stored memories
//! fresh without letting refreshes pile up.
//!
//! A refresh runs at most once per interval and never concurrently. A failed
//! refresh either latches clustering off for the process lifetime (the
//! default) or schedules a retry, depending on [`ClusteringFailurePolicy`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use chrono::{DateTime, Utc};
use mindthread_config::{AppConfig, FailurePolicyKind};
use mindthread_core::error::MemoryError;
use mindthread_core::memory::{Cluster, ClusteringConfig, MemoryEngine};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Minimum time between two clustering refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// What a failed refresh does to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusteringFailurePolicy {
    /// Turn clustering off until the process restarts.
    #[default]
    Disable,
    /// Keep clustering on and skip refreshes until `retry_after` has passed.
    Backoff { retry_after: Duration },
}

/// Everything needed to build a [`ClusteringCoordinator`].
#[derive(Debug, Clone)]
pub struct ClusteringOptions {
    pub enabled: bool,
    pub refresh_interval: Duration,
    pub failure_policy: ClusteringFailurePolicy,
    pub config: ClusteringConfig,
}

impl Default for ClusteringOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            failure_policy: ClusteringFailurePolicy::default(),
            config: ClusteringConfig::default(),
        }
    }
}

impl ClusteringOptions {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let failure_policy = match config.clustering.failure_policy {
            FailurePolicyKind::Disable => ClusteringFailurePolicy::Disable,
            FailurePolicyKind::Backoff => ClusteringFailurePolicy::Backoff {
                retry_after: Duration::from_secs(config.clustering.retry_after_secs),
            },
        };
        Self {
            enabled: config.clustering.enabled && config.memory.enabled,
            refresh_interval: Duration::from_secs(config.clustering.refresh_interval_secs),
            failure_policy,
            config: config.clustering_config(),
        }
    }
}

/// Snapshot of the cached clustering.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusteringState {
    pub clusters: Vec<Cluster>,
    pub last_update: Option<DateTime<Utc>>,
    pub enabled: bool,
    /// Set while backing off after a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

/// Why [`ClusteringCoordinator::maybe_refresh`] did or did not refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New clusters were stored; carries their count.
    Refreshed(usize),
    Disabled,
    /// The last refresh is younger than the interval.
    NotDue,
    /// A previous failure's retry time has not been reached.
    BackingOff,
    /// Another refresh is running.
    InFlight,
    Failed,
}

pub struct ClusteringCoordinator {
    engine: Arc<dyn MemoryEngine>,
    config: ClusteringConfig,
    interval: Duration,
    policy: ClusteringFailurePolicy,
    state: RwLock<ClusteringState>,
    refresh_guard: tokio::sync::Mutex<()>,
}

impl ClusteringCoordinator {
    pub fn new(engine: Arc<dyn MemoryEngine>, options: ClusteringOptions) -> Self {
        Self {
            engine,
            config: options.config,
            interval: options.refresh_interval,
            policy: options.failure_policy,
            state: RwLock::new(ClusteringState {
                enabled: options.enabled,
                ..ClusteringState::default()
            }),
            refresh_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ClusteringState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).enabled
    }

    /// Refresh if enabled, not backing off, and the interval has elapsed.
    pub async fn maybe_refresh(&self, now: DateTime<Utc>) -> RefreshOutcome {
        self.refresh(now, true).await
    }

    /// First refresh after initialization; ignores the interval.
    pub async fn bootstrap(&self, now: DateTime<Utc>) -> RefreshOutcome {
        self.refresh(now, false).await
    }

    async fn refresh(&self, now: DateTime<Utc>, respect_interval: bool) -> RefreshOutcome {
        let Ok(_guard) = self.refresh_guard.try_lock() else {
            debug!("Clustering refresh already in flight");
            return RefreshOutcome::InFlight;
        };

        if let Some(skip) = self.skip_reason(now, respect_interval) {
            return skip;
        }

        match self.engine.create_clusters(&self.config).await {
            Ok(clusters) => {
                let count = clusters.len();
                let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
                state.clusters = clusters;
                state.last_update = Some(now);
                state.retry_at = None;
                info!(clusters = count, "Memory clusters refreshed");
                RefreshOutcome::Refreshed(count)
            }
            Err(e) => {
                self.record_failure(now, &e);
                RefreshOutcome::Failed
            }
        }
    }

    fn skip_reason(&self, now: DateTime<Utc>, respect_interval: bool) -> Option<RefreshOutcome> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if !state.enabled {
            return Some(RefreshOutcome::Disabled);
        }
        if state.retry_at.is_some_and(|at| now < at) {
            return Some(RefreshOutcome::BackingOff);
        }
        if respect_interval {
            if let Some(last) = state.last_update {
                // A clock that went backwards counts as "just refreshed".
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                if elapsed < self.interval {
                    return Some(RefreshOutcome::NotDue);
                }
            }
        }
        None
    }

    fn record_failure(&self, now: DateTime<Utc>, error: &MemoryError) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match self.policy {
            ClusteringFailurePolicy::Disable => {
                state.enabled = false;
                warn!(error = %error, "Clustering failed; disabled until restart");
            }
            ClusteringFailurePolicy::Backoff { retry_after } => {
                let retry_at = chrono::Duration::from_std(retry_after)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d));
                match retry_at {
                    Some(at) => {
                        state.retry_at = Some(at);
                        warn!(error = %error, retry_at = %at, "Clustering failed; backing off");
                    }
                    None => {
                        state.enabled = false;
                        warn!(error = %error, "Clustering failed; retry time out of range, disabled");
                    }
                }
            }
        }
    }

    /// Up to `k` cached clusters closest to `embedding`. Empty when
    /// clustering is off or nothing has been clustered yet.
    pub async fn related_clusters(&self, embedding: &[f32], k: usize) -> Result<Vec<Cluster>, MemoryError> {
        let clusters = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if !state.enabled || state.clusters.is_empty() {
                return Ok(Vec::new());
            }
            state.clusters.clone()
        };
        self.engine.find_related_clusters(embedding, &clusters, k).await
    }
}
