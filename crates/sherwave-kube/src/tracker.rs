//! Polling rollout tracker
//!
//! Checks every spec's readiness each `status_interval` until all are ready,
//! one fails, the timeout expires or the scope is cancelled.

use async_trait::async_trait;
use sherwave_core::TrackingConfig;
use sherwave_engine::TrackableSpec;
use std::time::Duration;
use tokio::time::Instant;

use crate::cluster::{ClusterClient, Readiness, RolloutTracker};
use crate::error::{KubeError, Result};
use crate::scope::CancelScope;

const MIN_STATUS_INTERVAL: Duration = Duration::from_millis(100);

/// Timing for one tracking call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackOptions {
    pub timeout: Duration,
    pub status_interval: Duration,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self::from(&TrackingConfig::default())
    }
}

impl From<&TrackingConfig> for TrackOptions {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            timeout: config.timeout,
            status_interval: config.status_interval,
        }
    }
}

/// Tracker backed by [`ClusterClient::readiness`]
pub struct PollingTracker<C> {
    cluster: C,
    namespace: String,
}

impl<C: ClusterClient> PollingTracker<C> {
    pub fn new(cluster: C, namespace: impl Into<String>) -> Self {
        Self {
            cluster,
            namespace: namespace.into(),
        }
    }

    /// Specs not ready yet, with their progress messages
    async fn pending<'a>(&self, specs: &'a [TrackableSpec]) -> Result<Vec<(&'a TrackableSpec, String)>> {
        let mut pending = Vec::new();
        for spec in specs {
            match self.cluster.readiness(spec).await? {
                Readiness::Ready => {}
                Readiness::Progressing(message) => pending.push((spec, message)),
                Readiness::Failed(message) => {
                    return Err(KubeError::RolloutFailed {
                        namespace: self.namespace.clone(),
                        resource: spec.to_string(),
                        message,
                    });
                }
            }
        }
        Ok(pending)
    }

    fn cancelled(&self) -> KubeError {
        KubeError::Cancelled {
            namespace: self.namespace.clone(),
        }
    }
}

#[async_trait]
impl<C: ClusterClient> RolloutTracker for PollingTracker<C> {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn track(
        &self,
        specs: &[TrackableSpec],
        options: &TrackOptions,
        scope: &CancelScope,
    ) -> Result<()> {
        let deadline = Instant::now() + options.timeout;
        let interval = options.status_interval.max(MIN_STATUS_INTERVAL);

        loop {
            if scope.is_cancelled() {
                return Err(self.cancelled());
            }

            let pending = tokio::select! {
                biased;
                _ = scope.cancelled() => return Err(self.cancelled()),
                pending = self.pending(specs) => pending?,
            };

            if pending.is_empty() {
                tracing::info!(namespace = %self.namespace, workloads = specs.len(), "rollout complete");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(KubeError::RolloutTimeout {
                    namespace: self.namespace.clone(),
                    timeout: humantime_duration(options.timeout),
                    pending: pending
                        .iter()
                        .map(|(spec, _)| spec.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }

            for (spec, message) in &pending {
                tracing::info!(namespace = %self.namespace, workload = %spec, "{}", message);
            }

            tokio::select! {
                biased;
                _ = scope.cancelled() => return Err(self.cancelled()),
                _ = tokio::time::sleep(interval.min(deadline - now)) => {}
            }
        }
    }
}

fn humantime_duration(duration: Duration) -> String {
    humantime_serde::re::humantime::format_duration(duration).to_string()
}
