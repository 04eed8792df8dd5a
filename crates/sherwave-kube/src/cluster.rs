//! Cluster client contract
//!
//! Releases and the orchestrator only talk to the cluster through
//! [`ClusterClient`]. [`crate::KubeCluster`] implements it against a real API
//! server, [`crate::FakeCluster`] in memory.

use async_trait::async_trait;
use sherwave_engine::TrackableSpec;

use crate::error::Result;
use crate::scope::CancelScope;
use crate::tracker::TrackOptions;

/// Outcome of applying or deleting a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Objects applied or deleted, as `Kind/name`
    pub succeeded: Vec<String>,

    /// Objects left alone, with the reason
    pub skipped: Vec<(String, String)>,

    pub dry_run: bool,
}

impl ApplySummary {
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if !self.succeeded.is_empty() {
            parts.push(format!("{} succeeded", self.succeeded.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Live state of one trackable workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,

    /// Not ready yet, with a progress message
    Progressing(String),

    /// Will not become ready without intervention
    Failed(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Apply every document of `manifest`; namespaced objects without a
    /// namespace land in `namespace`
    ///
    /// Fails if any object could not be applied.
    async fn apply(&self, namespace: &str, manifest: &str, dry_run: bool) -> Result<ApplySummary>;

    /// Delete every object of `manifest`, skipping objects already gone
    async fn delete(&self, namespace: &str, manifest: &str) -> Result<ApplySummary>;

    /// Current readiness of a workload
    async fn readiness(&self, spec: &TrackableSpec) -> Result<Readiness>;

    /// Tracker watching rollouts in one namespace
    ///
    /// Fails when the namespace cannot be watched with this client.
    async fn rollout_tracker(&self, namespace: &str) -> Result<Box<dyn RolloutTracker>>;
}

#[async_trait]
pub trait RolloutTracker: Send + Sync {
    fn namespace(&self) -> &str;

    /// Block until every spec is ready
    ///
    /// Returns `RolloutFailed` as soon as one spec fails, `RolloutTimeout`
    /// once `options.timeout` expires, and `Cancelled` promptly after
    /// `scope` is cancelled.
    async fn track(
        &self,
        specs: &[TrackableSpec],
        options: &TrackOptions,
        scope: &CancelScope,
    ) -> Result<()>;
}
