//! Cluster handle that connects on first use
//!
//! Commands that only read release history never touch the API server, so
//! they work without a reachable cluster or kubeconfig.

use async_trait::async_trait;
use sherwave_engine::TrackableSpec;
use tokio::sync::OnceCell;

use crate::cluster::{ApplySummary, ClusterClient, Readiness, RolloutTracker};
use crate::error::Result;
use crate::resources::KubeCluster;

pub struct LazyCluster {
    context: Option<String>,
    cluster: OnceCell<KubeCluster>,
}

impl LazyCluster {
    /// Empty or missing context means the current kubeconfig context
    pub fn new(context: Option<&str>) -> Self {
        Self {
            context: context.filter(|c| !c.is_empty()).map(str::to_string),
            cluster: OnceCell::new(),
        }
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.cluster.initialized()
    }

    async fn cluster(&self) -> Result<&KubeCluster> {
        self.cluster
            .get_or_try_init(|| async {
                tracing::debug!(context = ?self.context, "connecting to cluster");
                KubeCluster::connect(self.context.as_deref()).await
            })
            .await
    }
}

#[async_trait]
impl ClusterClient for LazyCluster {
    async fn apply(&self, namespace: &str, manifest: &str, dry_run: bool) -> Result<ApplySummary> {
        self.cluster().await?.apply(namespace, manifest, dry_run).await
    }

    async fn delete(&self, namespace: &str, manifest: &str) -> Result<ApplySummary> {
        self.cluster().await?.delete(namespace, manifest).await
    }

    async fn readiness(&self, spec: &TrackableSpec) -> Result<Readiness> {
        self.cluster().await?.readiness(spec).await
    }

    async fn rollout_tracker(&self, namespace: &str) -> Result<Box<dyn RolloutTracker>> {
        self.cluster().await?.rollout_tracker(namespace).await
    }
}
