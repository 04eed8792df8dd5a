//! The capability contract of an orchestrated release

use async_trait::async_trait;
use sherwave_core::{
    ChartRef, MonitorReference, ReleaseId, ResolvedDependency, SyncSettings, Templater,
    ValuesReference,
};
use sherwave_engine::RenderedManifestSet;
use sherwave_kube::{ReleaseState, StoredRelease};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::monitor::{notify_monitors, Monitor};

/// Everything the orchestrator needs from a release
///
/// Accessors are pure. Operations report the underlying failure unchanged.
/// The dry-run flag uses interior mutability so releases can be shared
/// between concurrent sync units.
#[async_trait]
pub trait Release: Send + Sync {
    fn id(&self) -> &ReleaseId;

    fn namespace(&self) -> &str {
        self.id().namespace()
    }

    fn chart(&self) -> &ChartRef;

    /// Dependencies, resolved against this release's namespace and context
    fn depends_on(&self) -> &[ResolvedDependency];

    fn tags(&self) -> &[String];

    fn values(&self) -> &[ValuesReference];

    fn monitors(&self) -> &[MonitorReference];

    fn allows_failure(&self) -> bool;

    fn waits_for_ready(&self) -> bool;

    fn is_dry_run(&self) -> bool;

    fn set_dry_run(&self, dry_run: bool);

    /// Make the chart available locally
    async fn fetch_chart(&self, settings: &SyncSettings) -> Result<()>;

    /// Download the chart's own pack dependencies
    async fn update_chart_dependencies(&self, settings: &SyncSettings) -> Result<()>;

    /// Render every values reference into `work_dir`, last declared first
    async fn materialize_values(&self, work_dir: &Path, templater: Templater) -> Result<()>;

    /// Render the release's manifests
    async fn render(&self) -> Result<RenderedManifestSet>;

    /// Deploy the release; a non-mutating dry run while the dry-run flag is set
    async fn apply(&self) -> Result<ReleaseState>;

    /// One `apply` with the dry-run flag forced on
    ///
    /// The previous flag is restored whether `apply` succeeds, fails or
    /// panics.
    async fn apply_dry_run(&self) -> Result<ReleaseState> {
        let _guard = DryRunGuard::force(self);
        self.apply().await
    }

    /// Latest recorded revision
    async fn status(&self) -> Result<StoredRelease>;

    async fn current_revision(&self) -> Result<u32> {
        Ok(self.status().await?.version)
    }

    /// Re-apply a recorded revision as a new revision
    async fn rollback(&self, revision: u32) -> Result<()>;

    async fn uninstall(&self) -> Result<()>;

    async fn validate(&self) -> Result<()>;

    /// Best-effort failure notification, never fails
    async fn notify_monitors_of_failure(&self, error: &str, monitors: &[Arc<dyn Monitor>]) {
        notify_monitors(self.id(), self.monitors(), monitors, error).await;
    }
}

/// Forces a release's dry-run flag on and restores the previous value on drop
pub struct DryRunGuard<'a, R: Release + ?Sized> {
    release: &'a R,
    previous: bool,
}

impl<'a, R: Release + ?Sized> DryRunGuard<'a, R> {
    pub fn force(release: &'a R) -> Self {
        let previous = release.is_dry_run();
        release.set_dry_run(true);
        Self { release, previous }
    }
}

impl<R: Release + ?Sized> Drop for DryRunGuard<'_, R> {
    fn drop(&mut self) {
        self.release.set_dry_run(self.previous);
    }
}
