//! Release sync orchestration
//!
//! A tracked sync runs in phases:
//!
//! 1. repository indexes are refreshed
//! 2. every release is rehearsed with a dry-run apply, without pack
//!    dependency downloads
//! 3. one rollout tracker is started per namespace
//! 4. the real apply runs as one more unit next to the trackers and cancels
//!    the shared scope when it finishes
//! 5. all units are joined; the first error is the result

use sherwave_core::{
    Plan, ReleaseGraph, ReleaseId, RepositoryConfig, SyncSettings, Templater, TrackingConfig,
};
use sherwave_kube::{CancelScope, ClusterClient, StoredRelease};
use sherwave_repo::RepositorySettings;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PlanError, Result};
use crate::group::TaskGroup;
use crate::monitor::{build_monitors, Monitor};
use crate::release::{DryRunGuard, Release};
use crate::tracking::{launch_trackers, namespace_specs};

/// Latest recorded state of one release
#[derive(Debug, Clone)]
pub struct ReleaseListing {
    pub id: ReleaseId,

    /// `None` until the release has been applied once
    pub record: Option<StoredRelease>,
}

impl ReleaseListing {
    pub fn status_name(&self) -> &'static str {
        self.record
            .as_ref()
            .map_or("not-installed", |r| r.state.status_name())
    }
}

/// Cancels the scope when the real apply finishes, panics included
struct CancelOnDrop(CancelScope);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Drives the releases of one plan
#[derive(Clone)]
pub struct Orchestrator {
    /// Dependencies first
    releases: Vec<Arc<dyn Release>>,
    repositories: Vec<RepositoryConfig>,
    monitors: Vec<Arc<dyn Monitor>>,
    templater: Templater,
}

impl Orchestrator {
    /// Orchestrator for a plan's releases
    pub fn new(plan: &Plan, releases: Vec<Arc<dyn Release>>) -> Result<Self> {
        let monitors = build_monitors(&plan.monitors)?;
        Self::with_monitors(releases, plan.repositories.clone(), monitors, plan.templater)
    }

    /// Orchestrator with explicit monitors
    ///
    /// Fails if the releases' dependencies are missing or form a cycle.
    pub fn with_monitors(
        mut releases: Vec<Arc<dyn Release>>,
        repositories: Vec<RepositoryConfig>,
        monitors: Vec<Arc<dyn Monitor>>,
        templater: Templater,
    ) -> Result<Self> {
        let graph = ReleaseGraph::build(
            releases
                .iter()
                .map(|r| (r.id().clone(), r.depends_on().to_vec())),
        )?;

        let order = graph.order();
        let rank: HashMap<&ReleaseId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        releases.sort_by_key(|r| rank.get(r.id()).copied().unwrap_or(usize::MAX));

        Ok(Self {
            releases,
            repositories,
            monitors,
            templater,
        })
    }

    /// Releases in apply order
    pub fn releases(&self) -> &[Arc<dyn Release>] {
        &self.releases
    }

    /// Validate every release, stopping at the first invalid one
    pub async fn validate(&self) -> Result<()> {
        for release in &self.releases {
            release.validate().await?;
        }
        Ok(())
    }

    /// Sync repositories, then every release
    pub async fn sync(&self, settings: &SyncSettings) -> Result<()> {
        self.validate().await?;
        self.sync_repositories(settings).await?;
        self.sync_releases(settings).await
    }

    /// [`Orchestrator::sync`] with every release forced into dry-run mode
    ///
    /// Pack dependencies are not downloaded. Dry-run flags are restored on
    /// every exit path.
    pub async fn sync_dry_run(&self, settings: &SyncSettings) -> Result<()> {
        let settings = settings.for_rehearsal();
        let _guards: Vec<_> = self
            .releases
            .iter()
            .map(|r| DryRunGuard::force(r.as_ref()))
            .collect();

        tracing::info!(releases = self.releases.len(), "rehearsing sync");
        self.sync(&settings).await
    }

    /// Rehearse, then apply for real while tracking rollouts per namespace
    ///
    /// `cluster` creates the trackers. Nothing is mutated if the rehearsal
    /// fails or any tracker cannot be created. The call returns only after
    /// every tracker and the real apply have finished.
    pub async fn sync_with_tracking(
        &self,
        settings: &SyncSettings,
        tracking: &TrackingConfig,
        cluster: Arc<dyn ClusterClient>,
    ) -> Result<()> {
        self.sync_dry_run(settings).await.map_err(|e| match e {
            PlanError::RepositorySync(_) => e,
            e => PlanError::Rehearsal(Box::new(e)),
        })?;

        let specs = namespace_specs(&self.releases).await?;
        let scope = CancelScope::new();
        let mut group = TaskGroup::new();

        let trackers = launch_trackers(cluster.as_ref(), &specs, tracking, &scope, &mut group).await?;
        tracing::info!(trackers, "rollout tracking started");

        let orchestrator = self.clone();
        let settings = settings.clone();
        let apply_scope = scope.clone();
        group.spawn(async move {
            let _cancel = CancelOnDrop(apply_scope);
            orchestrator.sync_releases(&settings).await
        });

        group.wait().await
    }

    /// Latest state of the named releases, or of every release if `names`
    /// is empty
    ///
    /// A name matches a release's full id (`web@prod`) or its bare name.
    pub async fn status(&self, names: &[String]) -> Result<Vec<ReleaseListing>> {
        let selected: Vec<&Arc<dyn Release>> = if names.is_empty() {
            self.releases.iter().collect()
        } else {
            names
                .iter()
                .map(|name| {
                    self.find(name)
                        .ok_or_else(|| PlanError::UnknownRelease(name.clone()))
                })
                .collect::<Result<_>>()?
        };

        let mut listings = Vec::with_capacity(selected.len());
        for release in selected {
            let record = match release.status().await {
                Ok(record) => Some(record),
                Err(e) if e.is_release_not_found() => None,
                Err(e) => return Err(e),
            };
            listings.push(ReleaseListing {
                id: release.id().clone(),
                record,
            });
        }
        Ok(listings)
    }

    /// Releases of the plan that have been applied at least once
    pub async fn list(&self) -> Result<Vec<ReleaseListing>> {
        Ok(self
            .status(&[])
            .await?
            .into_iter()
            .filter(|listing| listing.record.is_some())
            .collect())
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Release>> {
        self.releases
            .iter()
            .find(|r| r.id().to_string() == name)
            .or_else(|| self.releases.iter().find(|r| r.id().name() == name))
    }

    async fn sync_repositories(&self, settings: &SyncSettings) -> Result<()> {
        if self.repositories.is_empty() {
            return Ok(());
        }
        sherwave_repo::sync_repositories(&self.repositories, &RepositorySettings::from(settings))
            .await
            .map_err(PlanError::RepositorySync)
    }

    /// Apply every release in order
    ///
    /// A failing release notifies its monitors, except during a dry run. It
    /// stops the sync unless it allows failure.
    async fn sync_releases(&self, settings: &SyncSettings) -> Result<()> {
        for release in &self.releases {
            let Err(e) = self.sync_release(release.as_ref(), settings).await else {
                continue;
            };

            if !release.is_dry_run() {
                release
                    .notify_monitors_of_failure(&e.to_string(), &self.monitors)
                    .await;
            }
            if release.allows_failure() {
                tracing::warn!(release = %release.id(), error = %e, "release failed, failure allowed");
                continue;
            }
            return Err(PlanError::Apply {
                release: release.id().clone(),
                source: Box::new(e),
            });
        }
        Ok(())
    }

    async fn sync_release(&self, release: &dyn Release, settings: &SyncSettings) -> Result<()> {
        release.fetch_chart(settings).await?;
        if settings.dependencies {
            release.update_chart_dependencies(settings).await?;
        }
        release
            .materialize_values(&settings.work_dir, self.templater)
            .await?;

        let state = release.apply().await?;
        tracing::info!(
            release = %release.id(),
            dry_run = release.is_dry_run(),
            state = %state,
            "release synced"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockRelease};

    fn id(s: &str) -> ReleaseId {
        ReleaseId::parse(s).unwrap()
    }

    fn orchestrator(releases: Vec<Arc<MockRelease>>) -> Orchestrator {
        let releases = releases
            .into_iter()
            .map(|r| r as Arc<dyn Release>)
            .collect();
        Orchestrator::with_monitors(releases, Vec::new(), Vec::new(), Templater::Copy).unwrap()
    }

    fn settings() -> SyncSettings {
        SyncSettings::new("/tmp/sherwave-work", "/tmp/sherwave-cache")
    }

    #[test]
    fn test_releases_sorted_dependencies_first() {
        let app = Arc::new(MockRelease::new(id("app@ns")).depending_on(id("db")));
        let db = Arc::new(MockRelease::new(id("db@ns")).depending_on(id("cache")));
        let cache = Arc::new(MockRelease::new(id("cache@ns")));

        let orchestrator = orchestrator(vec![app, db, cache]);
        let order: Vec<String> = orchestrator
            .releases()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(order, vec!["cache@ns", "db@ns", "app@ns"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let a: Arc<dyn Release> = Arc::new(MockRelease::new(id("a@ns")).depending_on(id("b")));
        let b: Arc<dyn Release> = Arc::new(MockRelease::new(id("b@ns")).depending_on(id("a")));

        let err = Orchestrator::with_monitors(vec![a, b], Vec::new(), Vec::new(), Templater::Copy)
            .err()
            .unwrap();
        assert!(matches!(err, PlanError::Graph(_)));
    }

    #[tokio::test]
    async fn test_sync_runs_every_step() {
        let app = Arc::new(MockRelease::new(id("app@ns")));
        orchestrator(vec![app.clone()]).sync(&settings()).await.unwrap();

        assert_eq!(
            app.calls(),
            vec![
                MockCall::Validate,
                MockCall::FetchChart,
                MockCall::UpdateDependencies,
                MockCall::MaterializeValues,
                MockCall::Apply { dry_run: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_dry_run_skips_dependencies_and_restores_flags() {
        let app = Arc::new(MockRelease::new(id("app@ns")));
        let db = Arc::new(MockRelease::new(id("db@ns")));
        let settings = settings();

        orchestrator(vec![app.clone(), db.clone()])
            .sync_dry_run(&settings)
            .await
            .unwrap();

        for release in [&app, &db] {
            assert!(!release.is_dry_run());
            assert_eq!(release.count(&MockCall::UpdateDependencies), 0);
            assert_eq!(release.count(&MockCall::Apply { dry_run: true }), 1);
            assert_eq!(release.count(&MockCall::Apply { dry_run: false }), 0);
        }
        assert!(settings.dependencies);
    }

    #[tokio::test]
    async fn test_dry_run_restores_flags_on_failure() {
        let app = Arc::new(MockRelease::new(id("app@ns")).failing_dry_run("bad manifest"));
        let db = Arc::new(MockRelease::new(id("db@ns")));

        let err = orchestrator(vec![app.clone(), db.clone()])
            .sync_dry_run(&settings())
            .await
            .unwrap_err();

        assert!(matches!(err, PlanError::Apply { .. }));
        assert!(!app.is_dry_run());
        assert!(!db.is_dry_run());
        // Validation covers every release, the sync stops at the first failure
        assert_eq!(db.calls(), vec![MockCall::Validate]);
    }

    #[tokio::test]
    async fn test_allowed_failure_continues() {
        let flaky = Arc::new(
            MockRelease::new(id("flaky@ns"))
                .failing_apply("quota exceeded")
                .allowing_failure(),
        );
        let app = Arc::new(MockRelease::new(id("app@ns")));

        orchestrator(vec![flaky.clone(), app.clone()])
            .sync(&settings())
            .await
            .unwrap();

        assert_eq!(flaky.count(&MockCall::NotifyMonitors), 1);
        assert_eq!(app.count(&MockCall::Apply { dry_run: false }), 1);
    }

    #[tokio::test]
    async fn test_rehearsal_failure_does_not_notify_monitors() {
        let flaky = Arc::new(
            MockRelease::new(id("flaky@ns"))
                .failing_dry_run("webhook denied")
                .allowing_failure(),
        );
        let app = Arc::new(MockRelease::new(id("app@ns")));

        orchestrator(vec![flaky.clone(), app.clone()])
            .sync_dry_run(&settings())
            .await
            .unwrap();

        assert_eq!(flaky.count(&MockCall::NotifyMonitors), 0);
        assert_eq!(app.count(&MockCall::Apply { dry_run: true }), 1);
        assert!(!flaky.is_dry_run());
    }

    #[tokio::test]
    async fn test_failure_stops_sync() {
        let broken = Arc::new(MockRelease::new(id("broken@ns")).failing_apply("boom"));
        let app = Arc::new(MockRelease::new(id("app@ns")).depending_on(id("broken")));

        let err = orchestrator(vec![broken.clone(), app.clone()])
            .sync(&settings())
            .await
            .unwrap_err();

        assert!(matches!(err, PlanError::Apply { ref release, .. } if release == broken.id()));
        assert_eq!(broken.count(&MockCall::NotifyMonitors), 1);
        assert_eq!(app.count(&MockCall::Apply { dry_run: false }), 0);
    }

    #[tokio::test]
    async fn test_validation_fails_first() {
        let app = Arc::new(MockRelease::new(id("app@ns")).failing_validation("no chart"));
        let err = orchestrator(vec![app.clone()])
            .sync(&settings())
            .await
            .unwrap_err();

        assert!(matches!(err, PlanError::Validation { .. }));
        assert_eq!(app.calls(), vec![MockCall::Validate]);
    }

    #[tokio::test]
    async fn test_status_and_list() {
        let app = Arc::new(MockRelease::new(id("app@ns")));
        let db = Arc::new(MockRelease::new(id("db@ns")));
        let orchestrator = orchestrator(vec![app.clone(), db.clone()]);
        app.apply().await.unwrap();

        let listings = orchestrator.status(&["app".to_string()]).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].status_name(), "deployed");

        let all = orchestrator.status(&[]).await.unwrap();
        assert_eq!(all[1].status_name(), "not-installed");

        let listed = orchestrator.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id("app@ns"));

        let err = orchestrator.status(&["ghost".to_string()]).await.unwrap_err();
        assert!(matches!(err, PlanError::UnknownRelease(_)));
    }
}
