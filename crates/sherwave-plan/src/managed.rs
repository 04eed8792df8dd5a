//! Production release backed by a pack, a cluster and a history store

use async_trait::async_trait;
use sherwave_core::{
    ChartRef, LoadedPack, MonitorReference, ReleaseConfig, ReleaseId, RepositoryConfig,
    ResolvedDependency, SyncSettings, Templater, Values, ValuesReference,
};
use sherwave_engine::{Engine, ReleaseInfo, RenderedManifestSet, ValuesContext};
use sherwave_kube::{
    CancelScope, ClusterClient, KubeError, ReleaseState, StorageDriver, StoredRelease,
    TrackOptions,
};
use sherwave_repo::RepositorySettings;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{PlanError, Result};
use crate::release::Release;

/// Status interval used when a release waits for its own workloads
const WAIT_STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// History key for releases without a namespace
const DEFAULT_STORAGE_NAMESPACE: &str = "default";

/// What every release of one plan shares
pub struct ReleaseEnvironment {
    /// Directory the plan file lives in; relative paths resolve against it
    pub base_dir: PathBuf,
    pub repositories: Vec<RepositoryConfig>,
    pub engine: Engine,
}

impl ReleaseEnvironment {
    pub fn new(base_dir: impl Into<PathBuf>, repositories: Vec<RepositoryConfig>) -> Self {
        Self {
            base_dir: base_dir.into(),
            repositories,
            engine: Engine::default(),
        }
    }
}

/// A release declared in a plan file
pub struct ManagedRelease {
    config: ReleaseConfig,
    id: ReleaseId,
    depends_on: Vec<ResolvedDependency>,
    dry_run: AtomicBool,
    env: Arc<ReleaseEnvironment>,
    cluster: Arc<dyn ClusterClient>,
    storage: Arc<dyn StorageDriver>,
    chart_dir: Mutex<Option<PathBuf>>,
    values_files: Mutex<Vec<PathBuf>>,
}

/// Everything one apply needs, computed before touching the cluster
struct Prepared {
    pack: LoadedPack,
    values: Values,
    rendered: RenderedManifestSet,
    previous: Option<StoredRelease>,
}

impl ManagedRelease {
    pub fn new(
        config: ReleaseConfig,
        env: Arc<ReleaseEnvironment>,
        cluster: Arc<dyn ClusterClient>,
        storage: Arc<dyn StorageDriver>,
    ) -> Result<Self> {
        let id = config.id().map_err(sherwave_core::CoreError::from)?;
        let depends_on = config
            .resolved_depends_on()
            .map_err(sherwave_core::CoreError::from)?;
        Ok(Self {
            dry_run: AtomicBool::new(config.dry_run),
            config,
            id,
            depends_on,
            env,
            cluster,
            storage,
            chart_dir: Mutex::new(None),
            values_files: Mutex::new(Vec::new()),
        })
    }

    /// Namespace the release's history is stored under
    fn storage_namespace(&self) -> &str {
        match self.id.namespace() {
            "" => DEFAULT_STORAGE_NAMESPACE,
            ns => ns,
        }
    }

    fn chart_dir(&self) -> Result<PathBuf> {
        self.chart_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| PlanError::ChartNotFetched {
                release: self.id.clone(),
            })
    }

    fn load_pack(&self) -> Result<LoadedPack> {
        Ok(LoadedPack::load(self.chart_dir()?)?)
    }

    /// Latest recorded revision, `None` before the first install
    async fn latest(&self) -> Result<Option<StoredRelease>> {
        match self
            .storage
            .get_latest(self.storage_namespace(), self.id.name())
            .await
        {
            Ok(release) => Ok(Some(release)),
            Err(e) if e.is_release_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn prepare(&self) -> Result<Prepared> {
        let pack = self.load_pack()?;
        let files = self
            .values_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let values = Values::merge_all(
            files
                .iter()
                .map(Values::from_file)
                .collect::<sherwave_core::Result<Vec<_>>>()?,
        );

        let previous = self.latest().await?;
        let revision = previous.as_ref().map_or(1, |p| p.version + 1);
        let info = ReleaseInfo::for_revision(self.id.name(), self.id.namespace(), revision);
        let rendered = self.env.engine.render_pack(&pack, &values, &info)?;

        Ok(Prepared {
            pack,
            values,
            rendered,
            previous,
        })
    }

    async fn wait_for_workloads(&self, rendered: &RenderedManifestSet) -> Result<()> {
        if rendered.specs.is_empty() {
            return Ok(());
        }
        let tracker = self.cluster.rollout_tracker(self.id.namespace()).await?;
        let options = TrackOptions {
            timeout: self.config.timeout,
            status_interval: WAIT_STATUS_INTERVAL,
        };
        tracker
            .track(&rendered.specs, &options, &CancelScope::new())
            .await
            .map_err(PlanError::Rollout)
    }

    /// Store a finished revision and return the error that ended it, if any
    async fn finish(&self, mut record: StoredRelease, outcome: Result<()>) -> Result<ReleaseState> {
        match outcome {
            Ok(()) => {
                record.mark_deployed();
                self.storage.update(&record).await?;
                Ok(record.state)
            }
            Err(e) => {
                record.mark_failed(e.to_string());
                self.storage.update(&record).await?;
                Err(e)
            }
        }
    }

    async fn supersede(&self, previous: &StoredRelease) -> Result<()> {
        let mut previous = previous.clone();
        previous.mark_superseded();
        self.storage.update(&previous).await?;
        Ok(())
    }
}

#[async_trait]
impl Release for ManagedRelease {
    fn id(&self) -> &ReleaseId {
        &self.id
    }

    fn chart(&self) -> &ChartRef {
        &self.config.chart
    }

    fn depends_on(&self) -> &[ResolvedDependency] {
        &self.depends_on
    }

    fn tags(&self) -> &[String] {
        &self.config.tags
    }

    fn values(&self) -> &[ValuesReference] {
        &self.config.values
    }

    fn monitors(&self) -> &[MonitorReference] {
        &self.config.monitors
    }

    fn allows_failure(&self) -> bool {
        self.config.allow_failure
    }

    fn waits_for_ready(&self) -> bool {
        self.config.wait
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run.load(Ordering::SeqCst)
    }

    fn set_dry_run(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::SeqCst);
    }

    async fn fetch_chart(&self, settings: &SyncSettings) -> Result<()> {
        let dir = sherwave_repo::fetch_chart(
            &self.config.chart,
            &self.id,
            &self.env.base_dir,
            &self.env.repositories,
            settings,
        )
        .await?;
        tracing::debug!(release = %self.id, chart = %dir.display(), "chart ready");
        *self.chart_dir.lock().unwrap_or_else(PoisonError::into_inner) = Some(dir);
        Ok(())
    }

    async fn update_chart_dependencies(&self, settings: &SyncSettings) -> Result<()> {
        let pack = self.load_pack()?;
        let count = sherwave_repo::update_dependencies(
            &pack,
            &self.env.repositories,
            &RepositorySettings::from(settings),
        )
        .await?;
        if count > 0 {
            tracing::info!(release = %self.id, dependencies = count, "pack dependencies updated");
        }
        Ok(())
    }

    async fn materialize_values(&self, work_dir: &Path, templater: Templater) -> Result<()> {
        let context = ValuesContext::for_release(&self.id);
        let mut rendered = Vec::with_capacity(self.config.values.len());

        for reference in self.config.values.iter().rev() {
            let src = self.env.base_dir.join(&reference.src);
            if !src.is_file() && !reference.strict {
                tracing::warn!(release = %self.id, src = %src.display(), "values file not found, skipping");
                continue;
            }
            let dest = reference.destination(work_dir, &self.id);
            self.env
                .engine
                .render_values(&src, &dest, &context, templater)?;
            rendered.push(dest);
        }

        // Merge order is declaration order
        rendered.reverse();
        *self.values_files.lock().unwrap_or_else(PoisonError::into_inner) = rendered;
        Ok(())
    }

    async fn render(&self) -> Result<RenderedManifestSet> {
        Ok(self.prepare().await?.rendered)
    }

    async fn apply(&self) -> Result<ReleaseState> {
        let Prepared {
            pack,
            values,
            rendered,
            previous,
        } = self.prepare().await?;
        let namespace = self.id.namespace();
        let metadata = pack.pack.metadata;

        let record = match &previous {
            Some(prev) => StoredRelease::for_upgrade(prev, metadata, values, rendered.manifest.clone()),
            None => StoredRelease::for_install(
                self.id.name().to_string(),
                self.storage_namespace().to_string(),
                metadata,
                values,
                rendered.manifest.clone(),
            ),
        };

        if self.is_dry_run() {
            let summary = self.cluster.apply(namespace, &rendered.manifest, true).await?;
            tracing::info!(release = %self.id, revision = record.version, "dry run: {}", summary.summary());
            return Ok(record.state);
        }

        self.storage.create(&record).await?;
        if let Some(prev) = &previous {
            self.supersede(prev).await?;
        }

        let outcome = async {
            let summary = self.cluster.apply(namespace, &rendered.manifest, false).await?;
            tracing::info!(release = %self.id, revision = record.version, "applied: {}", summary.summary());
            if self.config.wait {
                self.wait_for_workloads(&rendered).await?;
            }
            Ok::<_, PlanError>(())
        }
        .await;

        self.finish(record, outcome).await
    }

    async fn status(&self) -> Result<StoredRelease> {
        Ok(self
            .storage
            .get_latest(self.storage_namespace(), self.id.name())
            .await?)
    }

    async fn rollback(&self, revision: u32) -> Result<()> {
        let history = self
            .storage
            .history(self.storage_namespace(), self.id.name())
            .await?;
        let latest = history.first().ok_or_else(|| KubeError::ReleaseNotFound {
            name: self.id.name().to_string(),
            namespace: self.storage_namespace().to_string(),
        })?;
        let target = history
            .iter()
            .find(|r| r.version == revision)
            .ok_or_else(|| KubeError::RevisionNotFound {
                name: self.id.name().to_string(),
                namespace: self.storage_namespace().to_string(),
                version: revision,
            })?;

        let record = StoredRelease::for_rollback(latest, target);
        if self.is_dry_run() {
            self.cluster
                .apply(self.id.namespace(), &record.manifest, true)
                .await?;
            return Ok(());
        }

        self.storage.create(&record).await?;
        self.supersede(latest).await?;

        let outcome = self
            .cluster
            .apply(self.id.namespace(), &record.manifest, false)
            .await
            .map(|_| ())
            .map_err(PlanError::from);
        self.finish(record, outcome).await?;
        tracing::info!(release = %self.id, revision, "rolled back");
        Ok(())
    }

    async fn uninstall(&self) -> Result<()> {
        let mut latest = self.status().await?;
        if self.is_dry_run() {
            tracing::info!(release = %self.id, "dry run: would uninstall revision {}", latest.version);
            return Ok(());
        }

        let summary = self.cluster.delete(self.id.namespace(), &latest.manifest).await?;
        latest.mark_uninstalled();
        self.storage.update(&latest).await?;
        tracing::info!(release = %self.id, "uninstalled: {}", summary.summary());
        Ok(())
    }

    async fn validate(&self) -> Result<()> {
        let invalid = |message: &str| PlanError::Validation {
            release: self.id.clone(),
            message: message.to_string(),
        };

        if self.id.name().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.config.chart.name.trim().is_empty() {
            return Err(invalid("chart name is empty"));
        }
        if self.config.values.iter().any(|v| v.src.trim().is_empty()) {
            return Err(invalid("values entry without src"));
        }
        if self.config.wait && self.config.timeout.is_zero() {
            return Err(invalid("wait requires a non-zero timeout"));
        }
        if self.depends_on.iter().any(|d| d.id == self.id) {
            return Err(invalid("release depends on itself"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherwave_kube::{FakeCluster, MockStorageDriver, Readiness};
    use std::fs;
    use tempfile::TempDir;

    const DEPLOYMENT: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ release.name }}
spec:
  replicas: {{ values.replicas }}
";

    fn write_pack(root: &Path) {
        let pack = root.join("web");
        fs::create_dir_all(pack.join("templates")).unwrap();
        fs::write(
            pack.join("Pack.yaml"),
            "apiVersion: sherwave/v1\nmetadata:\n  name: web\n  version: 1.0.0\n",
        )
        .unwrap();
        fs::write(pack.join("values.yaml"), "replicas: 1\n").unwrap();
        fs::write(pack.join("templates/deployment.yaml"), DEPLOYMENT).unwrap();
        fs::write(root.join("prod.yaml"), "replicas: 3\n").unwrap();
        fs::write(root.join("env.yaml"), "replicas: 5\n").unwrap();
    }

    fn config(yaml: &str) -> ReleaseConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        work_dir: PathBuf,
        cluster: FakeCluster,
        storage: MockStorageDriver,
        release: ManagedRelease,
    }

    async fn fixture(extra: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        write_pack(dir.path());
        let cluster = FakeCluster::new();
        let storage = MockStorageDriver::new();
        let env = Arc::new(ReleaseEnvironment::new(dir.path(), Vec::new()));

        let yaml = format!(
            "name: web\nnamespace: prod\nchart: {{\"name\": \"web\"}}\nvalues: [\"prod.yaml\", \"missing.yaml\", \"env.yaml\"]\n{}",
            extra
        );
        let release = ManagedRelease::new(
            config(&yaml),
            env,
            Arc::new(cluster.clone()),
            Arc::new(storage.clone()),
        )
        .unwrap();

        let work_dir = dir.path().join(".sherwave");
        let settings = SyncSettings::new(&work_dir, dir.path().join("cache"));
        release.fetch_chart(&settings).await.unwrap();
        release
            .materialize_values(&work_dir, Templater::Minijinja)
            .await
            .unwrap();

        Fixture {
            _dir: dir,
            work_dir,
            cluster,
            storage,
            release,
        }
    }

    #[tokio::test]
    async fn test_materialize_values_skips_missing_non_strict() {
        let f = fixture("").await;
        let values_dir = f.work_dir.join("values").join("web@prod");
        assert!(values_dir.join("prod.yaml").is_file());
        assert!(values_dir.join("env.yaml").is_file());
        assert!(!values_dir.join("missing.yaml").exists());
    }

    #[tokio::test]
    async fn test_strict_missing_values_fails() {
        let f = fixture("").await;
        let release = ManagedRelease::new(
            config("name: api\nchart: {\"name\": \"web\"}\nvalues: [{\"src\": \"nope.yaml\", \"strict\": true}]"),
            Arc::new(ReleaseEnvironment::new(f.work_dir.parent().unwrap(), Vec::new())),
            Arc::new(f.cluster.clone()),
            Arc::new(f.storage.clone()),
        )
        .unwrap();

        assert!(release
            .materialize_values(&f.work_dir, Templater::Copy)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_render_merges_values_in_declaration_order() {
        let f = fixture("").await;
        let rendered = f.release.render().await.unwrap();
        assert!(rendered.manifest.contains("replicas: 5"));
        assert_eq!(rendered.specs.len(), 1);
        assert_eq!(rendered.specs[0].namespace, "prod");
    }

    #[tokio::test]
    async fn test_render_requires_chart() {
        let dir = TempDir::new().unwrap();
        let release = ManagedRelease::new(
            config("name: web\nchart: {\"name\": \"web\"}"),
            Arc::new(ReleaseEnvironment::new(dir.path(), Vec::new())),
            Arc::new(FakeCluster::new()),
            Arc::new(MockStorageDriver::new()),
        )
        .unwrap();

        let err = release.render().await.unwrap_err();
        assert!(matches!(err, PlanError::ChartNotFetched { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_apply_records_nothing() {
        let f = fixture("").await;
        f.release.set_dry_run(true);

        let state = f.release.apply().await.unwrap();
        assert!(state.is_pending());
        assert_eq!(f.cluster.dry_run_applies(), 1);
        assert_eq!(f.cluster.mutating_applies(), 0);
        assert_eq!(f.storage.operation_counts().creates, 0);
    }

    #[tokio::test]
    async fn test_apply_records_revisions() {
        let f = fixture("").await;

        assert_eq!(f.release.apply().await.unwrap(), ReleaseState::Deployed);
        assert_eq!(f.release.apply().await.unwrap(), ReleaseState::Deployed);

        assert_eq!(f.release.current_revision().await.unwrap(), 2);
        let history = f.storage.history("prod", "web").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].state, ReleaseState::Superseded);
        assert_eq!(f.cluster.mutating_applies(), 2);
    }

    #[tokio::test]
    async fn test_failed_apply_is_recorded() {
        let f = fixture("").await;
        f.cluster.fail_apply_containing("kind: Deployment");

        assert!(f.release.apply().await.is_err());
        let latest = f.release.status().await.unwrap();
        assert!(matches!(latest.state, ReleaseState::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_tracks_workloads() {
        let f = fixture("wait: true\ntimeout: \"30s\"").await;
        f.cluster
            .set_default_readiness(Readiness::Failed("ImagePullBackOff".into()));

        let err = f.release.apply().await.unwrap_err();
        assert!(matches!(err, PlanError::Rollout(KubeError::RolloutFailed { .. })));
        assert_eq!(f.cluster.trackers(), vec!["prod"]);
    }

    #[tokio::test]
    async fn test_rollback_and_uninstall() {
        let f = fixture("").await;
        f.release.apply().await.unwrap();
        f.release.apply().await.unwrap();

        f.release.rollback(1).await.unwrap();
        let latest = f.release.status().await.unwrap();
        assert_eq!(latest.version, 3);
        assert_eq!(latest.state, ReleaseState::Deployed);

        let err = f.release.rollback(9).await.unwrap_err();
        assert!(matches!(err, PlanError::Kube(KubeError::RevisionNotFound { .. })));

        f.release.uninstall().await.unwrap();
        assert_eq!(f.release.status().await.unwrap().state, ReleaseState::Uninstalled);
        assert_eq!(f.cluster.deletes().len(), 1);
    }

    #[tokio::test]
    async fn test_status_before_install() {
        let f = fixture("").await;
        let err = f.release.status().await.unwrap_err();
        assert!(err.is_release_not_found());
    }

    #[tokio::test]
    async fn test_validate() {
        let f = fixture("").await;
        f.release.validate().await.unwrap();

        let release = ManagedRelease::new(
            config("name: web\nchart: {\"name\": \" \"}"),
            Arc::new(ReleaseEnvironment::new(f.work_dir.clone(), Vec::new())),
            Arc::new(f.cluster.clone()),
            Arc::new(f.storage.clone()),
        )
        .unwrap();
        assert!(matches!(
            release.validate().await.unwrap_err(),
            PlanError::Validation { .. }
        ));
    }
}
