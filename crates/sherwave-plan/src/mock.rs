//! Scriptable release for tests
//!
//! Records every operation it is asked to perform and forwards applies to an
//! optional [`ClusterClient`], so tests can assert on both the call sequence
//! and what reached the cluster.

use async_trait::async_trait;
use sherwave_core::{
    ChartRef, MonitorReference, ReleaseId, ResolvedDependency, SyncSettings, Templater, Values,
    ValuesReference,
};
use sherwave_engine::{RenderedManifestSet, WorkloadKind};
use sherwave_kube::{ClusterClient, KubeError, ReleaseState, StoredRelease};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{PlanError, Result};
use crate::monitor::{notify_monitors, Monitor};
use crate::release::Release;

/// One recorded operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    FetchChart,
    UpdateDependencies,
    MaterializeValues,
    Render,
    Apply { dry_run: bool },
    Status,
    Rollback(u32),
    Uninstall,
    Validate,
    NotifyMonitors,
}

pub struct MockRelease {
    id: ReleaseId,
    chart: ChartRef,
    depends_on: Vec<ResolvedDependency>,
    tags: Vec<String>,
    values: Vec<ValuesReference>,
    monitors: Vec<MonitorReference>,
    allow_failure: bool,
    wait: bool,
    dry_run: AtomicBool,
    workloads: Vec<(WorkloadKind, String)>,
    cluster: Option<Arc<dyn ClusterClient>>,
    apply_error: Option<String>,
    dry_run_error: Option<String>,
    validation_error: Option<String>,
    apply_delay: Duration,
    revision: AtomicU32,
    calls: Mutex<Vec<MockCall>>,
}

impl MockRelease {
    /// A release deploying one Deployment named after itself
    pub fn new(id: ReleaseId) -> Self {
        let workloads = vec![(WorkloadKind::Deployment, id.name().to_string())];
        Self {
            chart: ChartRef {
                name: format!("mock/{}", id.name()),
                version: None,
            },
            id,
            depends_on: Vec::new(),
            tags: Vec::new(),
            values: Vec::new(),
            monitors: Vec::new(),
            allow_failure: false,
            wait: false,
            dry_run: AtomicBool::new(false),
            workloads,
            cluster: None,
            apply_error: None,
            dry_run_error: None,
            validation_error: None,
            apply_delay: Duration::ZERO,
            revision: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Forward applies to `cluster`
    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn with_workload(mut self, kind: WorkloadKind, name: impl Into<String>) -> Self {
        self.workloads.push((kind, name.into()));
        self
    }

    /// Deploy only a ConfigMap
    pub fn without_workloads(mut self) -> Self {
        self.workloads.clear();
        self
    }

    pub fn depending_on(mut self, dependency: ReleaseId) -> Self {
        let id = dependency.with_defaults_from(&self.id);
        self.depends_on.push(ResolvedDependency {
            id,
            optional: false,
        });
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_values(mut self, src: impl Into<String>) -> Self {
        self.values.push(ValuesReference {
            src: src.into(),
            strict: false,
        });
        self
    }

    pub fn with_monitor(mut self, name: impl Into<String>) -> Self {
        self.monitors.push(MonitorReference { name: name.into() });
        self
    }

    pub fn allowing_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn waiting(mut self) -> Self {
        self.wait = true;
        self
    }

    /// Fail real applies
    pub fn failing_apply(mut self, message: impl Into<String>) -> Self {
        self.apply_error = Some(message.into());
        self
    }

    /// Fail dry-run applies
    pub fn failing_dry_run(mut self, message: impl Into<String>) -> Self {
        self.dry_run_error = Some(message.into());
        self
    }

    pub fn failing_validation(mut self, message: impl Into<String>) -> Self {
        self.validation_error = Some(message.into());
        self
    }

    /// Time every apply takes
    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, call: &MockCall) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| *c == call)
            .count()
    }

    fn record(&self, call: MockCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn manifest(&self) -> String {
        if self.workloads.is_empty() {
            return format!(
                "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n",
                self.id.name()
            );
        }
        self.workloads
            .iter()
            .map(|(kind, name)| {
                let api_version = match kind {
                    WorkloadKind::Job => "batch/v1",
                    _ => "apps/v1",
                };
                format!(
                    "apiVersion: {}\nkind: {}\nmetadata:\n  name: {}\n",
                    api_version, kind, name
                )
            })
            .collect::<Vec<_>>()
            .join("---\n")
    }

    fn rendered(&self) -> Result<RenderedManifestSet> {
        let manifest = self.manifest();
        Ok(RenderedManifestSet::from_documents(
            [("mock", manifest.as_str())],
            self.id.namespace(),
        )?)
    }

    fn scripted_failure(&self, dry_run: bool) -> Option<PlanError> {
        let message = if dry_run {
            self.dry_run_error.as_ref()
        } else {
            self.apply_error.as_ref()
        }?;
        Some(PlanError::Kube(KubeError::ApplyFailed {
            failed: 1,
            total: 1,
            message: message.clone(),
        }))
    }
}

#[async_trait]
impl Release for MockRelease {
    fn id(&self) -> &ReleaseId {
        &self.id
    }

    fn chart(&self) -> &ChartRef {
        &self.chart
    }

    fn depends_on(&self) -> &[ResolvedDependency] {
        &self.depends_on
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn values(&self) -> &[ValuesReference] {
        &self.values
    }

    fn monitors(&self) -> &[MonitorReference] {
        &self.monitors
    }

    fn allows_failure(&self) -> bool {
        self.allow_failure
    }

    fn waits_for_ready(&self) -> bool {
        self.wait
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run.load(Ordering::SeqCst)
    }

    fn set_dry_run(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::SeqCst);
    }

    async fn fetch_chart(&self, _settings: &SyncSettings) -> Result<()> {
        self.record(MockCall::FetchChart);
        Ok(())
    }

    async fn update_chart_dependencies(&self, _settings: &SyncSettings) -> Result<()> {
        self.record(MockCall::UpdateDependencies);
        Ok(())
    }

    async fn materialize_values(&self, _work_dir: &Path, _templater: Templater) -> Result<()> {
        self.record(MockCall::MaterializeValues);
        Ok(())
    }

    async fn render(&self) -> Result<RenderedManifestSet> {
        self.record(MockCall::Render);
        self.rendered()
    }

    async fn apply(&self) -> Result<ReleaseState> {
        let dry_run = self.is_dry_run();
        self.record(MockCall::Apply { dry_run });

        if !self.apply_delay.is_zero() {
            tokio::time::sleep(self.apply_delay).await;
        }
        if let Some(err) = self.scripted_failure(dry_run) {
            return Err(err);
        }
        if let Some(cluster) = &self.cluster {
            cluster
                .apply(self.id.namespace(), &self.manifest(), dry_run)
                .await?;
        }
        if !dry_run {
            self.revision.fetch_add(1, Ordering::SeqCst);
        }
        Ok(ReleaseState::Deployed)
    }

    async fn status(&self) -> Result<StoredRelease> {
        self.record(MockCall::Status);
        let version = self.revision.load(Ordering::SeqCst);
        if version == 0 {
            return Err(PlanError::Kube(KubeError::ReleaseNotFound {
                name: self.id.name().to_string(),
                namespace: self.id.namespace().to_string(),
            }));
        }

        let pack = serde_json::from_value(serde_json::json!({
            "name": self.chart.name,
            "version": "1.0.0",
        }))
        .map_err(KubeError::from)?;
        let mut release = StoredRelease::for_install(
            self.id.name().to_string(),
            self.id.namespace().to_string(),
            pack,
            Values::new(),
            self.manifest(),
        );
        release.version = version;
        release.mark_deployed();
        Ok(release)
    }

    async fn rollback(&self, revision: u32) -> Result<()> {
        self.record(MockCall::Rollback(revision));
        let current = self.revision.load(Ordering::SeqCst);
        if revision == 0 || revision > current {
            return Err(PlanError::Kube(KubeError::RevisionNotFound {
                name: self.id.name().to_string(),
                namespace: self.id.namespace().to_string(),
                version: revision,
            }));
        }
        self.revision.store(current + 1, Ordering::SeqCst);
        Ok(())
    }

    async fn uninstall(&self) -> Result<()> {
        self.record(MockCall::Uninstall);
        if let Some(cluster) = &self.cluster {
            cluster.delete(self.id.namespace(), &self.manifest()).await?;
        }
        Ok(())
    }

    async fn validate(&self) -> Result<()> {
        self.record(MockCall::Validate);
        match &self.validation_error {
            Some(message) => Err(PlanError::Validation {
                release: self.id.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn notify_monitors_of_failure(&self, error: &str, monitors: &[Arc<dyn Monitor>]) {
        self.record(MockCall::NotifyMonitors);
        notify_monitors(&self.id, &self.monitors, monitors, error).await;
    }
}
