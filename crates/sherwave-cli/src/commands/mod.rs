//! CLI commands

pub mod graph;
pub mod list;
pub mod status;
pub mod up;
pub mod validate;

use sherwave_core::{Plan, SyncSettings};
use sherwave_kube::{ClusterClient, FileDriver, LazyCluster, StorageConfig, StorageDriver};
use sherwave_plan::{ManagedRelease, Orchestrator, Release, ReleaseEnvironment};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// Default scratch directory, next to the plan file
const WORK_DIR: &str = ".sherwave";

pub(crate) fn load_plan(file: &Path) -> Result<Plan> {
    tracing::debug!(file = %file.display(), "loading plan");
    Ok(Plan::load(file)?)
}

/// Sync settings for a plan, honouring a `--work-dir` override
pub(crate) fn sync_settings(plan: &Plan, work_dir: Option<&Path>) -> SyncSettings {
    let work_dir = work_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| plan.base_dir.join(WORK_DIR));
    let cache_dir = dirs::cache_dir()
        .map(|d| d.join("sherwave"))
        .unwrap_or_else(|| work_dir.join("cache"));
    SyncSettings::new(work_dir, cache_dir)
}

/// Release history lives in the work directory
pub(crate) fn storage(settings: &SyncSettings) -> Result<Arc<dyn StorageDriver>> {
    let driver = FileDriver::new(settings.work_dir.join("releases"), StorageConfig::default())?;
    Ok(Arc::new(driver))
}

/// One client per kubeconfig context, connected on first use
///
/// `status` and `list` only read release history and never connect.
#[derive(Default)]
pub(crate) struct Clusters {
    clients: HashMap<String, Arc<LazyCluster>>,
}

impl Clusters {
    pub(crate) fn get(&mut self, context: &str) -> Arc<dyn ClusterClient> {
        self.clients
            .entry(context.to_string())
            .or_insert_with(|| Arc::new(LazyCluster::new(Some(context))))
            .clone()
    }
}

/// Build the orchestrator for a plan
///
/// Each release talks to the cluster of its own context unless the settings
/// pin one for all of them.
pub(crate) fn orchestrator(
    plan: &Plan,
    settings: &SyncSettings,
    clusters: &mut Clusters,
) -> Result<Orchestrator> {
    let env = Arc::new(ReleaseEnvironment::new(
        &plan.base_dir,
        plan.repositories.clone(),
    ));
    let storage = storage(settings)?;

    let mut releases: Vec<Arc<dyn Release>> = Vec::with_capacity(plan.releases.len());
    for config in &plan.releases {
        let context = settings
            .kube_context
            .clone()
            .unwrap_or_else(|| config.context.clone());
        let cluster = clusters.get(&context);
        let release = ManagedRelease::new(config.clone(), env.clone(), cluster, storage.clone())?;
        releases.push(Arc::new(release));
    }

    Ok(Orchestrator::new(plan, releases)?)
}
