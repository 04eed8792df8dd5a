//! In-memory cluster for tests
//!
//! Records every apply and delete, scripts readiness per workload and can be
//! told to fail applies or tracker initialization.

use async_trait::async_trait;
use sherwave_engine::{split_documents, TrackableSpec};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use crate::cluster::{ApplySummary, ClusterClient, Readiness, RolloutTracker};
use crate::error::{KubeError, Result};
use crate::tracker::PollingTracker;

/// One recorded apply call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedManifest {
    pub namespace: String,
    pub manifest: String,
    pub dry_run: bool,
}

#[derive(Debug)]
struct FakeState {
    applies: Vec<AppliedManifest>,
    deletes: Vec<AppliedManifest>,
    /// Scripted readiness per `namespace/Kind/name`; the last entry repeats
    readiness: HashMap<String, VecDeque<Readiness>>,
    default_readiness: Readiness,
    readiness_checks: usize,
    failing_applies: Vec<String>,
    failing_trackers: HashSet<String>,
    trackers: Vec<String>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            applies: Vec::new(),
            deletes: Vec::new(),
            readiness: HashMap::new(),
            default_readiness: Readiness::Ready,
            readiness_checks: 0,
            failing_applies: Vec::new(),
            failing_trackers: HashSet::new(),
            trackers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

fn spec_key(spec: &TrackableSpec) -> String {
    format!("{}/{}", spec.namespace, spec)
}

/// `Kind/name` of every document in a manifest
fn object_names(manifest: &str) -> Result<Vec<String>> {
    split_documents(manifest)
        .into_iter()
        .map(|doc| {
            let value: serde_yaml::Value = serde_yaml::from_str(doc)?;
            let kind = value.get("kind").and_then(|k| k.as_str());
            let name = value
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(|n| n.as_str());
            match (kind, name) {
                (Some(kind), Some(name)) => Ok(format!("{}/{}", kind, name)),
                _ => Err(KubeError::InvalidManifest(
                    "document missing kind or metadata.name".to_string(),
                )),
            }
        })
        .collect()
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Successive readiness answers for a workload
    pub fn script_readiness(
        &self,
        spec: &TrackableSpec,
        states: impl IntoIterator<Item = Readiness>,
    ) {
        let states = states.into_iter().collect();
        self.with_state(|s| s.readiness.insert(spec_key(spec), states));
    }

    /// Readiness of workloads without a script
    pub fn set_default_readiness(&self, readiness: Readiness) {
        self.with_state(|s| s.default_readiness = readiness);
    }

    /// Fail real and dry-run applies of manifests containing `pattern`
    pub fn fail_apply_containing(&self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        self.with_state(|s| s.failing_applies.push(pattern));
    }

    /// Fail tracker initialization for a namespace
    pub fn fail_tracker_init(&self, namespace: impl Into<String>) {
        let namespace = namespace.into();
        self.with_state(|s| s.failing_trackers.insert(namespace));
    }

    pub fn applies(&self) -> Vec<AppliedManifest> {
        self.with_state(|s| s.applies.clone())
    }

    pub fn mutating_applies(&self) -> usize {
        self.with_state(|s| s.applies.iter().filter(|a| !a.dry_run).count())
    }

    pub fn dry_run_applies(&self) -> usize {
        self.with_state(|s| s.applies.iter().filter(|a| a.dry_run).count())
    }

    pub fn deletes(&self) -> Vec<AppliedManifest> {
        self.with_state(|s| s.deletes.clone())
    }

    /// Namespaces a tracker was created for, in creation order
    pub fn trackers(&self) -> Vec<String> {
        self.with_state(|s| s.trackers.clone())
    }

    pub fn readiness_checks(&self) -> usize {
        self.with_state(|s| s.readiness_checks)
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn apply(&self, namespace: &str, manifest: &str, dry_run: bool) -> Result<ApplySummary> {
        let objects = object_names(manifest)?;
        let failing = self.with_state(|s| {
            s.failing_applies
                .iter()
                .find(|pattern| manifest.contains(pattern.as_str()))
                .cloned()
        });
        if let Some(pattern) = failing {
            return Err(KubeError::ApplyFailed {
                failed: objects.len(),
                total: objects.len(),
                message: format!("rejected by fake cluster ({})", pattern),
            });
        }

        self.with_state(|s| {
            s.applies.push(AppliedManifest {
                namespace: namespace.to_string(),
                manifest: manifest.to_string(),
                dry_run,
            })
        });
        Ok(ApplySummary {
            succeeded: objects,
            skipped: Vec::new(),
            dry_run,
        })
    }

    async fn delete(&self, namespace: &str, manifest: &str) -> Result<ApplySummary> {
        let objects = object_names(manifest)?;
        self.with_state(|s| {
            s.deletes.push(AppliedManifest {
                namespace: namespace.to_string(),
                manifest: manifest.to_string(),
                dry_run: false,
            })
        });
        Ok(ApplySummary {
            succeeded: objects,
            skipped: Vec::new(),
            dry_run: false,
        })
    }

    async fn readiness(&self, spec: &TrackableSpec) -> Result<Readiness> {
        Ok(self.with_state(|s| {
            s.readiness_checks += 1;
            match s.readiness.get_mut(&spec_key(spec)) {
                Some(script) if script.len() > 1 => script.pop_front().unwrap_or(Readiness::Ready),
                Some(script) => script.front().cloned().unwrap_or(Readiness::Ready),
                None => s.default_readiness.clone(),
            }
        }))
    }

    async fn rollout_tracker(&self, namespace: &str) -> Result<Box<dyn RolloutTracker>> {
        let failing = self.with_state(|s| {
            s.trackers.push(namespace.to_string());
            s.failing_trackers.contains(namespace)
        });
        if failing {
            return Err(KubeError::Kubeconfig(format!(
                "cannot watch namespace '{}'",
                namespace
            )));
        }
        Ok(Box::new(PollingTracker::new(self.clone(), namespace)))
    }
}
