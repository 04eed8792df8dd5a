//! Plan file model (`sherwave.yml`)
//!
//! The plan lists the repositories packs come from, the monitors to notify on
//! failure and the releases to deploy. Relative paths inside the plan are
//! resolved against the directory the plan was loaded from.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::id::{ReleaseId, ValidationError};

/// Plan file looked up when none is given
pub const DEFAULT_PLAN_FILE: &str = "sherwave.yml";

/// A parsed plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,

    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,

    #[serde(default)]
    pub releases: Vec<ReleaseConfig>,

    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Templater used to materialize values files
    #[serde(default)]
    pub templater: Templater,

    /// Directory the plan was loaded from
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// A pack repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub url: String,
}

/// Kind of failure monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    #[default]
    Log,
    Webhook,
}

/// A monitor notified when a release fails to apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: MonitorKind,

    /// Target of `webhook` monitors
    #[serde(default)]
    pub url: Option<String>,
}

/// Reference from a release to a plan-level monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorReference {
    pub name: String,
}

/// Where a release's pack comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRef {
    /// Local directory or `repo/pack`
    pub name: String,

    /// Semver constraint for repository packs
    #[serde(default)]
    pub version: Option<String>,
}

impl ChartRef {
    /// Split a `repo/pack` reference, `None` for anything else
    pub fn repository_ref(&self) -> Option<(&str, &str)> {
        let (repo, pack) = self.name.split_once('/')?;
        if repo.is_empty() || pack.is_empty() || pack.contains('/') || repo.starts_with('.') {
            return None;
        }
        Some((repo, pack))
    }
}

/// A `dependsOn` entry: a bare id string or `{ name, optional }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DependsOnRepr")]
pub struct DependsOnReference {
    pub name: String,
    pub optional: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependsOnRepr {
    Short(String),
    Full {
        name: String,
        #[serde(default)]
        optional: bool,
    },
}

impl From<DependsOnRepr> for DependsOnReference {
    fn from(repr: DependsOnRepr) -> Self {
        match repr {
            DependsOnRepr::Short(name) => Self {
                name,
                optional: false,
            },
            DependsOnRepr::Full { name, optional } => Self { name, optional },
        }
    }
}

/// A dependency reference resolved against the release declaring it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedDependency {
    pub id: ReleaseId,
    pub optional: bool,
}

/// A values file entry: a bare path or `{ src, strict }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ValuesRepr")]
pub struct ValuesReference {
    pub src: String,

    /// Fail when `src` does not exist instead of skipping it
    pub strict: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ValuesRepr {
    Short(String),
    Full {
        src: String,
        #[serde(default)]
        strict: bool,
    },
}

impl From<ValuesRepr> for ValuesReference {
    fn from(repr: ValuesRepr) -> Self {
        match repr {
            ValuesRepr::Short(src) => Self { src, strict: false },
            ValuesRepr::Full { src, strict } => Self { src, strict },
        }
    }
}

impl ValuesReference {
    /// Where the rendered copy of this file lives for a given release
    ///
    /// `<work_dir>/values/<release-id>/<file name>`
    pub fn destination(&self, work_dir: &Path, id: &ReleaseId) -> PathBuf {
        let file_name = Path::new(&self.src)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "values.yaml".into());
        work_dir.join("values").join(id.to_string()).join(file_name)
    }
}

/// Values templater
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Templater {
    /// Byte-for-byte copy
    Copy,
    #[default]
    #[serde(alias = "tpl")]
    Minijinja,
}

impl std::fmt::Display for Templater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => f.write_str("copy"),
            Self::Minijinja => f.write_str("minijinja"),
        }
    }
}

/// One release of the plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    /// Kubeconfig context, empty for the current one
    #[serde(default)]
    pub context: String,

    pub chart: ChartRef,

    #[serde(default)]
    pub depends_on: Vec<DependsOnReference>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub values: Vec<ValuesReference>,

    #[serde(default)]
    pub monitors: Vec<MonitorReference>,

    /// Wait for workloads to become ready after apply
    #[serde(default)]
    pub wait: bool,

    #[serde(default = "default_release_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// A failed apply is logged and reported but does not fail the sync
    #[serde(default)]
    pub allow_failure: bool,

    /// Accepted for plan compatibility, no hooks ever run
    #[serde(default)]
    pub disable_hooks: bool,

    #[serde(default)]
    pub dry_run: bool,
}

fn default_release_timeout() -> Duration {
    Duration::from_secs(300)
}

impl ReleaseConfig {
    pub fn id(&self) -> std::result::Result<ReleaseId, ValidationError> {
        ReleaseId::new(&self.name, &self.namespace, &self.context)
    }

    /// Dependency references with the namespace and context of this release
    /// filled in where the reference omits them
    pub fn resolved_depends_on(
        &self,
    ) -> std::result::Result<Vec<ResolvedDependency>, ValidationError> {
        let own = self.id()?;
        self.depends_on
            .iter()
            .map(|dep| {
                Ok(ResolvedDependency {
                    id: ReleaseId::parse(&dep.name)?.with_defaults_from(&own),
                    optional: dep.optional,
                })
            })
            .collect()
    }
}

/// Rollout tracking settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Context trackers connect to, empty for the current one
    #[serde(default)]
    pub context: String,

    /// Delay before each namespace tracker starts watching
    #[serde(default, with = "humantime_serde")]
    pub start_delay: Duration,

    #[serde(default = "default_tracking_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_status_interval", with = "humantime_serde")]
    pub status_interval: Duration,
}

fn default_tracking_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_status_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            context: String::new(),
            start_delay: Duration::ZERO,
            timeout: default_tracking_timeout(),
            status_interval: default_status_interval(),
        }
    }
}

/// Settings for one sync run
///
/// Passed by value down the call chain. The rehearsal works on
/// [`SyncSettings::for_rehearsal`], so the caller's copy is never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Scratch directory for rendered values and fetched packs
    pub work_dir: PathBuf,

    /// Repository index and archive cache
    pub cache_dir: PathBuf,

    /// Download pack dependencies while fetching charts
    pub dependencies: bool,

    /// Overrides every release's context when set
    pub kube_context: Option<String>,
}

impl SyncSettings {
    pub fn new(work_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            cache_dir: cache_dir.into(),
            dependencies: true,
            kube_context: None,
        }
    }

    /// Copy with dependency downloads switched off
    pub fn for_rehearsal(&self) -> Self {
        Self {
            dependencies: false,
            ..self.clone()
        }
    }
}

impl Plan {
    /// Load and validate a plan file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::PlanNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut plan: Plan = serde_yaml::from_str(&content)?;
        plan.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        plan.validate()?;
        Ok(plan)
    }

    /// Parse and validate a plan from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let plan: Plan = serde_yaml::from_str(yaml)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Resolve a path written in the plan
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    /// Check ids, references and monitor definitions
    ///
    /// Graph problems (missing dependencies, cycles) are reported by
    /// [`crate::graph::ReleaseGraph`].
    pub fn validate(&self) -> Result<()> {
        let mut repos = HashSet::new();
        for repo in &self.repositories {
            if !repos.insert(repo.name.as_str()) {
                return Err(CoreError::InvalidPlan {
                    message: format!("repository '{}' is declared more than once", repo.name),
                });
            }
        }

        let mut monitors = HashSet::new();
        for monitor in &self.monitors {
            if !monitors.insert(monitor.name.as_str()) {
                return Err(CoreError::InvalidPlan {
                    message: format!("monitor '{}' is declared more than once", monitor.name),
                });
            }
            if monitor.kind == MonitorKind::Webhook && monitor.url.is_none() {
                return Err(CoreError::InvalidPlan {
                    message: format!("webhook monitor '{}' has no url", monitor.name),
                });
            }
        }

        for release in &self.releases {
            let id = release.id()?;
            release.resolved_depends_on()?;

            for monitor in &release.monitors {
                if !monitors.contains(monitor.name.as_str()) {
                    return Err(CoreError::InvalidPlan {
                        message: format!("release {} uses unknown monitor '{}'", id, monitor.name),
                    });
                }
            }
            if let Some((repo, _)) = release.chart.repository_ref()
                && !repos.contains(repo)
                && !self.resolve_path(&release.chart.name).is_dir()
            {
                return Err(CoreError::InvalidPlan {
                    message: format!("release {} uses unknown repository '{}'", id, repo),
                });
            }
        }

        Ok(())
    }

    /// Look up a monitor by name
    pub fn monitor(&self, name: &str) -> Option<&MonitorConfig> {
        self.monitors.iter().find(|m| m.name == name)
    }

    /// Keep releases carrying any (or, with `match_all`, every) tag, plus
    /// everything they transitively depend on
    ///
    /// An empty tag list keeps the plan as is. Declaration order is kept.
    pub fn filter_by_tags(&self, tags: &[String], match_all: bool) -> Result<Plan> {
        if tags.is_empty() {
            return Ok(self.clone());
        }

        let mut by_id = HashMap::new();
        for (idx, release) in self.releases.iter().enumerate() {
            by_id.insert(release.id()?, idx);
        }

        let matches = |release: &ReleaseConfig| {
            if match_all {
                tags.iter().all(|t| release.tags.contains(t))
            } else {
                tags.iter().any(|t| release.tags.contains(t))
            }
        };

        let mut keep = vec![false; self.releases.len()];
        let mut queue: Vec<usize> = self
            .releases
            .iter()
            .enumerate()
            .filter(|(_, r)| matches(r))
            .map(|(idx, _)| idx)
            .collect();

        while let Some(idx) = queue.pop() {
            if keep[idx] {
                continue;
            }
            keep[idx] = true;
            for dep in self.releases[idx].resolved_depends_on()? {
                if let Some(&dep_idx) = by_id.get(&dep.id) {
                    queue.push(dep_idx);
                }
            }
        }

        let mut filtered = self.clone();
        filtered.releases = self
            .releases
            .iter()
            .zip(keep)
            .filter_map(|(release, kept)| kept.then(|| release.clone()))
            .collect();
        Ok(filtered)
    }
}
