//! Sherwave Kubernetes integration
//!
//! - [`ClusterClient`]: the contract releases and the orchestrator use to
//!   apply manifests and watch rollouts
//! - [`KubeCluster`]: kube-rs implementation (Server-Side Apply, discovery)
//! - [`LazyCluster`]: connects on first use
//! - [`PollingTracker`]: namespace rollout tracker polling workload readiness
//! - [`CancelScope`]: cancellation shared by concurrent sync units
//! - [`StorageDriver`]: release history, with file and in-memory drivers
//! - [`FakeCluster`]: in-memory cluster for tests

pub mod cluster;
pub mod error;
pub mod fake;
pub mod health;
pub mod lazy;
pub mod release;
pub mod resources;
pub mod scope;
pub mod storage;
pub mod tracker;

pub use cluster::{ApplySummary, ClusterClient, Readiness, RolloutTracker};
pub use error::{KubeError, Result};
pub use fake::{AppliedManifest, FakeCluster};
pub use lazy::LazyCluster;
pub use release::{ReleaseState, StoredRelease};
pub use resources::KubeCluster;
pub use scope::CancelScope;
pub use storage::{
    CompressionMethod, FileDriver, MockStorageDriver, OperationCounts, StorageConfig,
    StorageDriver,
};
pub use tracker::{PollingTracker, TrackOptions};
