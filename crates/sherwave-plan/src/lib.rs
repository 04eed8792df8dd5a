//! Sherwave release sync orchestration
//!
//! - [`Release`]: what a release must support to be orchestrated, with
//!   [`ManagedRelease`] for plan releases and [`MockRelease`] for tests
//! - [`TaskGroup`]: fan-out/fan-in of concurrent sync units
//! - [`launch_trackers`]: one rollout tracker per namespace
//! - [`Orchestrator`]: sync, dry-run sync and tracked sync of a plan
//!
//! ```rust,no_run
//! use sherwave_core::{Plan, SyncSettings};
//! use sherwave_kube::{FakeCluster, MockStorageDriver};
//! use sherwave_plan::{ManagedRelease, Orchestrator, Release, ReleaseEnvironment};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let plan = Plan::load("sherwave.yml")?;
//! let env = Arc::new(ReleaseEnvironment::new(&plan.base_dir, plan.repositories.clone()));
//! let cluster = Arc::new(FakeCluster::new());
//! let storage = Arc::new(MockStorageDriver::new());
//!
//! let releases = plan
//!     .releases
//!     .iter()
//!     .map(|config| {
//!         let release = ManagedRelease::new(config.clone(), env.clone(), cluster.clone(), storage.clone())?;
//!         Ok(Arc::new(release) as Arc<dyn Release>)
//!     })
//!     .collect::<sherwave_plan::Result<Vec<_>>>()?;
//!
//! let orchestrator = Orchestrator::new(&plan, releases)?;
//! let settings = SyncSettings::new(".sherwave", ".sherwave/cache");
//! orchestrator.sync_with_tracking(&settings, &plan.tracking, cluster).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod group;
pub mod managed;
pub mod mock;
pub mod monitor;
pub mod orchestrator;
pub mod release;
pub mod tracking;

pub use error::{PlanError, Result};
pub use group::TaskGroup;
pub use managed::{ManagedRelease, ReleaseEnvironment};
pub use mock::{MockCall, MockRelease};
pub use monitor::{build_monitors, notify_monitors, LogMonitor, Monitor, WebhookMonitor};
pub use orchestrator::{Orchestrator, ReleaseListing};
pub use release::{DryRunGuard, Release};
pub use tracking::{launch_trackers, namespace_specs, track_namespace, NamespaceSpecs};
