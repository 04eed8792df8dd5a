//! Sherwave Core - Core types shared by the release orchestrator
//!
//! This crate provides the foundational types used throughout Sherwave:
//! - `ReleaseId`: The validated `name@namespace@context` identity of a release
//! - `Plan`: The `sherwave.yml` model (repositories, monitors, releases)
//! - `ReleaseGraph`: Dependency ordering and cycle detection
//! - `Values`: Configuration values with deep merge support
//! - `LoadedPack`: The pack format releases deploy

pub mod error;
pub mod graph;
pub mod id;
pub mod pack;
pub mod plan;
pub mod values;

pub use error::{CoreError, Result};
pub use graph::{GraphError, ReleaseGraph};
pub use id::{IdPart, ReleaseId, ValidationError};
pub use pack::{Dependency, LoadedPack, Pack, PackMetadata};
pub use plan::{
    ChartRef, DependsOnReference, MonitorConfig, MonitorKind, MonitorReference, Plan,
    ReleaseConfig, RepositoryConfig, ResolvedDependency, SyncSettings, Templater,
    TrackingConfig, ValuesReference, DEFAULT_PLAN_FILE,
};
pub use values::Values;
