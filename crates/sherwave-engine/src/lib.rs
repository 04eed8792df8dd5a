//! Sherwave Engine - MiniJinja rendering for values files and packs

pub mod engine;
pub mod error;
pub mod filters;
pub mod manifest;

pub use engine::{Engine, EngineBuilder, ReleaseInfo, ValuesContext, ValuesRelease};
pub use error::{EngineError, Result, TemplateError};
pub use manifest::{split_documents, RenderedManifestSet, TrackableSpec, WorkloadKind};
