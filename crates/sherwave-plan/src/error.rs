//! Error types for sherwave-plan

use sherwave_core::{CoreError, GraphError, ReleaseId};
use sherwave_engine::EngineError;
use sherwave_kube::KubeError;
use sherwave_repo::RepoError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

/// Errors raised while orchestrating a sync
///
/// The phase variants (`RepositorySync`, `Rehearsal`, `TrackerInit`,
/// `Rollout`, `Apply`, `Cancelled`) say where a sync stopped; the wrapped
/// variants carry failures of the layers below.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlanError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("invalid release graph: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Kube(#[from] KubeError),

    /// A release's own configuration is unusable
    #[error("invalid release {release}: {message}")]
    Validation { release: ReleaseId, message: String },

    #[error("repository sync failed: {0}")]
    RepositorySync(#[source] RepoError),

    #[error("rehearsal failed: {0}")]
    Rehearsal(#[source] Box<PlanError>),

    #[error("cannot track namespace '{namespace}': {source}")]
    TrackerInit {
        namespace: String,
        #[source]
        source: KubeError,
    },

    #[error(transparent)]
    Rollout(KubeError),

    #[error("release {release} failed: {source}")]
    Apply {
        release: ReleaseId,
        #[source]
        source: Box<PlanError>,
    },

    /// A tracker stopped because the sync's scope was cancelled
    #[error("tracking of namespace '{namespace}' cancelled")]
    Cancelled { namespace: String },

    /// A release was used before its chart was fetched
    #[error("release {release} has no chart yet, fetch it first")]
    ChartNotFetched { release: ReleaseId },

    #[error("release '{0}' is not part of the plan")]
    UnknownRelease(String),

    #[error("monitor '{name}' failed: {message}")]
    Monitor { name: String, message: String },

    /// A sync unit panicked or was aborted
    #[error("sync task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for PlanError {
    fn from(e: tokio::task::JoinError) -> Self {
        PlanError::Join(e.to_string())
    }
}

impl PlanError {
    /// Stopped by cancellation rather than an observed fault
    pub fn is_cancellation(&self) -> bool {
        match self {
            PlanError::Cancelled { .. } => true,
            PlanError::Kube(e) | PlanError::Rollout(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// No revision of the release has been recorded yet
    pub fn is_release_not_found(&self) -> bool {
        matches!(self, PlanError::Kube(e) if e.is_release_not_found())
    }
}
