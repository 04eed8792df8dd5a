//! Error types for sherwave-kube

use thiserror::Error;

/// Result type for sherwave-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Kubeconfig could not be loaded or the context does not exist
    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    /// Release not found
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Release already exists
    #[error("release '{name}' already exists in namespace '{namespace}'")]
    ReleaseAlreadyExists { name: String, namespace: String },

    /// Revision missing from the release history
    #[error("release '{name}' has no revision {version} in namespace '{namespace}'")]
    RevisionNotFound {
        name: String,
        namespace: String,
        version: u32,
    },

    /// Some objects of a manifest could not be applied
    #[error("{failed} of {total} object(s) failed to apply: {message}")]
    ApplyFailed {
        failed: usize,
        total: usize,
        message: String,
    },

    /// A tracked workload reached a failed state
    #[error("rollout of {resource} in namespace '{namespace}' failed: {message}")]
    RolloutFailed {
        namespace: String,
        resource: String,
        message: String,
    },

    /// Workloads were still progressing when the tracking timeout expired
    #[error("rollout in namespace '{namespace}' timed out after {timeout}: waiting for {pending}")]
    RolloutTimeout {
        namespace: String,
        timeout: String,
        pending: String,
    },

    /// Tracking stopped because its scope was cancelled
    #[error("tracking of namespace '{namespace}' cancelled")]
    Cancelled { namespace: String },

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Compression error
    #[error("compression error: {0}")]
    Compression(String),

    /// Template rendering error
    #[error("template error: {0}")]
    Template(String),

    /// Pack loading error
    #[error("pack error: {0}")]
    Pack(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<sherwave_core::CoreError> for KubeError {
    fn from(e: sherwave_core::CoreError) -> Self {
        KubeError::Pack(e.to_string())
    }
}

impl From<sherwave_engine::EngineError> for KubeError {
    fn from(e: sherwave_engine::EngineError) -> Self {
        KubeError::Template(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// No revision of the release is stored
    pub fn is_release_not_found(&self) -> bool {
        matches!(self, KubeError::ReleaseNotFound { .. })
    }

    /// Tracking stopped by cancellation rather than an observed fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KubeError::Cancelled { .. })
    }
}
