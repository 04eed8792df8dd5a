//! CLI error types with exit code handling
//!
//! Library errors are classified into the few kinds the exit code
//! distinguishes; the message keeps the full error chain.

use miette::Diagnostic;
use sherwave_core::CoreError;
use sherwave_engine::EngineError;
use sherwave_plan::PlanError;
use sherwave_repo::RepoError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid plan, release id or dependency graph
    #[error("Validation failed: {message}")]
    #[diagnostic(code(sherwave::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Values or manifest rendering failed
    #[error("Template error: {message}")]
    #[diagnostic(code(sherwave::cli::template))]
    Template { message: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(sherwave::cli::io))]
    Io { message: String },

    /// Cluster, apply or rollout failure
    #[error("Deploy failed: {message}")]
    #[diagnostic(code(sherwave::cli::deploy))]
    Deploy {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(sherwave::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Deploy { .. } => exit_codes::DEPLOY_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn deploy(message: impl Into<String>) -> Self {
        Self::Deploy {
            message: message.into(),
            help: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Validation,
    Template,
    Io,
    Deploy,
    Other,
}

fn core_kind(err: &CoreError) -> Kind {
    match err {
        CoreError::Validation(_)
        | CoreError::Graph(_)
        | CoreError::InvalidPlan { .. }
        | CoreError::InvalidPack { .. }
        | CoreError::YamlParse(_)
        | CoreError::JsonParse(_)
        | CoreError::InvalidVersion(_) => Kind::Validation,
        CoreError::PlanNotFound { .. } | CoreError::PackNotFound { .. } | CoreError::Io(_) => {
            Kind::Io
        }
    }
}

fn engine_kind(err: &EngineError) -> Kind {
    match err {
        EngineError::Core(e) => core_kind(e),
        EngineError::Io(_) | EngineError::MissingValues { .. } => Kind::Io,
        _ => Kind::Template,
    }
}

fn repo_kind(err: &RepoError) -> Kind {
    match err {
        RepoError::Core(e) => core_kind(e),
        RepoError::Io(_) => Kind::Io,
        _ => Kind::Other,
    }
}

/// The phase error wrappers are transparent here; the innermost error decides
fn plan_kind(err: &PlanError) -> Kind {
    match err {
        PlanError::Core(e) => core_kind(e),
        PlanError::Graph(_) | PlanError::Validation { .. } | PlanError::UnknownRelease(_) => {
            Kind::Validation
        }
        PlanError::Engine(e) => engine_kind(e),
        PlanError::Repo(e) | PlanError::RepositorySync(e) => repo_kind(e),
        PlanError::Rehearsal(inner) | PlanError::Apply { source: inner, .. } => plan_kind(inner),
        PlanError::Kube(_)
        | PlanError::TrackerInit { .. }
        | PlanError::Rollout(_)
        | PlanError::Cancelled { .. } => Kind::Deploy,
        _ => Kind::Other,
    }
}

fn from_kind(kind: Kind, message: String) -> CliError {
    match kind {
        Kind::Validation => CliError::Validation {
            message,
            help: None,
        },
        Kind::Template => CliError::Template { message },
        Kind::Io => CliError::Io { message },
        Kind::Deploy => CliError::Deploy {
            message,
            help: None,
        },
        Kind::Other => CliError::Other { message },
    }
}

impl From<PlanError> for CliError {
    fn from(err: PlanError) -> Self {
        let help = match &err {
            PlanError::Rehearsal(_) => Some("nothing was applied to the cluster".to_string()),
            PlanError::TrackerInit { .. } => {
                Some("check the tracking context and RBAC for the namespace".to_string())
            }
            _ => None,
        };
        match from_kind(plan_kind(&err), err.to_string()) {
            CliError::Deploy { message, .. } => CliError::Deploy { message, help },
            CliError::Validation { message, .. } => CliError::Validation { message, help },
            other => other,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        from_kind(core_kind(&err), err.to_string())
    }
}

impl From<sherwave_kube::KubeError> for CliError {
    fn from(err: sherwave_kube::KubeError) -> Self {
        match err {
            sherwave_kube::KubeError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            e => CliError::deploy(e.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
