//! Pipeline and publication errors.

use std::path::PathBuf;

use crate::stage::PipelineStage;

/// Orchestrator programming errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("illegal stage transition {from} -> {to}")]
    IllegalTransition {
        from: PipelineStage,
        to: PipelineStage,
    },
}

/// Errors from writing artifacts beneath a repository root.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("another publication holds the lock {path}")]
    Busy { path: PathBuf },

    #[error("artifact path {path} escapes the repository root")]
    UnsafePath { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("publication task aborted: {0}")]
    Aborted(String),
}

impl PublishError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PublishError::Io {
            path: path.into(),
            source,
        }
    }
}
