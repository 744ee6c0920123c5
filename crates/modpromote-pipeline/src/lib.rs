//! modpromote pipeline orchestration
//!
//! Provides the pipeline orchestrator that:
//! - Sequences resolve, harvest, synthesize, scaffold and verify per intent
//! - Retries transient registry/VCS failures with bounded backoff
//! - Publishes verified artifacts all-or-nothing under a repository root
//! - Reports every run as a `PipelineResult` with staged diagnostics

pub mod diagnostic;
pub mod error;
pub mod pipeline;
pub mod publish;
pub mod request;
pub mod retry;
pub mod stage;

// Re-export key types
pub use diagnostic::{Diagnostic, Severity};
pub use error::{PipelineError, PublishError};
pub use pipeline::{Pipeline, PipelineResult, RunStatus};
pub use publish::{PublishReport, Publisher};
pub use request::{InfraRequest, PipelineRequest, RepoRequest};
pub use retry::RetryPolicy;
pub use stage::{Intent, PipelineStage};
