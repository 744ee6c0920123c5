//! Pipeline invocation inputs, one per intent.

use modpromote_core::{Cloud, RepoScaffoldSpec, UserValues};
use serde::{Deserialize, Serialize};

use crate::stage::Intent;

/// Promote a registry module into a service's infrastructure tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfraRequest {
    /// Registry module name, e.g. `lambda`
    pub module: String,
    pub cloud: Cloud,
    /// Registry organization; the configured one when `None`
    #[serde(default)]
    pub organization: Option<String>,
    pub service_name: String,
    #[serde(default)]
    pub values: UserValues,
    /// Also scaffold the service repository descriptor
    #[serde(default)]
    pub scaffold: Option<RepoScaffoldSpec>,
}

/// Scaffold a service repository descriptor only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoRequest {
    pub service_name: String,
    pub cloud: Cloud,
    pub scaffold: RepoScaffoldSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum PipelineRequest {
    FullInfra(InfraRequest),
    RepositoryOnly(RepoRequest),
}

impl PipelineRequest {
    pub fn intent(&self) -> Intent {
        match self {
            PipelineRequest::FullInfra(_) => Intent::FullInfra,
            PipelineRequest::RepositoryOnly(_) => Intent::RepositoryOnly,
        }
    }

    /// Short description for logs: module and service, or service only.
    pub fn subject(&self) -> String {
        match self {
            PipelineRequest::FullInfra(req) => {
                format!("{}/{} for {}", req.module, req.cloud, req.service_name)
            }
            PipelineRequest::RepositoryOnly(req) => req.service_name.clone(),
        }
    }
}

impl From<InfraRequest> for PipelineRequest {
    fn from(req: InfraRequest) -> Self {
        PipelineRequest::FullInfra(req)
    }
}

impl From<RepoRequest> for PipelineRequest {
    fn from(req: RepoRequest) -> Self {
        PipelineRequest::RepositoryOnly(req)
    }
}
