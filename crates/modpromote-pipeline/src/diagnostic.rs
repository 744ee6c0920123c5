//! Diagnostics: what went wrong (or looked suspicious) at which stage.
//!
//! Each stage error becomes one diagnostic per correctable input, so a
//! failed run lists every unknown variable or missing field separately.

use modpromote_core::verifier::Finding;
use modpromote_core::{
    HarvestError, ResolveError, ScaffoldError, SourceDisagreement, SynthesisError,
    ValidationError,
};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PublishError};
use crate::stage::PipelineStage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: PipelineStage,
    pub severity: Severity,
    /// Stable machine-readable code, e.g. `schema_mismatch`
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn error(stage: PipelineStage, code: &str, message: impl Into<String>) -> Self {
        Self {
            stage,
            severity: Severity::Error,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(stage: PipelineStage, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(stage, code, message)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn not_found(module: &str) -> Self {
        Self::error(
            PipelineStage::Resolving,
            "not_found",
            format!("module {} not found in registry", module),
        )
    }

    pub fn from_resolve(err: &ResolveError) -> Self {
        let code = match err {
            ResolveError::InvalidReference(_) => "invalid_reference",
            ResolveError::Unreachable { .. } => "module_unreachable",
            ResolveError::CloudMismatch { .. } => "cloud_mismatch",
        };
        Self::error(PipelineStage::Resolving, code, err.to_string())
    }

    pub fn from_harvest(err: &HarvestError) -> Self {
        let code = match err {
            HarvestError::ModuleUnreachable { .. } => "module_unreachable",
            HarvestError::NoReleaseFound { .. } => "no_release_found",
            HarvestError::AmbiguousBranch { .. } => "ambiguous_branch",
            HarvestError::VersionMismatch { .. } => "version_mismatch",
            HarvestError::DuplicateVariable { .. } => "duplicate_variable",
            HarvestError::Declaration { .. } => "declaration_error",
            HarvestError::NoDeclarationFiles { .. } => "no_declaration_files",
        };
        Self::error(PipelineStage::Harvesting, code, err.to_string())
    }

    pub fn from_disagreement(disagreement: &SourceDisagreement) -> Self {
        Self::warning(
            PipelineStage::Harvesting,
            "source_disagreement",
            disagreement.to_string(),
        )
    }

    pub fn from_synthesis(err: &SynthesisError) -> Vec<Self> {
        match err {
            SynthesisError::SchemaMismatch(mismatches) => mismatches
                .iter()
                .map(|m| Self::error(PipelineStage::Synthesizing, "schema_mismatch", m.to_string()))
                .collect(),
        }
    }

    pub fn from_validation(err: &ValidationError) -> Self {
        Self::error(PipelineStage::Scaffolding, "validation_error", err.to_string())
    }

    pub fn from_scaffold(err: &ScaffoldError) -> Vec<Self> {
        err.errors().iter().map(Self::from_validation).collect()
    }

    pub fn from_finding(finding: &Finding) -> Self {
        Self::error(
            PipelineStage::Verifying,
            "verification_failure",
            format!("{} ({}): {}", finding.rule, finding.subject, finding.message),
        )
    }

    pub fn from_publish(err: &PublishError) -> Self {
        let code = match err {
            PublishError::Busy { .. } => "publish_busy",
            _ => "publish_failed",
        };
        Self::error(PipelineStage::Publishing, code, err.to_string())
    }

    pub fn from_pipeline(stage: PipelineStage, err: &PipelineError) -> Self {
        Self::error(stage, "illegal_transition", err.to_string())
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {}: {}", self.severity, self.stage, self.code, self.message)
    }
}
