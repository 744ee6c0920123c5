//! Domain-level error taxonomy for modpromote.
//!
//! Every display string names the offending input (variable, environment,
//! field) so a caller can correct exactly one thing and re-run.

use modpromote_sources::{Reachability, SourceError};

use crate::domain::environment::EnvironmentTarget;
use crate::hcl::HclError;

/// Errors from the module resolver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid module reference: {0}")]
    InvalidReference(String),

    #[error("module registry unreachable: {reason}")]
    Unreachable { reason: String, transient: bool },

    #[error("registry module {module} is published for provider '{found}', expected '{expected}'")]
    CloudMismatch {
        module: String,
        expected: String,
        found: String,
    },
}

impl ResolveError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolveError::Unreachable { transient: true, .. })
    }
}

impl From<SourceError> for ResolveError {
    fn from(err: SourceError) -> Self {
        ResolveError::Unreachable {
            transient: err.is_transient(),
            reason: err.to_string(),
        }
    }
}

/// Errors from the schema harvester.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HarvestError {
    #[error("module unreachable: {reason}")]
    ModuleUnreachable { reason: String, transient: bool },

    #[error("no release found in repository {repo}")]
    NoReleaseFound { repo: String },

    #[error(
        "cannot determine source branch of release {tag} (main: {main:?}, develop: {develop:?}); resolve manually"
    )]
    AmbiguousBranch {
        tag: String,
        main: Reachability,
        develop: Reachability,
    },

    #[error("registry version {registry} does not match release tag {release_tag}")]
    VersionMismatch {
        registry: String,
        release_tag: String,
    },

    #[error("variable '{name}' declared more than once (again in {path})")]
    DuplicateVariable { name: String, path: String },

    #[error("failed to parse declarations in {path}: {source}")]
    Declaration {
        path: String,
        #[source]
        source: HclError,
    },

    #[error("no declaration files found on branch {branch} of {repo}")]
    NoDeclarationFiles { repo: String, branch: String },
}

impl HarvestError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HarvestError::ModuleUnreachable { transient: true, .. })
    }
}

impl From<SourceError> for HarvestError {
    fn from(err: SourceError) -> Self {
        HarvestError::ModuleUnreachable {
            transient: err.is_transient(),
            reason: err.to_string(),
        }
    }
}

/// One contradiction between caller input and the harvested schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaMismatch {
    #[error("variable '{variable}' not found in module schema")]
    UnknownVariable { variable: String },

    #[error("required variable '{variable}' has no value for environment {environment}")]
    MissingRequired {
        variable: String,
        environment: EnvironmentTarget,
    },
}

/// Errors from the config synthesizer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthesisError {
    #[error("schema mismatch: {}", join_display(.0))]
    SchemaMismatch(Vec<SchemaMismatch>),
}

/// Malformed repository-scaffold input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("field '{field}' must not be empty")]
    MissingField { field: String },

    #[error("vault secret path '{path}' lists no keys")]
    EmptySecretKey { path: String },

    #[error("vault_secrets is empty; confirm explicitly that no secrets are needed")]
    SecretsNotConfirmed,

    #[error("environment {env} has no cloud configuration")]
    MissingEnvironment { env: EnvironmentTarget },

    #[error("environment {env} sets both account_id and subscription_id")]
    MixedIdentifiers { env: EnvironmentTarget },

    #[error("environment {env} is missing {expected}")]
    MissingIdentifier {
        env: EnvironmentTarget,
        expected: &'static str,
    },

    #[error("environment {env} targets {found}, but the request is for {expected}")]
    CloudMismatch {
        env: EnvironmentTarget,
        expected: String,
        found: String,
    },

    #[error("invalid service name '{name}'")]
    InvalidServiceName { name: String },
}

/// Errors from the repository scaffolder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScaffoldError {
    #[error("invalid scaffold input: {}", join_display(.0))]
    Invalid(Vec<ValidationError>),
}

impl ScaffoldError {
    pub fn errors(&self) -> &[ValidationError] {
        match self {
            ScaffoldError::Invalid(errors) => errors,
        }
    }
}

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },
}

fn join_display<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
