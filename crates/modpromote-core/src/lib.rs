//! modpromote Core Library
//!
//! Turns a module reference from the private registry into the files a
//! service repository needs to consume it: a version-pinned module call,
//! variable and output declarations, and one value file per environment.
//! Also scaffolds the repository descriptor for a new service.
//!
//! The stages are plain functions or small structs over the source traits
//! in `modpromote-sources`; orchestration, retries and publication live in
//! `modpromote-pipeline`.

pub mod config;
pub mod domain;
pub mod harvester;
pub mod hcl;
pub mod net;
pub mod obs;
pub mod reconcile;
pub mod resolver;
pub mod scaffolder;
pub mod synthesizer;
pub mod telemetry;
pub mod verifier;

pub use config::{
    Credentials, NetworkSettings, PromoteConfig, RegistrySettings, ScaffoldSettings, VcsSettings,
};

pub use domain::{
    files_digest, value_kind, Cloud, ConfigError, EnvironmentCloudConfig, EnvironmentTarget,
    HarvestError, ModuleArgument, ModuleCall, ModuleReference, ModuleSchema, OutputSpec,
    ReleaseProvenance, RenderedFile, RepoDescriptor, RepoScaffoldSpec, ResolveError,
    ScaffoldError, SchemaMismatch, ServiceInfraArtifact, SourceBranch, SynthesisError,
    TargetLayout, UserValues, ValidationError, ValueMap, VariableSpec, VariableType,
};

pub use harvester::{Harvest, SchemaCache, SchemaHarvester};
pub use hcl::HclError;
pub use reconcile::{reconcile_variables, Reconciled, SourceDisagreement};
pub use resolver::{parse_reference, ModuleResolver, Resolution, ResolvedModule};
pub use scaffolder::{scaffold, validate_spec};
pub use synthesizer::{check_values, synthesize};
pub use telemetry::init_tracing;
pub use verifier::{verify, verify_all, verify_descriptor, Finding, Verdict, VerifyRule};

/// Result alias for fallible setup code (configuration loading).
pub type Result<T> = std::result::Result<T, ConfigError>;
