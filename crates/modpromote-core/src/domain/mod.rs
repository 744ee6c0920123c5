//! Domain model for modpromote.

pub mod artifact;
pub mod environment;
pub mod error;
pub mod module_ref;
pub mod scaffold;
pub mod schema;
pub mod values;

pub use artifact::{
    files_digest, ModuleArgument, ModuleCall, RenderedFile, ServiceInfraArtifact, TargetLayout,
};
pub use environment::EnvironmentTarget;
pub use error::{
    ConfigError, HarvestError, ResolveError, ScaffoldError, SchemaMismatch, SynthesisError,
    ValidationError,
};
pub use module_ref::{Cloud, ModuleReference};
pub use scaffold::{EnvironmentCloudConfig, RepoDescriptor, RepoScaffoldSpec};
pub use schema::{
    value_kind, ModuleSchema, OutputSpec, ReleaseProvenance, SourceBranch, VariableSpec,
    VariableType,
};
pub use values::{UserValues, ValueMap};
