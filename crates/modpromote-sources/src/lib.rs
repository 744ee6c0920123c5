//! modpromote-sources: external collaborators of the promotion pipeline
//!
//! The pipeline reads from two sources of truth that may disagree:
//! the private module registry and the version-control host holding each
//! module's source repository. This crate defines both seams as async
//! traits, provides in-memory fakes, and implements HTTP backends for
//! Terraform Cloud and GitHub.
//!
//! Nothing here writes to either source.

pub mod error;
pub mod fakes;
pub mod github;
mod http;
pub mod tfc;
pub mod traits;

pub use error::SourceError;
pub use github::{GithubConfig, GithubVcs};
pub use tfc::{TfcConfig, TfcRegistry};
pub use traits::{
    ModuleCoordinates, ModuleRegistry, Reachability, RegistryInput, RegistryModule,
    ReleaseTag, RepoCoordinates, SourceResult, VersionControl,
};
