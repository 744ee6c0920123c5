//! Collaborator trait definitions for modpromote
//!
//! These traits define the two read-only external sources the pipeline
//! consults:
//! - `ModuleRegistry`: the private module registry (lookup, version inputs)
//! - `VersionControl`: the host of module source repositories (releases,
//!   branch reachability, file trees and contents)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! via the `fakes` module; HTTP backends live in `tfc` and `github`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Result type for collaborator calls
pub type SourceResult<T> = std::result::Result<T, SourceError>;

// ---------------------------------------------------------------------------
// ModuleRegistry: private module registry
// ---------------------------------------------------------------------------

/// Registry coordinates of a module: `<namespace>/<name>/<provider>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleCoordinates {
    /// Registry namespace (the owning organization)
    pub namespace: String,
    /// Module name, e.g. `lambda`
    pub name: String,
    /// Provider code as the registry spells it, e.g. `aws` or `azu`
    pub provider: String,
}

impl ModuleCoordinates {
    pub fn new(namespace: &str, name: &str, provider: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            provider: provider.to_string(),
        }
    }
}

impl std::fmt::Display for ModuleCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.provider)
    }
}

/// A module entry as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryModule {
    pub coordinates: ModuleCoordinates,
    /// Current published version (e.g. `0.9.23`)
    pub current_version: String,
    /// Identifier of the backing VCS repository (`owner/repo`), if linked
    pub vcs_repo: Option<String>,
    /// Registry-side module status (e.g. `setup_complete`)
    pub status: Option<String>,
}

/// One input variable as described by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryInput {
    pub name: String,
    /// Type expression, when the registry reports one
    pub type_expr: Option<String>,
    pub description: Option<String>,
    pub default: Option<serde_json::Value>,
    pub required: bool,
}

/// Private module registry.
///
/// Guarantees:
/// - `find_module` returns `Ok(None)` for an absent module, never `NotFound`.
/// - `version_inputs` returns `Ok(None)` when the registry has no input
///   description for that version.
#[async_trait]
pub trait ModuleRegistry: Send + Sync {
    /// Look up a module by coordinates.
    async fn find_module(&self, coords: &ModuleCoordinates)
        -> SourceResult<Option<RegistryModule>>;

    /// Input variables the registry reports for one version.
    async fn version_inputs(
        &self,
        coords: &ModuleCoordinates,
        version: &str,
    ) -> SourceResult<Option<Vec<RegistryInput>>>;
}

// ---------------------------------------------------------------------------
// VersionControl: module source repositories
// ---------------------------------------------------------------------------

/// Repository coordinates on the VCS host: `<owner>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    /// Parse an `owner/name` identifier.
    pub fn parse(identifier: &str) -> Option<Self> {
        let (owner, name) = identifier.trim().split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl std::fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The latest release of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTag {
    /// Tag name, e.g. `v0.9.23`
    pub tag_name: String,
    /// Branch or commit the release was cut from, as reported by the host
    pub target_commitish: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Whether a tag's commit is contained in a branch's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reachability {
    /// The tag commit is an ancestor of (or equal to) the branch tip
    Reachable,
    /// The branch exists but does not contain the tag commit
    NotReachable,
    /// The branch does not exist
    BranchMissing,
}

/// Host of module source repositories.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Latest published release, `Ok(None)` when the repo has none.
    async fn latest_release(&self, repo: &RepoCoordinates) -> SourceResult<Option<ReleaseTag>>;

    /// Whether `tag` is reachable from the tip of `branch`.
    async fn tag_reachability(
        &self,
        repo: &RepoCoordinates,
        tag: &str,
        branch: &str,
    ) -> SourceResult<Reachability>;

    /// All file paths in the branch tree, recursively, in path order.
    async fn list_files(&self, repo: &RepoCoordinates, branch: &str) -> SourceResult<Vec<String>>;

    /// Text content of one file on a branch.
    async fn read_file(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        path: &str,
    ) -> SourceResult<String>;
}
