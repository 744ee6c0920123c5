//! In-memory fakes for collaborator traits (testing and dry runs)
//!
//! Provides `MemoryRegistry` and `MemoryVcs` that satisfy the trait
//! contracts without network access. Both support fault injection: queued
//! errors are returned (one per call) before normal answers resume, and an
//! optional delay makes every call sleep first so callers' timeouts fire.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::traits::*;

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Faults {
    queued: Mutex<VecDeque<SourceError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl Faults {
    async fn enter(&self) -> SourceResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.queued.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn push(&self, err: SourceError, times: usize) {
        let mut queued = self.queued.lock().unwrap();
        for _ in 0..times {
            queued.push_back(err.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryRegistry
// ---------------------------------------------------------------------------

/// In-memory registry keyed by `namespace/name/provider`.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    modules: Mutex<HashMap<String, RegistryModule>>,
    inputs: Mutex<HashMap<(String, String), Vec<RegistryInput>>>,
    faults: Faults,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a module at `version`, linked to `vcs_repo` (`owner/name`).
    pub fn with_module(self, coords: ModuleCoordinates, version: &str, vcs_repo: &str) -> Self {
        self.modules.lock().unwrap().insert(
            coords.to_string(),
            RegistryModule {
                coordinates: coords,
                current_version: version.to_string(),
                vcs_repo: Some(vcs_repo.to_string()),
                status: Some("setup_complete".to_string()),
            },
        );
        self
    }

    /// Answer lookups for `lookup` with `module` exactly as given, even when
    /// its own coordinates differ.
    pub fn with_listing(self, lookup: &ModuleCoordinates, module: RegistryModule) -> Self {
        self.modules.lock().unwrap().insert(lookup.to_string(), module);
        self
    }

    /// Attach a registry-side input description to a published version.
    pub fn with_inputs(
        self,
        coords: &ModuleCoordinates,
        version: &str,
        inputs: Vec<RegistryInput>,
    ) -> Self {
        self.inputs
            .lock()
            .unwrap()
            .insert((coords.to_string(), version.to_string()), inputs);
        self
    }

    /// Fail the next `times` calls with `err`.
    pub fn fail_next(&self, err: SourceError, times: usize) {
        self.faults.push(err, times);
    }

    /// Sleep for `delay` at the start of every call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.faults.delay.lock().unwrap() = delay;
    }

    /// Number of calls received so far (including failed ones).
    pub fn call_count(&self) -> usize {
        self.faults.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleRegistry for MemoryRegistry {
    async fn find_module(
        &self,
        coords: &ModuleCoordinates,
    ) -> SourceResult<Option<RegistryModule>> {
        self.faults.enter().await?;
        let modules = self.modules.lock().unwrap();
        Ok(modules.get(&coords.to_string()).cloned())
    }

    async fn version_inputs(
        &self,
        coords: &ModuleCoordinates,
        version: &str,
    ) -> SourceResult<Option<Vec<RegistryInput>>> {
        self.faults.enter().await?;
        let inputs = self.inputs.lock().unwrap();
        Ok(inputs
            .get(&(coords.to_string(), version.to_string()))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryVcs
// ---------------------------------------------------------------------------

/// One fake repository: an optional latest release, branch file trees, and
/// which branches the release tag is reachable from.
#[derive(Debug, Clone, Default)]
pub struct FakeRepo {
    release: Option<ReleaseTag>,
    branches: BTreeMap<String, BTreeMap<String, String>>,
    reachable_from: Vec<String>,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latest release tag.
    pub fn release(mut self, tag_name: &str, target_commitish: &str) -> Self {
        self.release = Some(ReleaseTag {
            tag_name: tag_name.to_string(),
            target_commitish: Some(target_commitish.to_string()),
            published_at: None,
        });
        self
    }

    /// Add a file to a branch (creating the branch if needed).
    pub fn file(mut self, branch: &str, path: &str, content: &str) -> Self {
        self.branches
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
        self
    }

    /// Create an empty branch.
    pub fn branch(mut self, branch: &str) -> Self {
        self.branches.entry(branch.to_string()).or_default();
        self
    }

    /// Mark the release tag as reachable from `branch`.
    pub fn reachable_from(mut self, branch: &str) -> Self {
        self.branches.entry(branch.to_string()).or_default();
        self.reachable_from.push(branch.to_string());
        self
    }
}

/// In-memory VCS host keyed by `owner/name`.
#[derive(Debug, Default)]
pub struct MemoryVcs {
    repos: Mutex<HashMap<String, FakeRepo>>,
    faults: Faults,
}

impl MemoryVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(self, repo: &str, fake: FakeRepo) -> Self {
        self.repos.lock().unwrap().insert(repo.to_string(), fake);
        self
    }

    /// Fail the next `times` calls with `err`.
    pub fn fail_next(&self, err: SourceError, times: usize) {
        self.faults.push(err, times);
    }

    /// Sleep for `delay` at the start of every call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.faults.delay.lock().unwrap() = delay;
    }

    /// Number of calls received so far (including failed ones).
    pub fn call_count(&self) -> usize {
        self.faults.calls.load(Ordering::SeqCst)
    }

    fn repo(&self, repo: &RepoCoordinates) -> SourceResult<FakeRepo> {
        self.repos
            .lock()
            .unwrap()
            .get(&repo.to_string())
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                resource: format!("repos/{}", repo),
            })
    }
}

#[async_trait]
impl VersionControl for MemoryVcs {
    async fn latest_release(&self, repo: &RepoCoordinates) -> SourceResult<Option<ReleaseTag>> {
        self.faults.enter().await?;
        Ok(self.repo(repo)?.release)
    }

    async fn tag_reachability(
        &self,
        repo: &RepoCoordinates,
        tag: &str,
        branch: &str,
    ) -> SourceResult<Reachability> {
        self.faults.enter().await?;
        let fake = self.repo(repo)?;
        let tag_exists = fake
            .release
            .as_ref()
            .map(|r| r.tag_name == tag)
            .unwrap_or(false);
        if !tag_exists {
            return Err(SourceError::NotFound {
                resource: format!("repos/{}/tags/{}", repo, tag),
            });
        }
        if !fake.branches.contains_key(branch) {
            return Ok(Reachability::BranchMissing);
        }
        if fake.reachable_from.iter().any(|b| b == branch) {
            Ok(Reachability::Reachable)
        } else {
            Ok(Reachability::NotReachable)
        }
    }

    async fn list_files(&self, repo: &RepoCoordinates, branch: &str) -> SourceResult<Vec<String>> {
        self.faults.enter().await?;
        let fake = self.repo(repo)?;
        let files = fake
            .branches
            .get(branch)
            .ok_or_else(|| SourceError::NotFound {
                resource: format!("repos/{}/branches/{}", repo, branch),
            })?;
        Ok(files.keys().cloned().collect())
    }

    async fn read_file(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        path: &str,
    ) -> SourceResult<String> {
        self.faults.enter().await?;
        let fake = self.repo(repo)?;
        fake.branches
            .get(branch)
            .and_then(|files| files.get(path))
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                resource: format!("repos/{}/contents/{}?ref={}", repo, path, branch),
            })
    }
}
