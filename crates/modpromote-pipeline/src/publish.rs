//! All-or-nothing publication of rendered artifacts beneath a repository
//! root.
//!
//! A run either lands every file or leaves the tree as it found it:
//! files are staged as temp files next to their targets, renamed into
//! place one by one, and on any failure the renamed targets are restored.
//! An exclusive lock file keeps concurrent runs against the same root from
//! interleaving.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use modpromote_core::{files_digest, obs, RenderedFile};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::PublishError;

pub const LOCK_FILE: &str = ".modpromote.lock";

/// What a successful publication wrote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishReport {
    pub root: PathBuf,
    /// Paths relative to `root`, in write order
    pub files: Vec<PathBuf>,
    pub digest: String,
}

#[derive(Debug, Clone)]
pub struct Publisher {
    root: PathBuf,
}

impl Publisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `files` under the root.
    ///
    /// The work runs on a blocking task; once started it completes even if
    /// the returned future is dropped.
    pub async fn publish(&self, files: Vec<RenderedFile>) -> Result<PublishReport, PublishError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || publish_blocking(&root, &files))
            .await
            .map_err(|e| PublishError::Aborted(e.to_string()))?
    }
}

/// Removes the lock file on drop.
struct RootLock {
    path: PathBuf,
}

impl RootLock {
    fn acquire(root: &Path) -> Result<Self, PublishError> {
        let path = root.join(LOCK_FILE);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                // Guard first: a failed owner write still releases the lock.
                let lock = Self { path };
                writeln!(file, "{}", std::process::id())
                    .map_err(|e| PublishError::io(lock.path.clone(), e))?;
                Ok(lock)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(PublishError::Busy { path }),
            Err(e) => Err(PublishError::io(path, e)),
        }
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove publish lock");
        }
    }
}

/// A staged file and what its target held before.
struct Staged {
    target: PathBuf,
    temp: NamedTempFile,
    prior: Option<Vec<u8>>,
}

fn check_relative(path: &Path) -> Result<(), PublishError> {
    let safe = path.components().count() > 0
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(PublishError::UnsafePath {
            path: path.to_path_buf(),
        })
    }
}

fn stage(root: &Path, file: &RenderedFile) -> Result<Staged, PublishError> {
    let target = root.join(&file.path);
    let parent = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    fs::create_dir_all(&parent).map_err(|e| PublishError::io(&parent, e))?;

    let prior = if target.is_file() {
        Some(fs::read(&target).map_err(|e| PublishError::io(&target, e))?)
    } else {
        None
    };

    let mut temp = NamedTempFile::new_in(&parent).map_err(|e| PublishError::io(&parent, e))?;
    temp.write_all(file.content.as_bytes())
        .and_then(|_| temp.flush())
        .map_err(|e| PublishError::io(temp.path(), e))?;

    Ok(Staged {
        target,
        temp,
        prior,
    })
}

/// Put back what `committed` targets held before this run.
fn roll_back(committed: Vec<(PathBuf, Option<Vec<u8>>)>) {
    for (target, prior) in committed.into_iter().rev() {
        let restored = match prior {
            Some(bytes) => fs::write(&target, bytes),
            None => fs::remove_file(&target),
        };
        if let Err(e) = restored {
            warn!(path = %target.display(), error = %e, "rollback failed");
        }
    }
}

fn publish_blocking(root: &Path, files: &[RenderedFile]) -> Result<PublishReport, PublishError> {
    for file in files {
        check_relative(&file.path)?;
    }
    fs::create_dir_all(root).map_err(|e| PublishError::io(root, e))?;
    let _lock = RootLock::acquire(root)?;

    // Staging failures leave targets untouched; dropped temps delete themselves.
    let staged = files
        .iter()
        .map(|file| stage(root, file))
        .collect::<Result<Vec<_>, _>>()?;

    let mut committed = Vec::with_capacity(staged.len());
    for Staged {
        target,
        temp,
        prior,
    } in staged
    {
        if let Err(e) = temp.persist(&target) {
            let err = PublishError::io(&target, e.error);
            roll_back(committed);
            return Err(err);
        }
        debug!(path = %target.display(), "artifact written");
        committed.push((target, prior));
    }

    let report = PublishReport {
        root: root.to_path_buf(),
        files: files.iter().map(|f| f.path.clone()).collect(),
        digest: files_digest(files),
    };
    obs::emit_publish_completed(
        &root.display().to_string(),
        report.files.len(),
        &report.digest,
    );
    Ok(report)
}
