//! GitHub backend for module source repositories
//!
//! Branch reachability is answered by the compare API: comparing
//! `branch...tag` reports `identical` or `behind` exactly when the tag's
//! commit is already contained in the branch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::SourceError;
use crate::http::{build_client, check_status, normalize_base, send};
use crate::traits::*;

/// GitHub API configuration.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// API root, e.g. `https://api.github.com`
    pub api_url: String,
    /// Token (read from `GITHUB_TOKEN` by callers)
    pub token: Option<String>,
    pub timeout: Duration,
}

/// HTTP client for the GitHub REST API.
pub struct GithubVcs {
    config: GithubConfig,
    http: Client,
}

impl GithubVcs {
    pub fn new(config: GithubConfig) -> SourceResult<Self> {
        let http = build_client(
            config.token.as_deref(),
            "token",
            "application/vnd.github+json",
            config.timeout,
        )?;
        Ok(Self { config, http })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", normalize_base(&self.config.api_url), resource)
    }
}

#[derive(Debug, Deserialize)]
struct WireRelease {
    tag_name: String,
    #[serde(default)]
    target_commitish: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireCompare {
    status: String,
}

#[derive(Debug, Deserialize)]
struct WireTree {
    tree: Vec<WireTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct WireTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

fn reachability_from_compare(status: &str) -> SourceResult<Reachability> {
    match status {
        "identical" | "behind" => Ok(Reachability::Reachable),
        "ahead" | "diverged" => Ok(Reachability::NotReachable),
        other => Err(SourceError::Decode(format!(
            "unknown compare status '{}'",
            other
        ))),
    }
}

fn blob_paths(tree: WireTree) -> Vec<String> {
    let mut paths: Vec<String> = tree
        .tree
        .into_iter()
        .filter(|e| e.kind == "blob")
        .map(|e| e.path)
        .collect();
    paths.sort();
    paths
}

#[async_trait]
impl VersionControl for GithubVcs {
    async fn latest_release(&self, repo: &RepoCoordinates) -> SourceResult<Option<ReleaseTag>> {
        let resource = format!("repos/{}/releases/latest", repo);
        let response = send(
            self.http.get(self.url(&resource)),
            &resource,
            self.config.timeout,
        )
        .await?;
        let Some(response) = check_status(response, &resource)? else {
            return Ok(None);
        };
        let release: WireRelease = response.json().await?;
        Ok(Some(ReleaseTag {
            tag_name: release.tag_name,
            target_commitish: release.target_commitish,
            published_at: release.published_at,
        }))
    }

    async fn tag_reachability(
        &self,
        repo: &RepoCoordinates,
        tag: &str,
        branch: &str,
    ) -> SourceResult<Reachability> {
        let resource = format!("repos/{}/compare/{}...{}", repo, branch, tag);
        let response = send(
            self.http.get(self.url(&resource)),
            &resource,
            self.config.timeout,
        )
        .await?;
        let Some(response) = check_status(response, &resource)? else {
            return Ok(Reachability::BranchMissing);
        };
        let compare: WireCompare = response.json().await?;
        reachability_from_compare(&compare.status)
    }

    async fn list_files(&self, repo: &RepoCoordinates, branch: &str) -> SourceResult<Vec<String>> {
        let resource = format!("repos/{}/git/trees/{}", repo, branch);
        let request = self
            .http
            .get(self.url(&resource))
            .query(&[("recursive", "1")]);
        let response = send(request, &resource, self.config.timeout).await?;
        let response = check_status(response, &resource)?.ok_or_else(|| SourceError::NotFound {
            resource: resource.clone(),
        })?;
        let tree: WireTree = response.json().await?;
        if tree.truncated {
            warn!(repo = %repo, branch = %branch, "tree listing truncated by host");
        }
        Ok(blob_paths(tree))
    }

    async fn read_file(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        path: &str,
    ) -> SourceResult<String> {
        let resource = format!("repos/{}/contents/{}", repo, path);
        let request = self
            .http
            .get(self.url(&resource))
            .header(ACCEPT, "application/vnd.github.raw")
            .query(&[("ref", branch)]);
        let response = send(request, &resource, self.config.timeout).await?;
        let response = check_status(response, &resource)?.ok_or_else(|| SourceError::NotFound {
            resource: format!("{}?ref={}", resource, branch),
        })?;
        Ok(response.text().await?)
    }
}
