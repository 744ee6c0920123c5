//! Repository scaffold input and the descriptor built from it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::artifact::{RenderedFile, TargetLayout};
use crate::domain::environment::EnvironmentTarget;
use crate::domain::module_ref::Cloud;
use crate::hcl::files::{parse_descriptor, render_descriptor};
use crate::hcl::HclError;

/// Cloud placement of one environment.
///
/// Exactly one identifier must be set: `account_id` for aws,
/// `subscription_id` for azure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentCloudConfig {
    pub cloud: Cloud,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

impl EnvironmentCloudConfig {
    pub fn aws(account_id: &str) -> Self {
        Self {
            cloud: Cloud::Aws,
            account_id: Some(account_id.to_string()),
            subscription_id: None,
        }
    }

    pub fn azure(subscription_id: &str) -> Self {
        Self {
            cloud: Cloud::Azure,
            account_id: None,
            subscription_id: Some(subscription_id.to_string()),
        }
    }
}

/// Input for a new service repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RepoScaffoldSpec {
    #[serde(default)]
    pub app_acronym: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub github_org: String,
    #[serde(default)]
    pub template_org: String,
    #[serde(default)]
    pub template_repo: String,
    #[serde(default)]
    pub repo_name_suffix: String,
    /// Vault path to the key names stored under it
    #[serde(default)]
    pub vault_secret_paths: BTreeMap<String, BTreeSet<String>>,
    /// Set when the caller confirms the service needs no secrets
    #[serde(default)]
    pub no_secrets_confirmed: bool,
    #[serde(default)]
    pub environment_cloud_config: BTreeMap<EnvironmentTarget, EnvironmentCloudConfig>,
}

impl RepoScaffoldSpec {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Scalar fields in descriptor order, paired with their names.
    pub fn scalar_fields(&self) -> [(&'static str, &str); 6] {
        [
            ("app_acronym", &self.app_acronym),
            ("app_name", &self.app_name),
            ("github_org", &self.github_org),
            ("template_org", &self.template_org),
            ("template_repo", &self.template_repo),
            ("repo_name_suffix", &self.repo_name_suffix),
        ]
    }
}

/// A validated repository descriptor, keyed by service name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoDescriptor {
    pub service_name: String,
    /// `source` of the repository module block
    pub module_source: String,
    pub spec: RepoScaffoldSpec,
}

impl RepoDescriptor {
    /// `repositories/<service>.tf`
    pub fn render(&self, layout: &TargetLayout) -> RenderedFile {
        RenderedFile::new(
            layout.descriptor_path(&self.service_name),
            render_descriptor(self),
        )
    }

    pub fn parse(file: &RenderedFile) -> Result<Self, HclError> {
        parse_descriptor(&file.content, &file.path.display().to_string())
    }
}
