//! Configuration: a TOML file with per-section defaults plus environment
//! overrides. Credentials are read from the environment only.

use std::path::Path;
use std::time::Duration;

use modpromote_sources::{ModuleCoordinates, RepoCoordinates};
use serde::{Deserialize, Serialize};

use crate::domain::artifact::TargetLayout;
use crate::domain::error::ConfigError;
use crate::domain::module_ref::ModuleReference;

pub const ENV_REGISTRY_URL: &str = "MODPROMOTE_REGISTRY_URL";
pub const ENV_VCS_URL: &str = "MODPROMOTE_VCS_URL";
pub const ENV_TIMEOUT_SECS: &str = "MODPROMOTE_TIMEOUT_SECS";
pub const ENV_REGISTRY_TOKEN: &str = "TFC_TOKEN";
pub const ENV_VCS_TOKEN: &str = "GITHUB_TOKEN";

/// Private module registry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistrySettings {
    pub base_url: String,
    /// Registry namespace modules are published under
    pub organization: String,
    /// Host part of module source addresses
    pub source_host: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: "https://app.terraform.io".to_string(),
            organization: "Lennar".to_string(),
            source_host: "app.terraform.io".to_string(),
        }
    }
}

impl RegistrySettings {
    /// `<source_host>/<organization>/<name>/<provider code>`
    pub fn source_address(&self, module: &ModuleReference) -> String {
        format!(
            "{}/{}/{}/{}",
            self.source_host,
            module.organization,
            module.name,
            module.cloud.provider_code()
        )
    }

    pub fn coordinates(&self, module: &ModuleReference) -> ModuleCoordinates {
        ModuleCoordinates::new(
            &module.organization,
            &module.name,
            module.cloud.provider_code(),
        )
    }
}

/// Version-control host settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VcsSettings {
    pub api_url: String,
    /// Owner of the module source repositories
    pub organization: String,
    pub repo_prefix: String,
}

impl Default for VcsSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            organization: "modules-len".to_string(),
            repo_prefix: "terraform".to_string(),
        }
    }
}

impl VcsSettings {
    /// Conventional source repository: `<org>/<prefix>-<provider code>-<name>`.
    pub fn repository(&self, module: &ModuleReference) -> RepoCoordinates {
        RepoCoordinates::new(
            &self.organization,
            &format!(
                "{}-{}-{}",
                self.repo_prefix,
                module.cloud.provider_code(),
                module.name
            ),
        )
    }
}

/// Timeouts and retry policy for collaborator calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkSettings {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2,
        }
    }
}

impl NetworkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScaffoldSettings {
    /// `source` of the repository module in descriptors
    pub repo_module_source: String,
}

impl Default for ScaffoldSettings {
    fn default() -> Self {
        Self {
            repo_module_source: "../github-repo-lz".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromoteConfig {
    pub registry: RegistrySettings,
    pub vcs: VcsSettings,
    pub network: NetworkSettings,
    pub layout: TargetLayout,
    pub scaffold: ScaffoldSettings,
}

impl PromoteConfig {
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Load from `path` (defaults when `None`), then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text, &path.display().to_string())?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `MODPROMOTE_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_REGISTRY_URL) {
            self.registry.base_url = url;
        }
        if let Some(url) = lookup(ENV_VCS_URL) {
            self.vcs.api_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.network.timeout_secs =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        key: ENV_TIMEOUT_SECS.to_string(),
                        value: raw.clone(),
                    })?;
        }
        Ok(())
    }
}

/// API tokens, read from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    pub registry_token: Option<String>,
    pub vcs_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            registry_token: read(ENV_REGISTRY_TOKEN),
            vcs_token: read(ENV_VCS_TOKEN),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("registry_token", &self.registry_token.as_ref().map(|_| "***"))
            .field("vcs_token", &self.vcs_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::module_ref::Cloud;

    #[test]
    fn test_defaults_when_file_empty() {
        let config = PromoteConfig::from_toml_str("", "inline").unwrap();
        assert_eq!(config, PromoteConfig::default());
        assert_eq!(config.network.timeout(), Duration::from_secs(30));
        assert_eq!(config.layout.terraform_dir.to_str(), Some("terraform"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = PromoteConfig::from_toml_str(
            "[network]\nmax_attempts = 5\n\n[layout]\nterraform_dir = \"infra\"\n",
            "inline",
        )
        .unwrap();
        assert_eq!(config.network.max_attempts, 5);
        assert_eq!(config.network.initial_backoff_ms, 500);
        assert_eq!(config.layout.terraform_dir.to_str(), Some("infra"));
        assert_eq!(config.layout.environment_dir.to_str(), Some("environment"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = PromoteConfig::from_toml_str("[network\n", "bad.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PromoteConfig::default();
        config
            .apply_overrides(|key| match key {
                ENV_REGISTRY_URL => Some("http://localhost:8080".to_string()),
                ENV_TIMEOUT_SECS => Some("5".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.registry.base_url, "http://localhost:8080");
        assert_eq!(config.vcs.api_url, "https://api.github.com");
        assert_eq!(config.network.timeout_secs, 5);

        let err = config
            .apply_overrides(|key| (key == ENV_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn test_naming_conventions() {
        let config = PromoteConfig::default();
        let module = ModuleReference::new("storage", Cloud::Azure, "Lennar");
        assert_eq!(
            config.registry.source_address(&module),
            "app.terraform.io/Lennar/storage/azu"
        );
        assert_eq!(
            config.vcs.repository(&module).to_string(),
            "modules-len/terraform-azu-storage"
        );
        assert_eq!(config.registry.coordinates(&module).to_string(), "Lennar/storage/azu");
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials {
            registry_token: Some("secret".to_string()),
            vcs_token: None,
        };
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("***"));
    }
}
