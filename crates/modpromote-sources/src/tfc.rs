//! Terraform Cloud private registry backend
//!
//! Module lookup uses the v2 organization API
//! (`/api/v2/organizations/{org}/registry-modules/private/...`); version
//! inputs use the registry protocol endpoint
//! (`/api/registry/v1/modules/{ns}/{name}/{provider}/{version}`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::http::{build_client, check_status, normalize_base, send};
use crate::traits::*;

/// Terraform Cloud registry configuration.
#[derive(Debug, Clone)]
pub struct TfcConfig {
    /// API host, e.g. `https://app.terraform.io`
    pub base_url: String,
    /// Organization that owns the private registry
    pub organization: String,
    /// API token (read from `TFC_TOKEN` by callers)
    pub token: Option<String>,
    pub timeout: Duration,
}

/// HTTP client for the Terraform Cloud private registry.
pub struct TfcRegistry {
    config: TfcConfig,
    http: Client,
}

impl TfcRegistry {
    pub fn new(config: TfcConfig) -> SourceResult<Self> {
        let http = build_client(
            config.token.as_deref(),
            "Bearer",
            "application/vnd.api+json",
            config.timeout,
        )?;
        Ok(Self { config, http })
    }

    fn base(&self) -> String {
        normalize_base(&self.config.base_url)
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ModuleEnvelope {
    data: ModuleData,
}

#[derive(Debug, Deserialize)]
struct ModuleData {
    attributes: ModuleAttributes,
}

#[derive(Debug, Deserialize)]
struct ModuleAttributes {
    #[serde(default, rename = "version-statuses")]
    version_statuses: Vec<VersionStatus>,
    #[serde(default, rename = "vcs-repo")]
    vcs_repo: Option<VcsRepo>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    provider: Option<String>,
}

impl ModuleAttributes {
    /// Coordinates as the registry reports them; absent fields fall back to
    /// the ones looked up.
    fn coordinates(&self, requested: &ModuleCoordinates) -> ModuleCoordinates {
        let pick = |reported: &Option<String>, fallback: &str| {
            reported.clone().unwrap_or_else(|| fallback.to_string())
        };
        ModuleCoordinates {
            namespace: pick(&self.namespace, &requested.namespace),
            name: pick(&self.name, &requested.name),
            provider: pick(&self.provider, &requested.provider),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VersionStatus {
    version: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VcsRepo {
    #[serde(default)]
    identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionDetail {
    #[serde(default)]
    root: Option<VersionRoot>,
}

#[derive(Debug, Deserialize)]
struct VersionRoot {
    #[serde(default)]
    inputs: Option<Vec<WireInput>>,
}

#[derive(Debug, Deserialize)]
struct WireInput {
    name: String,
    #[serde(default, rename = "type")]
    type_expr: Option<String>,
    #[serde(default)]
    description: Option<String>,
    /// The registry encodes defaults as HCL/JSON text.
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    required: Option<bool>,
}

impl WireInput {
    fn into_input(self) -> RegistryInput {
        let default = self
            .default
            .filter(|d| !d.is_empty())
            .map(|d| serde_json::from_str(&d).unwrap_or(serde_json::Value::String(d)));
        let required = self.required.unwrap_or(default.is_none());
        RegistryInput {
            name: self.name,
            type_expr: self.type_expr.filter(|t| !t.is_empty()),
            description: self.description.filter(|d| !d.is_empty()),
            default,
            required,
        }
    }
}

/// Pick the current version: the first entry the registry marks `ok`,
/// else the first entry at all. The registry lists newest first.
fn current_version(statuses: &[VersionStatus]) -> Option<String> {
    statuses
        .iter()
        .find(|s| s.status.as_deref() == Some("ok"))
        .or_else(|| statuses.first())
        .map(|s| s.version.clone())
}

#[async_trait]
impl ModuleRegistry for TfcRegistry {
    async fn find_module(
        &self,
        coords: &ModuleCoordinates,
    ) -> SourceResult<Option<RegistryModule>> {
        let resource = format!(
            "organizations/{}/registry-modules/private/{}",
            self.config.organization, coords
        );
        let url = format!("{}/api/v2/{}", self.base(), resource);

        let response = send(self.http.get(&url), &resource, self.config.timeout).await?;
        let Some(response) = check_status(response, &resource)? else {
            debug!(module = %coords, "module not in registry");
            return Ok(None);
        };
        let envelope: ModuleEnvelope = response.json().await?;
        let attributes = envelope.data.attributes;

        let current_version = current_version(&attributes.version_statuses).ok_or_else(|| {
            SourceError::Decode(format!("module {} has no published versions", coords))
        })?;

        Ok(Some(RegistryModule {
            coordinates: attributes.coordinates(coords),
            current_version,
            vcs_repo: attributes.vcs_repo.and_then(|v| v.identifier),
            status: attributes.status,
        }))
    }

    async fn version_inputs(
        &self,
        coords: &ModuleCoordinates,
        version: &str,
    ) -> SourceResult<Option<Vec<RegistryInput>>> {
        let resource = format!("registry/v1/modules/{}/{}", coords, version);
        let url = format!("{}/api/{}", self.base(), resource);

        let response = send(self.http.get(&url), &resource, self.config.timeout).await?;
        let Some(response) = check_status(response, &resource)? else {
            warn!(module = %coords, version = %version, "registry has no version detail");
            return Ok(None);
        };
        let detail: VersionDetail = response.json().await?;

        Ok(detail
            .root
            .and_then(|root| root.inputs)
            .map(|inputs| inputs.into_iter().map(WireInput::into_input).collect()))
    }
}
