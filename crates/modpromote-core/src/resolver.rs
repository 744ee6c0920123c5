//! Module Resolver: confirms a module exists in the private registry.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use modpromote_sources::{ModuleCoordinates, ModuleRegistry, RepoCoordinates};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{RegistrySettings, VcsSettings};
use crate::domain::error::ResolveError;
use crate::domain::module_ref::{Cloud, ModuleReference};
use crate::net::bounded;

static MODULE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("module name pattern"));

/// A module the registry knows about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedModule {
    pub reference: ModuleReference,
    pub coordinates: ModuleCoordinates,
    /// Registry's current version
    pub current_version: String,
    /// Source repository on the VCS host
    pub repository: RepoCoordinates,
    pub source_address: String,
}

/// Outcome of a lookup. `NotFound` is terminal: no other provider is tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResolvedModule),
    NotFound,
}

/// Build a reference from raw caller input.
pub fn parse_reference(
    name: &str,
    cloud: &str,
    organization: &str,
) -> Result<ModuleReference, ResolveError> {
    let cloud: Cloud = cloud.parse()?;
    let reference = ModuleReference::new(name, cloud, organization);
    validate_reference(&reference)?;
    Ok(reference)
}

pub fn validate_reference(reference: &ModuleReference) -> Result<(), ResolveError> {
    if reference.name.is_empty() {
        return Err(ResolveError::InvalidReference(
            "module name must not be empty".to_string(),
        ));
    }
    if !MODULE_NAME.is_match(&reference.name) {
        return Err(ResolveError::InvalidReference(format!(
            "module name '{}' may only contain letters, digits, '-' and '_'",
            reference.name
        )));
    }
    if reference.organization.is_empty() {
        return Err(ResolveError::InvalidReference(
            "registry organization must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub struct ModuleResolver {
    registry: Arc<dyn ModuleRegistry>,
    registry_settings: RegistrySettings,
    vcs_settings: VcsSettings,
    timeout: Duration,
}

impl ModuleResolver {
    pub fn new(
        registry: Arc<dyn ModuleRegistry>,
        registry_settings: RegistrySettings,
        vcs_settings: VcsSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            registry_settings,
            vcs_settings,
            timeout,
        }
    }

    /// Look the module up by name and cloud.
    ///
    /// The repository comes from the registry's VCS link when it has one,
    /// and from the naming convention otherwise.
    pub async fn resolve(&self, reference: &ModuleReference) -> Result<Resolution, ResolveError> {
        validate_reference(reference)?;
        let coordinates = self.registry_settings.coordinates(reference);

        let found = bounded(
            self.timeout,
            format!("registry module {}", coordinates),
            self.registry.find_module(&coordinates),
        )
        .await?;

        let Some(module) = found else {
            info!(module = %coordinates, "module not found in registry");
            return Ok(Resolution::NotFound);
        };

        let expected = reference.cloud.provider_code();
        if !module.coordinates.provider.eq_ignore_ascii_case(expected) {
            return Err(ResolveError::CloudMismatch {
                module: coordinates.to_string(),
                expected: expected.to_string(),
                found: module.coordinates.provider,
            });
        }

        let repository = module
            .vcs_repo
            .as_deref()
            .and_then(RepoCoordinates::parse)
            .unwrap_or_else(|| {
                debug!(module = %coordinates, "registry has no VCS link, using naming convention");
                self.vcs_settings.repository(reference)
            });

        Ok(Resolution::Found(ResolvedModule {
            reference: reference.clone(),
            source_address: self.registry_settings.source_address(reference),
            current_version: module.current_version,
            coordinates,
            repository,
        }))
    }
}
