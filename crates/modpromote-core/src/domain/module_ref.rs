//! Module identity: cloud provider and module reference.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ResolveError;

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    Aws,
    Azure,
}

impl Cloud {
    /// Provider code used by the registry and in module repository names.
    pub fn provider_code(&self) -> &'static str {
        match self {
            Cloud::Aws => "aws",
            Cloud::Azure => "azu",
        }
    }

    /// User-facing name.
    pub fn name(&self) -> &'static str {
        match self {
            Cloud::Aws => "aws",
            Cloud::Azure => "azure",
        }
    }
}

impl std::fmt::Display for Cloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Cloud {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Cloud::Aws),
            "azure" | "azu" => Ok(Cloud::Azure),
            "" => Err(ResolveError::InvalidReference(
                "cloud must not be empty".to_string(),
            )),
            other => Err(ResolveError::InvalidReference(format!(
                "unsupported cloud '{}' (expected aws or azure)",
                other
            ))),
        }
    }
}

/// Identity of a module in the private registry. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ModuleReference {
    /// Module name, e.g. `lambda`
    pub name: String,
    pub cloud: Cloud,
    /// Registry organization (namespace)
    pub organization: String,
}

impl ModuleReference {
    pub fn new(name: &str, cloud: Cloud, organization: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            cloud,
            organization: organization.trim().to_string(),
        }
    }
}

impl std::fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.organization,
            self.name,
            self.cloud.provider_code()
        )
    }
}
