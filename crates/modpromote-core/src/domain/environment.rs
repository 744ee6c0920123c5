//! Deployment environments.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the four deployment environments. Each gets its own value file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentTarget {
    Dev,
    Qa,
    Uat,
    Prod,
}

impl EnvironmentTarget {
    pub const ALL: [EnvironmentTarget; 4] = [
        EnvironmentTarget::Dev,
        EnvironmentTarget::Qa,
        EnvironmentTarget::Uat,
        EnvironmentTarget::Prod,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EnvironmentTarget::Dev => "dev",
            EnvironmentTarget::Qa => "qa",
            EnvironmentTarget::Uat => "uat",
            EnvironmentTarget::Prod => "prod",
        }
    }
}

impl std::fmt::Display for EnvironmentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnvironmentTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(EnvironmentTarget::Dev),
            "qa" => Ok(EnvironmentTarget::Qa),
            "uat" => Ok(EnvironmentTarget::Uat),
            "prod" => Ok(EnvironmentTarget::Prod),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}
