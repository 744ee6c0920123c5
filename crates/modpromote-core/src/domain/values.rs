//! Caller-supplied variable values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::environment::EnvironmentTarget;

/// Values for one environment, keyed by variable name.
pub type ValueMap = BTreeMap<String, Value>;

/// Values supplied by the caller.
///
/// `common` applies to every environment; an environment's own map
/// overrides it key by key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserValues {
    #[serde(default)]
    pub common: ValueMap,
    #[serde(default, flatten)]
    pub environments: BTreeMap<EnvironmentTarget, ValueMap>,
}

impl UserValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value shared by all environments.
    pub fn with_common(mut self, name: &str, value: Value) -> Self {
        self.common.insert(name.to_string(), value);
        self
    }

    /// Set a value for one environment.
    pub fn with_value(mut self, env: EnvironmentTarget, name: &str, value: Value) -> Self {
        self.environments
            .entry(env)
            .or_default()
            .insert(name.to_string(), value);
        self
    }

    /// Effective values for `env` after applying overrides.
    pub fn resolved(&self, env: EnvironmentTarget) -> ValueMap {
        let mut merged = self.common.clone();
        if let Some(own) = self.environments.get(&env) {
            for (name, value) in own {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    /// Every variable name the caller mentioned anywhere.
    pub fn all_names(&self) -> std::collections::BTreeSet<&str> {
        self.common
            .keys()
            .chain(self.environments.values().flat_map(|m| m.keys()))
            .map(|k| k.as_str())
            .collect()
    }

    /// Parse the JSON value-map format: `{"common": {...}, "dev": {...}}`.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
