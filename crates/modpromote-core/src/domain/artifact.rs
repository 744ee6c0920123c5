//! Synthesized artifacts and the on-disk layout they are written to.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::environment::EnvironmentTarget;
use crate::domain::schema::{OutputSpec, VariableSpec};

/// Where generated files go inside the consumer repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetLayout {
    /// Directory holding `main.tf`, `variables.tf` and `outputs.tf`
    pub terraform_dir: PathBuf,
    /// Parent of the per-environment directories
    pub environment_dir: PathBuf,
    /// Directory holding repository descriptors
    pub repositories_dir: PathBuf,
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self {
            terraform_dir: PathBuf::from("terraform"),
            environment_dir: PathBuf::from("environment"),
            repositories_dir: PathBuf::from("repositories"),
        }
    }
}

impl TargetLayout {
    pub fn module_call_path(&self) -> PathBuf {
        self.terraform_dir.join("main.tf")
    }

    pub fn variables_path(&self) -> PathBuf {
        self.terraform_dir.join("variables.tf")
    }

    pub fn outputs_path(&self) -> PathBuf {
        self.terraform_dir.join("outputs.tf")
    }

    /// `environment/<env>/<env>.auto.tfvars`
    pub fn values_path(&self, env: EnvironmentTarget) -> PathBuf {
        self.environment_dir
            .join(env.name())
            .join(format!("{}.auto.tfvars", env.name()))
    }

    /// `repositories/<service>.tf`
    pub fn descriptor_path(&self, service_name: &str) -> PathBuf {
        self.repositories_dir.join(format!("{}.tf", service_name))
    }
}

/// A generated file: path relative to the repository root plus content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub content: String,
}

impl RenderedFile {
    pub fn new(path: PathBuf, content: String) -> Self {
        Self { path, content }
    }
}

/// SHA-256 over an ordered set of rendered files (paths and contents).
pub fn files_digest(files: &[RenderedFile]) -> String {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(file.content.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// One argument of the module-call block, e.g. `timeout = var.timeout`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleArgument {
    pub name: String,
    /// Expression text
    pub expr: String,
}

impl ModuleArgument {
    /// `name = var.name`
    pub fn passthrough(name: &str) -> Self {
        Self {
            name: name.to_string(),
            expr: format!("var.{}", name),
        }
    }
}

/// The single `module "<name>" { ... }` block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleCall {
    /// Block label
    pub name: String,
    pub source: String,
    /// Pinned version
    pub version: String,
    pub arguments: Vec<ModuleArgument>,
}

/// Everything the synthesizer produces for one module.
///
/// Owned by the synthesizer, consumed read-only by the verifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInfraArtifact {
    pub layout: TargetLayout,
    pub module_call: ModuleCall,
    /// Variable declarations, in schema order
    pub variable_declarations: Vec<VariableSpec>,
    /// Output pass-throughs, in schema order
    pub output_declarations: Vec<OutputSpec>,
    /// Per-environment assignments, each in schema order
    pub environment_values: BTreeMap<EnvironmentTarget, Vec<(String, Value)>>,
}

impl ServiceInfraArtifact {
    /// Render to files, in a fixed order: module call, variables, outputs,
    /// then one value file per environment.
    pub fn render(&self) -> Vec<RenderedFile> {
        crate::hcl::files::render_infra(self)
    }

    /// Rebuild an artifact from its rendered files.
    pub fn parse(
        layout: &TargetLayout,
        files: &[RenderedFile],
    ) -> Result<Self, crate::hcl::HclError> {
        crate::hcl::files::parse_infra(layout, files)
    }

    /// Digest of the rendered files; equal inputs give equal digests.
    pub fn digest(&self) -> String {
        files_digest(&self.render())
    }

    /// Variable names assigned in one environment.
    pub fn assigned_names(&self, env: EnvironmentTarget) -> Vec<&str> {
        self.environment_values
            .get(&env)
            .map(|values| values.iter().map(|(n, _)| n.as_str()).collect())
            .unwrap_or_default()
    }
}
