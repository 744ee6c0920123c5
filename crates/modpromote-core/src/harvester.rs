//! Schema Harvester: reads the authoritative variable/output schema of the
//! registry's current version from the branch its release was cut from.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::try_join_all;
use modpromote_sources::{ModuleRegistry, Reachability, VersionControl};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::error::HarvestError;
use crate::domain::module_ref::ModuleReference;
use crate::domain::schema::{
    ModuleSchema, OutputSpec, ReleaseProvenance, SourceBranch, VariableSpec,
};
use crate::hcl::parse_declarations;
use crate::net::bounded;
use crate::obs;
use crate::reconcile::{reconcile_variables, SourceDisagreement};
use crate::resolver::ResolvedModule;

/// Documentation is cut to this many characters.
pub const DOCUMENTATION_LIMIT: usize = 2000;

/// Directories that are not part of the root module.
const EXCLUDED_DIRS: [&str; 3] = ["examples", ".terraform", "modules"];

/// A harvested schema plus the source disagreements observed while
/// building it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Harvest {
    pub schema: ModuleSchema,
    pub disagreements: Vec<SourceDisagreement>,
}

/// Pick the authoritative branch from the tag's reachability.
///
/// - reachable from `main` → `main`
/// - reachable from `develop` only → `develop`
/// - reachable from neither → `AmbiguousBranch`
pub fn select_source_branch(
    tag: &str,
    main: Reachability,
    develop: Reachability,
) -> Result<SourceBranch, HarvestError> {
    match (main, develop) {
        (Reachability::Reachable, _) => Ok(SourceBranch::Main),
        (_, Reachability::Reachable) => Ok(SourceBranch::Develop),
        _ => Err(HarvestError::AmbiguousBranch {
            tag: tag.to_string(),
            main,
            develop,
        }),
    }
}

/// Release tag to version: `v0.9.23` → `0.9.23`.
pub fn tag_version(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

/// Whether a path belongs to the module's declaration files.
pub fn is_declaration_file(path: &str) -> bool {
    if !path.ends_with(".tf") {
        return false;
    }
    let mut dirs: Vec<&str> = path.split('/').collect();
    dirs.pop();
    !dirs.iter().any(|d| EXCLUDED_DIRS.contains(d))
}

fn is_root_readme(path: &str) -> bool {
    !path.contains('/') && path.eq_ignore_ascii_case("readme.md")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

pub struct SchemaHarvester {
    registry: Arc<dyn ModuleRegistry>,
    vcs: Arc<dyn VersionControl>,
    timeout: Duration,
}

impl SchemaHarvester {
    pub fn new(
        registry: Arc<dyn ModuleRegistry>,
        vcs: Arc<dyn VersionControl>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            vcs,
            timeout,
        }
    }

    /// Harvest the schema of `module` at the registry's current version.
    pub async fn harvest(&self, module: &ResolvedModule) -> Result<Harvest, HarvestError> {
        let repo = &module.repository;
        let subject = module.reference.to_string();

        let release = bounded(
            self.timeout,
            format!("latest release of {}", repo),
            self.vcs.latest_release(repo),
        )
        .await?
        .ok_or_else(|| HarvestError::NoReleaseFound {
            repo: repo.to_string(),
        })?;
        let tag = release.tag_name;

        if tag_version(&tag) != module.current_version {
            return Err(HarvestError::VersionMismatch {
                registry: module.current_version.clone(),
                release_tag: tag,
            });
        }

        let (main, develop) = futures::try_join!(
            bounded(
                self.timeout,
                format!("{} reachability from main", tag),
                self.vcs.tag_reachability(repo, &tag, SourceBranch::Main.name()),
            ),
            bounded(
                self.timeout,
                format!("{} reachability from develop", tag),
                self.vcs.tag_reachability(repo, &tag, SourceBranch::Develop.name()),
            ),
        )?;
        let branch = select_source_branch(&tag, main, develop)?;
        obs::emit_branch_selected(&subject, &tag, branch.name());

        let files = bounded(
            self.timeout,
            format!("file tree of {}@{}", repo, branch),
            self.vcs.list_files(repo, branch.name()),
        )
        .await?;
        let declaration_paths: Vec<&String> =
            files.iter().filter(|p| is_declaration_file(p)).collect();
        if declaration_paths.is_empty() {
            return Err(HarvestError::NoDeclarationFiles {
                repo: repo.to_string(),
                branch: branch.name().to_string(),
            });
        }
        let readme_path = files.iter().find(|p| is_root_readme(p));

        let contents = try_join_all(declaration_paths.iter().map(|path| {
            bounded(
                self.timeout,
                format!("{}@{}:{}", repo, branch, path),
                self.vcs.read_file(repo, branch.name(), path),
            )
        }))
        .await?;

        let documentation = match readme_path {
            Some(path) => {
                let text = bounded(
                    self.timeout,
                    format!("{}@{}:{}", repo, branch, path),
                    self.vcs.read_file(repo, branch.name(), path),
                )
                .await?;
                Some(truncate_chars(&text, DOCUMENTATION_LIMIT))
            }
            None => None,
        };

        let (declared, outputs) = collect_declarations(&declaration_paths, &contents)?;
        debug!(
            module = %subject,
            files = declaration_paths.len(),
            variables = declared.len(),
            outputs = outputs.len(),
            "parsed declaration files"
        );

        let registry_inputs = bounded(
            self.timeout,
            format!("registry inputs of {}@{}", module.coordinates, module.current_version),
            self.registry
                .version_inputs(&module.coordinates, &module.current_version),
        )
        .await;
        let registry_view = match &registry_inputs {
            Ok(Some(inputs)) => Ok(inputs.as_slice()),
            Ok(None) => Err(format!(
                "no input description for version {}",
                module.current_version
            )),
            Err(err) => {
                warn!(module = %subject, error = %err, "registry inputs unavailable");
                Err(err.to_string())
            }
        };
        let reconciled = reconcile_variables(declared, registry_view);
        for disagreement in &reconciled.disagreements {
            obs::emit_source_disagreement(&subject, disagreement);
        }

        Ok(Harvest {
            schema: ModuleSchema {
                module: module.reference.clone(),
                version: module.current_version.clone(),
                source_address: module.source_address.clone(),
                provenance: ReleaseProvenance {
                    tag,
                    source_branch: branch,
                },
                variables: reconciled.variables,
                outputs,
                documentation,
            },
            disagreements: reconciled.disagreements,
        })
    }
}

/// Concatenate declarations in path order, rejecting duplicate variables.
fn collect_declarations(
    paths: &[&String],
    contents: &[String],
) -> Result<(Vec<VariableSpec>, Vec<OutputSpec>), HarvestError> {
    let mut variables: Vec<VariableSpec> = Vec::new();
    let mut outputs: Vec<OutputSpec> = Vec::new();
    let mut seen_variables = BTreeSet::new();
    let mut seen_outputs = BTreeSet::new();

    for (path, text) in paths.iter().zip(contents) {
        let declarations =
            parse_declarations(text).map_err(|source| HarvestError::Declaration {
                path: path.to_string(),
                source,
            })?;
        for variable in declarations.variables {
            if !seen_variables.insert(variable.name.clone()) {
                return Err(HarvestError::DuplicateVariable {
                    name: variable.name,
                    path: path.to_string(),
                });
            }
            variables.push(variable);
        }
        for output in declarations.outputs {
            if seen_outputs.insert(output.name.clone()) {
                outputs.push(output);
            } else {
                warn!(output = %output.name, path = %path, "duplicate output declaration ignored");
            }
        }
    }
    Ok((variables, outputs))
}

/// Harvests keyed by module and version, shared by the stages of one run.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: Mutex<HashMap<(ModuleReference, String), Harvest>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, module: &ModuleReference, version: &str) -> Option<Harvest> {
        self.entries
            .lock()
            .ok()?
            .get(&(module.clone(), version.to_string()))
            .cloned()
    }

    pub fn insert(&self, harvest: Harvest) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                (harvest.schema.module.clone(), harvest.schema.version.clone()),
                harvest,
            );
        }
    }

    /// Cached harvest of `module`, harvesting on a miss.
    pub async fn get_or_harvest(
        &self,
        harvester: &SchemaHarvester,
        module: &ResolvedModule,
    ) -> Result<Harvest, HarvestError> {
        if let Some(hit) = self.get(&module.reference, &module.current_version) {
            debug!(module = %module.reference, "schema cache hit");
            return Ok(hit);
        }
        let harvest = harvester.harvest(module).await?;
        self.insert(harvest.clone());
        Ok(harvest)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
