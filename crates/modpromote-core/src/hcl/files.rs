//! Generated file formats: module call, variable and output declarations,
//! per-environment value files and repository descriptors.
//!
//! Every `render_*` has a matching `parse_*`; the verifier relies on the
//! pair being lossless.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::Value;

use crate::domain::artifact::{ModuleArgument, ModuleCall, RenderedFile, ServiceInfraArtifact, TargetLayout};
use crate::domain::environment::EnvironmentTarget;
use crate::domain::scaffold::{EnvironmentCloudConfig, RepoDescriptor, RepoScaffoldSpec};
use crate::domain::schema::{OutputSpec, VariableSpec, VariableType};
use crate::hcl::body::{parse_body, Block, Body};
use crate::hcl::error::HclError;
use crate::hcl::value::{
    parse_bool, parse_string, parse_value, quote, render_assignments, render_value,
};

/// Block label of the repository module in a descriptor file.
pub const DESCRIPTOR_BLOCK: &str = "github_repository";

/// Provider aliases passed to the repository module.
const DESCRIPTOR_PROVIDERS: [&str; 2] = ["vault.vault_prod", "vault.vault_nonprod"];

// ---------------------------------------------------------------------------
// Declarations (variables and outputs in any .tf file)
// ---------------------------------------------------------------------------

/// Variable and output declarations found in one file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declarations {
    pub variables: Vec<VariableSpec>,
    pub outputs: Vec<OutputSpec>,
}

/// Read `variable` and `output` blocks; every other block is ignored.
pub fn parse_declarations(src: &str) -> Result<Declarations, HclError> {
    let body = parse_body(src)?;
    let mut declarations = Declarations::default();
    for block in &body.blocks {
        match block.kind.as_str() {
            "variable" => declarations.variables.push(variable_from_block(block)?),
            "output" => declarations.outputs.push(output_from_block(block)?),
            _ => {}
        }
    }
    Ok(declarations)
}

fn variable_from_block(block: &Block) -> Result<VariableSpec, HclError> {
    let name = block_name(block)?;
    let body = &block.body;
    let qualified = format!("var.{}", name);

    let type_expr = body.attribute("type").map(|a| {
        // pre-0.12 modules quote the type keyword
        match parse_value(&a.expr) {
            Ok(Value::String(s)) => s,
            _ => a.expr.clone(),
        }
    });
    let var_type = type_expr
        .as_deref()
        .and_then(VariableType::from_expr)
        .unwrap_or(VariableType::Any);

    let default = match body.attribute("default") {
        Some(attr) => Some(parse_value(&attr.expr).map_err(|err| HclError::InvalidValue {
            name: format!("{}.default", qualified),
            message: err.to_string(),
        })?),
        None => None,
    };

    Ok(VariableSpec {
        required: default.is_none(),
        default,
        var_type,
        type_expr,
        description: optional_string(body, "description", &qualified)?,
        sensitive: optional_bool(body, "sensitive", &qualified)?,
        name,
    })
}

fn output_from_block(block: &Block) -> Result<OutputSpec, HclError> {
    let name = block_name(block)?;
    let qualified = format!("output.{}", name);
    Ok(OutputSpec {
        value_type: VariableType::Any,
        description: optional_string(&block.body, "description", &qualified)?,
        sensitive: optional_bool(&block.body, "sensitive", &qualified)?,
        name,
    })
}

fn block_name(block: &Block) -> Result<String, HclError> {
    match block.labels.as_slice() {
        [name] if !name.is_empty() => Ok(name.clone()),
        _ => Err(HclError::Syntax {
            line: block.line,
            message: format!("{} block needs exactly one label", block.kind),
        }),
    }
}

fn optional_string(body: &Body, attr: &str, owner: &str) -> Result<Option<String>, HclError> {
    body.attribute(attr)
        .map(|a| parse_string(&format!("{}.{}", owner, attr), &a.expr))
        .transpose()
}

fn optional_bool(body: &Body, attr: &str, owner: &str) -> Result<bool, HclError> {
    Ok(body
        .attribute(attr)
        .map(|a| parse_bool(&format!("{}.{}", owner, attr), &a.expr))
        .transpose()?
        .unwrap_or(false))
}

fn required_attr<'a>(body: &'a Body, block: &str, name: &str) -> Result<&'a str, HclError> {
    body.attribute(name)
        .map(|a| a.expr.as_str())
        .ok_or_else(|| HclError::MissingAttribute {
            block: block.to_string(),
            name: name.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Service infrastructure files
// ---------------------------------------------------------------------------

/// `module "<name>" { source, version, <arguments> }`
pub fn render_module_call(call: &ModuleCall) -> String {
    let mut out = format!("module {} {{\n", quote(&call.name));
    out.push_str(&render_assignments(
        &[
            ("source".to_string(), quote(&call.source)),
            ("version".to_string(), quote(&call.version)),
        ],
        1,
    ));
    if !call.arguments.is_empty() {
        out.push('\n');
        let args: Vec<(String, String)> = call
            .arguments
            .iter()
            .map(|a| (a.name.clone(), a.expr.clone()))
            .collect();
        out.push_str(&render_assignments(&args, 1));
    }
    out.push_str("}\n");
    out
}

pub fn parse_module_call(src: &str, file: &str) -> Result<ModuleCall, HclError> {
    let body = parse_body(src)?;
    if let Some(attr) = body.attributes.first() {
        return Err(HclError::Unexpected {
            what: format!("top-level attribute '{}'", attr.name),
            file: file.to_string(),
        });
    }
    let block = match body.blocks.as_slice() {
        [block] if block.kind == "module" => block,
        [] => {
            return Err(HclError::MissingBlock {
                kind: "module".to_string(),
                file: file.to_string(),
            })
        }
        [_, extra, ..] => {
            return Err(HclError::Unexpected {
                what: format!("second block '{}'", extra.kind),
                file: file.to_string(),
            })
        }
        [other] => {
            return Err(HclError::Unexpected {
                what: format!("block '{}'", other.kind),
                file: file.to_string(),
            })
        }
    };
    let name = block_name(block)?;
    let qualified = format!("module.{}", name);
    let source = parse_string(
        &format!("{}.source", qualified),
        required_attr(&block.body, &qualified, "source")?,
    )?;
    let version = parse_string(
        &format!("{}.version", qualified),
        required_attr(&block.body, &qualified, "version")?,
    )?;
    let arguments = block
        .body
        .attributes
        .iter()
        .filter(|a| a.name != "source" && a.name != "version")
        .map(|a| ModuleArgument {
            name: a.name.clone(),
            expr: a.expr.clone(),
        })
        .collect();
    Ok(ModuleCall {
        name,
        source,
        version,
        arguments,
    })
}

/// One `variable` block per spec, blank-line separated.
pub fn render_variables(variables: &[VariableSpec]) -> String {
    let blocks: Vec<String> = variables
        .iter()
        .map(|v| {
            let mut attrs = Vec::new();
            if let Some(description) = &v.description {
                attrs.push(("description".to_string(), quote(description)));
            }
            if let Some(type_expr) = &v.type_expr {
                attrs.push(("type".to_string(), type_expr.clone()));
            }
            if let Some(default) = &v.default {
                attrs.push(("default".to_string(), render_value(default, 1)));
            }
            if v.sensitive {
                attrs.push(("sensitive".to_string(), "true".to_string()));
            }
            render_block("variable", &v.name, &attrs)
        })
        .collect();
    blocks.join("\n")
}

pub fn parse_variables(src: &str, file: &str) -> Result<Vec<VariableSpec>, HclError> {
    let body = parse_body(src)?;
    reject_other_blocks(&body, "variable", file)?;
    body.blocks.iter().map(variable_from_block).collect()
}

/// One `output` block per spec, each re-exporting `module.<module>.<name>`.
pub fn render_outputs(module_name: &str, outputs: &[OutputSpec]) -> String {
    let blocks: Vec<String> = outputs
        .iter()
        .map(|o| {
            let mut attrs = Vec::new();
            if let Some(description) = &o.description {
                attrs.push(("description".to_string(), quote(description)));
            }
            attrs.push((
                "value".to_string(),
                format!("module.{}.{}", module_name, o.name),
            ));
            if o.sensitive {
                attrs.push(("sensitive".to_string(), "true".to_string()));
            }
            render_block("output", &o.name, &attrs)
        })
        .collect();
    blocks.join("\n")
}

pub fn parse_outputs(src: &str, module_name: &str, file: &str) -> Result<Vec<OutputSpec>, HclError> {
    let body = parse_body(src)?;
    reject_other_blocks(&body, "output", file)?;
    body.blocks
        .iter()
        .map(|block| {
            let output = output_from_block(block)?;
            let expected = format!("module.{}.{}", module_name, output.name);
            let value = required_attr(&block.body, &format!("output.{}", output.name), "value")?;
            if value != expected {
                return Err(HclError::InvalidValue {
                    name: format!("output.{}.value", output.name),
                    message: format!("expected {}, found {}", expected, value),
                });
            }
            Ok(output)
        })
        .collect()
}

/// `name = value` lines, aligned, in the given order.
pub fn render_values(values: &[(String, Value)]) -> String {
    let entries: Vec<(String, String)> = values
        .iter()
        .map(|(name, value)| (name.clone(), render_value(value, 0)))
        .collect();
    render_assignments(&entries, 0)
}

pub fn parse_values(src: &str, file: &str) -> Result<Vec<(String, Value)>, HclError> {
    let body = parse_body(src)?;
    if let Some(block) = body.blocks.first() {
        return Err(HclError::Unexpected {
            what: format!("block '{}'", block.kind),
            file: file.to_string(),
        });
    }
    body.attributes
        .iter()
        .map(|a| {
            let value = parse_value(&a.expr).map_err(|err| HclError::InvalidValue {
                name: a.name.clone(),
                message: err.to_string(),
            })?;
            Ok((a.name.clone(), value))
        })
        .collect()
}

/// Files of an artifact, in a fixed order.
pub fn render_infra(artifact: &ServiceInfraArtifact) -> Vec<RenderedFile> {
    let layout = &artifact.layout;
    let mut files = vec![
        RenderedFile::new(
            layout.module_call_path(),
            render_module_call(&artifact.module_call),
        ),
        RenderedFile::new(
            layout.variables_path(),
            render_variables(&artifact.variable_declarations),
        ),
        RenderedFile::new(
            layout.outputs_path(),
            render_outputs(&artifact.module_call.name, &artifact.output_declarations),
        ),
    ];
    for (env, values) in &artifact.environment_values {
        files.push(RenderedFile::new(layout.values_path(*env), render_values(values)));
    }
    files
}

/// Rebuild an artifact from files laid out per `layout`. Value files are
/// optional; an environment without one is absent from the result.
pub fn parse_infra(
    layout: &TargetLayout,
    files: &[RenderedFile],
) -> Result<ServiceInfraArtifact, HclError> {
    let main = require_file(files, &layout.module_call_path())?;
    let module_call = parse_module_call(&main.content, &main.path.display().to_string())?;

    let variables = require_file(files, &layout.variables_path())?;
    let variable_declarations =
        parse_variables(&variables.content, &variables.path.display().to_string())?;

    let outputs = require_file(files, &layout.outputs_path())?;
    let output_declarations = parse_outputs(
        &outputs.content,
        &module_call.name,
        &outputs.path.display().to_string(),
    )?;

    let mut environment_values = BTreeMap::new();
    for env in EnvironmentTarget::ALL {
        if let Some(file) = find_file(files, &layout.values_path(env)) {
            let values = parse_values(&file.content, &file.path.display().to_string())?;
            environment_values.insert(env, values);
        }
    }

    Ok(ServiceInfraArtifact {
        layout: layout.clone(),
        module_call,
        variable_declarations,
        output_declarations,
        environment_values,
    })
}

// ---------------------------------------------------------------------------
// Repository descriptor
// ---------------------------------------------------------------------------

pub fn render_descriptor(descriptor: &RepoDescriptor) -> String {
    let spec = &descriptor.spec;
    let providers_expr = {
        let entries: Vec<(String, String)> = DESCRIPTOR_PROVIDERS
            .iter()
            .map(|p| (p.to_string(), p.to_string()))
            .collect();
        format!("{{\n{}  }}", render_assignments(&entries, 2))
    };

    let secrets: serde_json::Map<String, Value> = spec
        .vault_secret_paths
        .iter()
        .map(|(path, keys)| {
            (
                path.clone(),
                Value::Array(keys.iter().cloned().map(Value::String).collect()),
            )
        })
        .collect();

    let environments: serde_json::Map<String, Value> = spec
        .environment_cloud_config
        .iter()
        .map(|(env, config)| {
            let mut entry = serde_json::Map::new();
            entry.insert("cloud".to_string(), Value::String(config.cloud.name().to_string()));
            if let Some(id) = &config.account_id {
                entry.insert("account_id".to_string(), Value::String(id.clone()));
            }
            if let Some(id) = &config.subscription_id {
                entry.insert("subscription_id".to_string(), Value::String(id.clone()));
            }
            (env.name().to_string(), Value::Object(entry))
        })
        .collect();

    let mut out = format!("module {} {{\n", quote(&descriptor_label(&descriptor.service_name)));
    out.push_str(&render_assignments(
        &[("source".to_string(), quote(&descriptor.module_source))],
        1,
    ));
    out.push('\n');
    out.push_str(&render_assignments(
        &[("providers".to_string(), providers_expr)],
        1,
    ));
    out.push('\n');
    let mut fields = vec![("service_name".to_string(), quote(&descriptor.service_name))];
    fields.push(("app_acronym".to_string(), quote(&spec.app_acronym)));
    fields.push(("app_name".to_string(), quote(&spec.app_name)));
    fields.push(("gh_org".to_string(), quote(&spec.github_org)));
    fields.push(("template_org".to_string(), quote(&spec.template_org)));
    fields.push(("template_repo".to_string(), quote(&spec.template_repo)));
    fields.push(("repo_name_suffix".to_string(), quote(&spec.repo_name_suffix)));
    out.push_str(&render_assignments(&fields, 1));
    out.push('\n');
    out.push_str(&render_assignments(
        &[
            (
                "vault_secrets".to_string(),
                render_value(&Value::Object(secrets), 1),
            ),
            (
                "environment_config".to_string(),
                render_value(&Value::Object(environments), 1),
            ),
        ],
        1,
    ));
    out.push_str("}\n");
    out
}

/// Module block label for a service: `github_repository_<service>`.
///
/// `service_name` must already have passed `validate_service_name`, which
/// keeps labels unique per service.
pub fn descriptor_label(service_name: &str) -> String {
    format!("{}_{}", DESCRIPTOR_BLOCK, service_name)
}

pub fn parse_descriptor(src: &str, file: &str) -> Result<RepoDescriptor, HclError> {
    let body = parse_body(src)?;
    let block = match body.blocks.as_slice() {
        [block] if block.kind == "module" && body.attributes.is_empty() => block,
        _ => {
            return Err(HclError::MissingBlock {
                kind: "module".to_string(),
                file: file.to_string(),
            })
        }
    };
    let owner = format!("module.{}", block.label());
    let attr = |name: &str| required_attr(&block.body, &owner, name);
    let string = |name: &str| -> Result<String, HclError> {
        parse_string(&format!("{}.{}", owner, name), attr(name)?)
    };

    let providers = attr("providers")?;
    for alias in DESCRIPTOR_PROVIDERS {
        if !providers.contains(alias) {
            return Err(HclError::InvalidValue {
                name: format!("{}.providers", owner),
                message: format!("missing provider alias {}", alias),
            });
        }
    }

    let secrets_value = parse_value(attr("vault_secrets")?)?;
    let mut vault_secret_paths = BTreeMap::new();
    if let Value::Object(map) = secrets_value {
        for (path, keys) in map {
            let keys: BTreeSet<String> = serde_json::from_value(keys).map_err(|err| {
                HclError::InvalidValue {
                    name: format!("{}.vault_secrets[\"{}\"]", owner, path),
                    message: err.to_string(),
                }
            })?;
            vault_secret_paths.insert(path, keys);
        }
    } else {
        return Err(HclError::InvalidValue {
            name: format!("{}.vault_secrets", owner),
            message: "expected an object".to_string(),
        });
    }

    let environment_cloud_config: BTreeMap<EnvironmentTarget, EnvironmentCloudConfig> =
        serde_json::from_value(parse_value(attr("environment_config")?)?).map_err(|err| {
            HclError::InvalidValue {
                name: format!("{}.environment_config", owner),
                message: err.to_string(),
            }
        })?;

    Ok(RepoDescriptor {
        service_name: string("service_name")?,
        module_source: string("source")?,
        spec: RepoScaffoldSpec {
            app_acronym: string("app_acronym")?,
            app_name: string("app_name")?,
            github_org: string("gh_org")?,
            template_org: string("template_org")?,
            template_repo: string("template_repo")?,
            repo_name_suffix: string("repo_name_suffix")?,
            no_secrets_confirmed: vault_secret_paths.is_empty(),
            vault_secret_paths,
            environment_cloud_config,
        },
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn render_block(kind: &str, label: &str, attrs: &[(String, String)]) -> String {
    if attrs.is_empty() {
        return format!("{} {} {{\n}}\n", kind, quote(label));
    }
    format!(
        "{} {} {{\n{}}}\n",
        kind,
        quote(label),
        render_assignments(attrs, 1)
    )
}

fn find_file<'a>(files: &'a [RenderedFile], path: &Path) -> Option<&'a RenderedFile> {
    files.iter().find(|f| f.path.as_path() == path)
}

fn require_file<'a>(files: &'a [RenderedFile], path: &Path) -> Result<&'a RenderedFile, HclError> {
    find_file(files, path).ok_or_else(|| HclError::MissingFile {
        path: path.display().to_string(),
    })
}

fn reject_other_blocks(body: &Body, kind: &str, file: &str) -> Result<(), HclError> {
    if let Some(attr) = body.attributes.first() {
        return Err(HclError::Unexpected {
            what: format!("top-level attribute '{}'", attr.name),
            file: file.to_string(),
        });
    }
    if let Some(block) = body.blocks.iter().find(|b| b.kind != kind) {
        return Err(HclError::Unexpected {
            what: format!("block '{}'", block.kind),
            file: file.to_string(),
        });
    }
    Ok(())
}
