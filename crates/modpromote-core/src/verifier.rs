//! Verifier: static checks of synthesized artifacts against the harvested
//! schema.
//!
//! Every rule runs independently and reports a [`Finding`]; the artifact
//! passes only when all findings pass. Checks run on the artifact as
//! re-parsed from its rendered files, so what is verified is exactly what
//! would be written.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::artifact::{RenderedFile, ServiceInfraArtifact};
use crate::domain::environment::EnvironmentTarget;
use crate::domain::scaffold::RepoDescriptor;
use crate::domain::schema::{value_kind, ModuleSchema};
use crate::obs;

/// A single verification rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerifyRule {
    /// Rendered files parse back into the same artifact
    RoundTrip,
    /// Declared variables equal the schema's variables (no extra, no missing)
    VariableSetEquality,
    /// Module-call arguments are exactly `<name> = var.<name>` for each
    /// schema variable
    ModuleArguments,
    /// Module-call source is the registry source address
    ModuleSource,
    /// Module-call version equals the harvested version
    VersionPin,
    /// Every assigned value is compatible with its variable's type
    ValueTypes,
    /// Every environment has a value for every variable lacking a default
    EnvironmentCompleteness,
    /// Output pass-throughs equal the schema's outputs
    OutputSetEquality,
    /// A repository descriptor parses back to what was scaffolded
    DescriptorRoundTrip,
}

impl VerifyRule {
    /// Rules applied to a service infrastructure artifact, in order.
    pub const INFRA: [VerifyRule; 8] = [
        VerifyRule::RoundTrip,
        VerifyRule::VariableSetEquality,
        VerifyRule::ModuleArguments,
        VerifyRule::ModuleSource,
        VerifyRule::VersionPin,
        VerifyRule::ValueTypes,
        VerifyRule::EnvironmentCompleteness,
        VerifyRule::OutputSetEquality,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VerifyRule::RoundTrip => "round_trip",
            VerifyRule::VariableSetEquality => "variable_set_equality",
            VerifyRule::ModuleArguments => "module_arguments",
            VerifyRule::ModuleSource => "module_source",
            VerifyRule::VersionPin => "version_pin",
            VerifyRule::ValueTypes => "value_types",
            VerifyRule::EnvironmentCompleteness => "environment_completeness",
            VerifyRule::OutputSetEquality => "output_set_equality",
            VerifyRule::DescriptorRoundTrip => "descriptor_round_trip",
        }
    }
}

impl std::fmt::Display for VerifyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one rule for one subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    pub rule: VerifyRule,
    pub passed: bool,
    /// What was checked, e.g. `variables` or `environment prod`
    pub subject: String,
    pub message: String,
}

impl Finding {
    fn pass(rule: VerifyRule, subject: impl Into<String>) -> Self {
        Self {
            rule,
            passed: true,
            subject: subject.into(),
            message: "ok".to_string(),
        }
    }

    fn fail(rule: VerifyRule, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule,
            passed: false,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = if self.passed { "pass" } else { "FAIL" };
        write!(f, "[{}] {} {}: {}", mark, self.rule, self.subject, self.message)
    }
}

/// All findings of one verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub findings: Vec<Finding>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.findings.iter().all(|f| f.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.passed)
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    fn merge(&mut self, other: Verdict) {
        self.findings.extend(other.findings);
    }
}

/// Verify a service infrastructure artifact against `schema`.
pub fn verify(artifact: &ServiceInfraArtifact, schema: &ModuleSchema) -> Verdict {
    let rendered = artifact.render();
    let mut findings = Vec::new();

    let parsed = match ServiceInfraArtifact::parse(&artifact.layout, &rendered) {
        Ok(parsed) if &parsed == artifact => {
            findings.push(Finding::pass(VerifyRule::RoundTrip, "rendered files"));
            parsed
        }
        Ok(parsed) => {
            findings.push(Finding::fail(
                VerifyRule::RoundTrip,
                "rendered files",
                "re-parsed files differ from the synthesized artifact",
            ));
            parsed
        }
        Err(err) => {
            findings.push(Finding::fail(
                VerifyRule::RoundTrip,
                "rendered files",
                format!("rendered files do not parse: {}", err),
            ));
            artifact.clone()
        }
    };

    findings.push(check_variable_set(&parsed, schema));
    findings.push(check_module_arguments(&parsed, schema));
    findings.push(check_module_source(&parsed, schema));
    findings.push(check_version_pin(&parsed, schema));
    findings.extend(check_value_types(&parsed, schema));
    findings.extend(check_environment_completeness(&parsed, schema));
    findings.push(check_output_set(&parsed, schema));

    let verdict = Verdict { findings };
    obs::emit_verify_completed(
        &schema.module.to_string(),
        verdict.findings.len(),
        verdict.failure_count(),
    );
    verdict
}

/// Verify a descriptor file against the descriptor it was rendered from.
pub fn verify_descriptor(file: &RenderedFile, expected: &RepoDescriptor) -> Verdict {
    let subject = file.path.display().to_string();
    let finding = match RepoDescriptor::parse(file) {
        Ok(parsed) if same_descriptor(&parsed, expected) => {
            Finding::pass(VerifyRule::DescriptorRoundTrip, subject.clone())
        }
        Ok(_) => Finding::fail(
            VerifyRule::DescriptorRoundTrip,
            subject.clone(),
            "descriptor content differs from the scaffold input",
        ),
        Err(err) => Finding::fail(
            VerifyRule::DescriptorRoundTrip,
            subject.clone(),
            format!("descriptor does not parse: {}", err),
        ),
    };
    let verdict = Verdict {
        findings: vec![finding],
    };
    obs::emit_verify_completed(&subject, 1, verdict.failure_count());
    verdict
}

/// Infrastructure artifact and optional descriptor together.
pub fn verify_all(
    artifact: Option<(&ServiceInfraArtifact, &ModuleSchema)>,
    descriptor: Option<(&RenderedFile, &RepoDescriptor)>,
) -> Verdict {
    let mut verdict = Verdict::default();
    if let Some((artifact, schema)) = artifact {
        verdict.merge(verify(artifact, schema));
    }
    if let Some((file, expected)) = descriptor {
        verdict.merge(verify_descriptor(file, expected));
    }
    verdict
}

fn same_descriptor(parsed: &RepoDescriptor, expected: &RepoDescriptor) -> bool {
    let (a, b) = (&parsed.spec, &expected.spec);
    parsed.service_name == expected.service_name
        && parsed.module_source == expected.module_source
        && a.scalar_fields() == b.scalar_fields()
        && a.vault_secret_paths == b.vault_secret_paths
        && a.environment_cloud_config == b.environment_cloud_config
}

fn describe_difference(extra: &BTreeSet<&str>, missing: &BTreeSet<&str>) -> String {
    let mut parts = Vec::new();
    if !extra.is_empty() {
        parts.push(format!(
            "not in module schema: {}",
            extra.iter().copied().collect::<Vec<_>>().join(", ")
        ));
    }
    if !missing.is_empty() {
        parts.push(format!(
            "missing: {}",
            missing.iter().copied().collect::<Vec<_>>().join(", ")
        ));
    }
    parts.join("; ")
}

fn check_variable_set(artifact: &ServiceInfraArtifact, schema: &ModuleSchema) -> Finding {
    let declared: Vec<&str> = artifact
        .variable_declarations
        .iter()
        .map(|v| v.name.as_str())
        .collect();
    let declared_set: BTreeSet<&str> = declared.iter().copied().collect();
    let expected = schema.variable_names();

    let extra: BTreeSet<&str> = declared_set.difference(&expected).copied().collect();
    let missing: BTreeSet<&str> = expected.difference(&declared_set).copied().collect();

    if declared.len() != schema.variables.len() || !extra.is_empty() || !missing.is_empty() {
        let mut message = format!(
            "{} variables declared, module schema has {}",
            declared.len(),
            schema.variables.len()
        );
        let detail = describe_difference(&extra, &missing);
        if !detail.is_empty() {
            message.push_str(": ");
            message.push_str(&detail);
        } else {
            message.push_str(": duplicate declarations");
        }
        return Finding::fail(VerifyRule::VariableSetEquality, "variables", message);
    }

    let changed: Vec<&str> = artifact
        .variable_declarations
        .iter()
        .filter(|v| schema.variable(&v.name) != Some(*v))
        .map(|v| v.name.as_str())
        .collect();
    if !changed.is_empty() {
        return Finding::fail(
            VerifyRule::VariableSetEquality,
            "variables",
            format!("declarations differ from module schema: {}", changed.join(", ")),
        );
    }
    Finding::pass(VerifyRule::VariableSetEquality, "variables")
}

fn check_module_arguments(artifact: &ServiceInfraArtifact, schema: &ModuleSchema) -> Finding {
    let subject = format!("module.{}", artifact.module_call.name);
    let args = &artifact.module_call.arguments;
    let names: BTreeSet<&str> = args.iter().map(|a| a.name.as_str()).collect();
    let expected = schema.variable_names();

    if args.len() != names.len() || names != expected {
        let extra: BTreeSet<&str> = names.difference(&expected).copied().collect();
        let missing: BTreeSet<&str> = expected.difference(&names).copied().collect();
        return Finding::fail(
            VerifyRule::ModuleArguments,
            subject,
            format!(
                "{} arguments, module schema has {} variables: {}",
                args.len(),
                expected.len(),
                describe_difference(&extra, &missing)
            ),
        );
    }

    let wrong: Vec<String> = args
        .iter()
        .filter(|a| a.expr != format!("var.{}", a.name))
        .map(|a| format!("{} = {}", a.name, a.expr))
        .collect();
    if !wrong.is_empty() {
        return Finding::fail(
            VerifyRule::ModuleArguments,
            subject,
            format!("arguments must pass the variable through: {}", wrong.join(", ")),
        );
    }
    Finding::pass(VerifyRule::ModuleArguments, subject)
}

fn check_module_source(artifact: &ServiceInfraArtifact, schema: &ModuleSchema) -> Finding {
    let subject = format!("module.{}", artifact.module_call.name);
    if artifact.module_call.source == schema.source_address {
        Finding::pass(VerifyRule::ModuleSource, subject)
    } else {
        Finding::fail(
            VerifyRule::ModuleSource,
            subject,
            format!(
                "source is {}, expected {}",
                artifact.module_call.source, schema.source_address
            ),
        )
    }
}

fn check_version_pin(artifact: &ServiceInfraArtifact, schema: &ModuleSchema) -> Finding {
    let subject = format!("module.{}", artifact.module_call.name);
    if artifact.module_call.version == schema.version {
        Finding::pass(VerifyRule::VersionPin, subject)
    } else {
        Finding::fail(
            VerifyRule::VersionPin,
            subject,
            format!(
                "pinned to {}, harvested version is {}",
                artifact.module_call.version, schema.version
            ),
        )
    }
}

fn check_value_types(artifact: &ServiceInfraArtifact, schema: &ModuleSchema) -> Vec<Finding> {
    artifact
        .environment_values
        .iter()
        .map(|(env, values)| {
            let subject = format!("environment {}", env);
            let problems: Vec<String> = values
                .iter()
                .filter_map(|(name, value)| match schema.variable(name) {
                    None => Some(format!("variable '{}' not found in module schema", name)),
                    Some(spec) if !spec.var_type.accepts(value) => Some(format!(
                        "variable '{}' expects {}, got {}",
                        name,
                        spec.var_type,
                        value_kind(value)
                    )),
                    Some(_) => None,
                })
                .collect();
            if problems.is_empty() {
                Finding::pass(VerifyRule::ValueTypes, subject)
            } else {
                Finding::fail(VerifyRule::ValueTypes, subject, problems.join("; "))
            }
        })
        .collect()
}

fn check_environment_completeness(
    artifact: &ServiceInfraArtifact,
    schema: &ModuleSchema,
) -> Vec<Finding> {
    EnvironmentTarget::ALL
        .iter()
        .map(|env| {
            let subject = format!("environment {}", env);
            let Some(values) = artifact.environment_values.get(env) else {
                return Finding::fail(
                    VerifyRule::EnvironmentCompleteness,
                    subject,
                    "no value file",
                );
            };
            let assigned: BTreeSet<&str> = values.iter().map(|(n, _)| n.as_str()).collect();
            let missing: Vec<&str> = schema
                .required_variables()
                .map(|v| v.name.as_str())
                .filter(|name| !assigned.contains(name))
                .collect();
            if missing.is_empty() {
                Finding::pass(VerifyRule::EnvironmentCompleteness, subject)
            } else {
                Finding::fail(
                    VerifyRule::EnvironmentCompleteness,
                    subject,
                    format!("no value for required variable(s): {}", missing.join(", ")),
                )
            }
        })
        .collect()
}

fn check_output_set(artifact: &ServiceInfraArtifact, schema: &ModuleSchema) -> Finding {
    let declared: BTreeSet<&str> = artifact
        .output_declarations
        .iter()
        .map(|o| o.name.as_str())
        .collect();
    let expected = schema.output_names();
    if declared == expected && artifact.output_declarations.len() == schema.outputs.len() {
        return Finding::pass(VerifyRule::OutputSetEquality, "outputs");
    }
    let extra: BTreeSet<&str> = declared.difference(&expected).copied().collect();
    let missing: BTreeSet<&str> = expected.difference(&declared).copied().collect();
    Finding::fail(
        VerifyRule::OutputSetEquality,
        "outputs",
        format!(
            "{} outputs, module schema has {}: {}",
            artifact.output_declarations.len(),
            schema.outputs.len(),
            describe_difference(&extra, &missing)
        ),
    )
}
