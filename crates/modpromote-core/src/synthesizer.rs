//! Config Synthesizer: module call, declarations and per-environment
//! values for one harvested schema.

use std::collections::BTreeMap;

use crate::domain::artifact::{ModuleArgument, ModuleCall, ServiceInfraArtifact, TargetLayout};
use crate::domain::environment::EnvironmentTarget;
use crate::domain::error::{SchemaMismatch, SynthesisError};
use crate::domain::schema::ModuleSchema;
use crate::domain::values::UserValues;

/// Check caller values against the schema without building anything.
///
/// Reports every unknown variable (once, in name order) and every
/// required variable missing a value, per environment.
pub fn check_values(schema: &ModuleSchema, values: &UserValues) -> Vec<SchemaMismatch> {
    let known = schema.variable_names();
    let mut mismatches: Vec<SchemaMismatch> = values
        .all_names()
        .into_iter()
        .filter(|name| !known.contains(name))
        .map(|name| SchemaMismatch::UnknownVariable {
            variable: name.to_string(),
        })
        .collect();

    for env in EnvironmentTarget::ALL {
        let resolved = values.resolved(env);
        for variable in schema.required_variables() {
            if !resolved.contains_key(&variable.name) {
                mismatches.push(SchemaMismatch::MissingRequired {
                    variable: variable.name.clone(),
                    environment: env,
                });
            }
        }
    }
    mismatches
}

/// Build the artifact for `schema`.
///
/// The module call is pinned to the harvested version and passes every
/// schema variable through. Each environment assigns, in schema order,
/// every variable the caller supplied a value for; variables with a
/// default and no value are left out. Output is a pure function of the
/// inputs.
pub fn synthesize(
    schema: &ModuleSchema,
    values: &UserValues,
    layout: &TargetLayout,
) -> Result<ServiceInfraArtifact, SynthesisError> {
    let mismatches = check_values(schema, values);
    if !mismatches.is_empty() {
        return Err(SynthesisError::SchemaMismatch(mismatches));
    }

    let module_call = ModuleCall {
        name: schema.module.name.clone(),
        source: schema.source_address.clone(),
        version: schema.version.clone(),
        arguments: schema
            .variables
            .iter()
            .map(|v| ModuleArgument::passthrough(&v.name))
            .collect(),
    };

    let mut environment_values = BTreeMap::new();
    for env in EnvironmentTarget::ALL {
        let mut resolved = values.resolved(env);
        let assigned: Vec<_> = schema
            .variables
            .iter()
            .filter_map(|v| resolved.remove(&v.name).map(|value| (v.name.clone(), value)))
            .collect();
        environment_values.insert(env, assigned);
    }

    Ok(ServiceInfraArtifact {
        layout: layout.clone(),
        module_call,
        variable_declarations: schema.variables.clone(),
        output_declarations: schema.outputs.clone(),
        environment_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::module_ref::{Cloud, ModuleReference};
    use crate::domain::schema::{OutputSpec, ReleaseProvenance, SourceBranch, VariableSpec, VariableType};
    use serde_json::json;

    fn lambda_schema() -> ModuleSchema {
        ModuleSchema {
            module: ModuleReference::new("lambda", Cloud::Aws, "Lennar"),
            version: "0.9.23".to_string(),
            source_address: "app.terraform.io/Lennar/lambda/aws".to_string(),
            provenance: ReleaseProvenance {
                tag: "v0.9.23".to_string(),
                source_branch: SourceBranch::Main,
            },
            variables: vec![
                VariableSpec::required("timeout", VariableType::Number),
                VariableSpec::optional("memory", VariableType::Number, json!(128)),
            ],
            outputs: vec![OutputSpec::new("function_arn")],
            documentation: None,
        }
    }

    #[test]
    fn test_lambda_scenario() {
        let values = UserValues::new().with_common("timeout", json!(30));
        let artifact = synthesize(&lambda_schema(), &values, &TargetLayout::default()).unwrap();

        assert_eq!(artifact.module_call.version, "0.9.23");
        assert_eq!(artifact.variable_declarations.len(), 2);
        assert_eq!(artifact.environment_values.len(), 4);
        for env in EnvironmentTarget::ALL {
            assert_eq!(
                artifact.environment_values[&env],
                vec![("timeout".to_string(), json!(30))]
            );
        }
    }

    #[test]
    fn test_arguments_follow_declaration_order() {
        let values = UserValues::new()
            .with_common("memory", json!(256))
            .with_common("timeout", json!(30));
        let artifact = synthesize(&lambda_schema(), &values, &TargetLayout::default()).unwrap();

        let names: Vec<_> = artifact
            .module_call
            .arguments
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["timeout", "memory"]);
        assert_eq!(
            artifact.assigned_names(EnvironmentTarget::Qa),
            vec!["timeout", "memory"]
        );
    }

    #[test]
    fn test_unknown_variable_is_named() {
        let values = UserValues::new()
            .with_common("timeout", json!(30))
            .with_value(EnvironmentTarget::Dev, "extra_tag", json!("x"));
        let err = synthesize(&lambda_schema(), &values, &TargetLayout::default()).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::SchemaMismatch(vec![SchemaMismatch::UnknownVariable {
                variable: "extra_tag".to_string()
            }])
        );
    }

    #[test]
    fn test_missing_required_per_environment() {
        let values = UserValues::new()
            .with_value(EnvironmentTarget::Dev, "timeout", json!(30))
            .with_value(EnvironmentTarget::Qa, "timeout", json!(30))
            .with_value(EnvironmentTarget::Uat, "timeout", json!(30));
        let err = synthesize(&lambda_schema(), &values, &TargetLayout::default()).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::SchemaMismatch(vec![SchemaMismatch::MissingRequired {
                variable: "timeout".to_string(),
                environment: EnvironmentTarget::Prod,
            }])
        );
    }

    #[test]
    fn test_version_always_from_schema() {
        let mut schema = lambda_schema();
        schema.version = "1.0.0".to_string();
        let values = UserValues::new().with_common("timeout", json!(30));
        let artifact = synthesize(&schema, &values, &TargetLayout::default()).unwrap();
        assert_eq!(artifact.module_call.version, "1.0.0");
    }
}
