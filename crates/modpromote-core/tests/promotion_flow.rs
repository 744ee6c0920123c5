use std::collections::BTreeMap;

use modpromote_core::verifier::VerifyRule;
use modpromote_core::{
    check_values, files_digest, scaffold, synthesize, verify, verify_all, Cloud,
    EnvironmentCloudConfig, EnvironmentTarget, ModuleReference, ModuleSchema, OutputSpec,
    ReleaseProvenance, RepoScaffoldSpec, SchemaMismatch, ServiceInfraArtifact, SourceBranch,
    SynthesisError, TargetLayout, UserValues, VariableSpec, VariableType,
};
use proptest::prelude::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn schema_with(variables: Vec<VariableSpec>) -> ModuleSchema {
    ModuleSchema {
        module: ModuleReference::new("lambda", Cloud::Aws, "Lennar"),
        version: "0.9.23".to_string(),
        source_address: "app.terraform.io/Lennar/lambda/aws".to_string(),
        provenance: ReleaseProvenance {
            tag: "v0.9.23".to_string(),
            source_branch: SourceBranch::Main,
        },
        variables,
        outputs: vec![OutputSpec::new("function_arn"), OutputSpec::new("role_arn")],
        documentation: None,
    }
}

fn lambda_schema() -> ModuleSchema {
    schema_with(vec![
        VariableSpec::required("timeout", VariableType::Number)
            .with_description("Function timeout in seconds"),
        VariableSpec::optional("memory", VariableType::Number, json!(128)),
        VariableSpec::optional("tags", VariableType::Map, json!({})),
    ])
}

fn lambda_values() -> UserValues {
    UserValues::new()
        .with_common("timeout", json!(30))
        .with_value(EnvironmentTarget::Prod, "memory", json!(512))
        .with_value(EnvironmentTarget::Prod, "tags", json!({"team": "payments", "tier": "1"}))
}

fn scaffold_spec() -> RepoScaffoldSpec {
    let mut spec = RepoScaffoldSpec {
        app_acronym: "tla".to_string(),
        app_name: "test-lambda".to_string(),
        github_org: "Lennar".to_string(),
        template_org: "Lennar".to_string(),
        template_repo: "service-template".to_string(),
        repo_name_suffix: "svc".to_string(),
        no_secrets_confirmed: true,
        ..Default::default()
    };
    for env in EnvironmentTarget::ALL {
        spec.environment_cloud_config
            .insert(env, EnvironmentCloudConfig::aws("111111111111"));
    }
    spec
}

// ---------------------------------------------------------------------------
// Synthesis and verification
// ---------------------------------------------------------------------------

#[test]
fn test_lambda_promotion_verifies() {
    let schema = lambda_schema();
    let layout = TargetLayout::default();
    let artifact = synthesize(&schema, &lambda_values(), &layout).expect("synthesize");

    let files = artifact.render();
    assert_eq!(files.len(), 7);
    assert_eq!(files[0].path, layout.module_call_path());
    assert!(files[0].content.contains("version = \"0.9.23\""));
    assert!(files[0].content.contains("app.terraform.io/Lennar/lambda/aws"));

    let prod = files
        .iter()
        .find(|f| f.path == layout.values_path(EnvironmentTarget::Prod))
        .expect("prod values");
    assert!(prod.content.contains("memory"));
    assert!(prod.content.contains("payments"));

    let dev = files
        .iter()
        .find(|f| f.path == layout.values_path(EnvironmentTarget::Dev))
        .expect("dev values");
    assert!(!dev.content.contains("memory"));

    let verdict = verify(&artifact, &schema);
    assert!(verdict.passed(), "{:#?}", verdict);
}

#[test]
fn test_unknown_variable_rejected_with_name() {
    let values = lambda_values().with_value(EnvironmentTarget::Qa, "extra_tag", json!("blue"));
    let err = synthesize(&lambda_schema(), &values, &TargetLayout::default()).unwrap_err();

    assert_eq!(
        err,
        SynthesisError::SchemaMismatch(vec![SchemaMismatch::UnknownVariable {
            variable: "extra_tag".to_string(),
        }])
    );
    assert!(err.to_string().contains("extra_tag"));
}

#[test]
fn test_synthesis_is_byte_identical_across_runs() {
    let schema = lambda_schema();
    let a = synthesize(&schema, &lambda_values(), &TargetLayout::default()).unwrap();
    let b = synthesize(&schema, &lambda_values(), &TargetLayout::default()).unwrap();

    assert_eq!(a.render(), b.render());
    assert_eq!(a.digest(), b.digest());
    assert_eq!(a.digest(), files_digest(&b.render()));
}

#[test]
fn test_rendered_files_parse_back() {
    let artifact =
        synthesize(&lambda_schema(), &lambda_values(), &TargetLayout::default()).unwrap();
    let parsed = ServiceInfraArtifact::parse(&artifact.layout, &artifact.render()).unwrap();
    assert_eq!(parsed, artifact);
}

#[test]
fn test_verify_rejects_extra_declaration() {
    let schema = lambda_schema();
    let mut artifact = synthesize(&schema, &lambda_values(), &TargetLayout::default()).unwrap();
    artifact
        .variable_declarations
        .push(VariableSpec::optional("extra_tag", VariableType::String, json!("")));

    let verdict = verify(&artifact, &schema);
    let failure = verdict
        .failures()
        .find(|f| f.rule == VerifyRule::VariableSetEquality)
        .expect("variable set failure");
    assert!(failure.message.contains("4 variables declared, module schema has 3"));
    assert!(failure.message.contains("extra_tag"));
}

#[test]
fn test_verify_rejects_missing_declaration() {
    let schema = lambda_schema();
    let mut artifact = synthesize(&schema, &lambda_values(), &TargetLayout::default()).unwrap();
    artifact.variable_declarations.retain(|v| v.name != "tags");

    let verdict = verify(&artifact, &schema);
    assert!(!verdict.passed());
    let failure = verdict
        .failures()
        .find(|f| f.rule == VerifyRule::VariableSetEquality)
        .expect("variable set failure");
    assert!(failure.message.contains("missing: tags"));
}

#[test]
fn test_verify_all_covers_descriptor() {
    let schema = lambda_schema();
    let layout = TargetLayout::default();
    let artifact = synthesize(&schema, &lambda_values(), &layout).unwrap();
    let descriptor =
        scaffold("test-lambda", Cloud::Aws, &scaffold_spec(), "../github-repo-lz").unwrap();
    let file = descriptor.render(&layout);

    let verdict = verify_all(Some((&artifact, &schema)), Some((&file, &descriptor)));
    assert!(verdict.passed(), "{:#?}", verdict);
    assert!(verdict
        .findings
        .iter()
        .any(|f| f.rule == VerifyRule::DescriptorRoundTrip));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn arb_variables() -> impl Strategy<Value = Vec<VariableSpec>> {
    prop::collection::btree_map("[a-z]{1,6}", any::<bool>(), 0..8).prop_map(|vars| {
        vars.into_iter()
            .map(|(name, required)| {
                if required {
                    VariableSpec::required(&name, VariableType::Number)
                } else {
                    VariableSpec::optional(&name, VariableType::Number, json!(0))
                }
            })
            .collect()
    })
}

fn arb_values() -> impl Strategy<Value = UserValues> {
    let names = prop::collection::btree_map("[a-z]{1,6}", 0u32..1000, 0..8);
    (names.clone(), names).prop_map(|(common, prod)| {
        let mut values = UserValues::new();
        for (name, n) in common {
            values = values.with_common(&name, json!(n));
        }
        for (name, n) in prod {
            values = values.with_value(EnvironmentTarget::Prod, &name, json!(n));
        }
        values
    })
}

proptest! {
    #[test]
    fn prop_synthesis_never_emits_unknown_or_omits_required(
        variables in arb_variables(),
        values in arb_values(),
    ) {
        let schema = schema_with(variables);
        let known = schema.variable_names();

        match synthesize(&schema, &values, &TargetLayout::default()) {
            Ok(artifact) => {
                prop_assert!(check_values(&schema, &values).is_empty());
                for env in EnvironmentTarget::ALL {
                    let assigned = artifact.assigned_names(env);
                    prop_assert!(assigned.iter().all(|n| known.contains(n)));
                    for required in schema.required_variables() {
                        prop_assert!(assigned.contains(&required.name.as_str()));
                    }
                }
                prop_assert!(verify(&artifact, &schema).passed());
            }
            Err(SynthesisError::SchemaMismatch(mismatches)) => {
                prop_assert!(!mismatches.is_empty());
                let unknown: BTreeMap<&str, ()> = values
                    .all_names()
                    .into_iter()
                    .filter(|n| !known.contains(n))
                    .map(|n| (n, ()))
                    .collect();
                for mismatch in &mismatches {
                    match mismatch {
                        SchemaMismatch::UnknownVariable { variable } => {
                            prop_assert!(unknown.contains_key(variable.as_str()));
                        }
                        SchemaMismatch::MissingRequired { variable, environment } => {
                            prop_assert!(!values.resolved(*environment).contains_key(variable));
                        }
                    }
                }
            }
        }
    }
}
