//! Repository Scaffolder: validates scaffold input and builds the
//! repository descriptor for one service.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::environment::EnvironmentTarget;
use crate::domain::error::{ScaffoldError, ValidationError};
use crate::domain::module_ref::Cloud;
use crate::domain::scaffold::{EnvironmentCloudConfig, RepoDescriptor, RepoScaffoldSpec};

/// Descriptor file stems and module labels use the service name verbatim.
static SERVICE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("service name pattern"));

/// A service name must be usable as a file stem and a module label.
pub fn validate_service_name(name: &str) -> Result<(), ValidationError> {
    if SERVICE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidServiceName {
            name: name.to_string(),
        })
    }
}

/// Every problem with `spec`, in field order. Empty means valid.
pub fn validate_spec(spec: &RepoScaffoldSpec, cloud: Cloud) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (field, value) in spec.scalar_fields() {
        if value.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: field.to_string(),
            });
        }
    }

    if spec.vault_secret_paths.is_empty() && !spec.no_secrets_confirmed {
        errors.push(ValidationError::SecretsNotConfirmed);
    }
    for (path, keys) in &spec.vault_secret_paths {
        if path.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "vault_secret_paths".to_string(),
            });
        }
        if keys.is_empty() || keys.iter().any(|k| k.trim().is_empty()) {
            errors.push(ValidationError::EmptySecretKey { path: path.clone() });
        }
    }

    for env in EnvironmentTarget::ALL {
        match spec.environment_cloud_config.get(&env) {
            None => errors.push(ValidationError::MissingEnvironment { env }),
            Some(config) => errors.extend(validate_environment(env, config, cloud)),
        }
    }

    errors
}

fn validate_environment(
    env: EnvironmentTarget,
    config: &EnvironmentCloudConfig,
    cloud: Cloud,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.cloud != cloud {
        errors.push(ValidationError::CloudMismatch {
            env,
            expected: cloud.to_string(),
            found: config.cloud.to_string(),
        });
    }

    let present = |id: &Option<String>| id.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false);
    let (own, foreign, expected) = match config.cloud {
        Cloud::Aws => (&config.account_id, &config.subscription_id, "account_id"),
        Cloud::Azure => (&config.subscription_id, &config.account_id, "subscription_id"),
    };
    if foreign.is_some() {
        errors.push(ValidationError::MixedIdentifiers { env });
    }
    if !present(own) {
        errors.push(ValidationError::MissingIdentifier { env, expected });
    }
    errors
}

/// Validate and build the descriptor for `service_name`.
///
/// Reads and writes nothing; the descriptor only describes this service.
pub fn scaffold(
    service_name: &str,
    cloud: Cloud,
    spec: &RepoScaffoldSpec,
    module_source: &str,
) -> Result<RepoDescriptor, ScaffoldError> {
    let mut errors = Vec::new();
    if let Err(err) = validate_service_name(service_name) {
        errors.push(err);
    }
    errors.extend(validate_spec(spec, cloud));
    if !errors.is_empty() {
        return Err(ScaffoldError::Invalid(errors));
    }

    Ok(RepoDescriptor {
        service_name: service_name.to_string(),
        module_source: module_source.to_string(),
        spec: spec.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hcl::files::descriptor_label;
    use proptest::prelude::*;

    fn valid_spec() -> RepoScaffoldSpec {
        let mut spec = RepoScaffoldSpec {
            app_acronym: "tla".to_string(),
            app_name: "test-lambda".to_string(),
            github_org: "Lennar".to_string(),
            template_org: "Lennar".to_string(),
            template_repo: "service-template".to_string(),
            repo_name_suffix: "svc".to_string(),
            ..Default::default()
        };
        spec.vault_secret_paths
            .insert("kv/test-lambda".to_string(), ["api_key".to_string()].into());
        for env in EnvironmentTarget::ALL {
            spec.environment_cloud_config
                .insert(env, EnvironmentCloudConfig::aws("111111111111"));
        }
        spec
    }

    #[test]
    fn test_valid_spec_scaffolds() {
        let descriptor = scaffold("test-lambda", Cloud::Aws, &valid_spec(), "../github-repo-lz").unwrap();
        assert_eq!(descriptor.service_name, "test-lambda");
        assert_eq!(descriptor.spec, valid_spec());
    }

    #[test]
    fn test_empty_field_is_error_not_default() {
        let mut spec = valid_spec();
        spec.template_repo = "  ".to_string();
        let err = scaffold("svc", Cloud::Aws, &spec, "../m").unwrap_err();
        assert_eq!(
            err.errors(),
            &[ValidationError::MissingField {
                field: "template_repo".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_secrets_need_confirmation() {
        let mut spec = valid_spec();
        spec.vault_secret_paths.clear();
        assert_eq!(
            validate_spec(&spec, Cloud::Aws),
            vec![ValidationError::SecretsNotConfirmed]
        );

        spec.no_secrets_confirmed = true;
        assert!(validate_spec(&spec, Cloud::Aws).is_empty());
    }

    #[test]
    fn test_secret_path_without_keys() {
        let mut spec = valid_spec();
        spec.vault_secret_paths
            .insert("kv/empty".to_string(), Default::default());
        assert_eq!(
            validate_spec(&spec, Cloud::Aws),
            vec![ValidationError::EmptySecretKey {
                path: "kv/empty".to_string()
            }]
        );
    }

    #[test]
    fn test_mixed_identifiers_rejected() {
        let mut spec = valid_spec();
        spec.environment_cloud_config.insert(
            EnvironmentTarget::Qa,
            EnvironmentCloudConfig {
                subscription_id: Some("sub-1".to_string()),
                ..EnvironmentCloudConfig::aws("111111111111")
            },
        );
        assert_eq!(
            validate_spec(&spec, Cloud::Aws),
            vec![ValidationError::MixedIdentifiers {
                env: EnvironmentTarget::Qa
            }]
        );
    }

    #[test]
    fn test_azure_requires_subscription_id() {
        let mut spec = valid_spec();
        for env in EnvironmentTarget::ALL {
            spec.environment_cloud_config
                .insert(env, EnvironmentCloudConfig::azure("sub-1"));
        }
        assert!(validate_spec(&spec, Cloud::Azure).is_empty());

        spec.environment_cloud_config.insert(
            EnvironmentTarget::Prod,
            EnvironmentCloudConfig {
                cloud: Cloud::Azure,
                account_id: None,
                subscription_id: None,
            },
        );
        assert_eq!(
            validate_spec(&spec, Cloud::Azure),
            vec![ValidationError::MissingIdentifier {
                env: EnvironmentTarget::Prod,
                expected: "subscription_id"
            }]
        );
    }

    #[test]
    fn test_missing_environment_and_cloud_mismatch() {
        let mut spec = valid_spec();
        spec.environment_cloud_config.remove(&EnvironmentTarget::Uat);
        let errors = validate_spec(&spec, Cloud::Azure);
        assert!(errors.contains(&ValidationError::MissingEnvironment {
            env: EnvironmentTarget::Uat
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::CloudMismatch { env: EnvironmentTarget::Dev, .. })));
    }

    #[test]
    fn test_service_name_rules() {
        assert!(validate_service_name("test-lambda").is_ok());
        assert!(validate_service_name("svc_1-v2").is_ok());
        assert!(validate_service_name("svc_1.v2").is_err());
        assert!(validate_service_name("").is_err());
        assert!(validate_service_name(".hidden").is_err());
        assert!(validate_service_name("../escape").is_err());
        assert!(validate_service_name("a/b").is_err());
    }

    #[test]
    fn test_dotted_name_cannot_shadow_underscored_label() {
        assert!(validate_service_name("a_b").is_ok());
        assert!(validate_service_name("a.b").is_err());
        assert_eq!(descriptor_label("a_b"), "github_repository_a_b");
    }

    proptest! {
        #[test]
        fn prop_valid_service_names_get_distinct_labels(
            a in "[A-Za-z0-9._/-]{1,12}",
            b in "[A-Za-z0-9._/-]{1,12}",
        ) {
            prop_assume!(a != b);
            prop_assume!(validate_service_name(&a).is_ok() && validate_service_name(&b).is_ok());
            prop_assert_ne!(descriptor_label(&a), descriptor_label(&b));
        }
    }
}
