//! Integration tests for the pipeline against in-memory sources.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use modpromote_core::{
    Cloud, EnvironmentCloudConfig, EnvironmentTarget, PromoteConfig, RepoScaffoldSpec,
    UserValues,
};
use modpromote_pipeline::publish::LOCK_FILE;
use modpromote_pipeline::{
    InfraRequest, Intent, Pipeline, PipelineRequest, PipelineStage, Publisher, RepoRequest,
    RetryPolicy, RunStatus, Severity,
};
use modpromote_sources::fakes::{FakeRepo, MemoryRegistry, MemoryVcs};
use modpromote_sources::{ModuleCoordinates, RegistryInput, SourceError};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const REPO: &str = "modules-len/terraform-aws-lambda";

const VARIABLES_TF: &str = r#"
variable "timeout" {
  type = number
}

variable "memory" {
  type    = number
  default = 128
}
"#;

const OUTPUTS_TF: &str = r#"
output "function_arn" {
  value = aws_lambda_function.this.arn
}
"#;

fn coords() -> ModuleCoordinates {
    ModuleCoordinates::new("Lennar", "lambda", "aws")
}

fn input(name: &str, type_expr: &str, required: bool) -> RegistryInput {
    RegistryInput {
        name: name.to_string(),
        type_expr: Some(type_expr.to_string()),
        description: None,
        default: None,
        required,
    }
}

fn registry() -> MemoryRegistry {
    MemoryRegistry::new()
        .with_module(coords(), "0.9.23", REPO)
        .with_inputs(
            &coords(),
            "0.9.23",
            vec![input("timeout", "number", true), input("memory", "number", false)],
        )
}

fn vcs() -> MemoryVcs {
    MemoryVcs::new().with_repo(
        REPO,
        FakeRepo::new()
            .release("v0.9.23", "main")
            .file("main", "variables.tf", VARIABLES_TF)
            .file("main", "outputs.tf", OUTPUTS_TF)
            .reachable_from("main")
            .branch("develop"),
    )
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(500),
        multiplier: 2,
    }
}

fn pipeline(registry: Arc<MemoryRegistry>, vcs: Arc<MemoryVcs>) -> Pipeline {
    Pipeline::new(registry, vcs, PromoteConfig::default()).with_retry(fast_retry())
}

fn lambda_request(module: &str, values: UserValues) -> PipelineRequest {
    PipelineRequest::FullInfra(InfraRequest {
        module: module.to_string(),
        cloud: Cloud::Aws,
        organization: None,
        service_name: "test-lambda".to_string(),
        values,
        scaffold: None,
    })
}

fn timeout_values() -> UserValues {
    UserValues::new().with_common("timeout", json!(30))
}

fn scaffold_spec() -> RepoScaffoldSpec {
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

fn tree(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).expect("read_dir") {
            let path = entry.expect("entry").path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().display().to_string());
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

// ---------------------------------------------------------------------------
// Full infra intent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_infra_publishes_all_files() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(Arc::new(registry()), Arc::new(vcs()))
        .with_publisher(Publisher::new(dir.path()));

    let result = pipeline.run(&lambda_request("lambda", timeout_values())).await;

    assert!(result.succeeded(), "{:#?}", result.diagnostics);
    assert_eq!(result.intent, Intent::FullInfra);
    assert_eq!(result.stage_reached, PipelineStage::Succeeded);
    assert_eq!(result.artifacts.len(), 7);
    assert_eq!(result.errors().count(), 0);

    let published = result.published.as_ref().expect("published");
    assert_eq!(published.files.len(), 7);
    assert_eq!(Some(&published.digest), result.artifact_digest.as_ref());

    assert_eq!(
        tree(dir.path()),
        vec![
            "environment/dev/dev.auto.tfvars",
            "environment/prod/prod.auto.tfvars",
            "environment/qa/qa.auto.tfvars",
            "environment/uat/uat.auto.tfvars",
            "terraform/main.tf",
            "terraform/outputs.tf",
            "terraform/variables.tf",
        ]
    );
    let prod = std::fs::read_to_string(dir.path().join("environment/prod/prod.auto.tfvars")).unwrap();
    assert_eq!(prod, "timeout = 30\n");
    let main = std::fs::read_to_string(dir.path().join("terraform/main.tf")).unwrap();
    assert!(main.contains("\"0.9.23\""));
}

#[tokio::test]
async fn test_full_infra_with_scaffold_adds_descriptor() {
    let mut request = lambda_request("lambda", timeout_values());
    if let PipelineRequest::FullInfra(req) = &mut request {
        req.scaffold = Some(scaffold_spec());
    }

    let result = pipeline(Arc::new(registry()), Arc::new(vcs())).run(&request).await;

    assert!(result.succeeded(), "{:#?}", result.diagnostics);
    assert_eq!(result.artifacts.len(), 8);
    assert!(result.published.is_none());
    assert_eq!(
        result.artifacts[7].path,
        Path::new("repositories/test-lambda.tf")
    );
}

#[tokio::test]
async fn test_not_found_halts_at_resolving_without_writes() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(Arc::new(registry()), Arc::new(vcs()))
        .with_publisher(Publisher::new(dir.path()));

    let result = pipeline
        .run(&lambda_request("nonexistent-module", timeout_values()))
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.stage_reached, PipelineStage::Resolving);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].code, "not_found");
    assert!(result.artifacts.is_empty());
    assert!(result.schema.is_none());
    assert!(tree(dir.path()).is_empty());
}

#[tokio::test]
async fn test_unknown_variable_fails_synthesis() {
    let values = timeout_values().with_value(EnvironmentTarget::Dev, "extra_tag", json!("x"));
    let result = pipeline(Arc::new(registry()), Arc::new(vcs()))
        .run(&lambda_request("lambda", values))
        .await;

    assert!(!result.succeeded());
    assert_eq!(result.stage_reached, PipelineStage::Synthesizing);
    let error = result.errors().next().expect("error");
    assert_eq!(error.code, "schema_mismatch");
    assert!(error.message.contains("extra_tag"));
    assert!(result.schema.is_some());
    assert!(result.artifacts.is_empty());
}

#[tokio::test]
async fn test_verification_failure_blocks_publication() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(Arc::new(registry()), Arc::new(vcs()))
        .with_publisher(Publisher::new(dir.path()));

    let values = UserValues::new().with_common("timeout", json!("thirty"));
    let result = pipeline.run(&lambda_request("lambda", values)).await;

    assert!(!result.succeeded());
    assert_eq!(result.stage_reached, PipelineStage::Verifying);
    assert_eq!(result.errors().count(), 4);
    assert!(result
        .errors()
        .all(|d| d.code == "verification_failure" && d.message.contains("timeout")));
    assert!(result.published.is_none());
    assert!(tree(dir.path()).is_empty());
}

#[tokio::test]
async fn test_source_disagreement_is_a_warning() {
    let registry = MemoryRegistry::new()
        .with_module(coords(), "0.9.23", REPO)
        .with_inputs(&coords(), "0.9.23", vec![input("timeout", "number", true)]);

    let result = pipeline(Arc::new(registry), Arc::new(vcs()))
        .run(&lambda_request("lambda", timeout_values()))
        .await;

    assert!(result.succeeded(), "{:#?}", result.diagnostics);
    let warnings: Vec<_> = result.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].severity, Severity::Warning);
    assert_eq!(warnings[0].code, "source_disagreement");
    assert!(warnings[0].message.contains("memory"));
}

#[tokio::test]
async fn test_version_mismatch_fails_harvest() {
    let registry = MemoryRegistry::new().with_module(coords(), "0.9.24", REPO);
    let result = pipeline(Arc::new(registry), Arc::new(vcs()))
        .run(&lambda_request("lambda", timeout_values()))
        .await;

    assert_eq!(result.stage_reached, PipelineStage::Harvesting);
    assert_eq!(result.diagnostics[0].code, "version_mismatch");
}

#[tokio::test]
async fn test_busy_root_fails_publishing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(LOCK_FILE), "other run").unwrap();
    let pipeline = pipeline(Arc::new(registry()), Arc::new(vcs()))
        .with_publisher(Publisher::new(dir.path()));

    let result = pipeline.run(&lambda_request("lambda", timeout_values())).await;

    assert!(!result.succeeded());
    assert_eq!(result.stage_reached, PipelineStage::Publishing);
    assert_eq!(result.diagnostics[0].code, "publish_busy");
    assert_eq!(tree(dir.path()), vec![LOCK_FILE.to_string()]);
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_transient_registry_failure_is_retried() {
    let registry = Arc::new(registry());
    registry.fail_next(SourceError::Transport("connection reset".to_string()), 2);
    let started = tokio::time::Instant::now();

    let result = pipeline(registry.clone(), Arc::new(vcs()))
        .run(&lambda_request("lambda", timeout_values()))
        .await;

    assert!(result.succeeded(), "{:#?}", result.diagnostics);
    // two failed lookups, one good lookup, one inputs call
    assert_eq!(registry.call_count(), 4);
    assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_is_module_unreachable() {
    let registry = Arc::new(registry());
    registry.fail_next(
        SourceError::Status {
            resource: "registry".to_string(),
            status: 503,
        },
        5,
    );

    let result = pipeline(registry.clone(), Arc::new(vcs()))
        .run(&lambda_request("lambda", timeout_values()))
        .await;

    assert_eq!(result.stage_reached, PipelineStage::Resolving);
    assert_eq!(result.diagnostics[0].code, "module_unreachable");
    assert_eq!(registry.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_registry_timeout_is_retried() {
    let registry = Arc::new(registry());
    registry.set_delay(Some(Duration::from_secs(60)));

    let result = pipeline(registry.clone(), Arc::new(vcs()))
        .run(&lambda_request("lambda", timeout_values()))
        .await;

    assert_eq!(result.stage_reached, PipelineStage::Resolving);
    assert_eq!(result.diagnostics[0].code, "module_unreachable");
    assert!(result.diagnostics[0].message.contains("timed out"));
    assert_eq!(registry.call_count(), 3);
}

// ---------------------------------------------------------------------------
// Repository-only intent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_repository_only_writes_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(registry());
    let pipeline = pipeline(registry.clone(), Arc::new(vcs()))
        .with_publisher(Publisher::new(dir.path()));

    let request = PipelineRequest::RepositoryOnly(RepoRequest {
        service_name: "test-lambda".to_string(),
        cloud: Cloud::Aws,
        scaffold: scaffold_spec(),
    });
    let result = pipeline.run(&request).await;

    assert!(result.succeeded(), "{:#?}", result.diagnostics);
    assert_eq!(result.intent, Intent::RepositoryOnly);
    assert!(result.schema.is_none());
    assert_eq!(registry.call_count(), 0);
    assert_eq!(tree(dir.path()), vec!["repositories/test-lambda.tf"]);
}

#[tokio::test]
async fn test_repository_only_reports_every_invalid_field() {
    let mut spec = scaffold_spec();
    spec.app_name = String::new();
    spec.template_repo = String::new();
    spec.environment_cloud_config.remove(&EnvironmentTarget::Uat);

    let request = PipelineRequest::RepositoryOnly(RepoRequest {
        service_name: "test-lambda".to_string(),
        cloud: Cloud::Aws,
        scaffold: spec,
    });
    let result = pipeline(Arc::new(registry()), Arc::new(vcs())).run(&request).await;

    assert_eq!(result.stage_reached, PipelineStage::Scaffolding);
    let messages: Vec<_> = result.errors().map(|d| d.message.as_str()).collect();
    assert_eq!(messages.len(), 3, "{:?}", messages);
    assert!(messages[0].contains("app_name"));
    assert!(messages[1].contains("template_repo"));
    assert!(messages[2].contains("uat"));
}

#[tokio::test]
async fn test_repository_only_rejects_unsafe_service_name() {
    let request = PipelineRequest::RepositoryOnly(RepoRequest {
        service_name: "../escape".to_string(),
        cloud: Cloud::Aws,
        scaffold: scaffold_spec(),
    });
    let result = pipeline(Arc::new(registry()), Arc::new(vcs())).run(&request).await;

    assert_eq!(result.stage_reached, PipelineStage::Resolving);
    assert_eq!(result.diagnostics[0].code, "validation_error");
}
