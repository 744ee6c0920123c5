use std::sync::Arc;
use std::time::Duration;

use modpromote_core::config::{RegistrySettings, VcsSettings};
use modpromote_core::{
    Cloud, HarvestError, ModuleReference, ModuleResolver, Resolution, ResolvedModule,
    SchemaCache, SchemaHarvester, SourceBranch, SourceDisagreement, VariableType,
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
  type        = number
  description = "Function timeout in seconds"
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

fn lambda() -> ModuleReference {
    ModuleReference::new("lambda", Cloud::Aws, "Lennar")
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

fn module_repo(branch: &str) -> FakeRepo {
    FakeRepo::new()
        .release("v0.9.23", branch)
        .file(branch, "variables.tf", VARIABLES_TF)
        .file(branch, "outputs.tf", OUTPUTS_TF)
        .file(branch, "README.md", "# lambda\n")
        .file(branch, "examples/basic/main.tf", "variable \"ignored\" {}\n")
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

async fn resolve(registry: &Arc<MemoryRegistry>) -> ResolvedModule {
    let resolver = ModuleResolver::new(
        registry.clone(),
        RegistrySettings::default(),
        VcsSettings::default(),
        Duration::from_secs(5),
    );
    match resolver.resolve(&lambda()).await.expect("resolve") {
        Resolution::Found(module) => module,
        Resolution::NotFound => panic!("lambda should resolve"),
    }
}

fn harvester(registry: Arc<MemoryRegistry>, vcs: MemoryVcs) -> SchemaHarvester {
    SchemaHarvester::new(registry, Arc::new(vcs), Duration::from_secs(5))
}

// ---------------------------------------------------------------------------
// Branch selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_harvest_from_main() {
    let registry = Arc::new(registry());
    let module = resolve(&registry).await;
    assert_eq!(module.source_address, "app.terraform.io/Lennar/lambda/aws");

    let vcs = MemoryVcs::new().with_repo(REPO, module_repo("main").reachable_from("main").branch("develop"));
    let harvest = harvester(registry, vcs).harvest(&module).await.expect("harvest");

    let schema = harvest.schema;
    assert_eq!(schema.version, "0.9.23");
    assert_eq!(schema.provenance.tag, "v0.9.23");
    assert_eq!(schema.provenance.source_branch, SourceBranch::Main);
    let names: Vec<_> = schema.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["timeout", "memory"]);
    assert_eq!(schema.variables[0].var_type, VariableType::Number);
    assert!(schema.variables[0].required);
    assert_eq!(schema.variables[1].default, Some(json!(128)));
    assert_eq!(schema.outputs.len(), 1);
    assert_eq!(schema.documentation.as_deref(), Some("# lambda\n"));
    assert!(harvest.disagreements.is_empty(), "{:?}", harvest.disagreements);
}

#[tokio::test]
async fn test_harvest_from_develop_when_not_on_main() {
    let registry = Arc::new(registry());
    let module = resolve(&registry).await;

    let vcs = MemoryVcs::new().with_repo(
        REPO,
        module_repo("develop").reachable_from("develop").branch("main"),
    );
    let harvest = harvester(registry, vcs).harvest(&module).await.expect("harvest");

    assert_eq!(harvest.schema.provenance.source_branch, SourceBranch::Develop);
    assert_eq!(harvest.schema.variables.len(), 2);
}

#[tokio::test]
async fn test_harvest_ambiguous_branch() {
    let registry = Arc::new(registry());
    let module = resolve(&registry).await;

    let vcs = MemoryVcs::new().with_repo(REPO, module_repo("main").branch("develop"));
    let err = harvester(registry, vcs).harvest(&module).await.unwrap_err();

    assert!(matches!(err, HarvestError::AmbiguousBranch { ref tag, .. } if tag == "v0.9.23"));
    assert!(!err.is_transient());
}

// ---------------------------------------------------------------------------
// Source disagreements
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_version_mismatch_is_terminal() {
    let registry = Arc::new(registry());
    let module = resolve(&registry).await;

    let repo = FakeRepo::new()
        .release("v0.9.22", "main")
        .file("main", "variables.tf", VARIABLES_TF)
        .reachable_from("main");
    let err = harvester(registry, MemoryVcs::new().with_repo(REPO, repo))
        .harvest(&module)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        HarvestError::VersionMismatch {
            registry: "0.9.23".to_string(),
            release_tag: "v0.9.22".to_string(),
        }
    );
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_registry_disagreement_is_reported_not_fatal() {
    let registry = Arc::new(
        MemoryRegistry::new()
            .with_module(coords(), "0.9.23", REPO)
            .with_inputs(
                &coords(),
                "0.9.23",
                vec![
                    input("timeout", "string", true),
                    input("memory", "number", false),
                    input("runtime", "string", true),
                ],
            ),
    );
    let module = resolve(&registry).await;

    let vcs = MemoryVcs::new().with_repo(REPO, module_repo("main").reachable_from("main"));
    let harvest = harvester(registry, vcs).harvest(&module).await.expect("harvest");

    // Declarations stay authoritative
    assert_eq!(harvest.schema.variable_names().len(), 2);
    assert!(harvest.schema.variable("runtime").is_none());
    assert_eq!(
        harvest.disagreements,
        vec![
            SourceDisagreement::TypeDiffers {
                variable: "timeout".to_string(),
                registry: "string".to_string(),
                vcs: "number".to_string(),
            },
            SourceDisagreement::RegistryOnly {
                variable: "runtime".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_registry_without_inputs_falls_back_to_declarations() {
    let registry = Arc::new(MemoryRegistry::new().with_module(coords(), "0.9.23", REPO));
    let module = resolve(&registry).await;

    let vcs = MemoryVcs::new().with_repo(REPO, module_repo("main").reachable_from("main"));
    let harvest = harvester(registry, vcs).harvest(&module).await.expect("harvest");

    assert_eq!(harvest.schema.variables.len(), 2);
    assert!(matches!(
        harvest.disagreements.as_slice(),
        [SourceDisagreement::RegistryIncomplete { .. }]
    ));
}

#[tokio::test]
async fn test_missing_release_and_transient_vcs_errors() {
    let registry = Arc::new(registry());
    let module = resolve(&registry).await;

    let vcs = MemoryVcs::new().with_repo(REPO, FakeRepo::new().branch("main"));
    let err = harvester(registry.clone(), vcs).harvest(&module).await.unwrap_err();
    assert!(matches!(err, HarvestError::NoReleaseFound { .. }));

    let vcs = MemoryVcs::new().with_repo(REPO, module_repo("main").reachable_from("main"));
    vcs.fail_next(SourceError::Transport("connection reset".to_string()), 1);
    let err = harvester(registry, vcs).harvest(&module).await.unwrap_err();
    assert!(err.is_transient());
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_schema_cache_harvests_once() {
    let registry = Arc::new(registry());
    let module = resolve(&registry).await;

    let vcs = Arc::new(MemoryVcs::new().with_repo(REPO, module_repo("main").reachable_from("main")));
    let harvester = SchemaHarvester::new(registry, vcs.clone(), Duration::from_secs(5));
    let cache = SchemaCache::new();

    let first = cache.get_or_harvest(&harvester, &module).await.expect("first");
    let calls = vcs.call_count();
    let second = cache.get_or_harvest(&harvester, &module).await.expect("second");

    assert_eq!(first, second);
    assert_eq!(vcs.call_count(), calls);
    assert_eq!(cache.len(), 1);
}
