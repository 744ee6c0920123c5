//! modpromote - infrastructure module promotion CLI
//!
//! ## Commands
//!
//! - `infra`: promote a registry module into a service's Terraform tree
//! - `repo`: scaffold a service repository descriptor only
//! - `inspect`: resolve a module and print its harvested schema

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use modpromote_core::{
    Cloud, Credentials, ModuleReference, ModuleSchema, PromoteConfig, RepoScaffoldSpec,
    SourceDisagreement, UserValues,
};
use modpromote_pipeline::{
    InfraRequest, Pipeline, PipelineRequest, PipelineResult, Publisher, RepoRequest,
};
use modpromote_sources::{
    GithubConfig, GithubVcs, ModuleRegistry, TfcConfig, TfcRegistry, VersionControl,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "modpromote")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Promote private-registry Terraform modules into service repositories", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML); defaults apply when omitted
    #[arg(long, global = true, env = "MODPROMOTE_CONFIG")]
    config: Option<PathBuf>,

    /// Result format on stdout
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate module call, declarations and per-environment values
    Infra {
        /// Registry module name, e.g. `lambda`
        #[arg(short, long)]
        module: String,

        /// Cloud provider: aws or azure
        #[arg(short, long)]
        cloud: Cloud,

        /// Service the configuration is for
        #[arg(short, long)]
        service: String,

        /// Value map (JSON): `{"common": {...}, "dev": {...}, ...}`
        #[arg(long)]
        values: PathBuf,

        /// Also scaffold the repository descriptor from this spec (JSON)
        #[arg(long)]
        scaffold: Option<PathBuf>,

        /// Registry organization (default: from configuration)
        #[arg(long)]
        organization: Option<String>,

        /// Repository root to write into (default: current directory)
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Render and verify only; write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Scaffold a service repository descriptor only
    Repo {
        /// Service name (descriptor file stem)
        #[arg(short, long)]
        service: String,

        /// Cloud provider: aws or azure
        #[arg(short, long)]
        cloud: Cloud,

        /// Scaffold spec (JSON)
        #[arg(long)]
        scaffold: PathBuf,

        /// Repository root to write into (default: current directory)
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Render and verify only; write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve a module and show its harvested schema
    Inspect {
        /// Registry module name
        #[arg(short, long)]
        module: String,

        /// Cloud provider: aws or azure
        #[arg(short, long)]
        cloud: Cloud,

        /// Registry organization (default: from configuration)
        #[arg(long)]
        organization: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    modpromote_core::init_tracing(cli.json, level);

    let config = PromoteConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Infra {
            module,
            cloud,
            service,
            values,
            scaffold,
            organization,
            repo,
            dry_run,
        } => {
            let request = PipelineRequest::FullInfra(InfraRequest {
                module,
                cloud,
                organization,
                service_name: service,
                values: read_values(&values)?,
                scaffold: scaffold.as_deref().map(read_scaffold).transpose()?,
            });
            cmd_run(config, request, &repo, dry_run, cli.output).await
        }
        Commands::Repo {
            service,
            cloud,
            scaffold,
            repo,
            dry_run,
        } => {
            let request = PipelineRequest::RepositoryOnly(RepoRequest {
                service_name: service,
                cloud,
                scaffold: read_scaffold(&scaffold)?,
            });
            cmd_run(config, request, &repo, dry_run, cli.output).await
        }
        Commands::Inspect {
            module,
            cloud,
            organization,
        } => cmd_inspect(config, &module, cloud, organization.as_deref(), cli.output).await,
    }
}

fn read_values(path: &Path) -> Result<UserValues> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read value map {:?}", path))?;
    UserValues::from_json(&text).with_context(|| format!("Invalid value map {:?}", path))
}

fn read_scaffold(path: &Path) -> Result<RepoScaffoldSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scaffold spec {:?}", path))?;
    RepoScaffoldSpec::from_json(&text).with_context(|| format!("Invalid scaffold spec {:?}", path))
}

/// Registry and VCS clients for the configured endpoints.
fn build_sources(
    config: &PromoteConfig,
) -> Result<(Arc<dyn ModuleRegistry>, Arc<dyn VersionControl>)> {
    let credentials = Credentials::from_env();
    debug!(?credentials, "credentials from environment");

    let registry = TfcRegistry::new(TfcConfig {
        base_url: config.registry.base_url.clone(),
        organization: config.registry.organization.clone(),
        token: credentials.registry_token.clone(),
        timeout: config.network.timeout(),
    })
    .context("Failed to build registry client")?;

    let vcs = GithubVcs::new(GithubConfig {
        api_url: config.vcs.api_url.clone(),
        token: credentials.vcs_token.clone(),
        timeout: config.network.timeout(),
    })
    .context("Failed to build VCS client")?;

    Ok((Arc::new(registry), Arc::new(vcs)))
}

async fn cmd_run(
    config: PromoteConfig,
    request: PipelineRequest,
    repo: &Path,
    dry_run: bool,
    output: OutputFormat,
) -> Result<()> {
    let (registry, vcs) = build_sources(&config)?;
    let mut pipeline = Pipeline::new(registry, vcs, config);
    if !dry_run {
        pipeline = pipeline.with_publisher(Publisher::new(repo));
    }

    let result = pipeline.run(&request).await;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_result(&result, dry_run),
    }

    if result.succeeded() {
        Ok(())
    } else {
        anyhow::bail!("Pipeline failed at stage {}", result.stage_reached)
    }
}

fn print_result(result: &PipelineResult, dry_run: bool) {
    let status = if result.succeeded() { "✓" } else { "✗" };
    println!(
        "{} {} run {} ({}ms, stage: {})",
        status, result.intent, result.run_id, result.duration_ms, result.stage_reached
    );

    if let Some(schema) = &result.schema {
        println!(
            "  module {} @ {} (tag {} from {})",
            schema.module, schema.version, schema.provenance.tag, schema.provenance.source_branch
        );
    }

    for diagnostic in &result.diagnostics {
        println!("  {}", diagnostic);
    }

    if let Some(published) = &result.published {
        println!("  wrote {} files under {:?}", published.files.len(), published.root);
        for path in &published.files {
            println!("    {}", path.display());
        }
        println!("  digest: {}", published.digest);
    } else if result.succeeded() && dry_run {
        println!("  dry run; {} files rendered", result.artifacts.len());
        for file in &result.artifacts {
            println!();
            println!("# {}", file.path.display());
            print!("{}", file.content);
        }
    }
}

/// What `inspect` prints.
#[derive(Serialize)]
struct InspectReport<'a> {
    schema: &'a ModuleSchema,
    disagreements: &'a [SourceDisagreement],
}

async fn cmd_inspect(
    config: PromoteConfig,
    module: &str,
    cloud: Cloud,
    organization: Option<&str>,
    output: OutputFormat,
) -> Result<()> {
    let organization = organization
        .unwrap_or(&config.registry.organization)
        .to_string();
    let reference = ModuleReference::new(module, cloud, &organization);
    let (registry, vcs) = build_sources(&config)?;
    let pipeline = Pipeline::new(registry, vcs, config);

    let harvest = match pipeline.inspect(&reference).await {
        Ok(harvest) => harvest,
        Err(diagnostic) => anyhow::bail!("{}", diagnostic),
    };

    if output == OutputFormat::Json {
        let report = InspectReport {
            schema: &harvest.schema,
            disagreements: &harvest.disagreements,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let schema = &harvest.schema;
    println!("Module:   {}", schema.module);
    println!("Source:   {}", schema.source_address);
    println!("Version:  {}", schema.version);
    println!(
        "Release:  {} (from {})",
        schema.provenance.tag, schema.provenance.source_branch
    );
    println!();
    println!("Variables ({}):", schema.variables.len());
    for var in &schema.variables {
        let marker = if var.required { "required" } else { "optional" };
        let default = var
            .default
            .as_ref()
            .map(|d| format!(" = {}", d))
            .unwrap_or_default();
        println!("  {:<24} {:<8} {}{}", var.name, var.var_type, marker, default);
        if let Some(description) = &var.description {
            println!("  {:<24} {}", "", description);
        }
    }
    println!();
    println!("Outputs ({}):", schema.outputs.len());
    for out in &schema.outputs {
        println!("  {}", out.name);
    }
    if !harvest.disagreements.is_empty() {
        println!();
        println!("Registry/VCS disagreements:");
        for disagreement in &harvest.disagreements {
            println!("  - {}", disagreement);
        }
    }
    Ok(())
}
