//! Pipeline orchestration: sequences the stages for one request and turns
//! every outcome into a [`PipelineResult`].

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use modpromote_core::scaffolder::validate_service_name;
use modpromote_core::{
    obs, scaffold, synthesize, verify_all, verify_descriptor, Harvest, ModuleReference,
    ModuleResolver, ModuleSchema, PromoteConfig, RenderedFile, RepoDescriptor, Resolution,
    ResolvedModule, SchemaCache, SchemaHarvester,
};
use modpromote_sources::{ModuleRegistry, VersionControl};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::diagnostic::Diagnostic;
use crate::publish::{PublishReport, Publisher};
use crate::request::{InfraRequest, PipelineRequest, RepoRequest};
use crate::retry::RetryPolicy;
use crate::stage::{Intent, PipelineStage, StageTracker};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub intent: Intent,
    pub status: RunStatus,
    /// Last working stage entered; on failure, the stage that failed
    pub stage_reached: PipelineStage,
    /// Rendered files; empty unless the run succeeded
    pub artifacts: Vec<RenderedFile>,
    pub artifact_digest: Option<String>,
    /// Set when the artifacts were written to a repository root
    pub published: Option<PublishReport>,
    /// Errors and warnings, in the order they were raised
    pub diagnostics: Vec<Diagnostic>,
    /// Harvested schema, when the run got that far
    pub schema: Option<ModuleSchema>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }
}

/// What a successful run produced.
#[derive(Default)]
struct Produced {
    files: Vec<RenderedFile>,
    schema: Option<ModuleSchema>,
    published: Option<PublishReport>,
}

/// Mutable state of one run. Never shared between runs.
struct RunState {
    run_id: String,
    tracker: StageTracker,
    diagnostics: Vec<Diagnostic>,
    schema: Option<ModuleSchema>,
}

type StageResult<T> = Result<T, Vec<Diagnostic>>;

impl RunState {
    fn enter(&mut self, stage: PipelineStage) -> StageResult<()> {
        self.tracker
            .advance(stage)
            .map_err(|e| vec![Diagnostic::from_pipeline(self.tracker.current(), &e)])?;
        obs::emit_stage_entered(&self.run_id, stage.name());
        Ok(())
    }
}

pub struct Pipeline {
    registry: Arc<dyn ModuleRegistry>,
    vcs: Arc<dyn VersionControl>,
    config: PromoteConfig,
    retry: RetryPolicy,
    publisher: Option<Publisher>,
}

impl Pipeline {
    pub fn new(
        registry: Arc<dyn ModuleRegistry>,
        vcs: Arc<dyn VersionControl>,
        config: PromoteConfig,
    ) -> Self {
        Self {
            retry: RetryPolicy::from_settings(&config.network),
            registry,
            vcs,
            config,
            publisher: None,
        }
    }

    /// Write artifacts of successful runs through `publisher`. Without one,
    /// runs are dry: artifacts are only returned.
    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &PromoteConfig {
        &self.config
    }

    /// Run one request to completion. Never returns early without a result.
    pub async fn run(&self, request: &PipelineRequest) -> PipelineResult {
        let run_id = Uuid::new_v4().to_string();
        let intent = request.intent();
        let started_at = Utc::now();
        let start = Instant::now();

        let span = obs::run_span(&run_id, intent.name());
        obs::emit_pipeline_started(&run_id, intent.name(), &request.subject());

        let mut state = RunState {
            run_id: run_id.clone(),
            tracker: StageTracker::new(),
            diagnostics: Vec::new(),
            schema: None,
        };

        let outcome = async {
            match request {
                PipelineRequest::FullInfra(req) => self.full_infra(&mut state, req).await,
                PipelineRequest::RepositoryOnly(req) => self.repository_only(&mut state, req).await,
            }
        }
        .instrument(span)
        .await;

        let produced = match outcome.and_then(|p| state.enter(PipelineStage::Succeeded).map(|_| p)) {
            Ok(produced) => produced,
            Err(diagnostics) => {
                state.diagnostics.extend(diagnostics);
                if let Err(e) = state.tracker.advance(PipelineStage::Failed) {
                    warn!(run_id = %run_id, error = %e, "could not mark run failed");
                }
                Produced::default()
            }
        };

        let status = if state.tracker.current() == PipelineStage::Succeeded {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        let stage_reached = match status {
            RunStatus::Succeeded => PipelineStage::Succeeded,
            RunStatus::Failed => state.tracker.reached(),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_pipeline_finished(
            &run_id,
            stage_reached.name(),
            duration_ms,
            status == RunStatus::Succeeded,
        );

        let artifact_digest =
            (!produced.files.is_empty()).then(|| modpromote_core::files_digest(&produced.files));
        PipelineResult {
            run_id,
            intent,
            status,
            stage_reached,
            artifacts: produced.files,
            artifact_digest,
            published: produced.published,
            diagnostics: state.diagnostics,
            schema: produced.schema.or(state.schema),
            started_at,
            duration_ms,
        }
    }

    /// Resolve and harvest only; used to show a module's schema.
    pub async fn inspect(&self, reference: &ModuleReference) -> Result<Harvest, Diagnostic> {
        let run_id = Uuid::new_v4().to_string();
        let module = self
            .resolve(&run_id, reference)
            .await
            .map_err(first_or_internal)?;
        self.harvest(&run_id, &SchemaCache::new(), &module)
            .await
            .map_err(first_or_internal)
    }

    async fn resolve(&self, run_id: &str, reference: &ModuleReference) -> StageResult<ResolvedModule> {
        let resolver = ModuleResolver::new(
            self.registry.clone(),
            self.config.registry.clone(),
            self.config.vcs.clone(),
            self.config.network.timeout(),
        );
        let (resolved, attempts) = self
            .retry
            .run(run_id, PipelineStage::Resolving.name(), || resolver.resolve(reference))
            .await;
        match resolved {
            Ok(Resolution::Found(module)) => {
                info!(module = %reference, version = %module.current_version, attempts, "module resolved");
                Ok(module)
            }
            Ok(Resolution::NotFound) => Err(vec![Diagnostic::not_found(&reference.to_string())]),
            Err(e) => Err(vec![Diagnostic::from_resolve(&e)]),
        }
    }

    async fn harvest(
        &self,
        run_id: &str,
        cache: &SchemaCache,
        module: &ResolvedModule,
    ) -> StageResult<Harvest> {
        let harvester = SchemaHarvester::new(
            self.registry.clone(),
            self.vcs.clone(),
            self.config.network.timeout(),
        );
        let (harvest, _) = self
            .retry
            .run(run_id, PipelineStage::Harvesting.name(), || {
                cache.get_or_harvest(&harvester, module)
            })
            .await;
        harvest.map_err(|e| vec![Diagnostic::from_harvest(&e)])
    }

    async fn full_infra(&self, state: &mut RunState, req: &InfraRequest) -> StageResult<Produced> {
        let organization = req
            .organization
            .as_deref()
            .unwrap_or(&self.config.registry.organization);
        let reference = ModuleReference::new(&req.module, req.cloud, organization);

        state.enter(PipelineStage::Resolving)?;
        let module = self.resolve(&state.run_id, &reference).await?;

        state.enter(PipelineStage::Harvesting)?;
        let cache = SchemaCache::new();
        let harvest = self.harvest(&state.run_id, &cache, &module).await?;
        state.diagnostics.extend(
            harvest
                .disagreements
                .iter()
                .map(Diagnostic::from_disagreement),
        );
        let schema = harvest.schema;
        state.schema = Some(schema.clone());

        state.enter(PipelineStage::Synthesizing)?;
        let artifact = synthesize(&schema, &req.values, &self.config.layout)
            .map_err(|e| Diagnostic::from_synthesis(&e))?;

        let descriptor = match &req.scaffold {
            Some(spec) => {
                state.enter(PipelineStage::Scaffolding)?;
                Some(self.scaffold_descriptor(&req.service_name, req.cloud, spec)?)
            }
            None => None,
        };

        state.enter(PipelineStage::Verifying)?;
        let verdict = verify_all(
            Some((&artifact, &schema)),
            descriptor.as_ref().map(|(file, d)| (file, d)),
        );
        if !verdict.passed() {
            return Err(verdict.failures().map(Diagnostic::from_finding).collect());
        }

        let mut files = artifact.render();
        files.extend(descriptor.map(|(file, _)| file));

        let published = self.publish(state, &files).await?;
        Ok(Produced {
            files,
            schema: Some(schema),
            published,
        })
    }

    async fn repository_only(&self, state: &mut RunState, req: &RepoRequest) -> StageResult<Produced> {
        state.enter(PipelineStage::Resolving)?;
        validate_service_name(&req.service_name).map_err(|e| {
            vec![Diagnostic {
                stage: PipelineStage::Resolving,
                ..Diagnostic::from_validation(&e)
            }]
        })?;

        state.enter(PipelineStage::Scaffolding)?;
        let (file, descriptor) = self.scaffold_descriptor(&req.service_name, req.cloud, &req.scaffold)?;

        state.enter(PipelineStage::Verifying)?;
        let verdict = verify_descriptor(&file, &descriptor);
        if !verdict.passed() {
            return Err(verdict.failures().map(Diagnostic::from_finding).collect());
        }

        let files = vec![file];
        let published = self.publish(state, &files).await?;
        Ok(Produced {
            files,
            schema: None,
            published,
        })
    }

    fn scaffold_descriptor(
        &self,
        service_name: &str,
        cloud: modpromote_core::Cloud,
        spec: &modpromote_core::RepoScaffoldSpec,
    ) -> StageResult<(RenderedFile, RepoDescriptor)> {
        let descriptor = scaffold(
            service_name,
            cloud,
            spec,
            &self.config.scaffold.repo_module_source,
        )
        .map_err(|e| Diagnostic::from_scaffold(&e))?;
        Ok((descriptor.render(&self.config.layout), descriptor))
    }

    async fn publish(
        &self,
        state: &mut RunState,
        files: &[RenderedFile],
    ) -> StageResult<Option<PublishReport>> {
        let Some(publisher) = &self.publisher else {
            info!(run_id = %state.run_id, files = files.len(), "dry run, nothing written");
            return Ok(None);
        };
        state.enter(PipelineStage::Publishing)?;
        let report = publisher
            .publish(files.to_vec())
            .await
            .map_err(|e| vec![Diagnostic::from_publish(&e)])?;
        Ok(Some(report))
    }
}

fn first_or_internal(mut diagnostics: Vec<Diagnostic>) -> Diagnostic {
    if diagnostics.is_empty() {
        Diagnostic::error(PipelineStage::Failed, "internal", "stage failed without a diagnostic")
    } else {
        diagnostics.swap_remove(0)
    }
}
