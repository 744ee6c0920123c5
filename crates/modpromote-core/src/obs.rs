//! Structured observability hooks for pipeline run lifecycle events.
//!
//! Every event carries an `event` field naming it (`pipeline.started`,
//! `harvest.branch_selected`, ...) so log queries can filter on it.

use tracing::{info, warn};

/// Span tagging all events of one pipeline run with its `run_id`.
///
/// Use with `tracing::Instrument` around async work.
pub fn run_span(run_id: &str, intent: &str) -> tracing::Span {
    tracing::info_span!("modpromote.run", run_id = %run_id, intent = %intent)
}

/// RAII guard that enters a run-scoped span for synchronous sections.
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345", "full_infra");
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str, intent: &str) -> Self {
        Self {
            _span: run_span(run_id, intent).entered(),
        }
    }
}

pub fn emit_pipeline_started(run_id: &str, intent: &str, subject: &str) {
    info!(event = "pipeline.started", run_id = %run_id, intent = %intent, subject = %subject);
}

pub fn emit_stage_entered(run_id: &str, stage: &str) {
    info!(event = "pipeline.stage_entered", run_id = %run_id, stage = %stage);
}

/// A transient failure is about to be retried after `backoff_ms`.
pub fn emit_retry(run_id: &str, stage: &str, attempt: u32, backoff_ms: u64, error: &dyn std::fmt::Display) {
    warn!(
        event = "pipeline.retry",
        run_id = %run_id,
        stage = %stage,
        attempt = attempt,
        backoff_ms = backoff_ms,
        error = %error,
    );
}

pub fn emit_pipeline_finished(run_id: &str, stage_reached: &str, duration_ms: u64, success: bool) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        stage_reached = %stage_reached,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_branch_selected(module: &str, tag: &str, branch: &str) {
    info!(event = "harvest.branch_selected", module = %module, tag = %tag, branch = %branch);
}

pub fn emit_source_disagreement(module: &str, disagreement: &dyn std::fmt::Display) {
    warn!(event = "harvest.source_disagreement", module = %module, detail = %disagreement);
}

pub fn emit_verify_completed(subject: &str, checks: usize, failures: usize) {
    info!(
        event = "verify.completed",
        subject = %subject,
        checks = checks,
        failures = failures,
        passed = failures == 0,
    );
}

pub fn emit_publish_completed(root: &str, files: usize, digest: &str) {
    info!(event = "publish.completed", root = %root, files = files, digest = %digest);
}
