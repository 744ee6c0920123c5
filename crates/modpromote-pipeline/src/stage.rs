//! Pipeline stages, intents and the allowed-transition table.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// What the caller asked for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Resolve, harvest, synthesize, optionally scaffold, verify
    FullInfra,
    /// Scaffold a repository descriptor only; no schema is harvested
    RepositoryOnly,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::FullInfra => "full_infra",
            Intent::RepositoryOnly => "repository_only",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pipeline state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Resolving,
    Harvesting,
    Synthesizing,
    Scaffolding,
    Verifying,
    Publishing,
    Succeeded,
    Failed,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Resolving => "resolving",
            PipelineStage::Harvesting => "harvesting",
            PipelineStage::Synthesizing => "synthesizing",
            PipelineStage::Scaffolding => "scaffolding",
            PipelineStage::Verifying => "verifying",
            PipelineStage::Publishing => "publishing",
            PipelineStage::Succeeded => "succeeded",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Succeeded | PipelineStage::Failed)
    }

    /// Whether `self → next` is a legal transition.
    ///
    /// Every non-terminal, non-idle stage may move to `Failed`.
    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        if next == Failed {
            return !self.is_terminal() && *self != Idle;
        }
        matches!(
            (self, next),
            (Idle, Resolving)
                | (Resolving, Harvesting)
                | (Resolving, Scaffolding)
                | (Harvesting, Synthesizing)
                | (Synthesizing, Scaffolding)
                | (Synthesizing, Verifying)
                | (Scaffolding, Verifying)
                | (Verifying, Publishing)
                | (Verifying, Succeeded)
                | (Publishing, Succeeded)
        )
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Current stage of one run plus the last non-terminal stage entered.
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: PipelineStage,
    reached: PipelineStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            current: PipelineStage::Idle,
            reached: PipelineStage::Idle,
        }
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    /// Last working stage entered; unchanged by moving to `Failed`.
    pub fn reached(&self) -> PipelineStage {
        self.reached
    }

    pub fn advance(&mut self, next: PipelineStage) -> Result<(), PipelineError> {
        if !self.current.can_transition_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        if next != PipelineStage::Failed {
            self.reached = next;
        }
        Ok(())
    }
}
