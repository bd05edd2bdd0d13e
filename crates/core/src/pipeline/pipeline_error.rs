use thiserror::Error;

use crate::pipeline::stage::StageKind;
use crate::video::domain::video_source::SourceError;

/// Misuse of the orchestrator's control surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline is already running")]
    AlreadyRunning,
    #[error("no detector or render sink is installed")]
    ComponentsUnavailable,
    #[error("{0} stage panicked and its component was lost")]
    StagePanicked(StageKind),
}

/// Why a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// `stop()` was called.
    Stopped,
    SourceFailed(SourceError),
    StagePanicked(StageKind),
}

impl TerminationReason {
    pub fn code(&self) -> &'static str {
        match self {
            TerminationReason::Stopped => "stopped",
            TerminationReason::SourceFailed(e) => e.code(),
            TerminationReason::StagePanicked(_) => "stage_panicked",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, TerminationReason::Stopped)
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Stopped => write!(f, "stopped on request"),
            TerminationReason::SourceFailed(e) => write!(f, "{e}"),
            TerminationReason::StagePanicked(kind) => write!(f, "{kind} stage panicked"),
        }
    }
}
