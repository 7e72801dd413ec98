//! Pipeline orchestration: drives sessions through the stage sequence,
//! pauses at review checkpoints, and reconciles human edits.

mod orchestrator;

pub use orchestrator::Pipeline;

use miette::Diagnostic;
use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::error::FailureClass;
use crate::session::SessionError;
use crate::stages::{StageDef, StageError};

/// A caller's response at a review checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditSubmission {
    /// Accept the artifact as generated.
    Skip,
    /// Replace the artifact with the edited content.
    Content(String),
}

/// What one pipeline step produced.
#[derive(Debug)]
pub enum StepOutcome {
    /// A stage ran without pausing.
    Ran(&'static StageDef),
    /// A stage ran and the session is now paused for review.
    Review(ReviewRecord),
    /// All stages have completed.
    Complete,
}

/// The reviewable content at a checkpoint, in the form a human edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRecord {
    /// 1-based checkpoint number.
    pub checkpoint: u8,
    /// Name of the stage under review.
    pub stage: &'static str,
    /// Review label shown to the caller ("Context Review", ...).
    pub content_type: &'static str,
    /// Editable content: pretty JSON for structured artifacts, the markdown
    /// rendition for the test plan, raw text otherwise.
    pub content: String,
    /// Baseline for diffing an edit against: the canonical form of the
    /// artifact under review (for the test plan, the structured record
    /// behind the markdown).
    pub original_content: String,
    /// Whether this session's display and structured forms have diverged.
    pub diverged: bool,
}

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("stage {stage} failed: {source}")]
    #[diagnostic(
        code(plansmith::pipeline::stage),
        help("Completed artifacts are intact; advance the session again to retry from this stage.")
    )]
    Stage {
        stage: &'static str,
        #[source]
        source: StageError,
    },

    #[error("session requires live clients but none are configured")]
    #[diagnostic(
        code(plansmith::pipeline::live_unavailable),
        help("Construct the pipeline with `with_live_clients`, or create the session in mock mode.")
    )]
    LiveClientsUnavailable,

    #[error("edit at checkpoint {checkpoint} rejected: {reason}")]
    #[diagnostic(code(plansmith::pipeline::invalid_edit))]
    InvalidEdit { checkpoint: u8, reason: String },

    #[error("checkpoint {checkpoint} is not awaiting review (session is at stage {current})")]
    #[diagnostic(code(plansmith::pipeline::not_reviewable))]
    NotReviewable { checkpoint: u8, current: u8 },

    #[error("checkpoint {checkpoint} has not been reached yet")]
    #[diagnostic(code(plansmith::pipeline::checkpoint_not_reached))]
    CheckpointNotReached { checkpoint: u8 },

    #[error("unknown checkpoint number {checkpoint}")]
    #[diagnostic(code(plansmith::pipeline::unknown_checkpoint))]
    UnknownCheckpoint { checkpoint: u8 },
}

impl PipelineError {
    pub fn class(&self) -> FailureClass {
        match self {
            PipelineError::Session(e) => e.class(),
            PipelineError::Artifact(e) => e.class(),
            PipelineError::Stage { source, .. } => source.class(),
            PipelineError::LiveClientsUnavailable => FailureClass::Integration,
            PipelineError::InvalidEdit { .. }
            | PipelineError::NotReviewable { .. }
            | PipelineError::UnknownCheckpoint { .. } => FailureClass::Validation,
            PipelineError::CheckpointNotReached { .. } => FailureClass::NotFound,
        }
    }
}
