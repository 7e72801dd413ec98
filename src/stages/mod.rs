//! The stage table and the transform trait each stage implements.
//!
//! The pipeline is a fixed linear sequence of stages. Each stage declares
//! its input artifacts, its primary output, and whether a checkpoint review
//! sits after it. Stage ordinals are 1-based; a session's `current_stage`
//! records the highest ordinal whose outputs are on disk, with 0 meaning
//! nothing has run.

mod detail_tests;
mod extract_context;
mod generate_plan;
mod parse_design;
mod render_plan;
mod summarize_design;

pub use detail_tests::DetailTests;
pub use extract_context::ExtractContext;
pub use generate_plan::GeneratePlan;
pub use parse_design::ParseDesign;
pub use render_plan::RenderPlan;
pub use summarize_design::SummarizeDesign;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::artifacts::{ArtifactKind, ArtifactValue};
use crate::clients::{ClientSet, DesignError, GenerativeError, RetryPolicy};
use crate::error::FailureClass;
use crate::session::Session;

/// Summary text recorded when a session has no design reference.
pub const NO_DESIGN_SENTINEL: &str = "No design data provided";

/// Identity of a stage in the fixed sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    ExtractContext,
    ParseDesign,
    SummarizeDesign,
    GeneratePlan,
    DetailTests,
    RenderPlan,
}

/// Static description of one stage.
#[derive(Debug)]
pub struct StageDef {
    pub id: StageId,
    pub name: &'static str,
    pub ordinal: u8,
    pub inputs: &'static [ArtifactKind],
    /// The artifact a reviewer sees (and edits) at this stage's checkpoint.
    pub output: ArtifactKind,
    /// Review label, present only on reviewable stages.
    pub review: Option<&'static str>,
    /// Disabled stages still run, producing their placeholder output.
    pub enabled: bool,
}

/// The pipeline's stage sequence, in execution order.
pub static STAGES: [StageDef; 6] = [
    StageDef {
        id: StageId::ExtractContext,
        name: "extract-context",
        ordinal: 1,
        inputs: &[],
        output: ArtifactKind::PrdContext,
        review: Some("Context Review"),
        enabled: true,
    },
    StageDef {
        id: StageId::ParseDesign,
        name: "parse-design",
        ordinal: 2,
        inputs: &[],
        output: ArtifactKind::DesignData,
        review: None,
        enabled: true,
    },
    StageDef {
        id: StageId::SummarizeDesign,
        name: "summarize-design",
        ordinal: 3,
        inputs: &[ArtifactKind::DesignData],
        output: ArtifactKind::DesignSummary,
        review: Some("Design Summary Review"),
        enabled: true,
    },
    StageDef {
        id: StageId::GeneratePlan,
        name: "generate-plan",
        ordinal: 4,
        inputs: &[ArtifactKind::PrdContext, ArtifactKind::DesignSummary],
        output: ArtifactKind::TestPlan,
        review: Some("Test Plan Review"),
        enabled: true,
    },
    StageDef {
        id: StageId::DetailTests,
        name: "detail-tests",
        ordinal: 5,
        inputs: &[ArtifactKind::TestPlan],
        output: ArtifactKind::TestSuite,
        review: None,
        enabled: false,
    },
    StageDef {
        id: StageId::RenderPlan,
        name: "render-plan",
        ordinal: 6,
        inputs: &[ArtifactKind::TestPlan, ArtifactKind::TestPlanMarkdown],
        output: ArtifactKind::TestPlanMarkdown,
        review: None,
        enabled: true,
    },
];

/// Ordinal of the final stage; a session at this ordinal is complete.
pub const TERMINAL_STAGE: u8 = 6;

/// Reviewable stage ordinals, indexed by checkpoint number minus one.
const CHECKPOINT_ORDINALS: [u8; 3] = [1, 3, 4];

/// Number of review checkpoints in the sequence.
pub const CHECKPOINT_COUNT: u8 = 3;

/// The stage with the given 1-based ordinal.
#[must_use]
pub fn stage_at(ordinal: u8) -> Option<&'static StageDef> {
    STAGES.get(usize::from(ordinal).checked_sub(1)?)
}

/// Stage ordinal a 1-based checkpoint number reviews.
#[must_use]
pub fn checkpoint_stage(checkpoint: u8) -> Option<&'static StageDef> {
    let ordinal = *CHECKPOINT_ORDINALS.get(usize::from(checkpoint).checked_sub(1)?)?;
    stage_at(ordinal)
}

/// Checkpoint number for a reviewable stage ordinal.
#[must_use]
pub fn checkpoint_for(ordinal: u8) -> Option<u8> {
    CHECKPOINT_ORDINALS
        .iter()
        .position(|&o| o == ordinal)
        .map(|i| i as u8 + 1)
}

#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Generative(#[from] GenerativeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Design(#[from] DesignError),

    #[error("required input artifact {kind} was not provided")]
    #[diagnostic(code(plansmith::stages::missing_input))]
    MissingInput { kind: ArtifactKind },

    #[error("stage output does not match its artifact schema: {source}")]
    #[diagnostic(
        code(plansmith::stages::schema),
        help("The generative response parsed as JSON but not as the expected record.")
    )]
    Schema {
        #[source]
        source: serde_json::Error,
    },

    #[error("source document is empty")]
    #[diagnostic(code(plansmith::stages::empty_document))]
    EmptyDocument,
}

impl StageError {
    pub fn class(&self) -> FailureClass {
        match self {
            StageError::Generative(e) => e.class(),
            StageError::Design(e) => e.class(),
            StageError::MissingInput { .. } => FailureClass::NotFound,
            StageError::Schema { .. } | StageError::EmptyDocument => FailureClass::Validation,
        }
    }
}

/// Per-run context handed to a transform alongside its input artifacts.
pub struct StageContext<'a> {
    pub session: &'a Session,
    pub prd_text: &'a str,
}

/// One stage's work: consume the declared inputs, produce one or more
/// artifacts. The first returned artifact must be the stage's declared
/// primary output.
#[async_trait]
pub trait StageTransform: Send + Sync {
    fn def(&self) -> &'static StageDef;

    async fn run(
        &self,
        ctx: &StageContext<'_>,
        inputs: &[ArtifactValue],
    ) -> Result<Vec<(ArtifactKind, ArtifactValue)>, StageError>;
}

/// Construct the transform for a stage, wired to the given clients.
#[must_use]
pub fn build_transform(
    def: &'static StageDef,
    clients: &ClientSet,
    retry: &RetryPolicy,
) -> Box<dyn StageTransform> {
    match def.id {
        StageId::ExtractContext => Box::new(ExtractContext::new(
            clients.generative.clone(),
            retry.clone(),
        )),
        StageId::ParseDesign => Box::new(ParseDesign::new(clients.design.clone())),
        StageId::SummarizeDesign => Box::new(SummarizeDesign::new(
            clients.generative.clone(),
            retry.clone(),
        )),
        StageId::GeneratePlan => Box::new(GeneratePlan::new(
            clients.generative.clone(),
            retry.clone(),
        )),
        StageId::DetailTests => Box::new(DetailTests),
        StageId::RenderPlan => Box::new(RenderPlan),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_match_table_positions() {
        for (index, stage) in STAGES.iter().enumerate() {
            assert_eq!(usize::from(stage.ordinal), index + 1);
            assert!(std::ptr::eq(stage_at(stage.ordinal).unwrap(), stage));
        }
        assert_eq!(STAGES.last().map(|s| s.ordinal), Some(TERMINAL_STAGE));
    }

    #[test]
    fn checkpoints_cover_exactly_the_reviewable_stages() {
        let reviewable: Vec<u8> = STAGES
            .iter()
            .filter(|s| s.review.is_some())
            .map(|s| s.ordinal)
            .collect();
        assert_eq!(reviewable, CHECKPOINT_ORDINALS);

        for checkpoint in 1..=CHECKPOINT_COUNT {
            let stage = checkpoint_stage(checkpoint).unwrap();
            assert_eq!(checkpoint_for(stage.ordinal), Some(checkpoint));
        }
        assert!(checkpoint_stage(0).is_none());
        assert!(checkpoint_stage(4).is_none());
    }

    #[test]
    fn detail_tests_is_the_only_disabled_stage() {
        let disabled: Vec<_> = STAGES.iter().filter(|s| !s.enabled).map(|s| s.name).collect();
        assert_eq!(disabled, vec!["detail-tests"]);
    }
}
