//! Stage 4: generate the prioritized test plan from the PRD context and
//! design summary, plus its markdown rendition for review.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::artifacts::schema::{PrdContextEnvelope, TestPlanEnvelope};
use crate::artifacts::{ArtifactKind, ArtifactValue};
use crate::clients::{GenerativeClient, ResponseSchema, RetryPolicy, with_retry};
use crate::prompts;
use crate::render::render_test_plan;

use super::{NO_DESIGN_SENTINEL, StageContext, StageDef, StageError, StageTransform, STAGES};

/// Replaces the sentinel design summary so the planner prompt gives the
/// model usable direction instead of an internal marker.
const NO_DESIGN_GUIDANCE: &str =
    "No UI design information available. Focus on functional testing based on the PRD requirements.";

pub struct GeneratePlan {
    generative: Arc<dyn GenerativeClient>,
    retry: RetryPolicy,
}

impl GeneratePlan {
    pub fn new(generative: Arc<dyn GenerativeClient>, retry: RetryPolicy) -> Self {
        GeneratePlan { generative, retry }
    }
}

#[async_trait]
impl StageTransform for GeneratePlan {
    fn def(&self) -> &'static StageDef {
        &STAGES[3]
    }

    #[instrument(skip_all, fields(session = %ctx.session.id))]
    async fn run(
        &self,
        ctx: &StageContext<'_>,
        inputs: &[ArtifactValue],
    ) -> Result<Vec<(ArtifactKind, ArtifactValue)>, StageError> {
        let context_value = inputs
            .first()
            .and_then(ArtifactValue::as_structured)
            .ok_or(StageError::MissingInput {
                kind: ArtifactKind::PrdContext,
            })?;
        let envelope: PrdContextEnvelope = serde_json::from_value(context_value.clone())
            .map_err(|source| StageError::Schema { source })?;
        let context = envelope.prd_context;

        let summary = inputs
            .get(1)
            .and_then(ArtifactValue::as_text)
            .ok_or(StageError::MissingInput {
                kind: ArtifactKind::DesignSummary,
            })?;
        let design_summary = if summary.trim().is_empty() || summary == NO_DESIGN_SENTINEL {
            NO_DESIGN_GUIDANCE
        } else {
            summary
        };

        let user_stories = context.core_user_stories.join("\n- ");
        let tech_specs = serde_json::to_string_pretty(&context.technical_specifications)
            .map_err(|source| StageError::Schema { source })?;
        let notes = serde_json::to_string_pretty(&context.other_contextual_data)
            .map_err(|source| StageError::Schema { source })?;
        let prompt = prompts::fill(
            prompts::TEST_PLANNER,
            &[
                ("project_name", &context.project_name),
                ("target_feature", &context.target_feature_summary),
                ("core_user_stories", &user_stories),
                ("tech_specs", &tech_specs),
                ("design_summary", design_summary),
                ("additional_notes", &notes),
            ],
        );

        let value = with_retry(&self.retry, self.def().name, || {
            self.generative
                .generate_structured(&prompt, ResponseSchema::TestPlan)
        })
        .await?;
        let plan_envelope: TestPlanEnvelope = serde_json::from_value(value.clone())
            .map_err(|source| StageError::Schema { source })?;

        // The markdown rendition is written alongside the structured plan so
        // the review artifact exists before any checkpoint looks for it.
        let markdown = render_test_plan(&plan_envelope.test_plan);
        Ok(vec![
            (ArtifactKind::TestPlan, ArtifactValue::Structured(value)),
            (ArtifactKind::TestPlanMarkdown, ArtifactValue::Text(markdown)),
        ])
    }
}
