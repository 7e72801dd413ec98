//! Stage 6: produce the final test-plan markdown.
//!
//! Normally a re-render of the structured plan. When a reviewer's edit
//! could not be parsed back (the session is diverged), the edited text is
//! authoritative and passes through unchanged.

use async_trait::async_trait;
use tracing::instrument;

use crate::artifacts::schema::TestPlanEnvelope;
use crate::artifacts::{ArtifactKind, ArtifactValue};
use crate::render::render_test_plan;

use super::{StageContext, StageDef, StageError, StageTransform, STAGES};

pub struct RenderPlan;

#[async_trait]
impl StageTransform for RenderPlan {
    fn def(&self) -> &'static StageDef {
        &STAGES[5]
    }

    #[instrument(skip_all, fields(session = %ctx.session.id, diverged = ctx.session.diverged))]
    async fn run(
        &self,
        ctx: &StageContext<'_>,
        inputs: &[ArtifactValue],
    ) -> Result<Vec<(ArtifactKind, ArtifactValue)>, StageError> {
        if ctx.session.diverged {
            let existing = inputs
                .get(1)
                .and_then(ArtifactValue::as_text)
                .ok_or(StageError::MissingInput {
                    kind: ArtifactKind::TestPlanMarkdown,
                })?;
            return Ok(vec![(
                ArtifactKind::TestPlanMarkdown,
                ArtifactValue::Text(existing.to_string()),
            )]);
        }

        let plan_value = inputs
            .first()
            .and_then(ArtifactValue::as_structured)
            .ok_or(StageError::MissingInput {
                kind: ArtifactKind::TestPlan,
            })?;
        let envelope: TestPlanEnvelope = serde_json::from_value(plan_value.clone())
            .map_err(|source| StageError::Schema { source })?;

        let markdown = render_test_plan(&envelope.test_plan);
        Ok(vec![(
            ArtifactKind::TestPlanMarkdown,
            ArtifactValue::Text(markdown),
        )])
    }
}
