//! Stage 3: summarize the filtered design components as reviewer-facing
//! text.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::artifacts::schema::DesignSnapshot;
use crate::artifacts::{ArtifactKind, ArtifactValue};
use crate::clients::{GenerativeClient, RetryPolicy, with_retry};
use crate::prompts;

use super::{NO_DESIGN_SENTINEL, StageContext, StageDef, StageError, StageTransform, STAGES};

pub struct SummarizeDesign {
    generative: Arc<dyn GenerativeClient>,
    retry: RetryPolicy,
}

impl SummarizeDesign {
    pub fn new(generative: Arc<dyn GenerativeClient>, retry: RetryPolicy) -> Self {
        SummarizeDesign { generative, retry }
    }
}

#[async_trait]
impl StageTransform for SummarizeDesign {
    fn def(&self) -> &'static StageDef {
        &STAGES[2]
    }

    #[instrument(skip_all, fields(session = %ctx.session.id))]
    async fn run(
        &self,
        ctx: &StageContext<'_>,
        inputs: &[ArtifactValue],
    ) -> Result<Vec<(ArtifactKind, ArtifactValue)>, StageError> {
        let snapshot_value = inputs
            .first()
            .and_then(ArtifactValue::as_structured)
            .ok_or(StageError::MissingInput {
                kind: ArtifactKind::DesignData,
            })?;
        let snapshot: DesignSnapshot = serde_json::from_value(snapshot_value.clone())
            .map_err(|source| StageError::Schema { source })?;

        // An empty snapshot gets a sentinel summary; calling the generative
        // service with no components would only produce filler.
        let summary = if snapshot.components.is_empty() {
            NO_DESIGN_SENTINEL.to_string()
        } else {
            let components = serde_json::to_string_pretty(&snapshot.components)
                .map_err(|source| StageError::Schema { source })?;
            let prompt = prompts::fill(
                prompts::DESIGN_SUMMARIZER,
                &[("design_components", &components)],
            );
            with_retry(&self.retry, self.def().name, || {
                self.generative.generate_text(&prompt)
            })
            .await?
        };

        Ok(vec![(
            ArtifactKind::DesignSummary,
            ArtifactValue::Text(summary),
        )])
    }
}
