//! Stage 1: extract structured test-planning context from the PRD text.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::artifacts::{ArtifactKind, ArtifactValue, schema};
use crate::clients::{GenerativeClient, ResponseSchema, RetryPolicy, with_retry};
use crate::prompts;

use super::{StageContext, StageDef, StageError, StageTransform, STAGES};

pub struct ExtractContext {
    generative: Arc<dyn GenerativeClient>,
    retry: RetryPolicy,
}

impl ExtractContext {
    pub fn new(generative: Arc<dyn GenerativeClient>, retry: RetryPolicy) -> Self {
        ExtractContext { generative, retry }
    }
}

#[async_trait]
impl StageTransform for ExtractContext {
    fn def(&self) -> &'static StageDef {
        &STAGES[0]
    }

    #[instrument(skip_all, fields(session = %ctx.session.id))]
    async fn run(
        &self,
        ctx: &StageContext<'_>,
        _inputs: &[ArtifactValue],
    ) -> Result<Vec<(ArtifactKind, ArtifactValue)>, StageError> {
        if ctx.prd_text.trim().is_empty() {
            return Err(StageError::EmptyDocument);
        }

        let prompt = prompts::fill(prompts::PRD_READER, &[("prd_content", ctx.prd_text)]);
        let value = with_retry(&self.retry, self.def().name, || {
            self.generative
                .generate_structured(&prompt, ResponseSchema::PrdContext)
        })
        .await?;

        schema::validate(ArtifactKind::PrdContext, &value)
            .map_err(|source| StageError::Schema { source })?;
        Ok(vec![(
            ArtifactKind::PrdContext,
            ArtifactValue::Structured(value),
        )])
    }
}
