//! Stage 5: detailed per-case test generation.
//!
//! Disabled in the stage table; emits the placeholder suite so the artifact
//! set is complete and the stage can be re-enabled without a data-model
//! change.

use async_trait::async_trait;

use crate::artifacts::schema::TestSuite;
use crate::artifacts::{ArtifactKind, ArtifactValue};
use crate::render::render_test_suite;

use super::{StageContext, StageDef, StageError, StageTransform, STAGES};

pub struct DetailTests;

#[async_trait]
impl StageTransform for DetailTests {
    fn def(&self) -> &'static StageDef {
        &STAGES[4]
    }

    async fn run(
        &self,
        _ctx: &StageContext<'_>,
        _inputs: &[ArtifactValue],
    ) -> Result<Vec<(ArtifactKind, ArtifactValue)>, StageError> {
        let suite = TestSuite::placeholder();
        let markdown = render_test_suite(&suite);
        let value =
            serde_json::to_value(&suite).map_err(|source| StageError::Schema { source })?;
        Ok(vec![
            (ArtifactKind::TestSuite, ArtifactValue::Structured(value)),
            (
                ArtifactKind::TestSuiteMarkdown,
                ArtifactValue::Text(markdown),
            ),
        ])
    }
}
