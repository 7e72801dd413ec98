//! Stage 2: fetch the referenced design file and keep its test-relevant
//! components.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::artifacts::schema::DesignSnapshot;
use crate::artifacts::{ArtifactKind, ArtifactValue};
use crate::clients::design::{DesignClient, file_key_from_url, filter_components};

use super::{StageContext, StageDef, StageError, StageTransform, STAGES};

pub struct ParseDesign {
    design: Arc<dyn DesignClient>,
}

impl ParseDesign {
    pub fn new(design: Arc<dyn DesignClient>) -> Self {
        ParseDesign { design }
    }
}

#[async_trait]
impl StageTransform for ParseDesign {
    fn def(&self) -> &'static StageDef {
        &STAGES[1]
    }

    #[instrument(skip_all, fields(session = %ctx.session.id))]
    async fn run(
        &self,
        ctx: &StageContext<'_>,
        _inputs: &[ArtifactValue],
    ) -> Result<Vec<(ArtifactKind, ArtifactValue)>, StageError> {
        // No design reference is a supported configuration, not an error:
        // the snapshot is simply empty and downstream stages fall back to
        // PRD-only planning.
        let snapshot = match ctx.session.design_reference.as_deref() {
            None => DesignSnapshot::default(),
            Some(url) => {
                let key = file_key_from_url(url)?;
                let file = self.design.fetch_file(&key).await?;
                let components = filter_components(&file);
                tracing::debug!(kept = components.len(), "design components filtered");
                DesignSnapshot { components }
            }
        };

        let value =
            serde_json::to_value(&snapshot).map_err(|source| StageError::Schema { source })?;
        Ok(vec![(
            ArtifactKind::DesignData,
            ArtifactValue::Structured(value),
        )])
    }
}
