//! The high-level planning API.
//!
//! [`Planner`] wraps the pipeline with the operations a frontend calls:
//! start a run, inspect and answer review checkpoints, fetch the finished
//! result, download individual artifacts, and push the plan to a tracker.

use serde_json::Value;
use tracing::instrument;

use crate::artifacts::{ArtifactKind, ArtifactValue, TestPlanEnvelope};
use crate::clients::tracker::{TrackerClient, UploadReport, upload_test_plan};
use crate::clients::TrackerError;
use crate::pipeline::{EditSubmission, Pipeline, PipelineError, ReviewRecord, StepOutcome};
use crate::session::{BackendMode, ReviewMode, SessionId};
use crate::stages::StageError;

/// Modes fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    pub review_mode: ReviewMode,
    pub backend_mode: BackendMode,
}

impl StartOptions {
    #[must_use]
    pub fn new(review_mode: ReviewMode, backend_mode: BackendMode) -> Self {
        StartOptions {
            review_mode,
            backend_mode,
        }
    }
}

/// What a checkpoint submission led to.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The run paused again at the next checkpoint.
    Review(ReviewRecord),
    /// The run finished.
    Complete(FinalResult),
}

/// Every artifact of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResult {
    pub prd_context: Value,
    pub design_data: Value,
    pub design_summary: String,
    pub test_plan: Value,
    pub test_plan_markdown: String,
    pub test_suite: Value,
    pub test_suite_markdown: String,
    /// Whether the markdown was hand-edited past the structured plan.
    pub diverged: bool,
}

/// Front door for planning runs.
pub struct Planner {
    pipeline: Pipeline,
}

impl Planner {
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Planner { pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Start a run from PRD text and an optional design URL.
    ///
    /// Trust mode runs to completion before returning; checkpoint mode runs
    /// up to the first review pause. Either way the returned id addresses a
    /// session that is fully resumable from disk.
    #[instrument(skip(self, prd_text))]
    pub async fn start(
        &self,
        prd_text: &str,
        design_reference: Option<&str>,
        options: StartOptions,
    ) -> Result<SessionId, PipelineError> {
        let mut session = self
            .pipeline
            .create_session(
                prd_text,
                design_reference,
                options.review_mode,
                options.backend_mode,
            )
            .await?;

        match options.review_mode {
            ReviewMode::Trust => self.pipeline.run_to_completion(&mut session).await?,
            ReviewMode::Checkpoint => {
                self.pipeline.advance_to_review(&mut session).await?;
            }
        }
        Ok(session.id)
    }

    /// The review content at a checkpoint the session has reached.
    pub async fn get_checkpoint(
        &self,
        id: &SessionId,
        checkpoint: u8,
    ) -> Result<ReviewRecord, PipelineError> {
        let session = self.pipeline.load_session(id).await?;
        self.pipeline.review_record(&session, checkpoint).await
    }

    /// Answer the checkpoint the session is paused on and continue.
    ///
    /// `content` replaces the artifact; `None` (or an explicit skip) accepts
    /// it as generated. The run continues to the next checkpoint or to
    /// completion.
    #[instrument(skip(self, content), fields(session = %id, checkpoint))]
    pub async fn submit_checkpoint(
        &self,
        id: &SessionId,
        checkpoint: u8,
        content: Option<String>,
    ) -> Result<SubmitOutcome, PipelineError> {
        let mut session = self.pipeline.load_session(id).await?;

        let submission = match content {
            Some(text) => EditSubmission::Content(text),
            None => EditSubmission::Skip,
        };
        self.pipeline
            .apply_edit(&mut session, checkpoint, &submission)
            .await?;

        match self.pipeline.advance_to_review(&mut session).await? {
            StepOutcome::Review(record) => Ok(SubmitOutcome::Review(record)),
            StepOutcome::Ran(_) | StepOutcome::Complete => {
                Ok(SubmitOutcome::Complete(self.get_result(id).await?))
            }
        }
    }

    /// Collect every artifact of a finished run.
    pub async fn get_result(&self, id: &SessionId) -> Result<FinalResult, PipelineError> {
        let session = self.pipeline.load_session(id).await?;

        let structured = |value: ArtifactValue, kind: ArtifactKind| match value {
            ArtifactValue::Structured(v) => Ok(v),
            ArtifactValue::Text(_) => Err(PipelineError::Stage {
                stage: "collect-result",
                source: StageError::MissingInput { kind },
            }),
        };
        let text = |value: ArtifactValue, kind: ArtifactKind| match value {
            ArtifactValue::Text(s) => Ok(s),
            ArtifactValue::Structured(_) => Err(PipelineError::Stage {
                stage: "collect-result",
                source: StageError::MissingInput { kind },
            }),
        };

        let prd_context = structured(
            self.pipeline.artifact(id, ArtifactKind::PrdContext).await?,
            ArtifactKind::PrdContext,
        )?;
        let design_data = structured(
            self.pipeline.artifact(id, ArtifactKind::DesignData).await?,
            ArtifactKind::DesignData,
        )?;
        let design_summary = text(
            self.pipeline
                .artifact(id, ArtifactKind::DesignSummary)
                .await?,
            ArtifactKind::DesignSummary,
        )?;
        let test_plan = structured(
            self.pipeline.artifact(id, ArtifactKind::TestPlan).await?,
            ArtifactKind::TestPlan,
        )?;
        let test_plan_markdown = text(
            self.pipeline
                .artifact(id, ArtifactKind::TestPlanMarkdown)
                .await?,
            ArtifactKind::TestPlanMarkdown,
        )?;
        let test_suite = structured(
            self.pipeline.artifact(id, ArtifactKind::TestSuite).await?,
            ArtifactKind::TestSuite,
        )?;
        let test_suite_markdown = text(
            self.pipeline
                .artifact(id, ArtifactKind::TestSuiteMarkdown)
                .await?,
            ArtifactKind::TestSuiteMarkdown,
        )?;

        Ok(FinalResult {
            prd_context,
            design_data,
            design_summary,
            test_plan,
            test_plan_markdown,
            test_suite,
            test_suite_markdown,
            diverged: session.diverged,
        })
    }

    /// Raw bytes of one artifact, suitable for a file download.
    pub async fn download_artifact(
        &self,
        id: &SessionId,
        kind: ArtifactKind,
    ) -> Result<Vec<u8>, PipelineError> {
        self.pipeline.artifact_bytes(id, kind).await
    }

    /// Push the session's structured test plan to a tracker.
    #[instrument(skip(self, tracker), fields(session = %id))]
    pub async fn upload_to_tracker(
        &self,
        id: &SessionId,
        tracker: &dyn TrackerClient,
        project_id: u64,
        suite_id: u64,
    ) -> Result<UploadReport, TrackerError> {
        let value = self
            .pipeline
            .artifact(id, ArtifactKind::TestPlan)
            .await
            .map_err(|e| TrackerError::Api {
                message: format!("test plan unavailable: {e}"),
            })?;
        let envelope: TestPlanEnvelope = match value {
            ArtifactValue::Structured(v) => {
                serde_json::from_value(v).map_err(|e| TrackerError::Api {
                    message: format!("test plan unreadable: {e}"),
                })?
            }
            ArtifactValue::Text(_) => {
                return Err(TrackerError::Api {
                    message: "test plan artifact is not structured".to_string(),
                });
            }
        };
        upload_test_plan(tracker, &envelope.test_plan, project_id, suite_id).await
    }
}
