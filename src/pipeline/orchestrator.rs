//! The pipeline driver.
//!
//! Each step reads the next stage's inputs from disk, runs the transform,
//! writes its outputs, and only then advances and saves the session record.
//! A failed stage therefore leaves `current_stage` untouched and every
//! completed artifact on disk; advancing the session again retries exactly
//! the failed stage.
//!
//! A single session must not be driven concurrently: steps assume they are
//! the only writer of the session directory. Distinct sessions are
//! independent.

use std::path::Path;

use tracing::instrument;

use crate::artifacts::{ArtifactKind, ArtifactValue, FsArtifactStore, TestPlanEnvelope, schema};
use crate::clients::{ClientSet, RetryPolicy};
use crate::render::{parse_test_plan_markdown, render_test_plan};
use crate::session::{BackendMode, ReviewMode, Session, SessionId, SessionStore};
use crate::stages::{
    StageContext, StageDef, StageId, TERMINAL_STAGE, build_transform, checkpoint_for,
    checkpoint_stage, stage_at,
};

use super::{EditSubmission, PipelineError, ReviewRecord, StepOutcome};

/// Drives sessions through the stage sequence against a shared output root.
pub struct Pipeline {
    artifacts: FsArtifactStore,
    sessions: SessionStore,
    mock: ClientSet,
    live: Option<ClientSet>,
    retry: RetryPolicy,
}

impl Pipeline {
    /// Pipeline rooted at an output directory, mock clients only.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Pipeline {
            artifacts: FsArtifactStore::new(root),
            sessions: SessionStore::new(root),
            mock: ClientSet::mock(),
            live: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Provide the client set used by sessions created in live mode.
    #[must_use]
    pub fn with_live_clients(mut self, clients: ClientSet) -> Self {
        self.live = Some(clients);
        self
    }

    /// Replace the mock client set (used by tests to inject failures).
    #[must_use]
    pub fn with_mock_clients(mut self, clients: ClientSet) -> Self {
        self.mock = clients;
        self
    }

    /// Override the retry policy for generative calls.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn artifacts(&self) -> &FsArtifactStore {
        &self.artifacts
    }

    /// Create and persist a new session at stage 0.
    pub async fn create_session(
        &self,
        prd_text: &str,
        design_reference: Option<&str>,
        review_mode: ReviewMode,
        backend_mode: BackendMode,
    ) -> Result<Session, PipelineError> {
        Ok(self
            .sessions
            .create(prd_text, design_reference, review_mode, backend_mode)
            .await?)
    }

    /// Load a session from disk, verifying its artifacts are intact.
    pub async fn load_session(&self, id: &SessionId) -> Result<Session, PipelineError> {
        Ok(self.sessions.load(id, &self.artifacts).await?)
    }

    fn clients_for(&self, session: &Session) -> Result<&ClientSet, PipelineError> {
        match session.backend_mode {
            BackendMode::Mock => Ok(&self.mock),
            BackendMode::Live => self.live.as_ref().ok_or(PipelineError::LiveClientsUnavailable),
        }
    }

    /// Run exactly the next stage.
    ///
    /// In checkpoint mode, a review-bearing stage pauses the session and
    /// returns the review record; in trust mode every stage just runs.
    #[instrument(skip(self, session), fields(session = %session.id, stage = session.current_stage + 1))]
    pub async fn advance_one(
        &self,
        session: &mut Session,
    ) -> Result<StepOutcome, PipelineError> {
        if session.current_stage >= TERMINAL_STAGE {
            return Ok(StepOutcome::Complete);
        }
        let Some(def) = stage_at(session.current_stage + 1) else {
            return Ok(StepOutcome::Complete);
        };

        self.run_stage(session, def).await?;

        if session.review_mode == ReviewMode::Checkpoint
            && let Some(checkpoint) = checkpoint_for(def.ordinal)
        {
            let record = self.review_record(session, checkpoint).await?;
            return Ok(StepOutcome::Review(record));
        }
        if session.current_stage >= TERMINAL_STAGE {
            return Ok(StepOutcome::Complete);
        }
        Ok(StepOutcome::Ran(def))
    }

    /// Run stages until the next review pause or completion.
    pub async fn advance_to_review(
        &self,
        session: &mut Session,
    ) -> Result<StepOutcome, PipelineError> {
        loop {
            match self.advance_one(session).await? {
                StepOutcome::Ran(_) => continue,
                outcome => return Ok(outcome),
            }
        }
    }

    /// Run every remaining stage without pausing, regardless of mode.
    pub async fn run_to_completion(&self, session: &mut Session) -> Result<(), PipelineError> {
        while session.current_stage < TERMINAL_STAGE {
            let Some(def) = stage_at(session.current_stage + 1) else {
                break;
            };
            self.run_stage(session, def).await?;
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        session: &mut Session,
        def: &'static StageDef,
    ) -> Result<(), PipelineError> {
        let clients = self.clients_for(session)?;
        let transform = build_transform(def, clients, &self.retry);
        let prd_text = self.sessions.source_text(&session.id).await?;

        let mut inputs = Vec::with_capacity(def.inputs.len());
        for kind in def.inputs {
            inputs.push(self.artifacts.read(&session.id, *kind).await?);
        }

        let outputs = {
            let ctx = StageContext {
                session,
                prd_text: &prd_text,
            };
            transform
                .run(&ctx, &inputs)
                .await
                .map_err(|source| PipelineError::Stage {
                    stage: def.name,
                    source,
                })?
        };

        for (kind, value) in &outputs {
            self.artifacts.write(&session.id, *kind, value).await?;
        }
        for (kind, _) in &outputs {
            session
                .manifest
                .insert(kind.encode().to_string(), kind.file_name().to_string());
        }
        session.advance_to(def.ordinal);
        self.sessions.save(session).await?;
        tracing::info!(session = %session.id, stage = def.name, "stage completed");
        Ok(())
    }

    /// Build the review record for a checkpoint whose stage has run.
    pub async fn review_record(
        &self,
        session: &Session,
        checkpoint: u8,
    ) -> Result<ReviewRecord, PipelineError> {
        let def = checkpoint_stage(checkpoint)
            .ok_or(PipelineError::UnknownCheckpoint { checkpoint })?;
        if session.current_stage < def.ordinal {
            return Err(PipelineError::CheckpointNotReached { checkpoint });
        }
        let content_type = def
            .review
            .ok_or(PipelineError::UnknownCheckpoint { checkpoint })?;

        // The test plan is reviewed through its markdown rendition; the
        // structured record stays available as the diff baseline.
        let display_kind = match def.output {
            ArtifactKind::TestPlan => ArtifactKind::TestPlanMarkdown,
            other => other,
        };
        let content = self.display_form(session, display_kind, checkpoint).await?;
        let original_content = if display_kind == def.output {
            content.clone()
        } else {
            self.display_form(session, def.output, checkpoint).await?
        };

        Ok(ReviewRecord {
            checkpoint,
            stage: def.name,
            content_type,
            content,
            original_content,
            diverged: session.diverged,
        })
    }

    async fn display_form(
        &self,
        session: &Session,
        kind: ArtifactKind,
        checkpoint: u8,
    ) -> Result<String, PipelineError> {
        match self.artifacts.read(&session.id, kind).await? {
            ArtifactValue::Structured(v) => {
                serde_json::to_string_pretty(&v).map_err(|reason| PipelineError::InvalidEdit {
                    checkpoint,
                    reason: reason.to_string(),
                })
            }
            ArtifactValue::Text(s) => Ok(s),
        }
    }

    /// Apply a reviewer's submission at the checkpoint the session is
    /// paused on, persisting the session record afterwards.
    #[instrument(skip(self, session, submission), fields(session = %session.id, checkpoint))]
    pub async fn apply_edit(
        &self,
        session: &mut Session,
        checkpoint: u8,
        submission: &EditSubmission,
    ) -> Result<(), PipelineError> {
        let def = checkpoint_stage(checkpoint)
            .ok_or(PipelineError::UnknownCheckpoint { checkpoint })?;
        if session.current_stage != def.ordinal {
            return Err(PipelineError::NotReviewable {
                checkpoint,
                current: session.current_stage,
            });
        }

        let EditSubmission::Content(text) = submission else {
            return Ok(());
        };
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidEdit {
                checkpoint,
                reason: "edited content is empty".to_string(),
            });
        }

        match def.id {
            StageId::ExtractContext => {
                let value: serde_json::Value =
                    serde_json::from_str(text).map_err(|e| PipelineError::InvalidEdit {
                        checkpoint,
                        reason: format!("not valid JSON: {e}"),
                    })?;
                schema::validate(ArtifactKind::PrdContext, &value).map_err(|e| {
                    PipelineError::InvalidEdit {
                        checkpoint,
                        reason: format!("not a valid PRD context record: {e}"),
                    }
                })?;
                self.artifacts
                    .write(
                        &session.id,
                        ArtifactKind::PrdContext,
                        &ArtifactValue::Structured(value),
                    )
                    .await?;
            }
            StageId::SummarizeDesign => {
                self.artifacts
                    .write(
                        &session.id,
                        ArtifactKind::DesignSummary,
                        &ArtifactValue::Text(text.clone()),
                    )
                    .await?;
            }
            StageId::GeneratePlan => {
                self.apply_plan_edit(session, text).await?;
            }
            _ => {
                return Err(PipelineError::NotReviewable {
                    checkpoint,
                    current: session.current_stage,
                });
            }
        }

        self.sessions.save(session).await?;
        tracing::info!(session = %session.id, checkpoint, "review edit applied");
        Ok(())
    }

    /// Reconcile an edited test-plan document.
    ///
    /// A parseable edit updates both the structured plan and its re-rendered
    /// markdown. An unparseable edit keeps the last valid structured plan,
    /// stores the edited text as the display form, and marks the session
    /// diverged; it never silently falls back to stale content.
    async fn apply_plan_edit(
        &self,
        session: &mut Session,
        text: &str,
    ) -> Result<(), PipelineError> {
        match parse_test_plan_markdown(text) {
            Some(plan) => {
                let envelope = TestPlanEnvelope { test_plan: plan };
                let value = serde_json::to_value(&envelope).map_err(|e| {
                    PipelineError::InvalidEdit {
                        checkpoint: 3,
                        reason: e.to_string(),
                    }
                })?;
                let markdown = render_test_plan(&envelope.test_plan);
                self.artifacts
                    .write(
                        &session.id,
                        ArtifactKind::TestPlan,
                        &ArtifactValue::Structured(value),
                    )
                    .await?;
                self.artifacts
                    .write(
                        &session.id,
                        ArtifactKind::TestPlanMarkdown,
                        &ArtifactValue::Text(markdown),
                    )
                    .await?;
                session.diverged = false;
            }
            None => {
                tracing::warn!(
                    session = %session.id,
                    "edited plan could not be parsed back; keeping structured plan, marking diverged"
                );
                self.artifacts
                    .write(
                        &session.id,
                        ArtifactKind::TestPlanMarkdown,
                        &ArtifactValue::Text(text.to_string()),
                    )
                    .await?;
                session.diverged = true;
            }
        }
        Ok(())
    }

    /// Raw bytes of a finished artifact, for downloads.
    pub async fn artifact_bytes(
        &self,
        id: &SessionId,
        kind: ArtifactKind,
    ) -> Result<Vec<u8>, PipelineError> {
        Ok(self.artifacts.read_bytes(id, kind).await?)
    }

    /// Read one artifact in its natural form.
    pub async fn artifact(
        &self,
        id: &SessionId,
        kind: ArtifactKind,
    ) -> Result<ArtifactValue, PipelineError> {
        Ok(self.artifacts.read(id, kind).await?)
    }
}
