//! Persisted session state and the session store.
//!
//! A session tracks how far a pipeline run has advanced, which artifacts
//! exist so far, and the modes fixed at creation. The record is saved to
//! `session.json` inside the session directory *after* the stage's artifact
//! files land on disk, so a crash between the two can never leave
//! `current_stage` pointing past an artifact that does not exist. `load`
//! verifies that every file the manifest references is actually present and
//! refuses to resume otherwise.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::instrument;
use uuid::Uuid;

use crate::artifacts::FsArtifactStore;
use crate::error::FailureClass;

/// File name of the session record inside the session directory.
pub const SESSION_FILE: &str = "session.json";

/// File name of the stored PRD source text.
pub const SOURCE_FILE: &str = "prd_source.txt";

/// Opaque session identifier; also the session's directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the pipeline pauses for human review after review-bearing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    /// Run every stage automatically without pausing.
    Trust,
    /// Pause after each review-bearing stage and wait for the caller.
    Checkpoint,
}

/// Which client set the session's transforms call.
///
/// Fixed at session creation and persisted with the record; never inferred
/// from ambient environment state at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Real generative / design-tool clients.
    Live,
    /// Canned mock clients, suitable for demos and tests.
    Mock,
}

/// In-memory session state.
///
/// `current_stage` is the ordinal of the last completed stage (0 = not
/// started) and is monotone non-decreasing for the session's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub review_mode: ReviewMode,
    pub backend_mode: BackendMode,
    pub current_stage: u8,
    /// Design reference URL submitted at start, if any.
    pub design_reference: Option<String>,
    /// Artifact kind (encoded) -> file name present in the session directory.
    pub manifest: FxHashMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Set when an edited display form could not be parsed back into its
    /// structured record; the two representations have diverged.
    pub diverged: bool,
}

impl Session {
    /// Record completion of a stage. Never moves backwards.
    pub fn advance_to(&mut self, stage: u8) {
        self.current_stage = self.current_stage.max(stage);
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("session not found: {0}")]
    #[diagnostic(code(plansmith::session::not_found))]
    NotFound(SessionId),

    #[error("corrupt session state for {session}, cannot resume: {reason}")]
    #[diagnostic(
        code(plansmith::session::corrupt),
        help("The session record references artifacts that are missing or unreadable.")
    )]
    Corrupt { session: SessionId, reason: String },

    #[error("session record serialization failed: {source}")]
    #[diagnostic(code(plansmith::session::serde))]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error("session I/O failed: {source}")]
    #[diagnostic(code(plansmith::session::io))]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl SessionError {
    pub fn class(&self) -> FailureClass {
        match self {
            SessionError::NotFound(_) => FailureClass::NotFound,
            SessionError::Corrupt { .. } => FailureClass::Corrupt,
            SessionError::Serde { .. } => FailureClass::Corrupt,
            SessionError::Io { .. } => FailureClass::Integration,
        }
    }
}

/// Serde-friendly persisted form of [`Session`], decoupled from the
/// in-memory representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSession {
    session_id: String,
    review_mode: ReviewMode,
    backend_mode: BackendMode,
    current_stage: u8,
    #[serde(default)]
    design_reference: Option<String>,
    #[serde(default)]
    manifest: FxHashMap<String, String>,
    /// RFC3339 creation time.
    created_at: String,
    #[serde(default)]
    diverged: bool,
}

impl From<&Session> for PersistedSession {
    fn from(s: &Session) -> Self {
        PersistedSession {
            session_id: s.id.as_str().to_string(),
            review_mode: s.review_mode,
            backend_mode: s.backend_mode,
            current_stage: s.current_stage,
            design_reference: s.design_reference.clone(),
            manifest: s.manifest.clone(),
            created_at: s.created_at.to_rfc3339(),
            diverged: s.diverged,
        }
    }
}

impl From<PersistedSession> for Session {
    fn from(p: PersistedSession) -> Self {
        let created_at = DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Session {
            id: SessionId::from(p.session_id.as_str()),
            review_mode: p.review_mode,
            backend_mode: p.backend_mode,
            current_stage: p.current_stage,
            design_reference: p.design_reference,
            manifest: p.manifest,
            created_at,
            diverged: p.diverged,
        }
    }
}

/// Persistence for session records, sharing the artifact store's root
/// directory layout.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str()).join(SESSION_FILE)
    }

    fn source_path(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str()).join(SOURCE_FILE)
    }

    /// Create a fresh session at stage 0 and persist it, together with the
    /// submitted PRD source text.
    #[instrument(skip(self, prd_text))]
    pub async fn create(
        &self,
        prd_text: &str,
        design_reference: Option<&str>,
        review_mode: ReviewMode,
        backend_mode: BackendMode,
    ) -> Result<Session, SessionError> {
        let session = Session {
            id: SessionId::new(),
            review_mode,
            backend_mode,
            current_stage: 0,
            design_reference: design_reference
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            manifest: FxHashMap::default(),
            created_at: Utc::now(),
            diverged: false,
        };

        fs::create_dir_all(self.root.join(session.id.as_str())).await?;
        fs::write(self.source_path(&session.id), prd_text).await?;
        self.save(&session).await?;
        tracing::info!(session = %session.id, ?review_mode, ?backend_mode, "session created");
        Ok(session)
    }

    /// Persist the session record. Callers must have written the stage's
    /// artifact files first.
    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let persisted = PersistedSession::from(session);
        let mut text = serde_json::to_string_pretty(&persisted)?;
        text.push('\n');
        fs::write(self.record_path(&session.id), text).await?;
        Ok(())
    }

    /// Load a session record, verifying every manifest entry (and the PRD
    /// source) is actually present on disk.
    pub async fn load(
        &self,
        id: &SessionId,
        artifacts: &FsArtifactStore,
    ) -> Result<Session, SessionError> {
        let text = match fs::read_to_string(self.record_path(id)).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let persisted: PersistedSession =
            serde_json::from_str(&text).map_err(|e| SessionError::Corrupt {
                session: id.clone(),
                reason: format!("unreadable session record: {e}"),
            })?;
        let session = Session::from(persisted);

        if !fs::try_exists(self.source_path(id)).await.unwrap_or(false) {
            return Err(SessionError::Corrupt {
                session: id.clone(),
                reason: format!("missing source document {SOURCE_FILE}"),
            });
        }
        for (kind, file) in &session.manifest {
            if !artifacts.file_exists(id, file).await {
                return Err(SessionError::Corrupt {
                    session: id.clone(),
                    reason: format!("manifest references missing artifact {kind} ({file})"),
                });
            }
        }
        Ok(session)
    }

    /// Read the PRD source text stored at session creation.
    pub async fn source_text(&self, id: &SessionId) -> Result<String, SessionError> {
        match fs::read_to_string(self.source_path(id)).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::NotFound(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path());
        let artifacts = FsArtifactStore::new(dir.path());

        let mut session = sessions
            .create(
                "some prd text",
                Some("https://www.figma.com/design/abc123"),
                ReviewMode::Checkpoint,
                BackendMode::Mock,
            )
            .await
            .unwrap();
        session.advance_to(2);
        sessions.save(&session).await.unwrap();

        let loaded = sessions.load(&session.id, &artifacts).await.unwrap();
        assert_eq!(loaded.current_stage, 2);
        assert_eq!(loaded.review_mode, ReviewMode::Checkpoint);
        assert_eq!(loaded.backend_mode, BackendMode::Mock);
        assert_eq!(
            loaded.design_reference.as_deref(),
            Some("https://www.figma.com/design/abc123")
        );
        assert_eq!(
            sessions.source_text(&session.id).await.unwrap(),
            "some prd text"
        );
    }

    #[tokio::test]
    async fn advance_never_moves_backwards() {
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path());
        let mut session = sessions
            .create("text", None, ReviewMode::Trust, BackendMode::Mock)
            .await
            .unwrap();

        session.advance_to(3);
        session.advance_to(1);
        assert_eq!(session.current_stage, 3);
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path());
        let artifacts = FsArtifactStore::new(dir.path());

        let err = sessions
            .load(&SessionId::from("nope"), &artifacts)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn manifest_referencing_missing_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let sessions = SessionStore::new(dir.path());
        let artifacts = FsArtifactStore::new(dir.path());

        let mut session = sessions
            .create("text", None, ReviewMode::Trust, BackendMode::Mock)
            .await
            .unwrap();
        session
            .manifest
            .insert("prd_context".to_string(), "prd_context.json".to_string());
        session.advance_to(1);
        sessions.save(&session).await.unwrap();

        let err = sessions.load(&session.id, &artifacts).await.unwrap_err();
        assert!(matches!(err, SessionError::Corrupt { .. }));
        assert_eq!(err.class(), FailureClass::Corrupt);
    }
}
