//! Filesystem-backed artifact store.
//!
//! One directory per session, one file per artifact kind. Writes are
//! whole-file overwrites; the artifact on disk is always the latest complete
//! value for its stage. Structured artifacts are validated against their
//! schema record before anything touches disk.

use std::path::PathBuf;

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tracing::instrument;

use crate::error::FailureClass;
use crate::session::SessionId;

use super::{schema, ArtifactKind, ArtifactValue};

#[derive(Debug, Error, Diagnostic)]
pub enum ArtifactError {
    #[error("artifact {kind} not found for session {session}")]
    #[diagnostic(
        code(plansmith::artifacts::not_found),
        help("The producing stage has not run yet, or the session directory was removed.")
    )]
    NotFound { session: SessionId, kind: ArtifactKind },

    #[error("artifact {kind} does not conform to its schema: {source}")]
    #[diagnostic(
        code(plansmith::artifacts::schema),
        help("Structured artifacts must parse into their stage's record before being written.")
    )]
    Schema {
        kind: ArtifactKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact {kind} on disk is not valid JSON: {source}")]
    #[diagnostic(code(plansmith::artifacts::corrupt))]
    Corrupt {
        kind: ArtifactKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact I/O failed: {source}")]
    #[diagnostic(code(plansmith::artifacts::io))]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub fn class(&self) -> FailureClass {
        match self {
            ArtifactError::NotFound { .. } => FailureClass::NotFound,
            ArtifactError::Schema { .. } => FailureClass::Validation,
            ArtifactError::Corrupt { .. } => FailureClass::Corrupt,
            ArtifactError::Io { .. } => FailureClass::Integration,
        }
    }
}

/// Artifact store rooted at an output directory, one subdirectory per
/// session.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory owned by the given session.
    #[must_use]
    pub fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.as_str())
    }

    fn artifact_path(&self, session: &SessionId, kind: ArtifactKind) -> PathBuf {
        self.session_dir(session).join(kind.file_name())
    }

    /// Write an artifact, replacing any previous value.
    ///
    /// Structured values are schema-validated first and serialized with
    /// stable key order (the record's field order), so identical records
    /// always produce identical bytes.
    #[instrument(skip(self, value), fields(session = %session, artifact = %kind))]
    pub async fn write(
        &self,
        session: &SessionId,
        kind: ArtifactKind,
        value: &ArtifactValue,
    ) -> Result<(), ArtifactError> {
        let bytes = match value {
            ArtifactValue::Structured(v) => {
                schema::validate(kind, v)
                    .map_err(|source| ArtifactError::Schema { kind, source })?;
                let canonical = canonicalize(kind, v);
                let mut text = serde_json::to_string_pretty(&canonical)
                    .map_err(|source| ArtifactError::Schema { kind, source })?;
                text.push('\n');
                text.into_bytes()
            }
            ArtifactValue::Text(s) => s.clone().into_bytes(),
        };

        fs::create_dir_all(self.session_dir(session)).await?;
        fs::write(self.artifact_path(session, kind), bytes).await?;
        tracing::debug!(artifact = %kind, "artifact written");
        Ok(())
    }

    /// Read an artifact back in its natural form.
    pub async fn read(
        &self,
        session: &SessionId,
        kind: ArtifactKind,
    ) -> Result<ArtifactValue, ArtifactError> {
        let path = self.artifact_path(session, kind);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound {
                    session: session.clone(),
                    kind,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if kind.is_structured() {
            let value: Value = serde_json::from_str(&text)
                .map_err(|source| ArtifactError::Corrupt { kind, source })?;
            Ok(ArtifactValue::Structured(value))
        } else {
            Ok(ArtifactValue::Text(text))
        }
    }

    /// Read the raw bytes of an artifact (for downloads).
    pub async fn read_bytes(
        &self,
        session: &SessionId,
        kind: ArtifactKind,
    ) -> Result<Vec<u8>, ArtifactError> {
        match fs::read(self.artifact_path(session, kind)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ArtifactError::NotFound {
                session: session.clone(),
                kind,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the artifact file exists on disk.
    pub async fn exists(&self, session: &SessionId, kind: ArtifactKind) -> bool {
        fs::try_exists(self.artifact_path(session, kind))
            .await
            .unwrap_or(false)
    }

    /// Check that a file recorded in a session manifest is present.
    pub async fn file_exists(&self, session: &SessionId, file_name: &str) -> bool {
        fs::try_exists(self.session_dir(session).join(file_name))
            .await
            .unwrap_or(false)
    }
}

/// Re-serialize through the typed record so field order (and therefore byte
/// output) is stable regardless of how the value was produced.
fn canonicalize(kind: ArtifactKind, value: &Value) -> Value {
    let reserialized = match kind {
        ArtifactKind::PrdContext => serde_json::from_value::<schema::PrdContextEnvelope>(
            value.clone(),
        )
        .ok()
        .and_then(|r| serde_json::to_value(r).ok()),
        ArtifactKind::DesignData => serde_json::from_value::<schema::DesignSnapshot>(value.clone())
            .ok()
            .and_then(|r| serde_json::to_value(r).ok()),
        ArtifactKind::TestPlan => serde_json::from_value::<schema::TestPlanEnvelope>(value.clone())
            .ok()
            .and_then(|r| serde_json::to_value(r).ok()),
        ArtifactKind::TestSuite => serde_json::from_value::<schema::TestSuite>(value.clone())
            .ok()
            .and_then(|r| serde_json::to_value(r).ok()),
        _ => None,
    };
    reserialized.unwrap_or_else(|| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::schema::PrdContextEnvelope;
    use serde_json::json;
    use tempfile::tempdir;

    fn sid() -> SessionId {
        SessionId::new()
    }

    #[tokio::test]
    async fn write_read_round_trip() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let session = sid();

        let value = serde_json::to_value(PrdContextEnvelope::sample()).unwrap();
        store
            .write(
                &session,
                ArtifactKind::PrdContext,
                &ArtifactValue::Structured(value.clone()),
            )
            .await
            .unwrap();

        assert!(store.exists(&session, ArtifactKind::PrdContext).await);
        let back = store.read(&session, ArtifactKind::PrdContext).await.unwrap();
        assert_eq!(back.as_structured(), Some(&value));
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let session = sid();

        let err = store
            .read(&session, ArtifactKind::TestPlan)
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }));
        assert_eq!(err.class(), crate::error::FailureClass::NotFound);
    }

    #[tokio::test]
    async fn malformed_structured_write_is_rejected() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let session = sid();

        let err = store
            .write(
                &session,
                ArtifactKind::TestPlan,
                &ArtifactValue::Structured(json!({"not": "a plan"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Schema { .. }));
        assert!(!store.exists(&session, ArtifactKind::TestPlan).await);
    }

    #[tokio::test]
    async fn writes_are_whole_file_overwrites() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let session = sid();

        store
            .write(
                &session,
                ArtifactKind::DesignSummary,
                &ArtifactValue::Text("first".to_string()),
            )
            .await
            .unwrap();
        store
            .write(
                &session,
                ArtifactKind::DesignSummary,
                &ArtifactValue::Text("second".to_string()),
            )
            .await
            .unwrap();

        let back = store
            .read(&session, ArtifactKind::DesignSummary)
            .await
            .unwrap();
        assert_eq!(back.as_text(), Some("second"));
    }
}
