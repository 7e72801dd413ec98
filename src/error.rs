//! Failure classification shared across the crate's error types.
//!
//! Each module defines its own `thiserror` enum (store, session, stage,
//! pipeline); this module provides the coarse taxonomy callers see at the
//! operation surface. Every error type exposes a `class()` method mapping it
//! into one of these categories.

use std::fmt;

/// Coarse category reported alongside an error at the session boundary.
///
/// - `Validation`: malformed input document, malformed human edit, or a
///   schema mismatch in generated output.
/// - `NotFound`: missing session, artifact, stage, or checkpoint.
/// - `Transient`: rate limit or timeout from an external call. Retried
///   internally with backoff; only surfaced once retries are exhausted.
/// - `Integration`: a downstream collaborator (tracker, design tool) failed
///   in a non-retryable way.
/// - `Corrupt`: persisted session state references artifacts that are not on
///   disk, or an artifact no longer parses. The session cannot be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Validation,
    NotFound,
    Transient,
    Integration,
    Corrupt,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureClass::Validation => "validation",
            FailureClass::NotFound => "not found",
            FailureClass::Transient => "transient",
            FailureClass::Integration => "integration",
            FailureClass::Corrupt => "corrupt",
        };
        f.write_str(label)
    }
}
