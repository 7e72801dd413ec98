//! External collaborators behind traits.
//!
//! The pipeline never talks to a network service directly; every external
//! dependency (generative completion, design-tool fetch, document
//! extraction, tracker upload) sits behind a trait with a mock
//! implementation, and the live HTTP implementations are gated behind the
//! `live-clients` feature.

pub mod design;
pub mod document;
pub mod generative;
pub mod tracker;

pub use design::{DesignClient, DesignError, MockDesignClient};
pub use document::{DocumentError, DocumentExtractor, PlainTextExtractor};
pub use generative::{
    GenerativeClient, GenerativeError, MockGenerativeClient, ResponseSchema, RetryPolicy,
    with_retry,
};
pub use tracker::{MockTrackerClient, TrackerClient, TrackerError, UploadReport};

#[cfg(feature = "live-clients")]
pub use design::FigmaClient;
#[cfg(feature = "live-clients")]
pub use generative::GeminiClient;
#[cfg(feature = "live-clients")]
pub use tracker::TestRailClient;

use std::sync::Arc;

/// The client pair a session's transforms call, selected by the session's
/// persisted backend mode.
#[derive(Clone)]
pub struct ClientSet {
    pub generative: Arc<dyn GenerativeClient>,
    pub design: Arc<dyn DesignClient>,
}

impl ClientSet {
    /// Canned clients for offline runs.
    #[must_use]
    pub fn mock() -> Self {
        ClientSet {
            generative: Arc::new(MockGenerativeClient::new()),
            design: Arc::new(MockDesignClient::new()),
        }
    }
}
