//! Artifact kinds, per-stage schema records, and the filesystem store.
//!
//! Every pipeline stage produces one or more named artifacts. An artifact is
//! either a structured record (JSON, validated against its stage schema at
//! the store boundary) or raw text. Artifacts are immutable once written,
//! except when a human edit at a checkpoint explicitly overwrites one before
//! the next stage consumes it.

pub mod schema;
pub mod store;

pub use schema::{
    ContextualData, DesignComponent, DesignSnapshot, PrdContext, PrdContextEnvelope, SubFeatureTests,
    TechSpecs, TestCase, TestPlan, TestPlanEnvelope, TestSuite,
};
pub use store::{ArtifactError, FsArtifactStore};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical name of a persisted artifact, with its backing file and form.
///
/// The kind determines the file name inside the session directory and
/// whether the content is a structured record or raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Structured context extracted from the PRD.
    PrdContext,
    /// Filtered interactive components from the design reference.
    DesignData,
    /// Natural-language summary of the design reference.
    DesignSummary,
    /// The structured test plan.
    TestPlan,
    /// Markdown display form derived from the test plan.
    TestPlanMarkdown,
    /// Detailed test suite (currently a placeholder record).
    TestSuite,
    /// Markdown display form of the test suite.
    TestSuiteMarkdown,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::PrdContext,
        ArtifactKind::DesignData,
        ArtifactKind::DesignSummary,
        ArtifactKind::TestPlan,
        ArtifactKind::TestPlanMarkdown,
        ArtifactKind::TestSuite,
        ArtifactKind::TestSuiteMarkdown,
    ];

    /// File name backing this artifact inside the session directory.
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::PrdContext => "prd_context.json",
            ArtifactKind::DesignData => "figma_data.json",
            ArtifactKind::DesignSummary => "figma_summary.txt",
            ArtifactKind::TestPlan => "test_plan.json",
            ArtifactKind::TestPlanMarkdown => "test_plan.md",
            ArtifactKind::TestSuite => "test_suite.json",
            ArtifactKind::TestSuiteMarkdown => "test_suite.md",
        }
    }

    /// Stable string form used as the manifest key in the session record.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            ArtifactKind::PrdContext => "prd_context",
            ArtifactKind::DesignData => "design_data",
            ArtifactKind::DesignSummary => "design_summary",
            ArtifactKind::TestPlan => "test_plan",
            ArtifactKind::TestPlanMarkdown => "test_plan_markdown",
            ArtifactKind::TestSuite => "test_suite",
            ArtifactKind::TestSuiteMarkdown => "test_suite_markdown",
        }
    }

    /// Decode the manifest key back into a kind.
    #[must_use]
    pub fn decode(s: &str) -> Option<ArtifactKind> {
        ArtifactKind::ALL.into_iter().find(|k| k.encode() == s)
    }

    /// Whether this artifact is a structured record validated at write time.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            ArtifactKind::PrdContext
                | ArtifactKind::DesignData
                | ArtifactKind::TestPlan
                | ArtifactKind::TestSuite
        )
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// The content of an artifact: a structured JSON record or raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactValue {
    Structured(serde_json::Value),
    Text(String),
}

impl ArtifactValue {
    /// Borrow the structured record, if this is one.
    #[must_use]
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            ArtifactValue::Structured(v) => Some(v),
            ArtifactValue::Text(_) => None,
        }
    }

    /// Borrow the text content, if this is raw text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArtifactValue::Text(s) => Some(s),
            ArtifactValue::Structured(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_encoding_round_trips() {
        for kind in ArtifactKind::ALL {
            assert_eq!(ArtifactKind::decode(kind.encode()), Some(kind));
        }
        assert_eq!(ArtifactKind::decode("no_such_artifact"), None);
    }

    #[test]
    fn structured_kinds_have_json_files() {
        for kind in ArtifactKind::ALL {
            if kind.is_structured() {
                assert!(kind.file_name().ends_with(".json"), "{kind}");
            }
        }
    }
}
