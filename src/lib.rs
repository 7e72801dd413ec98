//! # Plansmith: Staged PRD-to-Test-Plan Pipeline
//!
//! Plansmith turns a product requirements document (PRD) and an optional
//! design-tool reference into a structured, human-reviewable test plan. The
//! pipeline runs as a fixed sequence of stages, each producing a named,
//! persisted artifact, and can either run to completion automatically
//! ("trust" mode) or pause after review-bearing stages for human edits
//! ("checkpoint" mode). All state lives on disk in a per-session directory,
//! so a session survives process restarts.
//!
//! ## Core Concepts
//!
//! - **Stages**: One transformation step each, with declared input/output
//!   artifacts ([`stages`])
//! - **Artifacts**: Named, schema-validated outputs persisted per session
//!   ([`artifacts`])
//! - **Sessions**: The persisted record of how far a pipeline has advanced
//!   ([`session`])
//! - **Pipeline**: The orchestrator and checkpoint state machine
//!   ([`pipeline`])
//! - **Clients**: External collaborators behind traits, with mock
//!   implementations for offline runs ([`clients`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plansmith::pipeline::Pipeline;
//! use plansmith::service::{Planner, StartOptions};
//! use plansmith::session::{BackendMode, ReviewMode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let planner = Planner::new(Pipeline::new("output"));
//!
//! // Trust mode: run every stage without pausing.
//! let session_id = planner
//!     .start(
//!         "PRD text...",
//!         None,
//!         StartOptions::new(ReviewMode::Trust, BackendMode::Mock),
//!     )
//!     .await?;
//!
//! let result = planner.get_result(&session_id).await?;
//! println!("{}", result.test_plan_markdown);
//! # Ok(())
//! # }
//! ```
//!
//! ## Checkpoint Mode
//!
//! In checkpoint mode the pipeline pauses after each review-bearing stage and
//! returns a [`pipeline::ReviewRecord`]. The caller resumes with either an
//! accept-as-is signal or edited content; structured edits are validated
//! against the artifact's schema before anything advances.
//!
//! ## Module Guide
//!
//! - [`artifacts`] - Artifact kinds, per-stage schema records, filesystem store
//! - [`session`] - Persisted session state and the session store
//! - [`stages`] - Stage table and the per-stage transform functions
//! - [`pipeline`] - Orchestrator, checkpoint state machine, review records
//! - [`render`] - Markdown rendering of plans and best-effort parse-back
//! - [`clients`] - Generative, design-tool, document, and tracker collaborators
//! - [`service`] - Session operation surface (start / checkpoint / result)
//! - [`error`] - Failure classification shared across module error types

pub mod artifacts;
pub mod clients;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod service;
pub mod session;
pub mod stages;
pub mod telemetry;
