//! End-to-end checkpoint-mode runs: pause/resume across reviews, human
//! edits, divergence handling, and resumability from disk.

use plansmith::artifacts::{ArtifactKind, TestPlanEnvelope};
use plansmith::pipeline::Pipeline;
use plansmith::service::{Planner, StartOptions, SubmitOutcome};
use plansmith::session::{BackendMode, ReviewMode, SessionId};
use tempfile::tempdir;

const PRD: &str = "Broadcast performance reports: campaign owners need per-broadcast \
delivery and engagement metrics with date-range filtering and CSV export.";

const DESIGN_URL: &str = "https://www.figma.com/design/aBc123XYZ/Broadcast-Reports";

fn planner(root: &std::path::Path) -> Planner {
    Planner::new(Pipeline::new(root))
}

async fn start_checkpoint_run(planner: &Planner) -> SessionId {
    planner
        .start(
            PRD,
            Some(DESIGN_URL),
            StartOptions::new(ReviewMode::Checkpoint, BackendMode::Mock),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn checkpoint_run_pauses_at_each_review() {
    let dir = tempdir().unwrap();
    let planner = planner(dir.path());
    let id = start_checkpoint_run(&planner).await;

    // Paused at the first review with the extracted context as pretty JSON.
    let review = planner.get_checkpoint(&id, 1).await.unwrap();
    assert_eq!(review.checkpoint, 1);
    assert_eq!(review.content_type, "Context Review");
    let context: serde_json::Value = serde_json::from_str(&review.content).unwrap();
    assert!(context["prd_context"]["project_name"].is_string());

    // Accept as generated; the run pauses at the design summary.
    let outcome = planner.submit_checkpoint(&id, 1, None).await.unwrap();
    let SubmitOutcome::Review(review) = outcome else {
        panic!("expected a second review pause");
    };
    assert_eq!(review.checkpoint, 2);
    assert_eq!(review.content_type, "Design Summary Review");
    assert!(!review.content.trim().is_empty());

    // Accept again; the run pauses at the test plan, shown as markdown.
    let outcome = planner.submit_checkpoint(&id, 2, None).await.unwrap();
    let SubmitOutcome::Review(review) = outcome else {
        panic!("expected a third review pause");
    };
    assert_eq!(review.checkpoint, 3);
    assert_eq!(review.content_type, "Test Plan Review");
    assert!(review.content.starts_with("# Test Plan Guidelines:"));

    // The diff baseline at the plan review is the structured record.
    let baseline: serde_json::Value = serde_json::from_str(&review.original_content).unwrap();
    assert!(baseline["test_plan"]["test_plan_id"].is_string());
}

#[tokio::test]
async fn structured_edit_at_final_review_lands_in_the_result() {
    let dir = tempdir().unwrap();
    let planner = planner(dir.path());
    let id = start_checkpoint_run(&planner).await;

    planner.submit_checkpoint(&id, 1, None).await.unwrap();
    planner.submit_checkpoint(&id, 2, None).await.unwrap();

    // Edit the plan's objective through the structured form.
    let mut envelope = TestPlanEnvelope::sample();
    envelope.test_plan.objective = "Hand-reviewed objective.".to_string();
    let edited = serde_json::to_string_pretty(&envelope).unwrap();

    let outcome = planner
        .submit_checkpoint(&id, 3, Some(edited))
        .await
        .unwrap();
    let SubmitOutcome::Complete(result) = outcome else {
        panic!("expected the run to complete");
    };

    assert!(!result.diverged);
    assert_eq!(
        result.test_plan["test_plan"]["objective"],
        "Hand-reviewed objective."
    );
    // The markdown was re-rendered from the edited plan.
    assert!(result
        .test_plan_markdown
        .contains("**Objective:** Hand-reviewed objective."));
    assert_eq!(result.test_suite, serde_json::json!({"WIP": "Detailed test cases."}));
}

#[tokio::test]
async fn unparseable_edit_marks_the_session_diverged() {
    let dir = tempdir().unwrap();
    let planner = planner(dir.path());
    let id = start_checkpoint_run(&planner).await;

    planner.submit_checkpoint(&id, 1, None).await.unwrap();
    planner.submit_checkpoint(&id, 2, None).await.unwrap();

    let freeform = "Completely rewritten by the reviewer in prose.";
    let outcome = planner
        .submit_checkpoint(&id, 3, Some(freeform.to_string()))
        .await
        .unwrap();
    let SubmitOutcome::Complete(result) = outcome else {
        panic!("expected the run to complete");
    };

    // The edited text is authoritative for display; the last valid
    // structured plan is retained rather than silently replaced.
    assert!(result.diverged);
    assert_eq!(result.test_plan_markdown, freeform);
    let expected = serde_json::to_value(TestPlanEnvelope::sample()).unwrap();
    assert_eq!(result.test_plan, expected);
}

#[tokio::test]
async fn session_resumes_identically_from_disk() {
    let dir = tempdir().unwrap();
    let id;
    let first_review;
    {
        let planner = planner(dir.path());
        id = start_checkpoint_run(&planner).await;
        planner.submit_checkpoint(&id, 1, None).await.unwrap();
        planner.submit_checkpoint(&id, 2, None).await.unwrap();
        first_review = planner.get_checkpoint(&id, 3).await.unwrap();
    }

    // A fresh planner over the same root sees the same pending review.
    let resumed = planner(dir.path());
    let review = resumed.get_checkpoint(&id, 3).await.unwrap();
    assert_eq!(review, first_review);

    // And the run can be finished by the new instance.
    let outcome = resumed.submit_checkpoint(&id, 3, None).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Complete(_)));
}

#[tokio::test]
async fn edits_at_earlier_checkpoints_validate_their_schema() {
    let dir = tempdir().unwrap();
    let planner = planner(dir.path());
    let id = start_checkpoint_run(&planner).await;

    // A context edit that is not a valid record is rejected and the run
    // stays paused at the same checkpoint.
    let err = planner
        .submit_checkpoint(&id, 1, Some("{\"not\": \"a context\"}".to_string()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("checkpoint 1"));
    let review = planner.get_checkpoint(&id, 1).await.unwrap();
    assert_eq!(review.checkpoint, 1);

    // Submitting against the wrong checkpoint number is rejected too.
    let err = planner.submit_checkpoint(&id, 3, None).await.unwrap_err();
    assert!(err.to_string().contains("not awaiting review"));
}

#[tokio::test]
async fn artifacts_are_downloadable_after_completion() {
    let dir = tempdir().unwrap();
    let planner = planner(dir.path());
    let id = start_checkpoint_run(&planner).await;

    planner.submit_checkpoint(&id, 1, None).await.unwrap();
    planner.submit_checkpoint(&id, 2, None).await.unwrap();
    planner.submit_checkpoint(&id, 3, None).await.unwrap();

    let bytes = planner
        .download_artifact(&id, ArtifactKind::TestPlanMarkdown)
        .await
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("# Test Plan Guidelines:"));

    let bytes = planner
        .download_artifact(&id, ArtifactKind::PrdContext)
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(value["prd_context"].is_object());
}
