//! Markdown rendering for test plans, and the inverse parse used to
//! reconcile human edits made to the rendered document.
//!
//! Rendering is deterministic: the same plan always produces the same
//! bytes, so re-rendering an unchanged plan never shows as a spurious edit.

use crate::artifacts::schema::{SubFeatureTests, TestCase, TestPlan, TestPlanEnvelope, TestSuite};

const TABLE_HEADER: &str = "| Test Case ID | Test Scenario | Test Steps | Expected Result | Rationale / Business Impact | Test Type | Priority |";
const TABLE_DIVIDER: &str = "| :--- | :--- | :--- | :--- | :--- | :--- | :--- |";

/// Render a structured test plan as a markdown document.
#[must_use]
pub fn render_test_plan(plan: &TestPlan) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Test Plan Guidelines: {}\n\n", plan.feature));
    out.push_str(&format!("**Test Plan ID:** `{}`\n\n", plan.test_plan_id));
    out.push_str(&format!("**Objective:** {}\n\n", plan.objective));

    out.push_str("## Preconditions\n\n");
    if plan.preconditions.is_empty() {
        out.push_str("- None specified.\n");
    } else {
        for precondition in &plan.preconditions {
            out.push_str(&format!("- {precondition}\n"));
        }
    }
    out.push_str("\n---\n");

    for group in &plan.sub_feature_tests {
        out.push_str(&format!("\n## Test Cases for: {}\n\n", group.sub_feature));
        out.push_str(TABLE_HEADER);
        out.push('\n');
        out.push_str(TABLE_DIVIDER);
        out.push('\n');
        for case in &group.test_cases {
            out.push_str(&render_case_row(case));
            out.push('\n');
        }
    }

    out
}

fn render_case_row(case: &TestCase) -> String {
    let steps = case
        .test_steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("<br>");
    let results = case
        .expected_result
        .iter()
        .map(|r| format!("- {r}"))
        .collect::<Vec<_>>()
        .join("<br>");
    format!(
        "| {} | {} | {} | {} | {} | {} | {} |",
        case.test_case_id,
        case.test_scenario,
        steps,
        results,
        case.rationale,
        case.test_type,
        case.priority
    )
}

/// Render the detailed-suite artifact.
#[must_use]
pub fn render_test_suite(suite: &TestSuite) -> String {
    match suite {
        TestSuite::Placeholder { wip } => format!("WIP: {wip}\n"),
        TestSuite::Detailed { test_suite } => {
            let mut out = String::from("# Detailed Test Suite\n");
            for entry in test_suite {
                out.push_str("\n```json\n");
                out.push_str(
                    &serde_json::to_string_pretty(entry).unwrap_or_else(|_| entry.to_string()),
                );
                out.push_str("\n```\n");
            }
            out
        }
    }
}

/// Parse an edited test-plan document back into a structured plan.
///
/// Tries JSON first (reviewers sometimes paste the structured form, with or
/// without its envelope), then the markdown layout produced by
/// [`render_test_plan`]. Returns `None` when the text fits neither shape;
/// the caller records the session as diverged and keeps the text as the
/// display artifact.
#[must_use]
pub fn parse_test_plan_markdown(text: &str) -> Option<TestPlan> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        if let Ok(envelope) = serde_json::from_str::<TestPlanEnvelope>(trimmed) {
            return Some(envelope.test_plan);
        }
        if let Ok(plan) = serde_json::from_str::<TestPlan>(trimmed) {
            return Some(plan);
        }
        return None;
    }
    parse_markdown(text)
}

fn parse_markdown(text: &str) -> Option<TestPlan> {
    let mut feature = None;
    let mut test_plan_id = None;
    let mut objective = None;
    let mut preconditions = Vec::new();
    let mut sub_feature_tests: Vec<SubFeatureTests> = Vec::new();

    enum Section {
        None,
        Preconditions,
        Cases,
    }
    let mut section = Section::None;

    for line in text.lines() {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("# Test Plan Guidelines: ") {
            feature = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("**Test Plan ID:** ") {
            test_plan_id = Some(rest.trim().trim_matches('`').to_string());
        } else if let Some(rest) = line.strip_prefix("**Objective:** ") {
            objective = Some(rest.trim().to_string());
        } else if line == "## Preconditions" {
            section = Section::Preconditions;
        } else if let Some(rest) = line.strip_prefix("## Test Cases for: ") {
            sub_feature_tests.push(SubFeatureTests {
                sub_feature: rest.trim().to_string(),
                test_cases: Vec::new(),
            });
            section = Section::Cases;
        } else {
            match section {
                Section::Preconditions => {
                    if let Some(item) = line.strip_prefix("- ") {
                        if item != "None specified." {
                            preconditions.push(item.to_string());
                        }
                    }
                }
                Section::Cases => {
                    if line.starts_with('|')
                        && line != TABLE_HEADER
                        && line != TABLE_DIVIDER
                        && let Some(case) = parse_case_row(line)
                        && let Some(group) = sub_feature_tests.last_mut()
                    {
                        group.test_cases.push(case);
                    }
                }
                Section::None => {}
            }
        }
    }

    Some(TestPlan {
        test_plan_id: test_plan_id?,
        feature: feature?,
        objective: objective?,
        preconditions,
        sub_feature_tests,
    })
}

fn parse_case_row(line: &str) -> Option<TestCase> {
    let cells: Vec<&str> = line
        .trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(str::trim)
        .collect();
    if cells.len() != 7 {
        return None;
    }

    let test_steps = cells[2]
        .split("<br>")
        .filter(|s| !s.trim().is_empty())
        .map(strip_step_number)
        .collect();
    let expected_result = cells[3]
        .split("<br>")
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().trim_start_matches("- ").to_string())
        .collect();

    Some(TestCase {
        test_case_id: cells[0].to_string(),
        test_scenario: cells[1].to_string(),
        test_steps,
        expected_result,
        rationale: cells[4].to_string(),
        test_type: cells[5].to_string(),
        priority: cells[6].to_string(),
    })
}

fn strip_step_number(step: &str) -> String {
    let step = step.trim();
    match step.split_once(". ") {
        Some((prefix, rest)) if prefix.chars().all(|c| c.is_ascii_digit()) => rest.to_string(),
        _ => step.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::schema::TestPlanEnvelope;

    fn sample_plan() -> TestPlan {
        TestPlanEnvelope::sample().test_plan
    }

    #[test]
    fn rendering_is_deterministic() {
        let plan = sample_plan();
        assert_eq!(render_test_plan(&plan), render_test_plan(&plan));
    }

    #[test]
    fn rendered_plan_has_expected_layout() {
        let md = render_test_plan(&sample_plan());
        assert!(md.starts_with("# Test Plan Guidelines: Broadcast Performance Reports\n"));
        assert!(md.contains("**Test Plan ID:** `TP-BB-REPORT-001`"));
        assert!(md.contains("## Preconditions"));
        assert!(md.contains("- Test user holds the campaign-owner role"));
        assert!(md.contains("## Test Cases for: Report Display"));
        assert!(md.contains("| TC-BB-001 |"));
        assert!(md.contains("1. Open the reports page<br>2. Select a completed broadcast"));
    }

    #[test]
    fn empty_preconditions_render_a_placeholder() {
        let mut plan = sample_plan();
        plan.preconditions.clear();
        let md = render_test_plan(&plan);
        assert!(md.contains("- None specified."));

        // The placeholder parses back to an empty list.
        let back = parse_test_plan_markdown(&md).unwrap();
        assert!(back.preconditions.is_empty());
    }

    #[test]
    fn markdown_round_trips_through_parse() {
        let plan = sample_plan();
        let md = render_test_plan(&plan);
        let back = parse_test_plan_markdown(&md).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn json_edits_parse_with_and_without_envelope() {
        let plan = sample_plan();

        let enveloped = serde_json::to_string(&TestPlanEnvelope {
            test_plan: plan.clone(),
        })
        .unwrap();
        assert_eq!(parse_test_plan_markdown(&enveloped).unwrap(), plan);

        let bare = serde_json::to_string(&plan).unwrap();
        assert_eq!(parse_test_plan_markdown(&bare).unwrap(), plan);
    }

    #[test]
    fn free_text_does_not_parse() {
        assert!(parse_test_plan_markdown("totally rewritten by a human").is_none());
        assert!(parse_test_plan_markdown("{\"not\": \"a plan\"}").is_none());
    }

    #[test]
    fn placeholder_suite_renders_wip_line() {
        let md = render_test_suite(&TestSuite::placeholder());
        assert_eq!(md, "WIP: Detailed test cases.\n");
    }

    mod roundtrip {
        use super::*;
        use proptest::prelude::*;

        // Cell text without the markdown structure characters the table
        // format reserves.
        fn cell() -> impl Strategy<Value = String> {
            "[A-Za-z0-9]{1,12}( [A-Za-z0-9]{1,12}){0,3}"
        }

        fn case() -> impl Strategy<Value = TestCase> {
            (
                cell(),
                cell(),
                proptest::collection::vec(cell(), 1..4),
                proptest::collection::vec(cell(), 1..3),
                cell(),
                cell(),
                "P[0-3]",
            )
                .prop_map(
                    |(id, scenario, steps, expected, rationale, test_type, priority)| TestCase {
                        test_case_id: id,
                        test_scenario: scenario,
                        test_steps: steps,
                        expected_result: expected,
                        rationale,
                        test_type,
                        priority,
                    },
                )
        }

        fn plan() -> impl Strategy<Value = TestPlan> {
            (
                cell(),
                cell(),
                cell(),
                proptest::collection::vec(cell(), 0..4),
                proptest::collection::vec(
                    (cell(), proptest::collection::vec(case(), 1..4)).prop_map(
                        |(sub_feature, test_cases)| SubFeatureTests {
                            sub_feature,
                            test_cases,
                        },
                    ),
                    1..3,
                ),
            )
                .prop_map(
                    |(test_plan_id, feature, objective, preconditions, sub_feature_tests)| {
                        TestPlan {
                            test_plan_id,
                            feature,
                            objective,
                            preconditions,
                            sub_feature_tests,
                        }
                    },
                )
        }

        proptest! {
            #[test]
            fn render_then_parse_restores_the_plan(plan in plan()) {
                let md = render_test_plan(&plan);
                let back = parse_test_plan_markdown(&md);
                prop_assert_eq!(back, Some(plan));
            }
        }
    }
}
