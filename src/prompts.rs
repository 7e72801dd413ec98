//! Prompt templates for the generative stages.
//!
//! Templates are embedded constants with `{placeholder}` slots filled by
//! [`fill`]. Keeping them in the crate (rather than external files) means a
//! session directory is self-contained and resumable anywhere.

/// Extracts structured test-planning context from raw PRD text.
pub const PRD_READER: &str = "\
You are a senior QA engineer reading a Product Requirements Document.
Extract the information most relevant for test planning and respond with a
single JSON object of the shape {\"prd_context\": {...}} containing:
project_name, target_feature_summary, core_user_stories,
technical_specifications (system_interactions, data_models_or_schemas,
api_endpoints, authentication_and_authorization) and other_contextual_data
(acceptance_criteria, dependencies_and_integrations,
known_limitations_or_risks, success_metrics).

PRD document:
{prd_content}
";

/// Summarizes filtered design components for a UI/UX perspective.
pub const DESIGN_SUMMARIZER: &str = "\
You are a UI/UX consultant. The JSON below lists the interactive components
of a product design, including their positions, sizes, interactions and
style overrides. Write a concise natural-language summary of the screens and
interactions a tester should know about.

Design components:
{design_components}
";

/// Generates a prioritized test plan from PRD context and a design summary.
pub const TEST_PLANNER: &str = "\
You are a senior QA engineer writing a prioritized end-to-end test plan.
Respond with a single JSON object of the shape {\"test_plan\": {...}}
containing: test_plan_id, feature, objective, preconditions, and
sub_feature_tests, where each sub-feature groups test cases with
test_case_id, test_scenario, test_steps, expected_result,
\"Rationale / Business Impact\", test_type and priority (P0-P3).

Project: {project_name}
Feature under test: {target_feature}

User stories:
{core_user_stories}

Technical specifications:
{tech_specs}

UI design summary:
{design_summary}

Additional notes:
{additional_notes}
";

/// Fill a template's `{placeholder}` slots.
///
/// Unknown placeholders are left untouched so a template change is visible
/// in the rendered prompt rather than silently dropped.
#[must_use]
pub fn fill(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in substitutions {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_replaces_all_occurrences() {
        let rendered = fill("a {x} b {x} c {y}", &[("x", "1"), ("y", "2")]);
        assert_eq!(rendered, "a 1 b 1 c 2");
    }

    #[test]
    fn unknown_placeholders_survive() {
        let rendered = fill("{known} {unknown}", &[("known", "v")]);
        assert_eq!(rendered, "v {unknown}");
    }

    #[test]
    fn prd_reader_takes_document_content() {
        let rendered = fill(PRD_READER, &[("prd_content", "THE DOCUMENT")]);
        assert!(rendered.contains("THE DOCUMENT"));
        assert!(!rendered.contains("{prd_content}"));
    }
}
