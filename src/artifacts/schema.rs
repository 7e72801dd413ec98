//! Per-stage schema records for structured artifacts.
//!
//! These replace duck-typed maps as the inter-stage contracts: every
//! structured artifact must parse into its record before it is written, so
//! malformed upstream output is caught at the store boundary rather than
//! deep inside a downstream transform. Wire shapes mirror the documents the
//! generative service is asked to produce (`{"prd_context": ...}`,
//! `{"test_plan": ...}`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ArtifactKind;

/// Technical specifications pulled out of the PRD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TechSpecs {
    #[serde(default)]
    pub system_interactions: Vec<String>,
    #[serde(default)]
    pub data_models_or_schemas: Vec<String>,
    #[serde(default)]
    pub api_endpoints: Vec<String>,
    #[serde(default)]
    pub authentication_and_authorization: Vec<String>,
}

/// Contextual information relevant for test design beyond the feature itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContextualData {
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub dependencies_and_integrations: Vec<String>,
    #[serde(default)]
    pub known_limitations_or_risks: Vec<String>,
    #[serde(default)]
    pub success_metrics: Vec<String>,
}

/// Structured context extracted from a PRD document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrdContext {
    pub project_name: String,
    pub target_feature_summary: String,
    #[serde(default)]
    pub core_user_stories: Vec<String>,
    #[serde(default)]
    pub technical_specifications: TechSpecs,
    #[serde(default)]
    pub other_contextual_data: ContextualData,
}

/// Wire envelope for the PRD context artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrdContextEnvelope {
    pub prd_context: PrdContext,
}

/// One interactive component kept from the design node tree.
///
/// Decorative nodes (no interactions, no style overrides) are filtered out
/// before this record is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignComponent {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub position: Value,
    #[serde(default)]
    pub size: Value,
    #[serde(default)]
    pub interactions: Value,
    #[serde(default, rename = "styleOverrideTable")]
    pub style_overrides: Value,
}

/// Filtered design reference snapshot. An absent design reference yields an
/// empty component list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DesignSnapshot {
    #[serde(rename = "figma_data", default)]
    pub components: Vec<DesignComponent>,
}

/// A single row in a test-case table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub test_case_id: String,
    pub test_scenario: String,
    #[serde(default)]
    pub test_steps: Vec<String>,
    #[serde(default)]
    pub expected_result: Vec<String>,
    #[serde(rename = "Rationale / Business Impact", default)]
    pub rationale: String,
    #[serde(default)]
    pub test_type: String,
    #[serde(default)]
    pub priority: String,
}

/// Test cases grouped under one sub-feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFeatureTests {
    pub sub_feature: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// The structured test plan for a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    pub test_plan_id: String,
    pub feature: String,
    pub objective: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub sub_feature_tests: Vec<SubFeatureTests>,
}

/// Wire envelope for the test plan artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlanEnvelope {
    pub test_plan: TestPlan,
}

/// Detailed test suite artifact.
///
/// Detailed-test generation is disabled in the stage table; until it is
/// re-enabled the artifact is the placeholder variant. The full shape is kept
/// so re-enabling the stage does not change the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestSuite {
    Detailed {
        test_suite: Vec<Value>,
    },
    Placeholder {
        #[serde(rename = "WIP")]
        wip: String,
    },
}

impl TestSuite {
    /// The placeholder record the disabled stage emits.
    #[must_use]
    pub fn placeholder() -> Self {
        TestSuite::Placeholder {
            wip: "Detailed test cases.".to_string(),
        }
    }
}

/// Validate a structured value against the schema record for its kind.
///
/// Text kinds always pass. Returns the `serde_json` failure for structured
/// kinds that do not conform, so the caller can surface where the shape
/// broke.
pub fn validate(kind: ArtifactKind, value: &Value) -> Result<(), serde_json::Error> {
    match kind {
        ArtifactKind::PrdContext => {
            serde_json::from_value::<PrdContextEnvelope>(value.clone()).map(|_| ())
        }
        ArtifactKind::DesignData => {
            serde_json::from_value::<DesignSnapshot>(value.clone()).map(|_| ())
        }
        ArtifactKind::TestPlan => {
            serde_json::from_value::<TestPlanEnvelope>(value.clone()).map(|_| ())
        }
        ArtifactKind::TestSuite => serde_json::from_value::<TestSuite>(value.clone()).map(|_| ()),
        ArtifactKind::DesignSummary
        | ArtifactKind::TestPlanMarkdown
        | ArtifactKind::TestSuiteMarkdown => Ok(()),
    }
}

impl PrdContextEnvelope {
    /// Representative record used by the mock generative client and tests.
    #[must_use]
    pub fn sample() -> Self {
        PrdContextEnvelope {
            prd_context: PrdContext {
                project_name: "Broadcast Performance Reports".to_string(),
                target_feature_summary:
                    "Surface delivery and engagement metrics for broadcast messages so \
                     campaign owners can evaluate reach without exporting raw logs."
                        .to_string(),
                core_user_stories: vec![
                    "As a campaign owner, I want a per-broadcast performance report so I can \
                     compare delivery across audiences."
                        .to_string(),
                    "As an analyst, I want to filter the report by date range so I can isolate \
                     a single campaign window."
                        .to_string(),
                ],
                technical_specifications: TechSpecs {
                    system_interactions: vec![
                        "Reporting service aggregates events from the delivery queue".to_string(),
                    ],
                    data_models_or_schemas: vec![
                        "broadcast_metrics table keyed by broadcast_id".to_string(),
                    ],
                    api_endpoints: vec!["GET /api/v1/broadcasts/{id}/report".to_string()],
                    authentication_and_authorization: vec![
                        "Report access requires the campaign-owner role".to_string(),
                    ],
                },
                other_contextual_data: ContextualData {
                    acceptance_criteria: vec![
                        "Report loads within 3 seconds for broadcasts under 100k recipients"
                            .to_string(),
                    ],
                    dependencies_and_integrations: vec!["Delivery event stream".to_string()],
                    known_limitations_or_risks: vec![
                        "Metrics are eventually consistent; totals may lag by minutes".to_string(),
                    ],
                    success_metrics: vec!["Report adoption by 60% of campaign owners".to_string()],
                },
            },
        }
    }
}

impl TestPlanEnvelope {
    /// Representative plan used by the mock generative client and tests.
    #[must_use]
    pub fn sample() -> Self {
        TestPlanEnvelope {
            test_plan: TestPlan {
                test_plan_id: "TP-BB-REPORT-001".to_string(),
                feature: "Broadcast Performance Reports".to_string(),
                objective: "Verify report accuracy, filtering, and access control.".to_string(),
                preconditions: vec![
                    "At least one broadcast has completed delivery".to_string(),
                    "Test user holds the campaign-owner role".to_string(),
                ],
                sub_feature_tests: vec![SubFeatureTests {
                    sub_feature: "Report Display".to_string(),
                    test_cases: vec![
                        TestCase {
                            test_case_id: "TC-BB-001".to_string(),
                            test_scenario: "Report renders totals for a completed broadcast"
                                .to_string(),
                            test_steps: vec![
                                "Open the reports page".to_string(),
                                "Select a completed broadcast".to_string(),
                            ],
                            expected_result: vec![
                                "Delivered and opened totals match the event stream".to_string(),
                            ],
                            rationale: "Core value of the feature".to_string(),
                            test_type: "Functional".to_string(),
                            priority: "P0".to_string(),
                        },
                        TestCase {
                            test_case_id: "TC-BB-002".to_string(),
                            test_scenario: "Report denies access to non-owners".to_string(),
                            test_steps: vec![
                                "Log in as a user without the campaign-owner role".to_string(),
                                "Request the report URL directly".to_string(),
                            ],
                            expected_result: vec!["Access is denied with a 403".to_string()],
                            rationale: "Authorization requirement from the PRD".to_string(),
                            test_type: "Negative".to_string(),
                            priority: "P1".to_string(),
                        },
                    ],
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prd_context_sample_validates() {
        let value = serde_json::to_value(PrdContextEnvelope::sample()).unwrap();
        validate(ArtifactKind::PrdContext, &value).unwrap();
    }

    #[test]
    fn test_plan_rationale_alias_round_trips() {
        let value = serde_json::to_value(TestPlanEnvelope::sample()).unwrap();
        let case = &value["test_plan"]["sub_feature_tests"][0]["test_cases"][0];
        assert!(case.get("Rationale / Business Impact").is_some());

        let back: TestPlanEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, TestPlanEnvelope::sample());
    }

    #[test]
    fn malformed_plan_is_rejected() {
        let value = json!({"test_plan": {"feature": "missing ids"}});
        assert!(validate(ArtifactKind::TestPlan, &value).is_err());
    }

    #[test]
    fn placeholder_suite_validates() {
        let value = serde_json::to_value(TestSuite::placeholder()).unwrap();
        validate(ArtifactKind::TestSuite, &value).unwrap();
        assert_eq!(value, json!({"WIP": "Detailed test cases."}));
    }
}
