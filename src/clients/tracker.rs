//! Test-management tracker upload.
//!
//! Converts a finished test plan into tracker sections and cases. Each
//! sub-feature becomes a section under a fixed suite; each test case becomes
//! a case with separated steps when step and expected-result counts line up.

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::instrument;

use crate::artifacts::schema::{TestCase, TestPlan};
use crate::error::FailureClass;

#[derive(Debug, Error, Diagnostic)]
pub enum TrackerError {
    #[error("tracker configuration incomplete: {message}")]
    #[diagnostic(
        code(plansmith::tracker::config),
        help("Set TESTRAIL_URL, TESTRAIL_USER and TESTRAIL_API_KEY.")
    )]
    Config { message: String },

    #[error("tracker API call failed: {message}")]
    #[diagnostic(code(plansmith::tracker::api))]
    Api { message: String },
}

impl TrackerError {
    // Uploads are never retried automatically: a partial upload must be
    // inspected, not blindly re-sent.
    pub fn class(&self) -> FailureClass {
        match self {
            TrackerError::Config { .. } => FailureClass::Validation,
            TrackerError::Api { .. } => FailureClass::Integration,
        }
    }
}

/// Section and case creation against a test-management service.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    async fn add_section(&self, project_id: u64, body: &Value) -> Result<Value, TrackerError>;
    async fn add_case(&self, section_id: u64, body: &Value) -> Result<Value, TrackerError>;
}

/// What an upload created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub sections: u32,
    pub cases: u32,
}

/// Priority labels map onto the tracker's numeric scale; unknown labels get
/// the lowest priority rather than failing the upload.
fn priority_id(label: &str) -> u64 {
    match label {
        "P0" => 4,
        "P1" => 3,
        "P2" => 2,
        _ => 1,
    }
}

/// Build the case-creation payload for one test case.
#[must_use]
pub fn case_payload(case: &TestCase) -> Value {
    let preconds = case
        .test_steps
        .iter()
        .map(|s| format!("- {s}\n"))
        .collect::<String>();
    let mut body = json!({
        "title": case.test_scenario,
        "refs": case.test_case_id,
        "priority_id": priority_id(&case.priority),
        // Fixed "Test Case" case type in the target instance.
        "type_id": 7,
        "labels": [case.test_type],
        "custom_preconds": preconds,
    });

    // Separated steps only make sense when each step has its own expected
    // result; otherwise the whole expectation goes on the last step.
    if case.test_steps.len() == case.expected_result.len() && !case.test_steps.is_empty() {
        let steps: Vec<Value> = case
            .test_steps
            .iter()
            .zip(&case.expected_result)
            .enumerate()
            .map(|(i, (step, expected))| {
                json!({
                    "content": format!("{}. {}", i + 1, step),
                    "expected": expected,
                })
            })
            .collect();
        body["custom_steps_separated"] = Value::Array(steps);
    } else if !case.test_steps.is_empty() {
        let steps: Vec<Value> = case
            .test_steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let expected = if i + 1 == case.test_steps.len() {
                    case.expected_result.join("\n")
                } else {
                    String::new()
                };
                json!({
                    "content": format!("{}. {}", i + 1, step),
                    "expected": expected,
                })
            })
            .collect();
        body["custom_steps_separated"] = Value::Array(steps);
    }

    body
}

/// Upload a test plan: one section per sub-feature, one case per test case.
///
/// Stops at the first failure; the report reflects what was created before
/// the failure so the caller can reconcile.
#[instrument(skip(client, plan), fields(plan = %plan.test_plan_id))]
pub async fn upload_test_plan(
    client: &dyn TrackerClient,
    plan: &TestPlan,
    project_id: u64,
    suite_id: u64,
) -> Result<UploadReport, TrackerError> {
    let mut report = UploadReport {
        sections: 0,
        cases: 0,
    };

    for group in &plan.sub_feature_tests {
        let section_body = json!({
            "suite_id": suite_id,
            "name": group.sub_feature,
            "description": format!("Test cases for {} ({})", group.sub_feature, plan.test_plan_id),
        });
        let section = client.add_section(project_id, &section_body).await?;
        let section_id = section
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| TrackerError::Api {
                message: "section response missing id".to_string(),
            })?;
        report.sections += 1;

        for case in &group.test_cases {
            client.add_case(section_id, &case_payload(case)).await?;
            report.cases += 1;
        }
    }

    tracing::info!(
        sections = report.sections,
        cases = report.cases,
        "test plan uploaded"
    );
    Ok(report)
}

/// Recording mock for tests; hands out sequential section ids.
#[derive(Debug, Default)]
pub struct MockTrackerClient {
    pub sections: std::sync::Mutex<Vec<Value>>,
    pub cases: std::sync::Mutex<Vec<(u64, Value)>>,
}

impl MockTrackerClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackerClient for MockTrackerClient {
    async fn add_section(&self, _project_id: u64, body: &Value) -> Result<Value, TrackerError> {
        let mut sections = self.sections.lock().map_err(|_| TrackerError::Api {
            message: "mock state poisoned".to_string(),
        })?;
        sections.push(body.clone());
        Ok(json!({"id": sections.len() as u64}))
    }

    async fn add_case(&self, section_id: u64, body: &Value) -> Result<Value, TrackerError> {
        let mut cases = self.cases.lock().map_err(|_| TrackerError::Api {
            message: "mock state poisoned".to_string(),
        })?;
        cases.push((section_id, body.clone()));
        Ok(json!({"id": cases.len() as u64}))
    }
}

#[cfg(feature = "live-clients")]
pub use live::TestRailClient;

#[cfg(feature = "live-clients")]
mod live {
    use super::*;

    /// Live TestRail client using its JSON API with basic auth.
    pub struct TestRailClient {
        http: reqwest::Client,
        base_url: String,
        user: String,
        api_key: String,
    }

    impl TestRailClient {
        pub fn from_env() -> Result<Self, TrackerError> {
            dotenvy::dotenv().ok();
            let get = |name: &str| {
                std::env::var(name).map_err(|_| TrackerError::Config {
                    message: format!("{name} not found in environment or .env"),
                })
            };
            let base_url = get("TESTRAIL_URL")?;
            let user = get("TESTRAIL_USER")?;
            let api_key = get("TESTRAIL_API_KEY")?;
            let http = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .map_err(|e| TrackerError::Api {
                    message: e.to_string(),
                })?;
            Ok(TestRailClient {
                http,
                base_url,
                user,
                api_key,
            })
        }

        async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, TrackerError> {
            let url = format!("{}/index.php?/api/v2/{endpoint}", self.base_url);
            let response = self
                .http
                .post(&url)
                .basic_auth(&self.user, Some(&self.api_key))
                .json(body)
                .send()
                .await
                .map_err(|e| TrackerError::Api {
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(TrackerError::Api {
                    message: format!("{status}: {message}"),
                });
            }
            response.json().await.map_err(|e| TrackerError::Api {
                message: e.to_string(),
            })
        }
    }

    #[async_trait]
    impl TrackerClient for TestRailClient {
        async fn add_section(
            &self,
            project_id: u64,
            body: &Value,
        ) -> Result<Value, TrackerError> {
            self.post(&format!("add_section/{project_id}"), body).await
        }

        async fn add_case(&self, section_id: u64, body: &Value) -> Result<Value, TrackerError> {
            self.post(&format!("add_case/{section_id}"), body).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::schema::TestPlanEnvelope;

    fn sample_case() -> TestCase {
        TestPlanEnvelope::sample().test_plan.sub_feature_tests[0].test_cases[0].clone()
    }

    #[test]
    fn priority_labels_map_to_tracker_scale() {
        assert_eq!(priority_id("P0"), 4);
        assert_eq!(priority_id("P1"), 3);
        assert_eq!(priority_id("P2"), 2);
        assert_eq!(priority_id("P3"), 1);
        assert_eq!(priority_id("weird"), 1);
    }

    #[test]
    fn case_payload_carries_title_refs_and_type() {
        let case = sample_case();
        let body = case_payload(&case);
        assert_eq!(body["title"], "Report renders totals for a completed broadcast");
        assert_eq!(body["refs"], "TC-BB-001");
        assert_eq!(body["type_id"], 7);
        assert_eq!(body["priority_id"], 4);
        assert_eq!(body["labels"][0], "Functional");
        assert!(body["custom_preconds"]
            .as_str()
            .unwrap()
            .starts_with("- Open the reports page\n"));
    }

    #[test]
    fn unbalanced_steps_put_expectation_on_last_step() {
        let case = sample_case();
        // Two steps, one expected result.
        let body = case_payload(&case);
        let steps = body["custom_steps_separated"].as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["content"], "1. Open the reports page");
        assert_eq!(steps[0]["expected"], "");
        assert_eq!(
            steps[1]["expected"],
            "Delivered and opened totals match the event stream"
        );
    }

    #[test]
    fn balanced_steps_pair_one_to_one() {
        let mut case = sample_case();
        case.expected_result = vec!["Page opens".to_string(), "Totals match".to_string()];
        let body = case_payload(&case);
        let steps = body["custom_steps_separated"].as_array().unwrap();
        assert_eq!(steps[0]["expected"], "Page opens");
        assert_eq!(steps[1]["expected"], "Totals match");
    }

    #[tokio::test]
    async fn upload_creates_section_per_sub_feature() {
        let plan = TestPlanEnvelope::sample().test_plan;
        let client = MockTrackerClient::new();

        let report = upload_test_plan(&client, &plan, 10, 20).await.unwrap();
        assert_eq!(report, UploadReport { sections: 1, cases: 2 });

        let sections = client.sections.lock().unwrap();
        assert_eq!(sections[0]["suite_id"], 20);
        assert_eq!(sections[0]["name"], "Report Display");

        let cases = client.cases.lock().unwrap();
        assert!(cases.iter().all(|(section_id, _)| *section_id == 1));
    }
}
