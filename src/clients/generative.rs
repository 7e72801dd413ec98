//! Generative completion client: trait, retry policy, mock, and the live
//! Gemini implementation.
//!
//! Each pipeline stage makes at most one generative call. Rate-limit and
//! timeout failures are retried with exponential backoff and jitter up to a
//! fixed attempt ceiling; every other failure propagates immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use rand::Rng;
use serde_json::Value;
use thiserror::Error;

use crate::artifacts::schema::{PrdContextEnvelope, TestPlanEnvelope};
use crate::error::FailureClass;

/// Which response document a structured call must produce.
///
/// The live client passes this to the service as the response schema; the
/// mock client uses it to pick its canned record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    PrdContext,
    TestPlan,
}

#[derive(Debug, Error, Diagnostic)]
pub enum GenerativeError {
    #[error("generative service rate limited: {message}")]
    #[diagnostic(
        code(plansmith::generative::rate_limited),
        help("Retried automatically with backoff; surfaced only after retries exhaust.")
    )]
    RateLimited { message: String },

    #[error("generative call timed out")]
    #[diagnostic(code(plansmith::generative::timeout))]
    Timeout,

    #[error("generative output is not valid JSON: {source}")]
    #[diagnostic(code(plansmith::generative::malformed))]
    Malformed {
        #[source]
        source: serde_json::Error,
    },

    #[error("generative service error: {message}")]
    #[diagnostic(code(plansmith::generative::service))]
    Service { message: String },
}

impl GenerativeError {
    /// Rate limits and timeouts are retried; everything else is final.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerativeError::RateLimited { .. } | GenerativeError::Timeout
        )
    }

    pub fn class(&self) -> FailureClass {
        match self {
            GenerativeError::RateLimited { .. } | GenerativeError::Timeout => {
                FailureClass::Transient
            }
            GenerativeError::Malformed { .. } => FailureClass::Validation,
            GenerativeError::Service { .. } => FailureClass::Integration,
        }
    }
}

/// Bounded exponential backoff for transient generative failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy with no sleep between attempts, for tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::ZERO,
        }
    }
}

/// Run an operation under the retry policy.
///
/// The delay doubles after each transient failure, with up to 500ms of
/// jitter added so stampeding sessions do not retry in lockstep.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, GenerativeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerativeError>>,
{
    let mut delay = policy.initial_delay;
    for attempt in 1..=policy.max_attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "transient generative failure, backing off"
                );
                let jitter = if delay.is_zero() {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::rng().random_range(0..500))
                };
                tokio::time::sleep(delay + jitter).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
    // Unreachable: the loop always returns on the final attempt.
    Err(GenerativeError::Service {
        message: format!("{operation}: retries exhausted"),
    })
}

/// One-shot generative completion.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Produce a JSON document conforming to the given response schema.
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: ResponseSchema,
    ) -> Result<Value, GenerativeError>;

    /// Produce plain text.
    async fn generate_text(&self, prompt: &str) -> Result<String, GenerativeError>;
}

/// Canned client for demos and tests.
///
/// Returns the sample PRD context / test plan records and a fixed summary.
/// `fail_on` injects a non-transient failure for a specific schema, used to
/// exercise partial-failure behavior.
#[derive(Debug, Clone, Default)]
pub struct MockGenerativeClient {
    fail_on: Option<ResponseSchema>,
}

impl MockGenerativeClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail (non-transiently) whenever the given schema is requested.
    #[must_use]
    pub fn failing_on(schema: ResponseSchema) -> Self {
        MockGenerativeClient {
            fail_on: Some(schema),
        }
    }
}

#[async_trait]
impl GenerativeClient for MockGenerativeClient {
    async fn generate_structured(
        &self,
        _prompt: &str,
        schema: ResponseSchema,
    ) -> Result<Value, GenerativeError> {
        if self.fail_on == Some(schema) {
            return Err(GenerativeError::Service {
                message: "mock failure injected".to_string(),
            });
        }
        let value = match schema {
            ResponseSchema::PrdContext => serde_json::to_value(PrdContextEnvelope::sample()),
            ResponseSchema::TestPlan => serde_json::to_value(TestPlanEnvelope::sample()),
        };
        value.map_err(|source| GenerativeError::Malformed { source })
    }

    async fn generate_text(&self, _prompt: &str) -> Result<String, GenerativeError> {
        Ok("The design presents a report dashboard with a broadcast selector, \
            a date-range filter, and a metrics table. Primary interactions are \
            selection, filtering, and CSV export."
            .to_string())
    }
}

#[cfg(feature = "live-clients")]
pub use live::GeminiClient;

#[cfg(feature = "live-clients")]
mod live {
    use super::*;

    const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
    const MODEL: &str = "gemini-2.5-flash";

    /// Live client for the Gemini REST API.
    ///
    /// Credentials come from `GEMINI_API_KEY` (environment or `.env`),
    /// loaded once at construction.
    pub struct GeminiClient {
        http: reqwest::Client,
        api_key: String,
        model: String,
    }

    impl GeminiClient {
        pub fn from_env() -> Result<Self, GenerativeError> {
            dotenvy::dotenv().ok();
            let api_key =
                std::env::var("GEMINI_API_KEY").map_err(|_| GenerativeError::Service {
                    message: "GEMINI_API_KEY not found in environment or .env".to_string(),
                })?;
            let http = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .map_err(|e| GenerativeError::Service {
                    message: e.to_string(),
                })?;
            Ok(GeminiClient {
                http,
                api_key,
                model: MODEL.to_string(),
            })
        }

        async fn generate(
            &self,
            prompt: &str,
            mime_type: &str,
        ) -> Result<String, GenerativeError> {
            let url = format!(
                "{API_BASE}/{}:generateContent?key={}",
                self.model, self.api_key
            );
            let body = serde_json::json!({
                "contents": [{"parts": [{"text": prompt}]}],
                "generationConfig": {"responseMimeType": mime_type},
            });

            let response = self.http.post(&url).json(&body).send().await.map_err(|e| {
                if e.is_timeout() {
                    GenerativeError::Timeout
                } else {
                    GenerativeError::Service {
                        message: e.to_string(),
                    }
                }
            })?;

            let status = response.status();
            if status.as_u16() == 429 {
                let message = response.text().await.unwrap_or_default();
                return Err(GenerativeError::RateLimited { message });
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(GenerativeError::Service {
                    message: format!("{status}: {message}"),
                });
            }

            let payload: Value = response.json().await.map_err(|e| {
                GenerativeError::Service {
                    message: e.to_string(),
                }
            })?;
            payload["candidates"][0]["content"]["parts"][0]["text"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| GenerativeError::Service {
                    message: "response contained no candidate text".to_string(),
                })
        }
    }

    #[async_trait]
    impl GenerativeClient for GeminiClient {
        async fn generate_structured(
            &self,
            prompt: &str,
            _schema: ResponseSchema,
        ) -> Result<Value, GenerativeError> {
            let text = self.generate(prompt, "application/json").await?;
            serde_json::from_str(&text).map_err(|source| GenerativeError::Malformed { source })
        }

        async fn generate_text(&self, prompt: &str) -> Result<String, GenerativeError> {
            self.generate(prompt, "text/plain").await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_recovers_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let result = with_retry(&policy, "test-op", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(GenerativeError::RateLimited {
                        message: "quota".to_string(),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_surfaces_after_ceiling() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let err = with_retry(&policy, "test-op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(GenerativeError::Timeout) }
        })
        .await
        .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_failures_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let err = with_retry(&policy, "test-op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(GenerativeError::Service {
                    message: "bad request".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mock_returns_schema_conformant_records() {
        let mock = MockGenerativeClient::new();
        let value = mock
            .generate_structured("prompt", ResponseSchema::PrdContext)
            .await
            .unwrap();
        crate::artifacts::schema::validate(crate::artifacts::ArtifactKind::PrdContext, &value)
            .unwrap();
    }
}
