//! Design-tool client: Figma URL parsing, file fetch, and the node filter
//! that keeps only test-relevant components.

use async_trait::async_trait;
use miette::Diagnostic;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;
use thiserror::Error;

use crate::artifacts::schema::DesignComponent;
use crate::error::FailureClass;

// Both /file/ and /design/ URL shapes carry the key in the same slot.
static FILE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://www\.figma\.com/(file|design)/([a-zA-Z0-9]+)").unwrap());

#[derive(Debug, Error, Diagnostic)]
pub enum DesignError {
    #[error("not a recognizable design file URL: {url}")]
    #[diagnostic(
        code(plansmith::design::invalid_url),
        help("Expected https://www.figma.com/file/<key>/... or /design/<key>/...")
    )]
    InvalidUrl { url: String },

    #[error("design service rate limited: {message}")]
    #[diagnostic(code(plansmith::design::rate_limited))]
    RateLimited { message: String },

    #[error("design file fetch failed: {message}")]
    #[diagnostic(code(plansmith::design::service))]
    Service { message: String },
}

impl DesignError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, DesignError::RateLimited { .. })
    }

    pub fn class(&self) -> FailureClass {
        match self {
            DesignError::InvalidUrl { .. } => FailureClass::Validation,
            DesignError::RateLimited { .. } => FailureClass::Transient,
            DesignError::Service { .. } => FailureClass::Integration,
        }
    }
}

/// Extract the file key from a design-tool share URL.
pub fn file_key_from_url(url: &str) -> Result<String, DesignError> {
    FILE_URL
        .captures(url)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| DesignError::InvalidUrl {
            url: url.to_string(),
        })
}

/// Fetch of a design file's full node tree.
#[async_trait]
pub trait DesignClient: Send + Sync {
    async fn fetch_file(&self, key: &str) -> Result<Value, DesignError>;
}

/// Walk the node tree under `document` and keep components a tester cares
/// about: nodes with interactions or style overrides.
///
/// Parent id, position and size travel with each kept node so the summary
/// stage can describe layout without the full tree.
#[must_use]
pub fn filter_components(file: &Value) -> Vec<DesignComponent> {
    let mut kept = Vec::new();
    if let Some(document) = file.get("document") {
        walk(document, None, &mut kept);
    }
    kept
}

fn walk(node: &Value, parent_id: Option<&str>, kept: &mut Vec<DesignComponent>) {
    let interactions = node.get("interactions").cloned().unwrap_or(Value::Null);
    let style_overrides = node
        .get("styleOverrideTable")
        .cloned()
        .unwrap_or(Value::Null);

    if non_empty(&interactions) || non_empty(&style_overrides) {
        let bbox = node.get("absoluteBoundingBox");
        kept.push(DesignComponent {
            parent_id: parent_id.map(str::to_string),
            id: node.get("id").and_then(Value::as_str).map(str::to_string),
            name: node.get("name").and_then(Value::as_str).map(str::to_string),
            node_type: node.get("type").and_then(Value::as_str).map(str::to_string),
            position: bbox
                .map(|b| json!({"x": b.get("x"), "y": b.get("y")}))
                .unwrap_or(Value::Null),
            size: bbox
                .map(|b| json!({"width": b.get("width"), "height": b.get("height")}))
                .unwrap_or(Value::Null),
            interactions,
            style_overrides,
        });
    }

    let id = node.get("id").and_then(Value::as_str);
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children {
            walk(child, id.or(parent_id), kept);
        }
    }
}

fn non_empty(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// Canned design file for offline runs: one frame with an interactive
/// export button and a styled table, plus a decorative label that the
/// filter drops.
#[derive(Debug, Clone, Default)]
pub struct MockDesignClient;

impl MockDesignClient {
    #[must_use]
    pub fn new() -> Self {
        MockDesignClient
    }

    /// The node tree the mock returns for any key.
    #[must_use]
    pub fn sample_file() -> Value {
        json!({
            "name": "Broadcast Reports",
            "document": {
                "id": "0:0",
                "name": "Document",
                "type": "DOCUMENT",
                "children": [{
                    "id": "1:1",
                    "name": "Report Dashboard",
                    "type": "FRAME",
                    "absoluteBoundingBox": {"x": 0, "y": 0, "width": 1440, "height": 900},
                    "children": [
                        {
                            "id": "1:2",
                            "name": "Export CSV",
                            "type": "INSTANCE",
                            "absoluteBoundingBox": {"x": 1240, "y": 24, "width": 160, "height": 40},
                            "interactions": [{"trigger": {"type": "ON_CLICK"}}]
                        },
                        {
                            "id": "1:3",
                            "name": "Metrics Table",
                            "type": "FRAME",
                            "absoluteBoundingBox": {"x": 24, "y": 120, "width": 1392, "height": 640},
                            "styleOverrideTable": {"1": {"fills": "accent"}}
                        },
                        {
                            "id": "1:4",
                            "name": "Page Title",
                            "type": "TEXT",
                            "absoluteBoundingBox": {"x": 24, "y": 24, "width": 400, "height": 48}
                        }
                    ]
                }]
            }
        })
    }
}

#[async_trait]
impl DesignClient for MockDesignClient {
    async fn fetch_file(&self, _key: &str) -> Result<Value, DesignError> {
        Ok(Self::sample_file())
    }
}

#[cfg(feature = "live-clients")]
pub use live::FigmaClient;

#[cfg(feature = "live-clients")]
mod live {
    use super::*;

    const API_BASE: &str = "https://api.figma.com/v1/files";

    /// Live client for the Figma REST API, authenticated with a personal
    /// access token from `FIGMA_API_KEY`.
    pub struct FigmaClient {
        http: reqwest::Client,
        token: String,
    }

    impl FigmaClient {
        pub fn from_env() -> Result<Self, DesignError> {
            dotenvy::dotenv().ok();
            let token = std::env::var("FIGMA_API_KEY").map_err(|_| DesignError::Service {
                message: "FIGMA_API_KEY not found in environment or .env".to_string(),
            })?;
            let http = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .map_err(|e| DesignError::Service {
                    message: e.to_string(),
                })?;
            Ok(FigmaClient { http, token })
        }
    }

    #[async_trait]
    impl DesignClient for FigmaClient {
        async fn fetch_file(&self, key: &str) -> Result<Value, DesignError> {
            let response = self
                .http
                .get(format!("{API_BASE}/{key}"))
                .header("X-Figma-Token", &self.token)
                .send()
                .await
                .map_err(|e| DesignError::Service {
                    message: e.to_string(),
                })?;

            let status = response.status();
            if status.as_u16() == 429 {
                let message = response.text().await.unwrap_or_default();
                return Err(DesignError::RateLimited { message });
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(DesignError::Service {
                    message: format!("{status}: {message}"),
                });
            }
            response.json().await.map_err(|e| DesignError::Service {
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_key_from_file_and_design_urls() {
        let key =
            file_key_from_url("https://www.figma.com/file/aBc123XYZ/My-Design?node-id=1-2")
                .unwrap();
        assert_eq!(key, "aBc123XYZ");

        let key =
            file_key_from_url("https://www.figma.com/design/Qr9s8T7u/Other-Design").unwrap();
        assert_eq!(key, "Qr9s8T7u");
    }

    #[test]
    fn bad_url_is_rejected() {
        let err = file_key_from_url("https://example.com/file/abc").unwrap_err();
        assert!(matches!(err, DesignError::InvalidUrl { .. }));
        assert_eq!(err.class(), FailureClass::Validation);
    }

    #[test]
    fn filter_keeps_interactive_and_styled_nodes_only() {
        let components = filter_components(&MockDesignClient::sample_file());
        let names: Vec<_> = components.iter().filter_map(|c| c.name.as_deref()).collect();
        assert_eq!(names, vec!["Export CSV", "Metrics Table"]);

        // Both kept nodes record their parent frame and geometry.
        for component in &components {
            assert_eq!(component.parent_id.as_deref(), Some("1:1"));
            assert!(component.position.get("x").is_some());
            assert!(component.size.get("width").is_some());
        }
    }

    #[test]
    fn filter_of_empty_tree_is_empty() {
        assert!(filter_components(&serde_json::json!({})).is_empty());
        assert!(filter_components(&serde_json::json!({"document": {"children": []}})).is_empty());
    }
}
