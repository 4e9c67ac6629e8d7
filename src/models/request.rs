//! Inbound request model shared by both transports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::finding::Severity;

/// Requests-per-second handed to the engine when the caller does not set one.
pub const DEFAULT_RATE_LIMIT: u32 = 50;

/// Discriminator carried in the `type` field of every inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    ScanRequest,
    SuggestTemplates,
}

impl RequestKind {
    pub fn from_type_field(value: &str) -> Option<Self> {
        match value {
            "scan_request" => Some(Self::ScanRequest),
            "suggest_templates" => Some(Self::SuggestTemplates),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScanRequest => "scan_request",
            Self::SuggestTemplates => "suggest_templates",
        }
    }
}

/// Wire shape of a request body before validation.
#[derive(Debug, Clone, Deserialize)]
struct RawRequest {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    templates: Option<Vec<String>>,
    #[serde(default)]
    rate_limit: Option<i64>,
    #[serde(default, alias = "use_deepseek")]
    use_oracle: Option<bool>,
    #[serde(default, alias = "vulnerability_type")]
    vulnerability_category: Option<String>,
    #[serde(default)]
    severity: Option<Vec<Severity>>,
    #[serde(default)]
    generate_template: Option<bool>,
}

/// A validated scan or suggestion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub target: String,
    pub templates: Vec<String>,
    pub rate_limit: u32,
    pub use_oracle: bool,
    pub vulnerability_category: String,
    pub severities: Vec<Severity>,
    pub generate_template: bool,
}

impl ScanRequest {
    /// Request with defaults for everything except the target.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            templates: Vec::new(),
            rate_limit: DEFAULT_RATE_LIMIT,
            use_oracle: true,
            vulnerability_category: "http".to_string(),
            severities: Vec::new(),
            generate_template: false,
        }
    }

    /// Validate a decoded JSON object into a request.
    ///
    /// Error strings are returned verbatim to the caller.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let raw: RawRequest =
            serde_json::from_value(value).map_err(|e| format!("Invalid request: {e}"))?;

        let target = raw
            .target
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "Missing target".to_string())?;

        let rate_limit = match raw.rate_limit {
            None => DEFAULT_RATE_LIMIT,
            Some(n) if n >= 1 && n <= i64::from(u32::MAX) => n as u32,
            Some(n) => return Err(format!("rate_limit must be a positive integer, got {n}")),
        };

        let category = raw
            .vulnerability_category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "http".to_string());

        Ok(Self {
            target,
            templates: raw
                .templates
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            rate_limit,
            use_oracle: raw.use_oracle.unwrap_or(true),
            vulnerability_category: category,
            severities: raw.severity.unwrap_or_default(),
            generate_template: raw.generate_template.unwrap_or(false),
        })
    }
}
