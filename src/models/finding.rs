//! Finding model and the engine output grammar it is parsed from.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Severity {
    Unknown,
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl From<&str> for Severity {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" | "informational" => Self::Info,
            "low" => Self::Low,
            "medium" | "moderate" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detection reported by the scanning engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub protocol: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub matched_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted_results: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// The engine's `info` block (tags, description, references, ...).
    #[serde(default)]
    pub metadata: Value,
}

/// Raw JSONL record as written by the engine.
#[derive(Debug, Deserialize)]
struct EngineRecord {
    #[serde(rename = "template-id")]
    template_id: Option<String>,
    #[serde(default)]
    info: Option<Value>,
    #[serde(rename = "type", default)]
    protocol: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(rename = "matched-at", default)]
    matched_at: Option<String>,
    #[serde(rename = "matcher-name", default)]
    matcher_name: Option<String>,
    #[serde(rename = "extracted-results", default)]
    extracted_results: Option<Vec<String>>,
    #[serde(default)]
    timestamp: Option<String>,
}

// [template-id] [protocol] [severity] matched-target [optional metadata]
static TEXT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\]]+)\]\s+\[([^\]]+)\]\s+\[([^\]]+)\]\s+(\S+)(?:\s+(.+))?$")
        .expect("static regex")
});

impl Finding {
    /// Parse one line of JSONL engine output.
    pub fn from_json_line(line: &str) -> Result<Self, String> {
        let record: EngineRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;

        let template_id = record
            .template_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "missing template-id".to_string())?;

        let info = record.info.unwrap_or(Value::Null);
        let severity = info
            .get("severity")
            .and_then(Value::as_str)
            .map(Severity::from)
            .unwrap_or(Severity::Unknown);
        let name = info.get("name").and_then(Value::as_str).map(String::from);

        let matched_at = record
            .matched_at
            .or_else(|| record.host.clone())
            .unwrap_or_default();

        Ok(Self {
            template_id,
            name,
            protocol: record.protocol.unwrap_or_else(|| "unknown".to_string()),
            severity,
            host: record.host,
            matched_at,
            matcher_name: record.matcher_name,
            extracted_results: record.extracted_results.unwrap_or_default(),
            timestamp: record
                .timestamp
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
            metadata: info,
        })
    }

    /// Scrape one line of plain console output. Returns `None` for banner and
    /// progress lines.
    pub fn from_text_line(line: &str) -> Option<Self> {
        let caps = TEXT_LINE.captures(line.trim())?;
        let metadata = caps
            .get(5)
            .map(|m| Value::String(m.as_str().trim().to_string()))
            .unwrap_or(Value::Null);

        Some(Self {
            template_id: caps[1].to_string(),
            name: None,
            protocol: caps[2].to_string(),
            severity: Severity::from(&caps[3]),
            host: None,
            matched_at: caps[4].to_string(),
            matcher_name: None,
            extracted_results: Vec::new(),
            timestamp: None,
            metadata,
        })
    }
}
