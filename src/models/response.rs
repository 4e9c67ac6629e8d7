//! Scan outcome and the outbound wire envelope.

use serde::{Deserialize, Serialize};

use crate::models::finding::Finding;
use crate::models::template::{Provenance, ResolvedTemplateSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Result of one executor run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResponse {
    pub status: Status,
    pub findings: Vec<Finding>,
    /// Fatal errors and non-fatal warnings, in the order they were observed.
    pub errors: Vec<String>,
    pub templates: ResolvedTemplateSet,
}

impl ScanResponse {
    pub fn success(
        findings: Vec<Finding>,
        warnings: Vec<String>,
        templates: ResolvedTemplateSet,
    ) -> Self {
        Self {
            status: Status::Success,
            findings,
            errors: warnings,
            templates,
        }
    }

    /// A failed scan never carries findings.
    pub fn failure(errors: Vec<String>, templates: ResolvedTemplateSet) -> Self {
        Self {
            status: Status::Error,
            findings: Vec::new(),
            errors,
            templates,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    ScanResponse,
    SuggestResponse,
    /// Protocol-level reply when the request type is unknown or unreadable.
    Response,
}

/// Outbound object written to either transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Finding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl OutboundMessage {
    /// Error reply without results, e.g. for input errors.
    pub fn error(kind: ResponseKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: Status::Error,
            results: None,
            templates: None,
            provenance: None,
            errors: vec![message.into()],
        }
    }

    pub fn suggestions(templates: Vec<String>, provenance: Provenance) -> Self {
        Self {
            kind: ResponseKind::SuggestResponse,
            status: Status::Success,
            results: None,
            templates: Some(templates),
            provenance: Some(provenance),
            errors: Vec::new(),
        }
    }
}

impl From<ScanResponse> for OutboundMessage {
    fn from(response: ScanResponse) -> Self {
        Self {
            kind: ResponseKind::ScanResponse,
            status: response.status,
            results: Some(response.findings),
            templates: Some(response.templates.templates),
            provenance: Some(response.templates.provenance),
            errors: response.errors,
        }
    }
}
