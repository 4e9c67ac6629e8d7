//! Validation and scratch storage for oracle-generated template documents.
//!
//! A generated document is only ever used whole: it must parse as YAML, carry
//! an `id` and an `info` mapping, and contain at least one protocol section
//! the engine can execute.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tempfile::NamedTempFile;

/// Top-level sections that make a template executable.
pub const SUPPORTED_PROTOCOLS: &[&str] = &[
    "http", "requests", "dns", "tcp", "network", "ssl", "file", "headless", "websocket",
    "whois", "code", "javascript",
];

#[derive(Debug, thiserror::Error)]
pub enum TemplateDocumentError {
    #[error("YAML syntax error: {0}")]
    Syntax(#[from] serde_yaml::Error),

    #[error("Template document is not a mapping")]
    NotAMapping,

    #[error("Template missing required field: {0}")]
    MissingField(&'static str),

    #[error("Template field '{0}' has the wrong shape")]
    InvalidField(&'static str),

    #[error(
        "Template has no supported protocol section (expected one of: {})",
        SUPPORTED_PROTOCOLS.join(", ")
    )]
    NoProtocolSection,

    #[error("Failed to write scratch template: {0}")]
    Io(#[from] std::io::Error),
}

/// Summary of a document that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDocument {
    pub id: String,
    pub protocols: Vec<String>,
}

/// Check that `content` is a complete, executable template document.
pub fn validate(content: &str) -> Result<ValidatedDocument, TemplateDocumentError> {
    let parsed: Value = serde_yaml::from_str(content)?;
    let mapping = parsed.as_mapping().ok_or(TemplateDocumentError::NotAMapping)?;

    let id = match mapping.get("id") {
        None => return Err(TemplateDocumentError::MissingField("id")),
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(_) => return Err(TemplateDocumentError::InvalidField("id")),
    };

    match mapping.get("info") {
        None => return Err(TemplateDocumentError::MissingField("info")),
        Some(Value::Mapping(_)) => {}
        Some(_) => return Err(TemplateDocumentError::InvalidField("info")),
    }

    let protocols: Vec<String> = SUPPORTED_PROTOCOLS
        .iter()
        .filter(|p| mapping.get(**p).is_some_and(|v| !v.is_null()))
        .map(|p| p.to_string())
        .collect();
    if protocols.is_empty() {
        return Err(TemplateDocumentError::NoProtocolSection);
    }

    Ok(ValidatedDocument { id, protocols })
}

/// A generated document written to a uniquely named scratch file.
///
/// The file is deleted when this value is dropped, whichever way the request
/// finishes.
#[derive(Debug)]
pub struct ScratchTemplate {
    file: NamedTempFile,
    document: ValidatedDocument,
}

impl ScratchTemplate {
    /// Validate `content` and persist it under `dir`.
    pub fn create(dir: &Path, content: &str) -> Result<Self, TemplateDocumentError> {
        let document = validate(content)?;

        let mut file = tempfile::Builder::new()
            .prefix("generated-template-")
            .suffix(".yaml")
            .tempfile_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        tracing::debug!(
            path = %file.path().display(),
            template_id = %document.id,
            "Wrote generated template"
        );

        Ok(Self { file, document })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    pub fn document(&self) -> &ValidatedDocument {
        &self.document
    }
}
