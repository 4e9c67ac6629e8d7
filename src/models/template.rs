//! Resolved template selection and where it came from.

use serde::{Deserialize, Serialize};

/// Why a given template set was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    UserProvided,
    OracleSuggested,
    DefaultFallback,
    GeneratedInline,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserProvided => write!(f, "user-provided"),
            Self::OracleSuggested => write!(f, "oracle-suggested"),
            Self::DefaultFallback => write!(f, "default-fallback"),
            Self::GeneratedInline => write!(f, "generated-inline"),
        }
    }
}

/// Ordered template identifiers plus their provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTemplateSet {
    pub templates: Vec<String>,
    pub provenance: Provenance,
}

impl ResolvedTemplateSet {
    pub fn new(templates: Vec<String>, provenance: Provenance) -> Self {
        Self {
            templates,
            provenance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }
}

/// Strip trailing path separators from a template identifier.
///
/// A bare separator is left as-is so it still names the corpus root.
pub fn normalize_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() {
        trimmed.to_string()
    } else {
        stripped.to_string()
    }
}
