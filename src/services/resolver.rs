//! Template resolution: user list, oracle suggestion, generated document, or
//! the configured default set.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::request::ScanRequest;
use crate::models::template::{normalize_identifier, Provenance, ResolvedTemplateSet};
use crate::services::oracle::{
    generate_document, suggest_directories, OracleError, TemplateOracle,
};
use crate::services::template_document::ScratchTemplate;

/// Outcome of resolving one scan request.
///
/// `scratch` owns any generated template file; keep it alive until the scan
/// that uses it has finished.
#[derive(Debug)]
pub struct Resolution {
    pub set: ResolvedTemplateSet,
    pub warnings: Vec<String>,
    pub scratch: Option<ScratchTemplate>,
}

/// Outcome of a suggestion-only request.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub templates: Vec<String>,
    pub provenance: Provenance,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TemplateResolver {
    oracle: Option<Arc<dyn TemplateOracle>>,
    default_templates: Vec<String>,
    max_tokens: u32,
    document_max_tokens: u32,
    scratch_dir: PathBuf,
}

fn directory_prompt(target: &str, category: &str) -> String {
    format!(
        "For the target {target}, suggest a JSON array of Nuclei template directories \
         suitable for scanning {category} vulnerabilities. \
         Examples include [\"http/technologies/\", \"http/exposures/\", \"http/vulnerabilities/\", \
         \"http/misconfiguration/\", \"http/cves/\"]. \
         Ensure the response is a valid JSON array containing only directory paths ending with '/'. \
         Do not include explanations or additional text outside the JSON array."
    )
}

fn document_prompt(target: &str, category: &str) -> String {
    format!(
        "Generate a valid Nuclei YAML template to scan the target {target} for {category} \
         vulnerabilities. The template must include the required fields id and info \
         (with name, author, severity, description) and at least one protocol section \
         such as http with requests and matchers. Respond with the YAML document only.\n\
         Example:\n\
         id: xss-vuln\n\
         info:\n  name: XSS Vulnerability Detection\n  author: scanpilot\n  severity: high\n  \
         description: Detects reflected XSS in search functionality\n\
         http:\n  - method: GET\n    path:\n      - \"{{{{BaseURL}}}}/search?q={{{{payload}}}}\"\n    \
         payloads:\n      payload:\n        - \"<script>alert(1)</script>\"\n    \
         matchers:\n      - type: word\n        words:\n          - \"<script>alert(1)</script>\"\n        \
         part: body\n"
    )
}

impl TemplateResolver {
    pub fn new(oracle: Option<Arc<dyn TemplateOracle>>, config: &AppConfig) -> Self {
        Self {
            oracle,
            default_templates: config.default_templates.clone(),
            max_tokens: config.oracle.max_tokens,
            document_max_tokens: config.oracle.document_max_tokens,
            scratch_dir: config.scanner.scratch_dir.clone(),
        }
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    fn default_set(&self) -> ResolvedTemplateSet {
        ResolvedTemplateSet::new(
            self.default_templates
                .iter()
                .map(|t| normalize_identifier(t))
                .collect(),
            Provenance::DefaultFallback,
        )
    }

    fn oracle(&self) -> Result<&dyn TemplateOracle, OracleError> {
        self.oracle.as_deref().ok_or(OracleError::NotConfigured)
    }

    /// Pick the template set for a scan request.
    pub async fn resolve(&self, request: &ScanRequest) -> Resolution {
        if !request.templates.is_empty() {
            let templates = request
                .templates
                .iter()
                .map(|t| normalize_identifier(t))
                .collect();
            return Resolution {
                set: ResolvedTemplateSet::new(templates, Provenance::UserProvided),
                warnings: Vec::new(),
                scratch: None,
            };
        }

        if request.generate_template {
            return match self.generate(request).await {
                Ok(scratch) => {
                    let path = scratch.path().to_string_lossy().into_owned();
                    tracing::info!(
                        template_id = %scratch.document().id,
                        path = %path,
                        "Using generated template"
                    );
                    Resolution {
                        set: ResolvedTemplateSet::new(vec![path], Provenance::GeneratedInline),
                        warnings: Vec::new(),
                        scratch: Some(scratch),
                    }
                }
                Err(message) => {
                    tracing::warn!(error = %message, "Template generation failed, using defaults");
                    Resolution {
                        set: self.default_set(),
                        warnings: vec![format!(
                            "template generation failed: {message}; using default templates"
                        )],
                        scratch: None,
                    }
                }
            };
        }

        if request.use_oracle {
            return match self.ask_for_directories(request).await {
                Ok(dirs) => {
                    tracing::info!(
                        category = %request.vulnerability_category,
                        templates = ?dirs,
                        "Oracle suggested templates"
                    );
                    Resolution {
                        set: ResolvedTemplateSet::new(
                            dirs.iter().map(|d| normalize_identifier(d)).collect(),
                            Provenance::OracleSuggested,
                        ),
                        warnings: Vec::new(),
                        scratch: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Template suggestion failed, using defaults");
                    Resolution {
                        set: self.default_set(),
                        warnings: vec![format!(
                            "template suggestion failed: {e}; using default templates"
                        )],
                        scratch: None,
                    }
                }
            };
        }

        Resolution {
            set: self.default_set(),
            warnings: Vec::new(),
            scratch: None,
        }
    }

    /// Suggestion-only path. Never fails: degrades to the default set.
    pub async fn suggest(&self, request: &ScanRequest) -> Suggestion {
        match self.ask_for_directories(request).await {
            Ok(templates) => Suggestion {
                templates,
                provenance: Provenance::OracleSuggested,
                warnings: Vec::new(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Template suggestion failed, returning defaults");
                Suggestion {
                    templates: self.default_templates.clone(),
                    provenance: Provenance::DefaultFallback,
                    warnings: vec![format!(
                        "template suggestion failed: {e}; returning default templates"
                    )],
                }
            }
        }
    }

    async fn ask_for_directories(&self, request: &ScanRequest) -> Result<Vec<String>, OracleError> {
        let oracle = self.oracle()?;
        let prompt = directory_prompt(&request.target, &request.vulnerability_category);
        suggest_directories(oracle, &prompt, self.max_tokens).await
    }

    async fn generate(&self, request: &ScanRequest) -> Result<ScratchTemplate, String> {
        let oracle = self.oracle().map_err(|e| e.to_string())?;
        let prompt = document_prompt(&request.target, &request.vulnerability_category);
        let document = generate_document(oracle, &prompt, self.document_max_tokens)
            .await
            .map_err(|e| e.to_string())?;
        ScratchTemplate::create(&self.scratch_dir, &document).map_err(|e| e.to_string())
    }
}
