//! Scan execution: template existence checks, engine invocation and
//! classification of whatever the engine printed.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::config::{EmptyTemplatePolicy, OutputFormat, ScannerConfig};
use crate::models::finding::{Finding, Severity};
use crate::models::response::ScanResponse;
use crate::models::template::{normalize_identifier, Provenance, ResolvedTemplateSet};
use crate::services::engine::{EngineError, Invocation, ScanEngine};

pub const TIMEOUT_MESSAGE: &str = "scan timed out";
pub const NO_TEMPLATES_MESSAGE: &str = "no valid templates available";

static SKIPPED_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)skipp\w*.*unresponsive").expect("static regex"));

static MISSING_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(could not find template|template not found|no templates provided)")
        .expect("static regex")
});

/// Per-request knobs handed through to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub rate_limit: u32,
    pub severities: Vec<Severity>,
}

#[derive(Debug, Clone)]
pub struct ScanExecutor {
    engine: Arc<dyn ScanEngine>,
    templates_root: PathBuf,
    timeout: Duration,
    empty_policy: EmptyTemplatePolicy,
    output: OutputFormat,
}

/// Findings and warnings recovered from engine output.
#[derive(Debug, Default)]
pub struct ParsedOutput {
    pub findings: Vec<Finding>,
    pub warnings: Vec<String>,
}

/// Parse engine stdout and classify stderr.
///
/// Unparseable stdout lines become warnings; they never abort the parse.
pub fn parse_output(stdout: &str, stderr: &str, format: OutputFormat) -> ParsedOutput {
    let mut parsed = ParsedOutput::default();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match format {
            OutputFormat::Jsonl => match Finding::from_json_line(line) {
                Ok(finding) => parsed.findings.push(finding),
                Err(e) => {
                    tracing::debug!(error = %e, line = %line, "Skipping unparseable output line");
                    parsed.warnings.push(format!("Invalid JSON output: {line}"));
                }
            },
            // Console output interleaves banners and progress; unmatched lines are noise.
            OutputFormat::Text => {
                if let Some(finding) = Finding::from_text_line(line) {
                    parsed.findings.push(finding);
                }
            }
        }
    }

    parsed.warnings.extend(classify_stderr(stderr));
    parsed
}

/// Known stderr diagnostics surfaced as warnings.
pub fn classify_stderr(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            if SKIPPED_TARGET.is_match(line) {
                Some(format!("Target skipped: {line}"))
            } else if MISSING_TEMPLATE.is_match(line) {
                Some(format!("Template error: {line}"))
            } else {
                None
            }
        })
        .collect()
}

impl ScanExecutor {
    pub fn new(engine: Arc<dyn ScanEngine>, config: &ScannerConfig) -> Self {
        Self {
            engine,
            templates_root: config.templates_root.clone(),
            timeout: config.timeout,
            empty_policy: config.empty_policy,
            output: config.output,
        }
    }

    pub fn engine(&self) -> &Arc<dyn ScanEngine> {
        &self.engine
    }

    pub fn templates_root(&self) -> &Path {
        &self.templates_root
    }

    /// Resolve an identifier to a path on disk.
    ///
    /// Only generated scratch documents may be absolute. Every other
    /// identifier must stay under the template root: absolute paths and
    /// `..` components resolve to nothing.
    fn locate(&self, identifier: &str, provenance: Provenance) -> Option<PathBuf> {
        let path = Path::new(identifier);
        if provenance == Provenance::GeneratedInline && path.is_absolute() {
            return Some(path.to_path_buf());
        }
        let contained = !identifier.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        contained.then(|| self.templates_root.join(path))
    }

    /// Split a resolved set into identifiers that exist and warnings for
    /// those that do not. Order is preserved.
    pub fn check_templates(&self, set: &ResolvedTemplateSet) -> (Vec<String>, Vec<String>) {
        let mut present = Vec::with_capacity(set.len());
        let mut warnings = Vec::new();

        for identifier in &set.templates {
            let normalized = normalize_identifier(identifier);
            let found = self
                .locate(&normalized, set.provenance)
                .is_some_and(|path| path.exists());
            if found {
                present.push(normalized);
            } else {
                tracing::warn!(template = %normalized, "Template not found, skipping");
                warnings.push(format!("Template directory not found: {normalized}"));
            }
        }

        (present, warnings)
    }

    /// Run one scan to completion. Never retries.
    pub async fn run(
        &self,
        target: &str,
        set: &ResolvedTemplateSet,
        options: &ScanOptions,
    ) -> ScanResponse {
        let (templates, mut warnings) = self.check_templates(set);
        let used = ResolvedTemplateSet::new(templates.clone(), set.provenance);

        if templates.is_empty() {
            match self.empty_policy {
                EmptyTemplatePolicy::Reject => {
                    tracing::warn!(target = %target, "No valid templates, refusing to scan");
                    warnings.push(NO_TEMPLATES_MESSAGE.to_string());
                    return ScanResponse::failure(warnings, used);
                }
                EmptyTemplatePolicy::EngineCorpus => {
                    tracing::info!(target = %target, "No valid templates, using engine corpus");
                    warnings.push(format!(
                        "{NO_TEMPLATES_MESSAGE}; running the engine's full template corpus"
                    ));
                }
            }
        }

        let invocation = Invocation {
            target: target.to_string(),
            templates,
            rate_limit: options.rate_limit,
            severities: options.severities.clone(),
            output: self.output,
        };

        let started = std::time::Instant::now();
        let output = match self.engine.execute(&invocation, self.timeout).await {
            Ok(output) => output,
            Err(EngineError::TimedOut(_)) => {
                return ScanResponse::failure(vec![TIMEOUT_MESSAGE.to_string()], used);
            }
            Err(e) => {
                tracing::error!(error = %e, target = %target, "Scanner failed to run");
                warnings.push(e.to_string());
                return ScanResponse::failure(warnings, used);
            }
        };

        tracing::info!(
            target = %target,
            exit_code = ?output.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scanner finished"
        );

        if !output.success() {
            let reason = match output.exit_code {
                Some(code) => format!("scanner exited with status {code}"),
                None => "scanner was terminated by a signal".to_string(),
            };
            warnings.push(reason);
            let stderr = output.stderr.trim();
            if !stderr.is_empty() {
                warnings.push(stderr.to_string());
            }
            return ScanResponse::failure(warnings, used);
        }

        let parsed = parse_output(&output.stdout, &output.stderr, self.output);
        warnings.extend(parsed.warnings);

        tracing::info!(
            target = %target,
            findings = parsed.findings.len(),
            warnings = warnings.len(),
            "Scan complete"
        );

        ScanResponse::success(parsed.findings, warnings, used)
    }
}
