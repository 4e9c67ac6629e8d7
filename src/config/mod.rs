use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Template directories used when nothing else is available.
pub const DEFAULT_TEMPLATES: &[&str] = &[
    "http/technologies/",
    "http/exposures/",
    "http/vulnerabilities/",
    "http/misconfiguration/",
    "http/cves/",
];

/// Oracle keys shorter than this are treated as missing.
const MIN_API_KEY_LEN: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' (expected {expected})")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// What the executor does when no requested template survives the existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyTemplatePolicy {
    /// Fail the scan with "no valid templates available".
    Reject,
    /// Run the engine without selectors so it uses its whole corpus.
    EngineCorpus,
}

impl FromStr for EmptyTemplatePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "engine-corpus" | "engine_corpus" => Ok(Self::EngineCorpus),
            _ => Err(()),
        }
    }
}

/// Output mode requested from the scanning engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jsonl,
    /// Plain console lines, scraped with a regex. Degraded mode.
    Text,
}

impl FromStr for OutputFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jsonl" | "json" => Ok(Self::Jsonl),
            "text" => Ok(Self::Text),
            _ => Err(()),
        }
    }
}

/// Connection settings for the text-generation oracle.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub document_max_tokens: u32,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// Settings for the external scanning engine.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub binary: PathBuf,
    pub templates_root: PathBuf,
    pub timeout: Duration,
    pub empty_policy: EmptyTemplatePolicy,
    pub output: OutputFormat,
    pub scratch_dir: PathBuf,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub oracle: OracleConfig,
    pub scanner: ScannerConfig,
    pub default_templates: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_key = lookup("ORACLE_API_KEY")
            .or_else(|| lookup("DEEPSEEK_API_KEY"))
            .map(|k| k.trim().to_string())
            .filter(|k| k.len() >= MIN_API_KEY_LEN);

        let templates_root = lookup("NUCLEI_TEMPLATES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                lookup("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_default()
                    .join("nuclei-templates")
            });

        let empty_policy_raw = var("EMPTY_TEMPLATE_POLICY", "reject");
        let empty_policy = empty_policy_raw
            .parse::<EmptyTemplatePolicy>()
            .map_err(|_| ConfigError::Invalid {
                key: "EMPTY_TEMPLATE_POLICY",
                value: empty_policy_raw.clone(),
                expected: "reject | engine-corpus",
            })?;

        let output_raw = var("SCANNER_OUTPUT", "jsonl");
        let output = output_raw.parse::<OutputFormat>().map_err(|_| ConfigError::Invalid {
            key: "SCANNER_OUTPUT",
            value: output_raw.clone(),
            expected: "jsonl | text",
        })?;

        let default_templates = lookup("DEFAULT_TEMPLATES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_TEMPLATES.iter().map(|t| t.to_string()).collect());

        Ok(Self {
            host: var("AGENT_HOST", "0.0.0.0"),
            port: var("AGENT_PORT", "8000").parse().unwrap_or(8000),
            oracle: OracleConfig {
                api_url: var(
                    "ORACLE_API_URL",
                    "https://api.deepseek.com/v1/chat/completions",
                ),
                api_key,
                model: var("ORACLE_MODEL", "deepseek-chat"),
                max_tokens: var("ORACLE_MAX_TOKENS", "500").parse().unwrap_or(500),
                document_max_tokens: var("ORACLE_DOCUMENT_MAX_TOKENS", "1000")
                    .parse()
                    .unwrap_or(1000),
                timeout: Duration::from_secs(positive(&var("ORACLE_TIMEOUT_SECS", "60"), 60)),
                max_attempts: var("ORACLE_MAX_ATTEMPTS", "5")
                    .parse::<u32>()
                    .unwrap_or(5)
                    .max(1),
                initial_backoff: Duration::from_millis(
                    var("ORACLE_INITIAL_BACKOFF_MS", "2000")
                        .parse()
                        .unwrap_or(2000),
                ),
                max_backoff: Duration::from_millis(
                    var("ORACLE_MAX_BACKOFF_MS", "30000")
                        .parse()
                        .unwrap_or(30000),
                ),
            },
            scanner: ScannerConfig {
                binary: PathBuf::from(var("SCANNER_BINARY", "nuclei")),
                templates_root,
                timeout: Duration::from_secs(positive(&var("SCAN_TIMEOUT_SECS", "900"), 900)),
                empty_policy,
                output,
                scratch_dir: lookup("SCRATCH_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(env::temp_dir),
            },
            default_templates,
        })
    }
}

/// Parse a strictly positive count of seconds, falling back to `default`.
fn positive(raw: &str, default: u64) -> u64 {
    raw.parse().ok().filter(|n| *n > 0).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[("HOME", "/home/scanner")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.oracle.model, "deepseek-chat");
        assert_eq!(config.oracle.max_attempts, 5);
        assert!(config.oracle.api_key.is_none());
        assert_eq!(config.scanner.timeout, Duration::from_secs(900));
        assert_eq!(config.scanner.empty_policy, EmptyTemplatePolicy::Reject);
        assert_eq!(config.scanner.output, OutputFormat::Jsonl);
        assert_eq!(
            config.scanner.templates_root,
            PathBuf::from("/home/scanner/nuclei-templates")
        );
        assert_eq!(config.default_templates.len(), DEFAULT_TEMPLATES.len());
    }

    #[test]
    fn short_api_key_is_treated_as_missing() {
        let config = config_from(&[("ORACLE_API_KEY", "short")]).unwrap();
        assert!(config.oracle.api_key.is_none());
    }

    #[test]
    fn legacy_key_name_is_accepted() {
        let config = config_from(&[("DEEPSEEK_API_KEY", "sk-0123456789abcdef")]).unwrap();
        assert_eq!(config.oracle.api_key.as_deref(), Some("sk-0123456789abcdef"));
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let config = config_from(&[("AGENT_PORT", "http"), ("SCAN_TIMEOUT_SECS", "-1")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.scanner.timeout, Duration::from_secs(900));
    }

    #[test]
    fn zero_timeouts_fall_back_to_defaults() {
        let config =
            config_from(&[("SCAN_TIMEOUT_SECS", "0"), ("ORACLE_TIMEOUT_SECS", "0")]).unwrap();
        assert_eq!(config.scanner.timeout, Duration::from_secs(900));
        assert_eq!(config.oracle.timeout, Duration::from_secs(60));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = config_from(&[("EMPTY_TEMPLATE_POLICY", "yolo")]).unwrap_err();
        assert!(err.to_string().contains("EMPTY_TEMPLATE_POLICY"));
    }

    #[test]
    fn engine_corpus_policy_parses() {
        let config = config_from(&[("EMPTY_TEMPLATE_POLICY", "engine-corpus")]).unwrap();
        assert_eq!(config.scanner.empty_policy, EmptyTemplatePolicy::EngineCorpus);
    }

    #[test]
    fn default_templates_override() {
        let config = config_from(&[("DEFAULT_TEMPLATES", "http/cves/, dns/ ,")]).unwrap();
        assert_eq!(config.default_templates, vec!["http/cves/", "dns/"]);
    }
}
