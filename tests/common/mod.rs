//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scanpilot::config::{AppConfig, DEFAULT_TEMPLATES};
use scanpilot::services::dispatcher::Dispatcher;
use scanpilot::services::engine::{EngineError, EngineOutput, Invocation, ScanEngine};
use scanpilot::services::executor::ScanExecutor;
use scanpilot::services::oracle::ChatCompletionClient;
use scanpilot::services::resolver::TemplateResolver;

pub const FINDING_LINE: &str = r#"{"template-id":"exposed-panel","info":{"severity":"medium"},"matched-at":"http://example.test/admin"}"#;

/// Engine stand-in that records invocations and prints a fixed output.
#[derive(Debug)]
pub struct RecordingEngine {
    stdout: String,
    invocations: Mutex<Vec<Invocation>>,
}

impl RecordingEngine {
    pub fn printing(stdout: &str) -> Arc<Self> {
        Arc::new(Self {
            stdout: stdout.to_string(),
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanEngine for RecordingEngine {
    async fn execute(
        &self,
        invocation: &Invocation,
        _timeout: Duration,
    ) -> Result<EngineOutput, EngineError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        // Generated templates must still exist while the engine runs.
        for template in &invocation.templates {
            let path = Path::new(template);
            if path.is_absolute() {
                assert!(path.exists(), "scratch template removed before the scan");
            }
        }
        Ok(EngineOutput {
            exit_code: Some(0),
            stdout: self.stdout.clone(),
            stderr: String::new(),
        })
    }

    async fn version(&self) -> Result<String, EngineError> {
        Ok("recording-engine 1.0".to_string())
    }
}

/// A template root containing every default directory plus `http/exposures`.
pub fn template_root() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    for dir in DEFAULT_TEMPLATES {
        std::fs::create_dir_all(root.path().join(dir)).unwrap();
    }
    root
}

/// Configuration pointing at `root`, with an oracle at `oracle_url` when given.
pub fn config(root: &Path, oracle_url: Option<&str>) -> AppConfig {
    let mut vars: HashMap<&str, String> = HashMap::from([
        ("NUCLEI_TEMPLATES_DIR", root.display().to_string()),
        ("SCRATCH_DIR", root.display().to_string()),
        ("ORACLE_MAX_ATTEMPTS", "3".to_string()),
        ("ORACLE_INITIAL_BACKOFF_MS", "1".to_string()),
        ("ORACLE_MAX_BACKOFF_MS", "5".to_string()),
        ("ORACLE_TIMEOUT_SECS", "5".to_string()),
    ]);
    if let Some(url) = oracle_url {
        vars.insert("ORACLE_API_URL", format!("{url}/v1/chat/completions"));
        vars.insert("ORACLE_API_KEY", "sk-test-0123456789".to_string());
    }
    AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn dispatcher(config: &AppConfig, engine: Arc<dyn ScanEngine>) -> Dispatcher {
    Dispatcher::new(
        TemplateResolver::new(ChatCompletionClient::shared(&config.oracle), config),
        ScanExecutor::new(engine, &config.scanner),
    )
}

/// Chat-completion body carrying `content`.
pub fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
}
