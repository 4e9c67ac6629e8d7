//! Transport-agnostic request handling.
//!
//! Each inbound message moves through parsing, resolution, an optional
//! suggestion call, execution and response building. Nothing is kept between
//! requests; concurrent calls share only the read-only resolver and executor.

use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::request::{RequestKind, ScanRequest};
use crate::models::response::{OutboundMessage, ResponseKind};
use crate::services::engine::NucleiEngine;
use crate::services::executor::{ScanExecutor, ScanOptions};
use crate::services::oracle::ChatCompletionClient;
use crate::services::resolver::{Resolution, TemplateResolver};

pub const INVALID_JSON: &str = "Invalid JSON";
pub const INVALID_REQUEST_TYPE: &str = "Invalid request type";

#[derive(Debug, Clone)]
pub struct Dispatcher {
    resolver: Arc<TemplateResolver>,
    executor: Arc<ScanExecutor>,
}

fn response_kind(kind: RequestKind) -> ResponseKind {
    match kind {
        RequestKind::ScanRequest => ResponseKind::ScanResponse,
        RequestKind::SuggestTemplates => ResponseKind::SuggestResponse,
    }
}

impl Dispatcher {
    pub fn new(resolver: TemplateResolver, executor: ScanExecutor) -> Self {
        Self {
            resolver: Arc::new(resolver),
            executor: Arc::new(executor),
        }
    }

    /// Wire the real oracle client and engine from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let oracle = ChatCompletionClient::shared(&config.oracle);
        let engine = Arc::new(NucleiEngine::new(config.scanner.binary.clone()));
        Self::new(
            TemplateResolver::new(oracle, config),
            ScanExecutor::new(engine, &config.scanner),
        )
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    pub fn executor(&self) -> &ScanExecutor {
        &self.executor
    }

    /// Handle one line of the local protocol.
    pub async fn handle_line(&self, line: &str) -> OutboundMessage {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting undecodable message");
                OutboundMessage::error(ResponseKind::Response, INVALID_JSON)
            }
        }
    }

    /// Route a decoded message by its `type` field.
    pub async fn handle_value(&self, value: Value) -> OutboundMessage {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .and_then(RequestKind::from_type_field);

        match kind {
            Some(kind) => self.handle(kind, value).await,
            None => {
                tracing::warn!(request_type = ?value.get("type"), "Rejecting unknown request type");
                OutboundMessage::error(ResponseKind::Response, INVALID_REQUEST_TYPE)
            }
        }
    }

    /// Handle a message whose kind is already known.
    pub async fn handle(&self, kind: RequestKind, value: Value) -> OutboundMessage {
        let span = tracing::info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            kind = kind.as_str()
        );

        async move {
            tracing::debug!(stage = "parsing", "Validating request");
            let request = match ScanRequest::from_value(value) {
                Ok(request) => request,
                Err(message) => {
                    tracing::warn!(error = %message, "Rejecting invalid request");
                    return OutboundMessage::error(response_kind(kind), message);
                }
            };

            let message = match kind {
                RequestKind::ScanRequest => self.scan(&request).await,
                RequestKind::SuggestTemplates => self.suggest(&request).await,
            };

            tracing::info!(
                stage = "responding",
                status = ?message.status,
                errors = message.errors.len(),
                "Request complete"
            );
            message
        }
        .instrument(span)
        .await
    }

    async fn scan(&self, request: &ScanRequest) -> OutboundMessage {
        tracing::info!(stage = "resolving", target = %request.target, "Resolving templates");
        let Resolution {
            set,
            warnings,
            scratch,
        } = self.resolver.resolve(request).await;
        tracing::info!(
            provenance = %set.provenance,
            templates = set.len(),
            "Templates resolved"
        );

        let options = ScanOptions {
            rate_limit: request.rate_limit,
            severities: request.severities.clone(),
        };

        tracing::info!(stage = "executing", "Starting scan");
        let mut response = self.executor.run(&request.target, &set, &options).await;
        // The generated template must outlive the engine run.
        drop(scratch);

        if !warnings.is_empty() {
            let mut errors = warnings;
            errors.append(&mut response.errors);
            response.errors = errors;
        }

        OutboundMessage::from(response)
    }

    async fn suggest(&self, request: &ScanRequest) -> OutboundMessage {
        tracing::info!(stage = "suggesting", target = %request.target, "Suggesting templates");
        let suggestion = self.resolver.suggest(request).await;
        let mut message = OutboundMessage::suggestions(suggestion.templates, suggestion.provenance);
        message.errors = suggestion.warnings;
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::response::Status;
    use crate::models::template::Provenance;
    use crate::services::oracle::TemplateOracle;
    use crate::services::stubs::{Behaviour, RecordingEngine, ScriptedOracle};
    use serde_json::json;

    const FINDING_LINE: &str = r#"{"template-id":"exposed-panel","info":{"severity":"medium"},"matched-at":"http://example.test/admin"}"#;

    struct Harness {
        dispatcher: Dispatcher,
        engine: Arc<RecordingEngine>,
        oracle: Arc<ScriptedOracle>,
        _root: tempfile::TempDir,
    }

    fn harness(engine: Arc<RecordingEngine>, oracle: Arc<ScriptedOracle>) -> Harness {
        let root = tempfile::tempdir().unwrap();
        for dir in [
            "http/exposures",
            "http/cves",
            "http/misconfiguration",
            "http/technologies",
        ] {
            std::fs::create_dir_all(root.path().join(dir)).unwrap();
        }

        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.scanner.templates_root = root.path().to_path_buf();
        config.scanner.scratch_dir = root.path().to_path_buf();

        let dispatcher = Dispatcher::new(
            TemplateResolver::new(Some(oracle.clone() as Arc<dyn TemplateOracle>), &config),
            ScanExecutor::new(engine.clone(), &config.scanner),
        );
        Harness {
            dispatcher,
            engine,
            oracle,
            _root: root,
        }
    }

    fn default_harness() -> Harness {
        harness(
            RecordingEngine::printing(&format!("{FINDING_LINE}\n"), "", 0),
            ScriptedOracle::replying("[\"http/cves/\"]"),
        )
    }

    #[tokio::test]
    async fn undecodable_line_is_a_protocol_error() {
        let h = default_harness();
        let message = h.dispatcher.handle_line("{not json").await;
        assert_eq!(message.kind, ResponseKind::Response);
        assert_eq!(message.status, Status::Error);
        assert_eq!(message.errors, vec![INVALID_JSON]);
        assert!(h.engine.invocations().is_empty());
        assert!(h.oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_type_has_no_side_effects() {
        let h = default_harness();
        for value in [
            json!({"type": "delete_everything", "target": "http://example.test/"}),
            json!({"target": "http://example.test/"}),
            json!([1, 2, 3]),
        ] {
            let message = h.dispatcher.handle_value(value).await;
            assert_eq!(message.kind, ResponseKind::Response);
            assert_eq!(message.errors, vec![INVALID_REQUEST_TYPE]);
        }
        assert!(h.engine.invocations().is_empty());
        assert!(h.oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_target_touches_nothing() {
        let h = default_harness();
        for line in [
            r#"{"type":"scan_request"}"#,
            r#"{"type":"suggest_templates","target":""}"#,
        ] {
            let message = h.dispatcher.handle_line(line).await;
            assert_eq!(message.status, Status::Error);
            assert!(message.errors[0].contains("target"));
        }
        assert!(h.engine.invocations().is_empty());
        assert!(h.oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn user_templates_reach_the_engine_unchanged() {
        let h = default_harness();
        let message = h
            .dispatcher
            .handle_line(r#"{"type":"scan_request","target":"http://example.test/","templates":["http/exposures/"],"use_oracle":false}"#)
            .await;

        assert_eq!(message.kind, ResponseKind::ScanResponse);
        assert_eq!(message.status, Status::Success);
        assert!(message.errors.is_empty());
        let results = message.results.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].template_id, "exposed-panel");
        assert_eq!(message.provenance, Some(Provenance::UserProvided));

        assert_eq!(h.engine.invocations()[0].templates, vec!["http/exposures"]);
        assert!(h.oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn fenced_oracle_reply_drives_the_scan() {
        let h = harness(
            RecordingEngine::printing("", "", 0),
            ScriptedOracle::replying(
                "Sure, try these:\n```json\n[\"http/cves/\",\"http/misconfiguration/\"]\n```",
            ),
        );
        let message = h
            .dispatcher
            .handle_value(json!({"type": "scan_request", "target": "http://example.test/"}))
            .await;

        assert_eq!(message.status, Status::Success);
        assert_eq!(message.provenance, Some(Provenance::OracleSuggested));
        assert_eq!(
            h.engine.invocations()[0].templates,
            vec!["http/cves", "http/misconfiguration"]
        );
    }

    #[tokio::test]
    async fn oracle_outage_degrades_to_defaults() {
        let h = harness(
            RecordingEngine::printing("", "", 0),
            ScriptedOracle::failing(),
        );
        let message = h
            .dispatcher
            .handle_value(json!({"type": "scan_request", "target": "http://example.test/"}))
            .await;

        assert_eq!(message.status, Status::Success);
        assert_eq!(message.provenance, Some(Provenance::DefaultFallback));
        assert!(message.errors[0].starts_with("template suggestion failed"));
        assert_eq!(h.engine.invocations().len(), 1);
    }

    #[tokio::test]
    async fn legacy_field_names_are_honoured() {
        let h = default_harness();
        h.dispatcher
            .handle_value(json!({
                "type": "scan_request",
                "target": "http://example.test/",
                "use_deepseek": false,
                "vulnerability_type": "sqli"
            }))
            .await;
        assert!(h.oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn suggestion_never_runs_the_engine() {
        let h = default_harness();
        let message = h
            .dispatcher
            .handle_value(json!({"type": "suggest_templates", "target": "http://example.test/"}))
            .await;

        assert_eq!(message.kind, ResponseKind::SuggestResponse);
        assert_eq!(message.status, Status::Success);
        assert_eq!(message.templates, Some(vec!["http/cves/".to_string()]));
        assert!(h.engine.invocations().is_empty());
    }

    #[tokio::test]
    async fn failed_suggestion_returns_defaults() {
        let h = harness(
            RecordingEngine::printing("", "", 0),
            ScriptedOracle::failing(),
        );
        let message = h
            .dispatcher
            .handle_value(json!({"type": "suggest_templates", "target": "http://example.test/"}))
            .await;

        assert_eq!(message.status, Status::Success);
        assert_eq!(message.provenance, Some(Provenance::DefaultFallback));
        assert_eq!(
            message.templates.unwrap().len(),
            crate::config::DEFAULT_TEMPLATES.len()
        );
        assert_eq!(message.errors.len(), 1);
    }

    #[tokio::test]
    async fn executor_timeout_is_reported() {
        let h = harness(
            RecordingEngine::new(Behaviour::TimeOut),
            ScriptedOracle::replying("[\"http/cves/\"]"),
        );
        let message = h
            .dispatcher
            .handle_value(json!({"type": "scan_request", "target": "http://example.test/", "templates": ["http/cves"]}))
            .await;

        assert_eq!(message.status, Status::Error);
        assert_eq!(message.results, Some(Vec::new()));
        assert_eq!(message.errors, vec!["scan timed out"]);
    }

    #[tokio::test]
    async fn generated_template_is_removed_after_the_scan() {
        let h = harness(
            RecordingEngine::printing("", "", 0),
            ScriptedOracle::replying(
                "```yaml\nid: gen\ninfo:\n  name: gen\n  severity: info\nhttp:\n  - method: GET\n    path: [\"{{BaseURL}}\"]\n```",
            ),
        );
        let message = h
            .dispatcher
            .handle_value(json!({
                "type": "scan_request",
                "target": "http://example.test/",
                "generate_template": true
            }))
            .await;

        assert_eq!(message.status, Status::Success);
        assert_eq!(message.provenance, Some(Provenance::GeneratedInline));
        let used = &h.engine.invocations()[0].templates;
        assert_eq!(used.len(), 1);
        assert!(!std::path::Path::new(&used[0]).exists());
    }
}
