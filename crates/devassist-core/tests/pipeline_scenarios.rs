//! End-to-end pipeline runs against in-process connectors and backends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use devassist_core::{
    select_backend, AiConfig, Aggregator, Backend, BackendError, BackendKind, BackendResult,
    BuiltinCatalog, CollectError, Connector, ConnectorConfig, ConnectorLoader, ConnectorRegistry,
    InitError, Pipeline, PipelineError, PipelineState, NO_DATA_MESSAGE,
};

struct Healthy;

#[async_trait]
impl Connector for Healthy {
    async fn init(&mut self, _config: &ConnectorConfig) -> Result<(), InitError> {
        Ok(())
    }

    async fn collect(&self) -> Result<Value, CollectError> {
        Ok(json!({"pull_requests": [{"title": "Fix login"}]}))
    }
}

struct Hanging;

#[async_trait]
impl Connector for Hanging {
    async fn init(&mut self, _config: &ConnectorConfig) -> Result<(), InitError> {
        Ok(())
    }

    async fn collect(&self) -> Result<Value, CollectError> {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    }
}

#[derive(Clone, Default)]
struct Recorder {
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Backend for Recorder {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn generate(&self, prompt: &str) -> BackendResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("You have one pull request to review.".to_string())
    }
}

fn loader() -> ConnectorLoader {
    let mut catalog = BuiltinCatalog::new();
    catalog
        .register("healthy", || Box::new(Healthy))
        .register("hanging", || Box::new(Hanging))
        .register("dormant", || Box::new(Healthy));
    ConnectorLoader::new(Duration::from_secs(5)).with_source(catalog)
}

#[tokio::test(start_paused = true)]
async fn disabled_and_timed_out_connectors_leave_only_the_healthy_one() {
    let mut registry = ConnectorRegistry::new();
    registry.register("dormant", false, ConnectorConfig::new());
    registry.register("hanging", true, ConnectorConfig::new());
    registry.register("healthy", true, ConnectorConfig::new());

    let recorder = Recorder::default();
    let mut pipeline = Pipeline::new(
        registry,
        loader(),
        Aggregator::new(Duration::from_secs(2)),
        Box::new(recorder.clone()),
    );

    let briefing = pipeline.run().await.unwrap();

    assert_eq!(briefing.sources, vec!["healthy"]);
    assert!(!briefing.no_data);
    assert!(briefing.degraded());
    assert_eq!(briefing.activation.skipped, vec!["dormant"]);
    assert_eq!(briefing.failures.len(), 1);
    assert_eq!(briefing.failures[0].connector, "hanging");
    assert!(matches!(
        briefing.failures[0].error,
        CollectError::Timeout(_)
    ));
    assert_eq!(pipeline.state(), PipelineState::Done);

    let prompts = recorder.prompts.lock().unwrap();
    assert!(prompts[0].contains("=== healthy ==="));
    assert!(!prompts[0].contains("hanging"));
    assert!(!prompts[0].contains("dormant"));
}

#[tokio::test]
async fn zero_enabled_connectors_still_reach_the_backend() {
    let mut registry = ConnectorRegistry::new();
    registry.register("healthy", false, ConnectorConfig::new());

    let recorder = Recorder::default();
    let mut pipeline = Pipeline::new(
        registry,
        loader(),
        Aggregator::default(),
        Box::new(recorder.clone()),
    );

    let briefing = pipeline.run().await.unwrap();

    assert!(briefing.no_data);
    assert!(briefing.sources.is_empty());
    assert!(pipeline.history().contains(&PipelineState::Failed));
    assert_eq!(pipeline.state(), PipelineState::Done);

    let prompts = recorder.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(NO_DATA_MESSAGE));
}

#[tokio::test]
async fn remote_backend_without_credential_fails_with_auth_error() {
    let mut registry = ConnectorRegistry::new();
    registry.register("healthy", true, ConnectorConfig::new());

    let backend = select_backend(&AiConfig::new(BackendKind::Claude, "")).unwrap();
    let mut pipeline = Pipeline::new(registry, loader(), Aggregator::default(), backend);

    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::Backend(BackendError::Auth(_))));
    assert_eq!(pipeline.state(), PipelineState::PromptBuilt);
    assert!(!pipeline.history().contains(&PipelineState::SummaryProduced));
}

#[tokio::test]
async fn unknown_connector_is_absent_not_fatal() {
    let mut registry = ConnectorRegistry::new();
    registry.register("gitlab", true, ConnectorConfig::new());
    registry.register("healthy", true, ConnectorConfig::new());

    let mut pipeline = Pipeline::new(
        registry,
        loader(),
        Aggregator::default(),
        Box::new(Recorder::default()),
    );

    let briefing = pipeline.run().await.unwrap();

    assert_eq!(briefing.sources, vec!["healthy"]);
    assert_eq!(briefing.activation.failed.len(), 1);
    assert!(briefing.activation.failed[0].is_not_found());
    assert!(!pipeline.history().contains(&PipelineState::Failed));
}
