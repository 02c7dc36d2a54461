//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{
    http_client, send_json, AiConfig, Backend, BackendError, BackendKind, BackendResult,
    MAX_COMPLETION_TOKENS,
};

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";
const API_VERSION: &str = "2023-06-01";

pub struct ClaudeBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl ClaudeBackend {
    pub fn from_config(config: &AiConfig) -> BackendResult<Self> {
        let model = match config.model.trim() {
            "" => DEFAULT_MODEL.to_string(),
            m => m.to_string(),
        };
        Ok(Self {
            client: http_client(config.request_timeout)?,
            api_key: config.credential().map(str::to_string),
            endpoint: config
                .endpoint()
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Backend for ClaudeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    async fn generate(&self, prompt: &str) -> BackendResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::Auth("Claude API key not configured".to_string()))?;

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        debug!(model = %self.model, "sending Claude request");
        let response = send_json(
            self.client
                .post(format!("{}/v1/messages", self.endpoint))
                .header("x-api-key", api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body),
        )
        .await?;

        response["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
            .map(str::to_string)
            .ok_or_else(|| BackendError::api(None, "Claude response contained no text block"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, key: Option<&str>) -> AiConfig {
        let mut config = AiConfig::new(BackendKind::Claude, "");
        config.api_key = key.map(str::to_string);
        config.api_url = Some(server.uri());
        config
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error_without_request() {
        let server = MockServer::start().await;
        let backend = ClaudeBackend::from_config(&config(&server, None)).unwrap();

        let err = backend.generate("hello").await.unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "model": DEFAULT_MODEL,
                "max_tokens": 1024
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "All quiet today."}]
            })))
            .mount(&server)
            .await;

        let backend = ClaudeBackend::from_config(&config(&server, Some("sk-test"))).unwrap();
        assert_eq!(backend.generate("brief me").await.unwrap(), "All quiet today.");
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = ClaudeBackend::from_config(&config(&server, Some("sk-test"))).unwrap();
        match backend.generate("brief me").await.unwrap_err() {
            BackendError::Api { status, message } => {
                assert_eq!(status, Some(529));
                assert!(message.contains("overloaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let mut config = AiConfig::new(BackendKind::Claude, "m");
        config.api_key = Some("sk-test".to_string());
        config.api_url = Some("http://127.0.0.1:9".to_string());

        let backend = ClaudeBackend::from_config(&config).unwrap();
        assert!(matches!(
            backend.generate("x").await,
            Err(BackendError::Network(_))
        ));
    }
}
