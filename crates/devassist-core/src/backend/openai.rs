//! OpenAI Chat Completions backend.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{
    http_client, send_json, AiConfig, Backend, BackendError, BackendKind, BackendResult,
    MAX_COMPLETION_TOKENS, SAMPLING_TEMPERATURE,
};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";

pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl OpenAiBackend {
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
impl Backend for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    async fn generate(&self, prompt: &str) -> BackendResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::Auth("OpenAI API key not configured".to_string()))?;

        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": MAX_COMPLETION_TOKENS,
            "temperature": SAMPLING_TEMPERATURE,
        });

        debug!(model = %self.model, "sending OpenAI request");
        let response = send_json(
            self.client
                .post(format!("{}/chat/completions", self.endpoint))
                .bearer_auth(api_key)
                .json(&body),
        )
        .await?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BackendError::api(None, "OpenAI response contained no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, key: Option<&str>) -> AiConfig {
        let mut config = AiConfig::new(BackendKind::OpenAi, "gpt-4o");
        config.api_key = key.map(str::to_string);
        config.api_url = Some(format!("{}/v1/", server.uri()));
        config
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error() {
        let server = MockServer::start().await;
        let backend = OpenAiBackend::from_config(&config(&server, None)).unwrap();
        assert!(matches!(
            backend.generate("hi").await,
            Err(BackendError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_successful_completion_uses_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Two reviews pending."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAiBackend::from_config(&config(&server, Some("sk-live"))).unwrap();
        assert_eq!(backend.model(), "gpt-4o");
        assert_eq!(
            backend.generate("brief me").await.unwrap(),
            "Two reviews pending."
        );
    }

    #[tokio::test]
    async fn test_unexpected_body_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let backend = OpenAiBackend::from_config(&config(&server, Some("sk-live"))).unwrap();
        assert!(matches!(
            backend.generate("brief me").await,
            Err(BackendError::Api { status: None, .. })
        ));
    }

    #[test]
    fn test_empty_model_falls_back_to_default() {
        let backend = OpenAiBackend::from_config(&AiConfig::new(BackendKind::OpenAi, " ")).unwrap();
        assert_eq!(backend.model(), DEFAULT_MODEL);
    }
}
