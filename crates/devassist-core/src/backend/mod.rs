//! Interchangeable summarization backends.
//!
//! [`select_backend`] maps an [`AiConfig`] to exactly one implementation.
//! The choice depends only on [`AiConfig::backend`] and is made once per
//! process; a failing backend is never swapped for another.

pub mod claude;
pub mod error;
pub mod local;
pub mod openai;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use claude::ClaudeBackend;
pub use error::{BackendError, BackendResult};
pub use local::LocalBackend;
pub use openai::OpenAiBackend;

/// Sampling temperature shared by every backend that accepts one.
pub const SAMPLING_TEMPERATURE: f64 = 0.7;

/// Completion length cap shared by every backend.
pub const MAX_COMPLETION_TOKENS: u32 = 1024;

/// Which summarization engine to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// llama.cpp against a model file on disk.
    Local,
    /// Anthropic Messages API.
    Claude,
    /// OpenAI Chat Completions API.
    #[serde(rename = "openai")]
    OpenAi,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Claude => "claude",
            BackendKind::OpenAi => "openai",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "claude" => Ok(BackendKind::Claude),
            "openai" => Ok(BackendKind::OpenAi),
            other => Err(BackendError::Config(format!(
                "unknown AI provider: {other:?} (expected local, claude or openai)"
            ))),
        }
    }
}

/// Resolved AI settings for one run.
#[derive(Clone, PartialEq)]
pub struct AiConfig {
    pub backend: BackendKind,
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub local_model_path: Option<PathBuf>,
    /// llama.cpp executable used by the local backend.
    pub local_runtime: PathBuf,
    pub request_timeout: Duration,
}

impl AiConfig {
    pub fn new(backend: BackendKind, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            api_key: None,
            api_url: None,
            local_model_path: None,
            local_runtime: PathBuf::from(local::DEFAULT_RUNTIME),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Non-empty credential, if any.
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Non-empty endpoint override, if any.
    pub fn endpoint(&self) -> Option<&str> {
        self.api_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "********"))
            .field("api_url", &self.api_url)
            .field("local_model_path", &self.local_model_path)
            .field("local_runtime", &self.local_runtime)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// A summarization engine.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Produce one completion for `prompt`.
    async fn generate(&self, prompt: &str) -> BackendResult<String>;
}

/// Build the backend named by `config.backend`.
pub fn select_backend(config: &AiConfig) -> BackendResult<Box<dyn Backend>> {
    Ok(match config.backend {
        BackendKind::Local => Box::new(LocalBackend::from_config(config)),
        BackendKind::Claude => Box::new(ClaudeBackend::from_config(config)?),
        BackendKind::OpenAi => Box::new(OpenAiBackend::from_config(config)?),
    })
}

pub(crate) fn http_client(timeout: Duration) -> BackendResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("devassist/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::Config(format!("failed to build HTTP client: {e}")))
}

/// Send a prepared request and decode a JSON success body.
pub(crate) async fn send_json(request: reqwest::RequestBuilder) -> BackendResult<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::api(Some(status.as_u16()), body));
    }

    Ok(response.json::<Value>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parses_case_insensitively() {
        assert_eq!("Claude".parse::<BackendKind>().unwrap(), BackendKind::Claude);
        assert_eq!(" openai ".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert_eq!("local".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert!(matches!(
            "bard".parse::<BackendKind>(),
            Err(BackendError::Config(_))
        ));
    }

    #[test]
    fn test_backend_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&BackendKind::OpenAi).unwrap(),
            "\"openai\""
        );
        let kind: BackendKind = serde_json::from_str("\"claude\"").unwrap();
        assert_eq!(kind, BackendKind::Claude);
    }

    #[test]
    fn test_selection_is_a_function_of_backend_kind() {
        for kind in [BackendKind::Local, BackendKind::Claude, BackendKind::OpenAi] {
            let config = AiConfig::new(kind, "m");
            let first = select_backend(&config).unwrap();
            let second = select_backend(&config).unwrap();
            assert_eq!(first.kind(), kind);
            assert_eq!(second.kind(), first.kind());
        }
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = AiConfig::new(BackendKind::Claude, "m");
        config.api_key = Some("sk-secret".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("********"));
    }

    #[test]
    fn test_blank_credential_is_none() {
        let mut config = AiConfig::new(BackendKind::OpenAi, "m");
        config.api_key = Some("   ".to_string());
        assert_eq!(config.credential(), None);
    }
}
