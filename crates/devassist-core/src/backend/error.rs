//! Error types for summarization backends.

/// Errors produced by a [`Backend`](super::Backend).
///
/// There is no fallback backend, so any of these ends the run without a
/// summary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend configuration error: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {message}")]
    Api { status: Option<u16>, message: String },
}

impl BackendError {
    pub(crate) fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = match status {
            Some(code) => format!("HTTP {code}: {message}"),
            None => message,
        };
        BackendError::Api { status, message }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => BackendError::api(Some(status.as_u16()), err.to_string()),
            None if err.is_decode() => {
                BackendError::api(None, format!("malformed response: {err}"))
            }
            None => BackendError::Network(err.to_string()),
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;
