//! The contract every data-source connector satisfies.
//!
//! A connector is constructed empty, initialized exactly once with its
//! configuration block, and then asked to [`Connector::collect`] once per
//! aggregation round. Any session state (authenticated HTTP clients,
//! resolved user ids) lives inside the connector value itself.

pub mod error;
pub mod process;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{CollectError, InitError, LoadError};
pub use process::ProcessConnector;

/// Opaque, connector-defined configuration block.
pub type ConnectorConfig = serde_json::Map<String, Value>;

/// A pluggable data source.
#[async_trait]
pub trait Connector: Send + Sync {
    /// One-time setup from the connector's configuration block.
    async fn init(&mut self, config: &ConnectorConfig) -> Result<(), InitError>;

    /// Fetch the current snapshot of external state.
    ///
    /// Implementations report ordinary remote failures through the error
    /// channel and return partial data when only some sub-queries fail.
    async fn collect(&self) -> Result<Value, CollectError>;
}

/// Typed accessors over a [`ConnectorConfig`].
pub trait ConfigExt {
    /// Non-empty string value for `key`.
    fn str_field(&self, key: &str) -> Option<&str>;

    /// Like [`ConfigExt::str_field`] but missing or empty is an [`InitError`].
    fn required_str(&self, key: &str) -> Result<&str, InitError>;

    /// String list for `key`; a single string is treated as a
    /// comma-separated list, which is what the setup wizard stores.
    fn str_list(&self, key: &str) -> Vec<String>;
}

impl ConfigExt for ConnectorConfig {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn required_str(&self, key: &str) -> Result<&str, InitError> {
        self.str_field(key)
            .ok_or_else(|| InitError::MissingField(key.to_string()))
    }

    fn str_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> ConnectorConfig {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_required_str_rejects_blank_values() {
        let cfg = config(json!({"token": "  ", "url": "https://x"}));
        assert_eq!(
            cfg.required_str("token"),
            Err(InitError::MissingField("token".to_string()))
        );
        assert_eq!(cfg.required_str("url"), Ok("https://x"));
        assert!(cfg.required_str("absent").is_err());
    }

    #[test]
    fn test_str_list_accepts_array_and_csv() {
        let cfg = config(json!({
            "repositories": ["a/b", "", "c/d"],
            "channels": "general, random ,",
            "number": 3
        }));
        assert_eq!(cfg.str_list("repositories"), vec!["a/b", "c/d"]);
        assert_eq!(cfg.str_list("channels"), vec!["general", "random"]);
        assert!(cfg.str_list("number").is_empty());
        assert!(cfg.str_list("missing").is_empty());
    }
}
