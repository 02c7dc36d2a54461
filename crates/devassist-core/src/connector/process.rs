//! Out-of-process connectors supplied by the user.
//!
//! An extension is any executable. It is spawned with a single argument,
//! `init` or `collect`, receives `{"config": {...}}` on stdin and must exit
//! with status 0. For `collect`, stdout must hold exactly one JSON value.
//! The process is killed if it outlives the configured timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{CollectError, Connector, ConnectorConfig, InitError};

enum InvokeError {
    Timeout,
    Failed(String),
}

/// A connector backed by an external executable.
pub struct ProcessConnector {
    name: String,
    program: PathBuf,
    timeout: Duration,
    config: Option<ConnectorConfig>,
}

impl ProcessConnector {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            timeout,
            config: None,
        }
    }

    /// Path of the executable this connector runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn invoke(
        &self,
        action: &str,
        config: &ConnectorConfig,
    ) -> Result<Vec<u8>, InvokeError> {
        debug!(
            connector = %self.name,
            action,
            program = %self.program.display(),
            "spawning extension"
        );

        let mut child = Command::new(&self.program)
            .arg(action)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InvokeError::Failed(format!("spawn {}: {e}", self.program.display())))?;

        let request = serde_json::to_vec(&json!({ "config": config }))
            .map_err(|e| InvokeError::Failed(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            // An extension that ignores its input may exit before reading it.
            if let Err(e) = stdin.write_all(&request).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(InvokeError::Failed(format!("write request: {e}")));
                }
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| InvokeError::Timeout)?
            .map_err(|e| InvokeError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InvokeError::Failed(format!(
                "{action} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Connector for ProcessConnector {
    async fn init(&mut self, config: &ConnectorConfig) -> Result<(), InitError> {
        match self.invoke("init", config).await {
            Ok(_) => {
                self.config = Some(config.clone());
                Ok(())
            }
            Err(InvokeError::Timeout) => Err(InitError::Process(format!(
                "init timed out after {:?}",
                self.timeout
            ))),
            Err(InvokeError::Failed(reason)) => Err(InitError::Process(reason)),
        }
    }

    async fn collect(&self) -> Result<Value, CollectError> {
        let config = self.config.as_ref().ok_or(CollectError::NotInitialized)?;
        let stdout = match self.invoke("collect", config).await {
            Ok(stdout) => stdout,
            Err(InvokeError::Timeout) => return Err(CollectError::Timeout(self.timeout)),
            Err(InvokeError::Failed(reason)) => return Err(CollectError::Remote(reason)),
        };

        serde_json::from_slice(&stdout)
            .map_err(|e| CollectError::Protocol(format!("extension stdout is not JSON: {e}")))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_collect_parses_stdout_json() {
        let dir = TempDir::new().unwrap();
        let program = script(
            &dir,
            "echoer",
            r#"cat > /dev/null
if [ "$1" = "collect" ]; then echo '{"items":[1,2]}'; fi"#,
        );

        let mut connector = ProcessConnector::new("echoer", program, Duration::from_secs(5));
        connector.init(&ConnectorConfig::new()).await.unwrap();
        let value = connector.collect().await.unwrap();
        assert_eq!(value, json!({"items": [1, 2]}));
    }

    #[tokio::test]
    async fn test_config_is_passed_on_stdin() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "mirror", "cat");

        let mut config = ConnectorConfig::new();
        config.insert("team".to_string(), json!("core"));

        let mut connector = ProcessConnector::new("mirror", program, Duration::from_secs(5));
        connector.init(&config).await.unwrap();
        let value = connector.collect().await.unwrap();
        assert_eq!(value, json!({"config": {"team": "core"}}));
    }

    #[tokio::test]
    async fn test_collect_before_init_is_rejected() {
        let connector = ProcessConnector::new("never", "/bin/true", Duration::from_secs(1));
        assert_eq!(
            connector.collect().await.unwrap_err(),
            CollectError::NotInitialized
        );
    }

    #[tokio::test]
    async fn test_failing_init_becomes_init_error() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "broken", "echo 'bad token' >&2; exit 3");

        let mut connector = ProcessConnector::new("broken", program, Duration::from_secs(5));
        let err = connector.init(&ConnectorConfig::new()).await.unwrap_err();
        match err {
            InitError::Process(reason) => assert!(reason.contains("bad token")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_collect_times_out() {
        let dir = TempDir::new().unwrap();
        let program = script(
            &dir,
            "sleepy",
            r#"if [ "$1" = "collect" ]; then sleep 5; fi"#,
        );

        let mut connector = ProcessConnector::new("sleepy", program, Duration::from_millis(200));
        connector.init(&ConnectorConfig::new()).await.unwrap();
        assert!(matches!(
            connector.collect().await,
            Err(CollectError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_non_json_stdout_is_protocol_error() {
        let dir = TempDir::new().unwrap();
        let program = script(&dir, "chatty", "echo hello");

        let mut connector = ProcessConnector::new("chatty", program, Duration::from_secs(5));
        connector.init(&ConnectorConfig::new()).await.unwrap();
        assert!(matches!(
            connector.collect().await,
            Err(CollectError::Protocol(_))
        ));
    }
}
