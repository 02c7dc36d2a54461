//! Local inference through a llama.cpp command-line runtime.
//!
//! The runtime is invoked once per prompt with a fixed seed and
//! temperature, so the same prompt against the same model file yields the
//! same completion. The prompt is handed over in a temporary file since an
//! aggregated context easily outgrows the per-argument size limit.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{
    AiConfig, Backend, BackendError, BackendKind, BackendResult, MAX_COMPLETION_TOKENS,
    SAMPLING_TEMPERATURE,
};

/// Executable looked up on `PATH` when no runtime is configured.
pub const DEFAULT_RUNTIME: &str = "llama-cli";

/// Seed passed to the runtime for reproducible sampling.
pub const SAMPLING_SEED: u64 = 42;

pub struct LocalBackend {
    model_path: Option<PathBuf>,
    runtime: PathBuf,
    timeout: Duration,
}

impl LocalBackend {
    pub fn new(
        model_path: Option<PathBuf>,
        runtime: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            model_path,
            runtime: runtime.into(),
            timeout,
        }
    }

    pub fn from_config(config: &AiConfig) -> Self {
        Self::new(
            config.local_model_path.clone(),
            config.local_runtime.clone(),
            config.request_timeout,
        )
    }

    fn model(&self) -> BackendResult<&Path> {
        let path = self
            .model_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| BackendError::Config("local model path not configured".to_string()))?;
        if !path.exists() {
            return Err(BackendError::Config(format!(
                "local model not found at {}",
                path.display()
            )));
        }
        Ok(path.as_path())
    }

    fn arguments(&self, model: &Path, prompt_file: &Path) -> Vec<String> {
        vec![
            "-m".to_string(),
            model.display().to_string(),
            "-f".to_string(),
            prompt_file.display().to_string(),
            "-n".to_string(),
            MAX_COMPLETION_TOKENS.to_string(),
            "--temp".to_string(),
            SAMPLING_TEMPERATURE.to_string(),
            "--seed".to_string(),
            SAMPLING_SEED.to_string(),
            "--no-display-prompt".to_string(),
            "-no-cnv".to_string(),
        ]
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn generate(&self, prompt: &str) -> BackendResult<String> {
        let model = self.model()?;
        debug!(
            model = %model.display(),
            runtime = %self.runtime.display(),
            prompt_bytes = prompt.len(),
            "running local model"
        );

        // Removed on drop, after the runtime has exited.
        let prompt_file = tempfile::Builder::new()
            .prefix("devassist-prompt-")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| BackendError::api(None, format!("cannot create prompt file: {e}")))?;
        tokio::fs::write(prompt_file.path(), prompt)
            .await
            .map_err(|e| BackendError::api(None, format!("cannot write prompt file: {e}")))?;

        let child = Command::new(&self.runtime)
            .args(self.arguments(model, prompt_file.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BackendError::Config(format!(
                    "cannot start local runtime {}: {e}",
                    self.runtime.display()
                ))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                BackendError::api(None, format!("local model timed out after {:?}", self.timeout))
            })?
            .map_err(|e| BackendError::api(None, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::api(
                None,
                format!("local runtime exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
