//! Settings file, home directory resolution and backend resolution.
//!
//! The settings live in `<home>/config.json`. `<home>` is resolved in
//! priority order: explicit argument, `DEVASSIST_HOME`, `~/.devassist`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::backend::{AiConfig, BackendError, BackendKind};
use crate::connector::ConnectorConfig;
use crate::registry::ConnectorRegistry;

pub const HOME_ENV: &str = "DEVASSIST_HOME";
pub const API_KEY_ENV: &str = "DEVASSIST_API_KEY";
pub const LLAMA_BIN_ENV: &str = "DEVASSIST_LLAMA_BIN";

const CONFIG_FILE: &str = "config.json";
const EXTENSIONS_DIR: &str = "extensions";
const REDACTED: &str = "********";

/// Config keys whose values are never printed.
pub const SECRET_KEYS: &[&str] = &["token", "api_token", "api_key", "password", "secret"];

/// Errors reading or writing the settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot determine the home directory; set {HOME_ENV}")]
    NoHomeDir,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Filesystem locations derived from the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub home: PathBuf,
    pub config_file: PathBuf,
    pub extensions_dir: PathBuf,
}

impl Paths {
    pub fn at(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            config_file: home.join(CONFIG_FILE),
            extensions_dir: home.join(EXTENSIONS_DIR),
            home,
        }
    }

    /// Explicit home, then `DEVASSIST_HOME`, then `~/.devassist`.
    pub fn resolve(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(home) = explicit {
            return Ok(Self::at(home));
        }
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|h| !h.is_empty()) {
            return Ok(Self::at(PathBuf::from(home)));
        }
        dirs::home_dir()
            .map(|h| Self::at(h.join(".devassist")))
            .ok_or(ConfigError::NoHomeDir)
    }

    /// Create the home and extension directories if missing.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.extensions_dir).map_err(|source| ConfigError::Io {
            path: self.extensions_dir.clone(),
            source,
        })
    }
}

fn default_provider() -> String {
    BackendKind::Local.as_str().to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_collect_timeout() -> u64 {
    30
}

fn default_init_timeout() -> u64 {
    10
}

fn default_enabled() -> bool {
    true
}

/// The `ai` block of the settings file.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSettings {
    /// `local`, `claude` or `openai`. Checked by [`Settings::ai_config`].
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub local_model_path: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
            local_model_path: dirs::home_dir()
                .map(|h| h.join(".cache").join("devassist").join("models").join("llama3")),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for AiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| REDACTED))
            .field("api_url", &self.api_url)
            .field("local_model_path", &self.local_model_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// One entry under `extensions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: ConnectorConfig,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            config: ConnectorConfig::new(),
        }
    }
}

/// Everything in `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub ai: AiSettings,
    #[serde(default)]
    pub extensions: BTreeMap<String, ExtensionSettings>,
    #[serde(default = "default_collect_timeout")]
    pub collect_timeout_secs: u64,
    #[serde(default = "default_init_timeout")]
    pub init_timeout_secs: u64,
}

fn object(value: Value) -> ConnectorConfig {
    match value {
        Value::Object(map) => map,
        _ => ConnectorConfig::new(),
    }
}

impl Default for Settings {
    /// The file written on first run: the three bundled connectors with
    /// empty credentials and a local model.
    fn default() -> Self {
        let mut extensions = BTreeMap::new();
        extensions.insert(
            "github".to_string(),
            ExtensionSettings {
                enabled: true,
                config: object(json!({"token": "", "repositories": []})),
            },
        );
        extensions.insert(
            "jira".to_string(),
            ExtensionSettings {
                enabled: true,
                config: object(json!({
                    "url": "",
                    "username": "",
                    "api_token": "",
                    "projects": []
                })),
            },
        );
        extensions.insert(
            "slack".to_string(),
            ExtensionSettings {
                enabled: true,
                config: object(json!({"token": "", "channels": []})),
            },
        );

        Self {
            ai: AiSettings::default(),
            extensions,
            collect_timeout_secs: default_collect_timeout(),
            init_timeout_secs: default_init_timeout(),
        }
    }
}

impl Settings {
    /// Read and parse a settings file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the settings, writing defaults on first run.
    ///
    /// An unreadable or invalid file is logged and replaced by defaults for
    /// this run only; the file itself is left alone.
    pub fn load_or_init(paths: &Paths) -> Self {
        if !paths.config_file.exists() {
            let settings = Self::default();
            match paths.ensure_dirs().and_then(|()| settings.save(&paths.config_file)) {
                Ok(()) => info!(path = %paths.config_file.display(), "wrote default settings"),
                Err(e) => warn!(error = %e, "could not write default settings"),
            }
            return settings;
        }

        match Self::load(&paths.config_file) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "using default settings for this run");
                Self::default()
            }
        }
    }

    /// Write the settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let rendered = serde_json::to_string_pretty(self)?;
        std::fs::write(path, rendered).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.collect_timeout_secs)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Resolve the `ai` block using the process environment.
    pub fn ai_config(&self) -> Result<AiConfig, BackendError> {
        self.ai_config_with_env(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(LLAMA_BIN_ENV).ok(),
        )
    }

    /// Resolve the `ai` block into a typed [`AiConfig`].
    ///
    /// `api_key_env` fills an empty `api_key`; `llama_bin` replaces the
    /// default local runtime. An unknown provider is the only error.
    pub fn ai_config_with_env(
        &self,
        api_key_env: Option<String>,
        llama_bin: Option<String>,
    ) -> Result<AiConfig, BackendError> {
        let kind: BackendKind = self.ai.provider.parse()?;
        let mut config = AiConfig::new(kind, self.ai.model.clone());

        let file_key = self.ai.api_key.clone().filter(|k| !k.trim().is_empty());
        config.api_key = file_key.or(api_key_env.filter(|k| !k.trim().is_empty()));
        config.api_url = self.ai.api_url.clone();
        config.local_model_path = self.ai.local_model_path.clone();
        if let Some(bin) = llama_bin.filter(|b| !b.trim().is_empty()) {
            config.local_runtime = PathBuf::from(bin);
        }
        config.request_timeout = Duration::from_secs(self.ai.request_timeout_secs);
        Ok(config)
    }

    /// Register every extension entry with `registry`.
    pub fn populate(&self, registry: &mut ConnectorRegistry) {
        for (name, ext) in &self.extensions {
            registry.register(name.clone(), ext.enabled, ext.config.clone());
        }
    }

    /// Add `name` as an enabled extension with an empty config.
    ///
    /// Returns `false` when an entry already exists; it is left untouched.
    pub fn ensure_extension(&mut self, name: &str) -> bool {
        if self.extensions.contains_key(name) {
            return false;
        }
        self.extensions
            .insert(name.to_string(), ExtensionSettings::default());
        true
    }

    /// The settings as JSON with every non-empty secret replaced.
    pub fn redacted(&self) -> ConfigResult<Value> {
        let mut value = serde_json::to_value(self)?;
        redact(&mut value);
        Ok(value)
    }
}

fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                let secret = SECRET_KEYS.contains(&key.to_ascii_lowercase().as_str());
                match inner {
                    Value::String(s) if secret => {
                        if !s.is_empty() {
                            *s = REDACTED.to_string();
                        }
                    }
                    other => redact(other),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}
