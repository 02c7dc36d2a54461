//! DevAssist Core Library
//!
//! Connector orchestration for the DevAssist briefing tool: connectors are
//! registered from settings, loaded from built-in or user sources, collected
//! concurrently with per-connector isolation, and the merged context is
//! summarized by one configured backend.

pub mod aggregator;
pub mod backend;
pub mod config;
pub mod connector;
pub mod loader;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod scaffold;
pub mod telemetry;

pub use aggregator::{AggregationRound, Aggregator, CollectFailure, CollectionResult};

pub use backend::{select_backend, AiConfig, Backend, BackendError, BackendKind, BackendResult};

pub use config::{AiSettings, ConfigError, ExtensionSettings, Paths, Settings};

pub use connector::{
    CollectError, ConfigExt, Connector, ConnectorConfig, InitError, LoadError, ProcessConnector,
};

pub use loader::{BuiltinCatalog, ConnectorLoader, ConnectorSource, ExtensionDir};

pub use pipeline::{Briefing, Pipeline, PipelineError, PipelineResult, PipelineState};

pub use prompt::{PromptContext, BRIEFING_TASK, NO_DATA_MESSAGE};

pub use registry::{ActivationReport, ConnectorRegistry, ConnectorSpec, LoadedConnector};

pub use scaffold::{install_extension, InstallReport, ScaffoldError};

pub use telemetry::init_tracing;

/// Crate version, shared by every workspace member.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
