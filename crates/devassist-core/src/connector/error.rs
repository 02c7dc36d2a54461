//! Error taxonomy for the connector layer.
//!
//! None of these ever escape the aggregator: they are logged and the
//! affected connector is left out of the round (or the whole run, for
//! [`LoadError`]).

use std::time::Duration;

/// A connector could not complete its one-time setup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("missing required config field: {0}")]
    MissingField(String),

    #[error("invalid config field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("client setup failed: {0}")]
    Client(String),

    #[error("extension process failed: {0}")]
    Process(String),
}

/// A connector failed to fetch data for this aggregation round.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    #[error("connector was not initialized")]
    NotInitialized,

    #[error("collection timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Http(String),

    #[error("remote service rejected the request: {0}")]
    Remote(String),

    #[error("credentials rejected: {0}")]
    Unauthorized(String),

    #[error("unexpected output: {0}")]
    Protocol(String),

    #[error("connector panicked during collection")]
    Panicked,

    #[error("collection task was cancelled")]
    Cancelled,
}

/// A configured connector could not be located, instantiated or initialized.
///
/// Every variant carries the connector name so the registry can log it
/// without extra context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("no implementation found for connector {name}")]
    NotFound { name: String },

    #[error("failed to instantiate connector {name}: {reason}")]
    Instantiate { name: String, reason: String },

    #[error("connector {name} failed to initialize: {source}")]
    Init {
        name: String,
        #[source]
        source: InitError,
    },

    #[error("connector {name} did not finish initializing within {timeout:?}")]
    InitTimeout { name: String, timeout: Duration },

    #[error("connector {name} panicked during initialization")]
    Panicked { name: String },
}

impl CollectError {
    /// `true` when the service as a whole is out of reach for this
    /// connector, as opposed to one endpoint misbehaving.
    pub fn is_service_wide(&self) -> bool {
        matches!(
            self,
            CollectError::Http(_) | CollectError::Timeout(_) | CollectError::Unauthorized(_)
        )
    }
}

impl LoadError {
    /// Name of the connector that failed to load.
    pub fn connector(&self) -> &str {
        match self {
            LoadError::NotFound { name }
            | LoadError::Instantiate { name, .. }
            | LoadError::Init { name, .. }
            | LoadError::InitTimeout { name, .. }
            | LoadError::Panicked { name } => name,
        }
    }

    /// `true` when no source provides the connector at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }
}
