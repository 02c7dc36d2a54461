//! Desired and activated connector state.
//!
//! The registry is written while specs are registered and during
//! [`ConnectorRegistry::activate_all`]; after that it is only read.
//! Activation runs every enabled connector's load concurrently and folds
//! the outcomes back in from a single place, so no two activations ever
//! write the same key.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;

use crate::connector::{Connector, ConnectorConfig, LoadError};
use crate::loader::ConnectorLoader;
use crate::obs;

/// A configured connector as it appears in the settings file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorSpec {
    pub name: String,
    pub enabled: bool,
    pub config: ConnectorConfig,
}

impl ConnectorSpec {
    pub fn new(name: impl Into<String>, enabled: bool, config: ConnectorConfig) -> Self {
        Self {
            name: name.into(),
            enabled,
            config,
        }
    }
}

/// A spec whose implementation was located and initialized.
#[derive(Clone)]
pub struct LoadedConnector {
    spec: ConnectorSpec,
    source: &'static str,
    handle: Arc<dyn Connector>,
}

impl LoadedConnector {
    pub fn new(spec: ConnectorSpec, source: &'static str, handle: Arc<dyn Connector>) -> Self {
        Self {
            spec,
            source,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ConnectorSpec {
        &self.spec
    }

    /// Label of the loader source that provided the implementation.
    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn handle(&self) -> &Arc<dyn Connector> {
        &self.handle
    }
}

impl fmt::Debug for LoadedConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedConnector")
            .field("name", &self.spec.name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Outcome of one [`ConnectorRegistry::activate_all`] call.
#[derive(Debug, Clone, Default)]
pub struct ActivationReport {
    /// Connectors that loaded, sorted by name.
    pub loaded: Vec<String>,
    /// Connectors that were enabled but failed to load.
    pub failed: Vec<LoadError>,
    /// Disabled connectors that were never looked at.
    pub skipped: Vec<String>,
}

impl ActivationReport {
    /// `true` when not a single connector is available for collection.
    pub fn none_loaded(&self) -> bool {
        self.loaded.is_empty()
    }
}

/// Name → spec map plus the handles produced by activation.
#[derive(Debug, Default)]
pub struct ConnectorRegistry {
    specs: BTreeMap<String, ConnectorSpec>,
    active: BTreeMap<String, LoadedConnector>,
    failures: BTreeMap<String, LoadError>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the spec for `name`.
    pub fn register(&mut self, name: impl Into<String>, enabled: bool, config: ConnectorConfig) {
        let spec = ConnectorSpec::new(name, enabled, config);
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&ConnectorSpec> {
        self.specs.get(name)
    }

    /// All registered specs, sorted by name.
    pub fn specs(&self) -> impl Iterator<Item = &ConnectorSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Load every enabled spec. Failures are recorded and logged, never returned.
    ///
    /// Calling this again discards the previous activation.
    pub async fn activate_all(&mut self, loader: &ConnectorLoader) -> ActivationReport {
        self.active.clear();
        self.failures.clear();

        let mut report = ActivationReport::default();
        let mut pending = Vec::new();
        for spec in self.specs.values() {
            if spec.enabled {
                pending.push(spec);
            } else {
                obs::emit_connector_skipped(&spec.name);
                report.skipped.push(spec.name.clone());
            }
        }

        let outcomes = join_all(pending.into_iter().map(|spec| loader.load(spec))).await;

        for outcome in outcomes {
            match outcome {
                Ok(loaded) => {
                    obs::emit_connector_loaded(loaded.name(), loaded.source());
                    report.loaded.push(loaded.name().to_string());
                    self.active.insert(loaded.name().to_string(), loaded);
                }
                Err(err) => {
                    obs::emit_connector_load_failed(err.connector(), &err);
                    report.failed.push(err.clone());
                    self.failures.insert(err.connector().to_string(), err);
                }
            }
        }

        report.loaded.sort();
        report
    }

    /// Activated connectors, sorted by name.
    pub fn active(&self) -> impl Iterator<Item = &LoadedConnector> {
        self.active.values()
    }

    pub fn active_names(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    /// Why `name` failed to load during the last activation, if it did.
    pub fn failure(&self, name: &str) -> Option<&LoadError> {
        self.failures.get(name)
    }
}
