//! Structured observability hooks for the briefing pipeline.
//!
//! This module provides:
//! - A run-scoped tracing span via [`PipelineSpan`]
//! - Emission functions for connector lifecycle, aggregation and backend events
//!
//! Every function also bumps the matching [`METRICS`](crate::metrics::METRICS)
//! counter so call sites only have to emit once.

use tracing::{debug, info, warn};

use crate::metrics::METRICS;

/// Run-scoped tracing span tagged with a fresh run id.
///
/// The span is attached to the run's future rather than entered, so it
/// follows the run across await points.
///
/// # Example
///
/// ```ignore
/// let span = PipelineSpan::new();
/// pipeline.run().instrument(span.span().clone()).await;
/// ```
pub struct PipelineSpan {
    run_id: String,
    span: tracing::Span,
}

impl PipelineSpan {
    pub fn new() -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("devassist.run", run_id = %run_id);
        Self { run_id, span }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Default for PipelineSpan {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit event: disabled connector skipped during activation.
pub fn emit_connector_skipped(name: &str) {
    info!(event = "connector.skipped", connector = %name, "connector disabled, skipping");
}

/// Emit event: connector located and initialized.
pub fn emit_connector_loaded(name: &str, source: &str) {
    METRICS.inc_connectors_loaded();
    info!(event = "connector.loaded", connector = %name, source = %source);
}

/// Emit event: connector could not be loaded (warning level).
pub fn emit_connector_load_failed(name: &str, error: &dyn std::fmt::Display) {
    METRICS.inc_load_failures();
    warn!(event = "connector.load_failed", connector = %name, error = %error);
}

/// Emit event: one connector's collection finished.
pub fn emit_collect_succeeded(name: &str, duration_ms: u64) {
    METRICS.inc_collections_ok();
    debug!(event = "connector.collected", connector = %name, duration_ms = duration_ms);
}

/// Emit event: one connector's collection failed (warning level).
pub fn emit_collect_failed(name: &str, error: &dyn std::fmt::Display) {
    METRICS.inc_collection_failures();
    warn!(event = "connector.collect_failed", connector = %name, error = %error);
}

/// Emit event: an aggregation round settled.
pub fn emit_aggregation_finished(collected: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "aggregation.finished",
        collected = collected,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// Emit event: pipeline moved to a new state.
pub fn emit_pipeline_state(state: &dyn std::fmt::Display) {
    debug!(event = "pipeline.state", state = %state);
}

/// Emit event: backend call attempted.
pub fn emit_backend_called(backend: &dyn std::fmt::Display, prompt_bytes: usize) {
    METRICS.inc_backend_calls();
    info!(event = "backend.called", backend = %backend, prompt_bytes = prompt_bytes);
}

/// Emit event: backend call failed (warning level).
pub fn emit_backend_failed(backend: &dyn std::fmt::Display, error: &dyn std::fmt::Display) {
    warn!(event = "backend.failed", backend = %backend, error = %error);
}
