//! The briefing pipeline: activate → collect → prompt → summarize.
//!
//! A [`Pipeline`] runs exactly once. Connector problems narrow the output
//! but never stop the run; only the backend call can fail it.

use std::fmt;

use tracing::{info, Instrument};

use crate::aggregator::{Aggregator, CollectFailure};
use crate::backend::{Backend, BackendError};
use crate::loader::ConnectorLoader;
use crate::metrics::METRICS;
use crate::obs::{self, PipelineSpan};
use crate::prompt::{PromptContext, BRIEFING_TASK};
use crate::registry::{ActivationReport, ConnectorRegistry};

/// Where a [`Pipeline`] is in its single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    ConnectorsActivated,
    /// Not a single connector loaded. The run continues with an empty context.
    Failed,
    DataCollected,
    PromptBuilt,
    SummaryProduced,
    Done,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::ConnectorsActivated => "connectors_activated",
            PipelineState::Failed => "failed",
            PipelineState::DataCollected => "data_collected",
            PipelineState::PromptBuilt => "prompt_built",
            PipelineState::SummaryProduced => "summary_produced",
            PipelineState::Done => "done",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a pipeline run without a summary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline has already run (state: {0})")]
    AlreadyRun(PipelineState),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// The product of a successful run.
#[derive(Debug, Clone)]
pub struct Briefing {
    pub run_id: String,
    pub summary: String,
    /// Connectors that contributed data, sorted by name.
    pub sources: Vec<String>,
    /// `true` when the prompt was built from an empty context.
    pub no_data: bool,
    pub activation: ActivationReport,
    pub failures: Vec<CollectFailure>,
}

impl Briefing {
    /// `true` when any enabled connector failed to load or collect.
    pub fn degraded(&self) -> bool {
        !self.activation.failed.is_empty() || !self.failures.is_empty()
    }
}

/// Wires registry, loader, aggregator and backend into one run.
pub struct Pipeline {
    registry: ConnectorRegistry,
    loader: ConnectorLoader,
    aggregator: Aggregator,
    backend: Box<dyn Backend>,
    task: String,
    history: Vec<PipelineState>,
}

impl Pipeline {
    pub fn new(
        registry: ConnectorRegistry,
        loader: ConnectorLoader,
        aggregator: Aggregator,
        backend: Box<dyn Backend>,
    ) -> Self {
        Self {
            registry,
            loader,
            aggregator,
            backend,
            task: BRIEFING_TASK.to_string(),
            history: vec![PipelineState::Idle],
        }
    }

    /// Replace the standard briefing instruction.
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    pub fn state(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Idle)
    }

    /// Every state entered so far, starting with [`PipelineState::Idle`].
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Drive the pipeline to completion.
    ///
    /// Returns [`PipelineError::AlreadyRun`] on every call after the first.
    pub async fn run(&mut self) -> PipelineResult<Briefing> {
        let state = self.state();
        if state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRun(state));
        }

        let span = PipelineSpan::new();
        let run_id = span.run_id().to_string();
        let outcome = self.drive(run_id).instrument(span.span().clone()).await;
        METRICS.flush();
        outcome
    }

    async fn drive(&mut self, run_id: String) -> PipelineResult<Briefing> {
        let activation = self.registry.activate_all(&self.loader).await;
        self.advance(PipelineState::ConnectorsActivated);
        if activation.none_loaded() {
            self.advance(PipelineState::Failed);
        }

        let round = self.aggregator.collect(&self.registry).await;
        self.advance(PipelineState::DataCollected);

        let prompt = PromptContext::build(&self.task, &round.results);
        self.advance(PipelineState::PromptBuilt);

        let kind = self.backend.kind();
        obs::emit_backend_called(&kind, prompt.as_str().len());
        let summary = match self.backend.generate(prompt.as_str()).await {
            Ok(summary) => summary,
            Err(e) => {
                obs::emit_backend_failed(&kind, &e);
                return Err(e.into());
            }
        };
        self.advance(PipelineState::SummaryProduced);

        let briefing = Briefing {
            run_id,
            summary,
            no_data: prompt.is_empty(),
            sources: prompt.sources().to_vec(),
            activation,
            failures: round.failures,
        };
        self.advance(PipelineState::Done);
        info!(
            sources = briefing.sources.len(),
            degraded = briefing.degraded(),
            "briefing produced"
        );
        Ok(briefing)
    }

    fn advance(&mut self, next: PipelineState) {
        obs::emit_pipeline_state(&next);
        self.history.push(next);
    }
}
