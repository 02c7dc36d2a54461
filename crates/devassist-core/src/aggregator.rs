//! Fan-out collection across the active connector set.
//!
//! [`Aggregator::collect`] spawns one task per active connector, bounds
//! each with the aggregator's timeout, and waits for every task to settle
//! before folding the outcomes into a [`CollectionResult`]. A connector that
//! errors, times out or panics is left out of the result and reported in
//! [`AggregationRound::failures`]; it never affects its siblings.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;
use tokio::task::{self, JoinSet};
use tracing::warn;

use crate::connector::{CollectError, Connector};
use crate::obs;
use crate::registry::{ConnectorRegistry, LoadedConnector};

/// Connector name → that connector's output for one round.
///
/// Only successful collections appear. An empty-but-successful output is
/// kept, so "nothing to report" stays distinguishable from "failed".
pub type CollectionResult = BTreeMap<String, Value>;

/// A connector that produced no entry this round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectFailure {
    pub connector: String,
    pub error: CollectError,
}

/// Everything one aggregation round produced.
#[derive(Debug, Clone, Default)]
pub struct AggregationRound {
    pub results: CollectionResult,
    pub failures: Vec<CollectFailure>,
    pub duration: Duration,
}

impl AggregationRound {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Runs `collect` on every active connector concurrently.
#[derive(Debug, Clone)]
pub struct Aggregator {
    timeout: Duration,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl Aggregator {
    /// `timeout` bounds each connector's `collect` individually.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Collect from the registry's active connectors.
    pub async fn collect(&self, registry: &ConnectorRegistry) -> AggregationRound {
        let active: Vec<&LoadedConnector> = registry.active().collect();
        self.collect_from(active).await
    }

    /// Collect from an explicit connector set.
    pub async fn collect_from<'a, I>(&self, connectors: I) -> AggregationRound
    where
        I: IntoIterator<Item = &'a LoadedConnector>,
    {
        let started = Instant::now();
        let mut join_set = JoinSet::new();
        let mut names: HashMap<task::Id, String> = HashMap::new();

        for loaded in connectors {
            let name = loaded.name().to_string();
            let handle: Arc<dyn Connector> = Arc::clone(loaded.handle());
            let timeout = self.timeout;
            let task_name = name.clone();
            let abort = join_set.spawn(async move {
                let began = Instant::now();
                let outcome = collect_one(handle.as_ref(), timeout).await;
                (task_name, outcome, began.elapsed())
            });
            names.insert(abort.id(), name);
        }

        let mut round = AggregationRound::default();
        while let Some(joined) = join_set.join_next().await {
            let (name, outcome, elapsed) = match joined {
                Ok(settled) => settled,
                Err(e) => {
                    let name = names.remove(&e.id()).unwrap_or_default();
                    warn!(connector = %name, error = %e, "collection task did not complete");
                    let error = if e.is_panic() {
                        CollectError::Panicked
                    } else {
                        CollectError::Cancelled
                    };
                    (name, Err(error), Duration::ZERO)
                }
            };
            match outcome {
                Ok(value) => {
                    obs::emit_collect_succeeded(&name, elapsed.as_millis() as u64);
                    round.results.insert(name, value);
                }
                Err(error) => {
                    obs::emit_collect_failed(&name, &error);
                    round.failures.push(CollectFailure {
                        connector: name,
                        error,
                    });
                }
            }
        }

        round.failures.sort_by(|a, b| a.connector.cmp(&b.connector));
        round.duration = started.elapsed();
        obs::emit_aggregation_finished(
            round.results.len(),
            round.failures.len(),
            round.duration.as_millis() as u64,
        );
        round
    }
}

async fn collect_one(connector: &dyn Connector, timeout: Duration) -> Result<Value, CollectError> {
    let guarded = AssertUnwindSafe(connector.collect()).catch_unwind();
    match tokio::time::timeout(timeout, guarded).await {
        Err(_) => Err(CollectError::Timeout(timeout)),
        Ok(Err(_panic)) => Err(CollectError::Panicked),
        Ok(Ok(outcome)) => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectorConfig, InitError};
    use crate::registry::ConnectorSpec;
    use async_trait::async_trait;
    use serde_json::json;

    enum Behaviour {
        Ok(Value),
        Fail,
        Hang,
        Panic,
    }

    struct Scripted(Behaviour);

    #[async_trait]
    impl Connector for Scripted {
        async fn init(&mut self, _config: &ConnectorConfig) -> Result<(), InitError> {
            Ok(())
        }

        async fn collect(&self) -> Result<Value, CollectError> {
            match &self.0 {
                Behaviour::Ok(v) => Ok(v.clone()),
                Behaviour::Fail => Err(CollectError::Http("503".to_string())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Value::Null)
                }
                Behaviour::Panic => panic!("connector bug"),
            }
        }
    }

    fn loaded(name: &str, behaviour: Behaviour) -> LoadedConnector {
        LoadedConnector::new(
            ConnectorSpec::new(name, true, ConnectorConfig::new()),
            "builtin",
            Arc::new(Scripted(behaviour)),
        )
    }

    #[tokio::test]
    async fn test_failure_is_isolated_from_siblings() {
        let connectors = vec![
            loaded("github", Behaviour::Ok(json!({"pull_requests": []}))),
            loaded("jira", Behaviour::Fail),
            loaded("slack", Behaviour::Ok(json!({"mentions": [1]}))),
        ];

        let round = Aggregator::new(Duration::from_secs(5))
            .collect_from(&connectors)
            .await;

        assert_eq!(
            round.results.keys().collect::<Vec<_>>(),
            vec!["github", "slack"]
        );
        assert_eq!(round.failures.len(), 1);
        assert_eq!(round.failures[0].connector, "jira");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_connector_times_out_without_blocking_others() {
        let connectors = vec![
            loaded("slow", Behaviour::Hang),
            loaded("fast", Behaviour::Ok(json!({"ok": true}))),
        ];

        let round = Aggregator::new(Duration::from_secs(10))
            .collect_from(&connectors)
            .await;

        assert_eq!(round.results.len(), 1);
        assert!(round.results.contains_key("fast"));
        assert_eq!(
            round.failures,
            vec![CollectFailure {
                connector: "slow".to_string(),
                error: CollectError::Timeout(Duration::from_secs(10)),
            }]
        );
    }

    #[tokio::test]
    async fn test_panicking_connector_is_omitted() {
        let connectors = vec![
            loaded("buggy", Behaviour::Panic),
            loaded("fine", Behaviour::Ok(json!([]))),
        ];

        let round = Aggregator::default().collect_from(&connectors).await;

        assert_eq!(round.results.keys().collect::<Vec<_>>(), vec!["fine"]);
        assert_eq!(round.failures[0].error, CollectError::Panicked);
    }

    type Collected = Result<Value, CollectError>;

    /// Completes immediately but panics when dropped, which happens after
    /// the guarded poll has returned.
    struct PanicsOnDrop;

    impl std::future::Future for PanicsOnDrop {
        type Output = Collected;

        fn poll(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Self::Output> {
            std::task::Poll::Ready(Ok(json!({})))
        }
    }

    impl Drop for PanicsOnDrop {
        fn drop(&mut self) {
            panic!("dropped");
        }
    }

    struct Leaky;

    #[async_trait]
    impl Connector for Leaky {
        async fn init(&mut self, _config: &ConnectorConfig) -> Result<(), InitError> {
            Ok(())
        }

        fn collect<'life0, 'async_trait>(
            &'life0 self,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Collected> + Send + 'async_trait>>
        where
            'life0: 'async_trait,
            Self: 'async_trait,
        {
            Box::pin(PanicsOnDrop)
        }
    }

    #[tokio::test]
    async fn test_task_failure_is_attributed_to_its_connector() {
        let connectors = vec![
            LoadedConnector::new(
                ConnectorSpec::new("leaky", true, ConnectorConfig::new()),
                "builtin",
                Arc::new(Leaky),
            ),
            loaded("fine", Behaviour::Ok(json!([]))),
        ];

        let round = Aggregator::default().collect_from(&connectors).await;

        assert_eq!(round.results.keys().collect::<Vec<_>>(), vec!["fine"]);
        assert_eq!(
            round.failures,
            vec![CollectFailure {
                connector: "leaky".to_string(),
                error: CollectError::Panicked,
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_success_is_kept() {
        let connectors = vec![loaded("quiet", Behaviour::Ok(json!({})))];
        let round = Aggregator::default().collect_from(&connectors).await;
        assert_eq!(round.results.get("quiet"), Some(&json!({})));
        assert!(round.failures.is_empty());
    }

    #[tokio::test]
    async fn test_no_connectors_yields_empty_round() {
        let round = Aggregator::default()
            .collect(&ConnectorRegistry::new())
            .await;
        assert!(round.is_empty());
        assert!(round.failures.is_empty());
    }
}
