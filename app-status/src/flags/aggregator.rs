//! Concurrent evaluation of every configured flag for one identity.

use super::FlagOracle;
use crate::metrics_defs::{FLAG_EVALUATIONS, FLAG_FETCH_DURATION, FLAG_FETCH_FAILURES};
use crate::model::FlagMap;
use shared::{counter, histogram};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum FlagError {
    #[error("flag evaluation timed out after {timeout:?}, pending flags: {pending:?}")]
    Timeout {
        timeout: Duration,
        pending: Vec<String>,
    },

    #[error("evaluation of flag {flag:?} failed: {reason}")]
    EvaluationFailed { flag: String, reason: String },
}

impl FlagError {
    fn metric_reason(&self) -> &'static str {
        match self {
            FlagError::Timeout { .. } => "timeout",
            FlagError::EvaluationFailed { .. } => "task_failed",
        }
    }
}

/// Evaluation tasks of a single `fetch_all` call.
struct SpawnedEvaluations {
    join_set: JoinSet<bool>,

    /// Maps task IDs to the flag each task evaluates
    task_flags: HashMap<tokio::task::Id, String>,
}

/// Fans out one oracle call per configured flag and joins them into a [`FlagMap`].
///
/// The flag list is fixed at construction. Every call to [`fetch_all`](Self::fetch_all)
/// owns its tasks and result map, so concurrent calls for different identities
/// never share state beyond the oracle itself.
#[derive(Clone)]
pub struct FlagAggregator {
    oracle: Arc<dyn FlagOracle>,
    flag_names: Arc<[String]>,
    evaluation_timeout: Option<Duration>,
}

impl FlagAggregator {
    pub fn new(oracle: Arc<dyn FlagOracle>, flag_names: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let flag_names: Vec<String> = flag_names
            .into_iter()
            .filter(|name| {
                let first = seen.insert(name.clone());
                if !first {
                    tracing::warn!(flag = %name, "Ignoring duplicate flag name");
                }
                first
            })
            .collect();

        Self {
            oracle,
            flag_names: flag_names.into(),
            evaluation_timeout: None,
        }
    }

    /// Bounds the whole aggregation. Outstanding evaluations are aborted once it elapses.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = Some(timeout);
        self
    }

    pub fn flag_names(&self) -> &[String] {
        &self.flag_names
    }

    /// Evaluates every configured flag for `identity` and waits for all of them.
    ///
    /// The result holds exactly one entry per configured flag. On timeout or a
    /// failed task, all outstanding evaluations are aborted and nothing partial
    /// is returned. Dropping the returned future also aborts them.
    pub async fn fetch_all(&self, identity: &str) -> Result<FlagMap, FlagError> {
        let started = Instant::now();
        let spawned = self.spawn_evaluations(identity);
        let result = self.collect_results(spawned).await;

        match &result {
            Ok(flags) => {
                histogram!(FLAG_FETCH_DURATION).record(started.elapsed().as_secs_f64());
                counter!(FLAG_EVALUATIONS).increment(flags.len() as u64);
            }
            Err(e) => {
                counter!(FLAG_FETCH_FAILURES, "reason" => e.metric_reason()).increment(1);
            }
        }

        result
    }

    fn spawn_evaluations(&self, identity: &str) -> SpawnedEvaluations {
        let identity: Arc<str> = Arc::from(identity);
        let mut join_set = JoinSet::new();
        let mut task_flags = HashMap::with_capacity(self.flag_names.len());

        for flag in self.flag_names.iter() {
            let oracle = Arc::clone(&self.oracle);
            let identity = Arc::clone(&identity);
            let flag_name = flag.clone();

            let abort_handle = join_set.spawn(async move {
                tracing::debug!(flag = %flag_name, "Fetching feature flag value");
                let enabled = oracle.evaluate(&flag_name, &identity).await;
                tracing::debug!(flag = %flag_name, enabled, "Found feature flag value");
                enabled
            });

            task_flags.insert(abort_handle.id(), flag.clone());
        }

        SpawnedEvaluations {
            join_set,
            task_flags,
        }
    }

    /// Joins every spawned evaluation, keyed by task ID.
    async fn collect_results(&self, spawned: SpawnedEvaluations) -> Result<FlagMap, FlagError> {
        let SpawnedEvaluations {
            mut join_set,
            mut task_flags,
        } = spawned;
        let mut flags = FlagMap::with_capacity(task_flags.len());

        let deadline = async {
            match self.evaluation_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        while !join_set.is_empty() {
            tokio::select! {
                Some(join_result) = join_set.join_next_with_id() => {
                    match join_result {
                        Ok((task_id, enabled)) => match task_flags.remove(&task_id) {
                            Some(flag) => {
                                flags.insert(flag, enabled);
                            }
                            None => tracing::error!(?task_id, "Result from untracked task"),
                        },
                        Err(e) => {
                            let flag = task_flags.remove(&e.id()).unwrap_or_default();
                            tracing::error!(flag = %flag, error = %e, "Flag evaluation task failed");
                            abort_and_drain(&mut join_set).await;
                            return Err(FlagError::EvaluationFailed {
                                flag,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                _ = &mut deadline => {
                    let mut pending: Vec<String> = task_flags.into_values().collect();
                    pending.sort();
                    tracing::error!(
                        "Flag evaluation deadline reached, aborting {} tasks",
                        pending.len()
                    );
                    abort_and_drain(&mut join_set).await;
                    return Err(FlagError::Timeout {
                        timeout: self.evaluation_timeout.unwrap_or_default(),
                        pending,
                    });
                }
            }
        }

        Ok(flags)
    }
}

async fn abort_and_drain(join_set: &mut JoinSet<bool>) {
    join_set.abort_all();
    while join_set.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{
        DelayedOracle, Latency, PanickingOracle, SlowFlagOracle, expected_flag_value, flag_names,
    };
    use std::sync::atomic::Ordering;

    fn aggregator(oracle: Arc<dyn FlagOracle>, count: usize) -> FlagAggregator {
        FlagAggregator::new(oracle, flag_names(count))
    }

    #[tokio::test]
    async fn test_no_flags_configured() {
        let oracle = Arc::new(DelayedOracle::new(Latency::None));
        let flags = aggregator(oracle.clone(), 0).fetch_all("alice").await.unwrap();

        assert!(flags.is_empty());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_every_flag_reported_once_for_any_latency() {
        for latency in [
            Latency::None,
            Latency::Fixed(Duration::from_millis(5)),
            Latency::Random { max_ms: 25 },
            Latency::SlowFlag {
                flag: "flag_7".into(),
                delay: Duration::from_millis(60),
            },
        ] {
            let aggregator = aggregator(Arc::new(DelayedOracle::new(latency.clone())), 24);
            let flags = aggregator.fetch_all("customer-42").await.unwrap();

            assert_eq!(flags.len(), 24, "latency {latency:?}");
            for name in aggregator.flag_names() {
                assert_eq!(
                    flags.get(name),
                    Some(&expected_flag_value(name, "customer-42")),
                    "flag {name} with latency {latency:?}"
                );
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_keep_their_own_identity() {
        let oracle = Arc::new(DelayedOracle::new(Latency::Random { max_ms: 20 }));
        let aggregator = aggregator(oracle.clone(), 32);

        let (alice, bob) = tokio::join!(aggregator.fetch_all("alice"), aggregator.fetch_all("bob"));
        let (alice, bob) = (alice.unwrap(), bob.unwrap());

        for name in aggregator.flag_names() {
            assert_eq!(alice[name], expected_flag_value(name, "alice"));
            assert_eq!(bob[name], expected_flag_value(name, "bob"));
        }
        // The two identities must disagree somewhere for the check to mean anything.
        assert_ne!(alice, bob);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 64);
    }

    #[tokio::test]
    async fn test_identity_passed_verbatim_and_never_cached() {
        let oracle = Arc::new(DelayedOracle::new(Latency::None));
        let aggregator = aggregator(oracle.clone(), 3);

        aggregator.fetch_all("").await.unwrap();
        aggregator.fetch_all("").await.unwrap();

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 6);
        assert!(oracle.identities().iter().all(|identity| identity.is_empty()));
    }

    #[tokio::test]
    async fn test_duplicate_flag_names_are_dropped() {
        let aggregator = FlagAggregator::new(
            Arc::new(DelayedOracle::new(Latency::None)),
            vec!["a".into(), "b".into(), "a".into()],
        );

        assert_eq!(aggregator.flag_names(), ["a".to_string(), "b".to_string()]);
        assert_eq!(aggregator.fetch_all("x").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_discards_partial_results() {
        let oracle = Arc::new(SlowFlagOracle::new("flag_2", Duration::from_secs(30)));
        let aggregator = aggregator(oracle.clone(), 5).with_timeout(Duration::from_millis(50));

        let err = aggregator.fetch_all("alice").await.unwrap_err();
        match err {
            FlagError::Timeout { timeout, pending } => {
                assert_eq!(timeout, Duration::from_millis(50));
                assert_eq!(pending, vec!["flag_2".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // The slow evaluation was cancelled rather than left running.
        assert!(oracle.cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_fetch_aborts_evaluations() {
        let oracle = Arc::new(SlowFlagOracle::new("flag_0", Duration::from_secs(30)));
        let aggregator = aggregator(oracle.clone(), 3);

        // No aggregator deadline: the caller gives up and drops the future.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), aggregator.fetch_all("alice")).await;
        assert!(abandoned.is_err());

        for _ in 0..100 {
            if oracle.cancelled.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(oracle.cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_timeout_not_reached() {
        let aggregator = aggregator(Arc::new(DelayedOracle::new(Latency::None)), 4)
            .with_timeout(Duration::from_secs(5));

        assert_eq!(aggregator.fetch_all("alice").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_panicking_evaluation_fails_whole_call() {
        let aggregator = aggregator(Arc::new(PanickingOracle::new("flag_1")), 3);

        let err = aggregator.fetch_all("alice").await.unwrap_err();
        assert!(matches!(
            err,
            FlagError::EvaluationFailed { ref flag, .. } if flag == "flag_1"
        ));
    }
}
