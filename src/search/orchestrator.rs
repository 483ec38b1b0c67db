//! Multi-query fan-out: every (query variant x strategy) pair runs as an
//! independent task, and the results are joined before fusion starts.
//!
//! Runs are pure CPU work over a shared read-only snapshot, so each one is
//! executed on tokio's blocking pool. A semaphore bounds how many execute at
//! once; a run holds its permit until the blocking work returns. A failed or
//! timed-out run is recorded and the others carry on; only when every run
//! fails does the whole retrieval fail.
//!
//! Blocking work cannot be interrupted. A run that has already started keeps
//! going in the background after a timeout or cancellation, and its result
//! is discarded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::strategy::{Strategy, StrategyKey, StrategyRunner};
use super::traits::RawResult;
use crate::corpus::CorpusSnapshot;
use crate::error::{Result, RetrievalError};
use crate::metrics::{STRATEGY_RUNS, STRATEGY_RUN_FAILURES};

/// One phrasing of the query, with its embedding if one could be computed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVariant {
    /// Position among the variants; the original query is always 0.
    pub index: usize,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

impl QueryVariant {
    pub fn new(index: usize, text: impl Into<String>, embedding: Option<Vec<f32>>) -> Self {
        Self {
            index,
            text: text.into(),
            embedding,
        }
    }
}

/// Results of one successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub key: StrategyKey,
    pub results: Vec<RawResult>,
}

/// A run that did not produce results.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFailure {
    pub key: StrategyKey,
    pub error: RetrievalError,
}

/// Everything the fan-out produced, ordered by (variant, strategy position)
/// regardless of the order in which runs completed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutcome {
    pub runs: Vec<RunOutput>,
    pub failures: Vec<RunFailure>,
}

impl RetrievalOutcome {
    /// Flattened `(result, run key)` pairs across all successful runs.
    pub fn entries(&self) -> impl Iterator<Item = (&RawResult, StrategyKey)> + '_ {
        self.runs
            .iter()
            .flat_map(|run| run.results.iter().map(move |r| (r, run.key)))
    }

    pub fn total_runs(&self) -> usize {
        self.runs.len() + self.failures.len()
    }
}

/// Fans strategy runs out over all query variants and joins them.
#[derive(Debug, Clone)]
pub struct MultiQueryOrchestrator {
    runner: StrategyRunner,
    max_concurrency: usize,
    run_timeout: Option<Duration>,
}

impl MultiQueryOrchestrator {
    pub fn new(runner: StrategyRunner, max_concurrency: usize) -> Self {
        Self {
            runner,
            max_concurrency: max_concurrency.max(1),
            run_timeout: None,
        }
    }

    /// Treat any run that takes longer than `timeout` as failed.
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every strategy against every variant and collect the results.
    ///
    /// Repeated strategies are collapsed to their first occurrence.
    ///
    /// # Errors
    /// * [`RetrievalError::Cancelled`] if `cancel` fires before all runs finish;
    ///   outstanding runs are aborted and nothing is returned.
    /// * [`RetrievalError::RetrievalFailed`] if there were runs to execute and
    ///   all of them failed.
    pub async fn retrieve(
        &self,
        snapshot: Arc<CorpusSnapshot>,
        variants: Arc<Vec<QueryVariant>>,
        top_k: usize,
        strategies: &[Strategy],
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome> {
        let start = Instant::now();
        let strategies = distinct(strategies);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut pending: BTreeMap<(usize, usize), StrategyKey> = BTreeMap::new();

        for (variant_pos, variant) in variants.iter().enumerate() {
            for (strategy_pos, &strategy) in strategies.iter().enumerate() {
                let slot = (variant_pos, strategy_pos);
                let key = StrategyKey::new(strategy, variant.index);
                pending.insert(slot, key);

                let job = RunJob {
                    runner: self.runner,
                    snapshot: Arc::clone(&snapshot),
                    variants: Arc::clone(&variants),
                    variant_pos,
                    strategy,
                    key,
                    top_k,
                    timeout: self.run_timeout,
                };
                let semaphore = Arc::clone(&semaphore);
                tasks.spawn(async move { (slot, job.execute(semaphore).await) });
            }
        }

        let mut completed: BTreeMap<(usize, usize), Result<Vec<RawResult>>> = BTreeMap::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    warn!(outstanding = pending.len(), "Retrieval cancelled before fan-out completed");
                    return Err(RetrievalError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((slot, result))) => {
                        pending.remove(&slot);
                        completed.insert(slot, result);
                    }
                    Some(Err(join_error)) => {
                        error!(error = %join_error, "Strategy run task did not complete");
                    }
                },
            }
        }

        // Slots still pending belong to tasks that died without reporting
        for (slot, key) in pending {
            completed.insert(
                slot,
                Err(RetrievalError::StrategyRunFailed {
                    key: key.to_string(),
                    reason: "run task aborted".to_string(),
                }),
            );
        }

        let mut outcome = RetrievalOutcome::default();
        for ((variant_pos, strategy_pos), result) in completed {
            let key = StrategyKey::new(strategies[strategy_pos], variants[variant_pos].index);
            match result {
                Ok(results) => {
                    STRATEGY_RUNS.inc();
                    debug!(run = %key, results = results.len(), "Strategy run completed");
                    outcome.runs.push(RunOutput { key, results });
                }
                Err(error) => {
                    STRATEGY_RUN_FAILURES.inc();
                    warn!(run = %key, error = %error, "Strategy run failed");
                    outcome.failures.push(RunFailure { key, error });
                }
            }
        }

        info!(
            runs = outcome.runs.len(),
            failed_runs = outcome.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fan-out completed"
        );

        if outcome.runs.is_empty() && !outcome.failures.is_empty() {
            return Err(RetrievalError::RetrievalFailed {
                failed: outcome.failures.len(),
            });
        }

        Ok(outcome)
    }
}

/// Strategies in first-seen order without repeats.
fn distinct(strategies: &[Strategy]) -> Vec<Strategy> {
    let mut unique = Vec::with_capacity(strategies.len());
    for &strategy in strategies {
        if !unique.contains(&strategy) {
            unique.push(strategy);
        }
    }
    unique
}

/// Everything one run needs, moved into its task.
struct RunJob {
    runner: StrategyRunner,
    snapshot: Arc<CorpusSnapshot>,
    variants: Arc<Vec<QueryVariant>>,
    variant_pos: usize,
    strategy: Strategy,
    key: StrategyKey,
    top_k: usize,
    timeout: Option<Duration>,
}

impl RunJob {
    async fn execute(self, semaphore: Arc<Semaphore>) -> Result<Vec<RawResult>> {
        let key = self.key;
        let failed = |reason: String| RetrievalError::StrategyRunFailed {
            key: key.to_string(),
            reason,
        };

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| failed(format!("worker pool closed: {e}")))?;

        let timeout = self.timeout;
        let RunJob {
            runner,
            snapshot,
            variants,
            variant_pos,
            strategy,
            top_k,
            ..
        } = self;

        let work = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let variant = &variants[variant_pos];
            runner.run(
                &snapshot,
                &variant.text,
                variant.embedding.as_deref(),
                top_k,
                strategy,
            )
        });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(failed(format!("timed out after {}ms", limit.as_millis())));
                }
            },
            None => work.await,
        };

        match joined {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(join_error) => Err(failed(format!("run panicked: {join_error}"))),
        }
    }
}
