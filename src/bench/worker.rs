//! Worker pool and result collection
//!
//! Spawns one tokio task per worker, hands each a disjoint range of task
//! ids, streams the finished reports back over a bounded mpsc channel and
//! reduces them into aggregate totals once every worker has been joined.

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bench::payload::run_task;
use crate::config::WorkloadConfig;
use crate::models::{AggregateTotals, RunSummary, WorkerReport, WorkerTiming};
use crate::{HarnessError, Result};

/// Join handle of one spawned worker
struct WorkerHandle {
    id: usize,
    handle: JoinHandle<Result<()>>,
}

/// Task ids owned by `worker_id`
pub fn task_range(worker_id: usize, tasks_per_worker: usize) -> Range<u64> {
    let width = tasks_per_worker as u64;
    let start = worker_id as u64 * width;
    start..start + width
}

/// Execute one worker's slice of tasks in increasing id order
///
/// Yields to the scheduler between tasks so the collector's deadline and
/// other tasks can make progress on a busy runtime.
pub async fn run_worker(worker_id: usize, config: &WorkloadConfig) -> WorkerReport {
    let range = task_range(worker_id, config.tasks_per_worker);
    let mut tasks = Vec::with_capacity(config.tasks_per_worker);
    let started = Instant::now();

    for task_id in range {
        tasks.push(run_task(task_id, config));
        tokio::task::yield_now().await;
    }

    WorkerReport {
        worker_id,
        elapsed: started.elapsed(),
        tasks,
    }
}

/// Hand a finished report to the collector
///
/// Fails with `WorkerError` when the collector has already dropped its
/// receiver, so a lost report is never silent.
pub async fn deliver(
    worker_id: usize,
    report: WorkerReport,
    report_tx: &mpsc::Sender<WorkerReport>,
) -> Result<()> {
    report_tx.send(report).await.map_err(|_| {
        HarnessError::WorkerError(format!(
            "Worker {} could not deliver its report: collector is gone",
            worker_id
        ))
    })
}

/// Fixed pool of workers plus the coordinator that collects their reports
pub struct WorkerPool {
    config: Arc<WorkloadConfig>,
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(config: WorkloadConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            workers: Vec::new(),
        })
    }

    /// Configuration this pool runs with
    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Run every worker to completion and reduce their reports
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.run_with(|_| {}).await
    }

    /// Like [`WorkerPool::run`], calling `on_report` as each report arrives
    pub async fn run_with<F>(&mut self, on_report: F) -> Result<RunSummary>
    where
        F: FnMut(&WorkerReport),
    {
        self.run_custom(
            |worker_id, config, report_tx| async move {
                let report = run_worker(worker_id, &config).await;
                deliver(worker_id, report, &report_tx).await
            },
            on_report,
        )
        .await
    }

    /// Run the pool with `body` as every worker's task
    ///
    /// `body` receives the worker id, the shared configuration and the
    /// worker's own sender; it is expected to [`deliver`] exactly one report.
    pub async fn run_custom<B, Fut, F>(&mut self, body: B, mut on_report: F) -> Result<RunSummary>
    where
        B: FnMut(usize, Arc<WorkloadConfig>, mpsc::Sender<WorkerReport>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
        F: FnMut(&WorkerReport),
    {
        let expected = self.config.num_workers;
        let start = Instant::now();

        info!(
            workers = expected,
            tasks_per_worker = self.config.tasks_per_worker,
            intensity = self.config.intensity,
            "starting workload"
        );

        // Room for every report, so no worker ever blocks on hand-off
        let (report_tx, mut report_rx) = mpsc::channel(expected.max(1));
        self.spawn_workers(body, &report_tx);
        // The channel closes once the last worker has sent and dropped its sender
        drop(report_tx);

        let deadline = self
            .config
            .collect_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let mut reports = Vec::with_capacity(expected);

        // Stop at `expected`: the join barrier below covers workers that
        // have delivered but not yet dropped their sender.
        while reports.len() < expected {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, report_rx.recv()).await {
                        Ok(next) => next,
                        Err(_) => return Err(self.abandon(reports).await),
                    }
                }
                None => report_rx.recv().await,
            };

            match next {
                Some(report) => {
                    debug!(
                        worker_id = report.worker_id,
                        tasks = report.tasks.len(),
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "worker reported"
                    );
                    on_report(&report);
                    reports.push(report);
                }
                None => break,
            }
        }

        self.wait_for_completion().await?;

        if reports.len() != expected {
            return Err(HarnessError::WorkerError(format!(
                "Expected {} worker reports, received {}",
                expected,
                reports.len()
            )));
        }

        let totals = AggregateTotals::from_reports(&reports);
        let elapsed = start.elapsed();
        let timings = reports.iter().map(WorkerTiming::from).collect();
        let summary = RunSummary::new((*self.config).clone(), totals, elapsed, timings);

        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            outcomes = summary.totals.outcome_count(),
            throughput = summary.throughput,
            "workload finished"
        );

        Ok(summary)
    }

    /// Spawn one task per worker, each owning a clone of the sender
    fn spawn_workers<B, Fut>(&mut self, mut body: B, report_tx: &mpsc::Sender<WorkerReport>)
    where
        B: FnMut(usize, Arc<WorkloadConfig>, mpsc::Sender<WorkerReport>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.workers.clear();

        for id in 0..self.config.num_workers {
            let task = body(id, Arc::clone(&self.config), report_tx.clone());
            self.workers.push(WorkerHandle {
                id,
                handle: tokio::spawn(task),
            });
        }
    }

    /// Join every worker, then surface the first failure
    async fn wait_for_completion(&mut self) -> Result<()> {
        let mut first_error = None;

        for worker in self.workers.drain(..) {
            let outcome = match worker.handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(e.into()),
            };

            if let Err(e) = outcome {
                warn!(worker_id = worker.id, error = %e, "worker failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Cancel outstanding workers, wait for them to stop, and report what did arrive
    async fn abandon(&mut self, reports: Vec<WorkerReport>) -> HarnessError {
        let delivered: Vec<usize> = reports.iter().map(|r| r.worker_id).collect();
        let mut cancelled = 0;

        for worker in self.workers.drain(..) {
            if !delivered.contains(&worker.id) {
                worker.handle.abort();
                cancelled += 1;
            }

            match worker.handle.await {
                Ok(Ok(())) => {}
                Err(e) if e.is_cancelled() => {}
                Ok(Err(e)) => {
                    debug!(worker_id = worker.id, error = %e, "abandoned worker failed");
                }
                Err(e) => {
                    debug!(worker_id = worker.id, error = %e, "abandoned worker panicked");
                }
            }
        }

        let expected = self.config.num_workers;
        warn!(
            received = reports.len(),
            expected, cancelled, "collection deadline expired"
        );

        HarnessError::PartialCompletion {
            received: reports.len(),
            expected,
            totals: AggregateTotals::from_reports(&reports),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::payload::sequential_totals;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type SharedConfig = Arc<WorkloadConfig>;
    type ReportTx = mpsc::Sender<WorkerReport>;

    /// Upper bound for runs that must return rather than hang
    const NO_HANG: Duration = Duration::from_secs(10);

    fn empty_report(worker_id: usize) -> WorkerReport {
        WorkerReport {
            worker_id,
            elapsed: Duration::ZERO,
            tasks: Vec::new(),
        }
    }

    /// Counts the worker bodies that have been dropped
    struct StopGuard(Arc<AtomicUsize>);

    impl Drop for StopGuard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new(WorkloadConfig::small()).unwrap();
        assert_eq!(pool.config().num_workers, 4);
        assert!(pool.workers.is_empty());

        let invalid = WorkloadConfig::small().with_num_workers(crate::config::MAX_WORKERS + 1);
        assert!(matches!(
            WorkerPool::new(invalid),
            Err(HarnessError::ConfigError(_))
        ));
    }

    #[test]
    fn test_task_ranges_partition_ids() {
        assert_eq!(task_range(0, 2), 0..2);
        assert_eq!(task_range(1, 2), 2..4);
        assert_eq!(task_range(3, 2), 6..8);
        assert!(task_range(5, 0).is_empty());
    }

    #[tokio::test]
    async fn test_run_worker_executes_in_order() {
        let config = WorkloadConfig::small().with_tasks_per_worker(3);
        let report = run_worker(2, &config).await;

        assert_eq!(report.worker_id, 2);
        let ids: Vec<u64> = report.tasks.iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec![6, 7, 8]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_four_workers_two_tasks() {
        let config = WorkloadConfig::small();
        let mut pool = WorkerPool::new(config.clone()).unwrap();

        let mut assignments = Vec::new();
        let summary = pool
            .run_with(|report| {
                let ids: Vec<u64> = report.tasks.iter().map(|t| t.task_id).collect();
                assignments.push((report.worker_id, ids));
            })
            .await
            .unwrap();

        assignments.sort();
        assert_eq!(
            assignments,
            vec![
                (0, vec![0, 1]),
                (1, vec![2, 3]),
                (2, vec![4, 5]),
                (3, vec![6, 7]),
            ]
        );

        assert_eq!(summary.totals.reports, 4);
        assert_eq!(summary.totals.tasks, 8);
        assert!(summary.totals.same_outcomes(&sequential_totals(&config)));
        assert_eq!(summary.workers.len(), 4);
        assert!(pool.workers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_full_coverage_without_duplicates() {
        let config = WorkloadConfig::small()
            .with_num_workers(7)
            .with_tasks_per_worker(5);
        let mut pool = WorkerPool::new(config).unwrap();

        let mut seen = Vec::new();
        pool.run_with(|report| seen.extend(report.tasks.iter().map(|t| t.task_id)))
            .await
            .unwrap();

        let unique: BTreeSet<u64> = seen.iter().copied().collect();
        assert_eq!(seen.len(), 35);
        assert_eq!(unique, (0..35).collect::<BTreeSet<u64>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_totals_match_sequential() {
        for workers in [1, 2, 3, 6] {
            for tasks in [0, 1, 3] {
                let config = WorkloadConfig::small()
                    .with_num_workers(workers)
                    .with_tasks_per_worker(tasks);
                let expected = sequential_totals(&config);

                let mut pool = WorkerPool::new(config).unwrap();
                let summary = pool.run().await.unwrap();

                assert_eq!(summary.totals.reports, workers as u64);
                assert!(
                    summary.totals.same_outcomes(&expected),
                    "mismatch for {} workers x {} tasks",
                    workers,
                    tasks
                );
            }
        }
    }

    #[tokio::test]
    async fn test_zero_workers() {
        let config = WorkloadConfig::small().with_num_workers(0);
        let mut pool = WorkerPool::new(config).unwrap();

        let summary = pool.run().await.unwrap();
        assert_eq!(summary.totals, AggregateTotals::default());
        assert!(summary.throughput.is_finite());
        assert!(summary.workers.is_empty());
    }

    #[tokio::test]
    async fn test_zero_workers_with_deadline() {
        let config = WorkloadConfig::small()
            .with_num_workers(0)
            .with_collect_timeout(Duration::from_millis(10));
        let mut pool = WorkerPool::new(config).unwrap();

        let summary = pool.run().await.unwrap();
        assert_eq!(summary.totals.outcome_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_tasks_still_reports() {
        let config = WorkloadConfig::small()
            .with_num_workers(3)
            .with_tasks_per_worker(0);
        let mut pool = WorkerPool::new(config).unwrap();

        let mut empty_reports = 0;
        let summary = pool
            .run_with(|report| {
                if report.tasks.is_empty() {
                    empty_reports += 1;
                }
            })
            .await
            .unwrap();

        assert_eq!(empty_reports, 3);
        assert_eq!(summary.totals.reports, 3);
        assert_eq!(summary.totals.tasks, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_reports_partial_completion() {
        let config = WorkloadConfig::small()
            .with_num_workers(4)
            .with_tasks_per_worker(200)
            .with_intensity(200_000)
            .with_collect_timeout(Duration::from_millis(1));
        let mut pool = WorkerPool::new(config).unwrap();

        match pool.run().await {
            Err(HarnessError::PartialCompletion {
                received,
                expected,
                totals,
            }) => {
                assert_eq!(expected, 4);
                assert!(received < expected);
                assert_eq!(totals.reports, received as u64);
            }
            other => panic!("expected partial completion, got {:?}", other.map(|_| ())),
        }
        assert!(pool.workers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_workers_are_stopped_before_return() {
        let config = WorkloadConfig::small()
            .with_num_workers(4)
            .with_collect_timeout(Duration::from_millis(100));
        let mut pool = WorkerPool::new(config).unwrap();
        let stopped = Arc::new(AtomicUsize::new(0));

        let body = {
            let stopped = Arc::clone(&stopped);
            move |worker_id: usize, _config: SharedConfig, report_tx: ReportTx| {
                let guard = StopGuard(Arc::clone(&stopped));
                async move {
                    if worker_id % 2 == 1 {
                        return deliver(worker_id, empty_report(worker_id), &report_tx).await;
                    }
                    let _guard = guard;
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(HarnessError::WorkerError("slept through the deadline".to_string()))
                }
            }
        };

        let outcome = tokio::time::timeout(NO_HANG, pool.run_custom(body, |_| {}))
            .await
            .expect("abandon must not wait for the sleeping workers");

        match outcome {
            Err(HarnessError::PartialCompletion {
                received,
                expected,
                totals,
            }) => {
                assert_eq!(received, 2);
                assert_eq!(expected, 4);
                assert_eq!(totals.reports, 2);
            }
            other => panic!("expected partial completion, got {:?}", other.map(|_| ())),
        }

        // Every body has been dropped: the two that delivered and the two aborted
        assert_eq!(stopped.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_complete_run_is_not_partial_when_senders_linger() {
        let config = WorkloadConfig::small()
            .with_num_workers(4)
            .with_collect_timeout(Duration::from_millis(50));
        let mut pool = WorkerPool::new(config).unwrap();

        // Each worker keeps its sender alive well past the deadline after delivering
        let body = |worker_id: usize, _config: SharedConfig, report_tx: ReportTx| async move {
            deliver(worker_id, empty_report(worker_id), &report_tx).await?;
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(report_tx);
            Ok::<_, HarnessError>(())
        };

        let summary = tokio::time::timeout(NO_HANG, pool.run_custom(body, |_| {}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.totals.reports, 4);
        assert!(summary.elapsed >= Duration::from_millis(300));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_worker_is_worker_error() {
        let mut pool = WorkerPool::new(WorkloadConfig::small()).unwrap();

        let body = |worker_id: usize, _config: SharedConfig, report_tx: ReportTx| async move {
            if worker_id == 1 {
                panic!("worker {} blew up", worker_id);
            }
            deliver(worker_id, empty_report(worker_id), &report_tx).await
        };

        let outcome = tokio::time::timeout(NO_HANG, pool.run_custom(body, |_| {}))
            .await
            .expect("a panicking worker must not hang the collector");

        match outcome {
            Err(HarnessError::WorkerError(msg)) => assert!(msg.contains("panicked"), "{}", msg),
            other => panic!("expected worker error, got {:?}", other.map(|_| ())),
        }
        assert!(pool.workers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_worker_is_worker_error() {
        let mut pool = WorkerPool::new(WorkloadConfig::small()).unwrap();

        let body = |worker_id: usize, _config: SharedConfig, report_tx: ReportTx| async move {
            if worker_id == 2 {
                return Err(HarnessError::WorkerError("out of scratch space".to_string()));
            }
            deliver(worker_id, empty_report(worker_id), &report_tx).await
        };

        let outcome = tokio::time::timeout(NO_HANG, pool.run_custom(body, |_| {}))
            .await
            .expect("a failed worker must not hang the collector");

        match outcome {
            Err(HarnessError::WorkerError(msg)) => assert_eq!(msg, "out of scratch space"),
            other => panic!("expected worker error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_deliver_to_dropped_collector() {
        let (report_tx, report_rx) = mpsc::channel(1);
        drop(report_rx);

        match deliver(3, empty_report(3), &report_tx).await {
            Err(HarnessError::WorkerError(msg)) => {
                assert!(msg.contains("Worker 3"), "{}", msg);
                assert!(msg.contains("collector is gone"), "{}", msg);
            }
            other => panic!("expected worker error, got {:?}", other),
        }
    }
}
