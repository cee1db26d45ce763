//! Benchmark result data models
//!
//! Contains the per-task and per-worker records produced by the pool, the
//! coordinator's aggregate totals, and the serializable run summaries.

use crate::config::WorkloadConfig;
use crate::util::units::calculate_rate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one unit of synthetic work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier, unique across the run
    pub task_id: u64,
    /// Primes found in the task's search window
    pub prime_count: u64,
    /// Largest prime in the window, if any
    pub last_prime: Option<u64>,
    /// Matrix products computed
    pub matrix_count: u64,
    /// Fibonacci terms computed
    pub fib_count: u64,
    /// Wrapping sum of the computed Fibonacci terms
    pub fib_checksum: u64,
}

impl TaskRecord {
    /// Total countable outcomes of this task
    pub fn outcome_count(&self) -> u64 {
        self.prime_count + self.matrix_count + self.fib_count
    }
}

/// Everything one worker produced for its slice of tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Worker identifier in `0..num_workers`
    pub worker_id: usize,
    /// Time from the first task start to the last task completion
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// Task records in execution order
    pub tasks: Vec<TaskRecord>,
}

/// Coordinator-side running sums over every task record
///
/// Every field combines commutatively, so the order in which reports
/// arrive does not affect the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTotals {
    /// Worker reports absorbed
    pub reports: u64,
    /// Task records absorbed
    pub tasks: u64,
    pub primes: u64,
    pub matrices: u64,
    pub fibs: u64,
    pub fib_checksum: u64,
    /// Largest prime seen by any task
    pub largest_prime: Option<u64>,
}

impl AggregateTotals {
    /// Fold one task record into the totals
    pub fn absorb_task(&mut self, task: &TaskRecord) {
        self.tasks += 1;
        self.primes += task.prime_count;
        self.matrices += task.matrix_count;
        self.fibs += task.fib_count;
        self.fib_checksum = self.fib_checksum.wrapping_add(task.fib_checksum);
        self.largest_prime = self.largest_prime.max(task.last_prime);
    }

    /// Fold every task of a worker report into the totals
    pub fn absorb(&mut self, report: &WorkerReport) {
        self.reports += 1;
        for task in &report.tasks {
            self.absorb_task(task);
        }
    }

    /// Reduce a set of reports in one pass
    pub fn from_reports<'a, I>(reports: I) -> Self
    where
        I: IntoIterator<Item = &'a WorkerReport>,
    {
        let mut totals = Self::default();
        for report in reports {
            totals.absorb(report);
        }
        totals
    }

    /// Sum of outcomes across all categories
    pub fn outcome_count(&self) -> u64 {
        self.primes + self.matrices + self.fibs
    }

    /// Compare everything except the report count
    ///
    /// A sequential pass has no reports, so this is the comparison used
    /// to check a parallel run against it.
    pub fn same_outcomes(&self, other: &Self) -> bool {
        self.tasks == other.tasks
            && self.primes == other.primes
            && self.matrices == other.matrices
            && self.fibs == other.fibs
            && self.fib_checksum == other.fib_checksum
            && self.largest_prime == other.largest_prime
    }
}

/// Timing of a single worker as seen from inside the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTiming {
    pub worker_id: usize,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    pub tasks: usize,
}

impl From<&WorkerReport> for WorkerTiming {
    fn from(report: &WorkerReport) -> Self {
        Self {
            worker_id: report.worker_id,
            elapsed: report.elapsed,
            tasks: report.tasks.len(),
        }
    }
}

/// Complete result of one worker pool run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    /// Configuration used for this run
    pub config: WorkloadConfig,
    /// Reduced totals across all workers
    pub totals: AggregateTotals,
    /// Collector-observed wall-clock time
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// Outcomes per second of wall-clock time
    pub throughput: f64,
    /// Per-worker timings, sorted by worker id
    pub workers: Vec<WorkerTiming>,
}

impl RunSummary {
    /// Build a summary from reduced totals and the worker timings
    pub fn new(
        config: WorkloadConfig,
        totals: AggregateTotals,
        elapsed: Duration,
        mut workers: Vec<WorkerTiming>,
    ) -> Self {
        workers.sort_by_key(|w| w.worker_id);
        let throughput = calculate_rate(totals.outcome_count(), elapsed);
        Self {
            timestamp: Utc::now(),
            config,
            totals,
            elapsed,
            throughput,
            workers,
        }
    }

    /// Tasks completed per second of wall-clock time
    pub fn tasks_per_sec(&self) -> f64 {
        calculate_rate(self.totals.tasks, self.elapsed)
    }

    /// Summed worker busy time divided by wall-clock time
    pub fn parallel_speedup(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.0;
        }
        let busy: f64 = self.workers.iter().map(|w| w.elapsed.as_secs_f64()).sum();
        busy / self.elapsed.as_secs_f64()
    }

    /// Slowest worker, the one that bounds the wall-clock time
    pub fn slowest_worker(&self) -> Option<&WorkerTiming> {
        self.workers.iter().max_by_key(|w| w.elapsed)
    }
}

/// Result of the lock-guarded counter run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterSummary {
    /// Increments requested
    pub increments: u64,
    /// Value read after every increment completed
    pub final_value: u64,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

impl CounterSummary {
    /// Whether no increment was lost or double-counted
    pub fn is_exact(&self) -> bool {
        self.final_value == self.increments
    }

    /// Increments completed per second
    pub fn increments_per_sec(&self) -> f64 {
        calculate_rate(self.final_value, self.elapsed)
    }
}

// Durations are stored as nanoseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_nanos().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u128::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}
