//! Lock-guarded shared counter
//!
//! Runs N independent increment tasks against one integer behind a
//! `tokio::sync::Mutex`, waits for all of them through a `JoinSet`, then
//! reads the value once.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::CounterConfig;
use crate::models::CounterSummary;
use crate::{HarnessError, Result};

/// Shared integer whose every update happens under the lock
#[derive(Debug, Clone, Default)]
pub struct LockedCounter {
    value: Arc<Mutex<u64>>,
}

impl LockedCounter {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one while holding the lock
    pub async fn increment(&self) {
        let mut value = self.value.lock().await;
        *value += 1;
    }

    /// Consume the last handle and return the value without locking
    ///
    /// Fails if any clone of the counter is still alive.
    pub fn into_value(self) -> Result<u64> {
        Arc::try_unwrap(self.value)
            .map(Mutex::into_inner)
            .map_err(|shared| {
                HarnessError::WorkerError(format!(
                    "Counter still shared by {} other handles",
                    Arc::strong_count(&shared) - 1
                ))
            })
    }

    /// Run `config.increments` concurrent increments and read the result
    ///
    /// At most `config.max_in_flight` increment tasks exist at once; each
    /// increment is still its own spawned task.
    pub async fn run(config: &CounterConfig) -> Result<CounterSummary> {
        config.validate()?;

        let counter = Self::new();
        let start = Instant::now();
        let mut tasks = JoinSet::new();

        info!(
            increments = config.increments,
            max_in_flight = config.max_in_flight,
            "starting counter"
        );

        for _ in 0..config.increments {
            if tasks.len() >= config.max_in_flight {
                if let Some(joined) = tasks.join_next().await {
                    joined?;
                }
            }
            let counter = counter.clone();
            tasks.spawn(async move { counter.increment().await });
        }

        // Barrier: every increment has finished before the value is read
        while let Some(joined) = tasks.join_next().await {
            joined?;
        }

        let final_value = counter.into_value()?;
        let elapsed = start.elapsed();
        debug!(final_value, elapsed_ms = elapsed.as_millis() as u64, "counter finished");

        Ok(CounterSummary {
            increments: config.increments,
            final_value,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(increments: u64) -> CounterConfig {
        CounterConfig::default().with_increments(increments)
    }

    #[tokio::test]
    async fn test_increment_then_read() {
        assert_eq!(LockedCounter::new().into_value().unwrap(), 0);

        let counter = LockedCounter::new();
        counter.increment().await;
        counter.increment().await;
        assert_eq!(counter.into_value().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_into_value_rejects_shared_counter() {
        let counter = LockedCounter::new();
        let _other = counter.clone();
        assert!(matches!(
            counter.into_value(),
            Err(HarnessError::WorkerError(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_increments() {
        let summary = LockedCounter::run(&config(0)).await.unwrap();
        assert_eq!(summary.final_value, 0);
        assert!(summary.is_exact());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_small_counts_are_exact() {
        for n in [1, 2, 100, 1_000] {
            let summary = LockedCounter::run(&config(n)).await.unwrap();
            assert_eq!(summary.final_value, n);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_repeated_runs_are_exact() {
        for _ in 0..20 {
            let summary = LockedCounter::run(&config(10_000)).await.unwrap();
            assert!(summary.is_exact());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_small_in_flight_window() {
        let config = CounterConfig {
            increments: 5_000,
            max_in_flight: 3,
        };
        let summary = LockedCounter::run(&config).await.unwrap();
        assert_eq!(summary.final_value, 5_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_one_million_increments() {
        let summary = LockedCounter::run(&config(1_000_000)).await.unwrap();
        assert_eq!(summary.final_value, 1_000_000);
    }
}
