//! Configuration management module
//!
//! Holds the workload and counter parameters, their compiled-in defaults,
//! validation, and optional loading from a TOML file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bench::payload::PRIME_STRIDE;
use crate::{HarnessError, Result};

/// Upper bound on concurrently spawned workers
pub const MAX_WORKERS: usize = 1024;
/// Upper bound on tasks assigned to a single worker
pub const MAX_TASKS_PER_WORKER: usize = 1_000_000;
/// Upper bound on the prime-search window per task
pub const MAX_INTENSITY: u64 = 10_000_000;
/// Upper bound on the matrix dimension
pub const MAX_MATRIX_SIZE: usize = 512;
/// Upper bound on matrices multiplied per task
pub const MAX_MATRIX_COUNT: usize = 64;
/// Upper bound on Fibonacci terms computed per task
pub const MAX_FIB_TERMS: usize = 100_000;
/// Upper bound on the first Fibonacci index
pub const MAX_FIB_START: u64 = 1_000_000;
/// Upper bound on lock-guarded increments
pub const MAX_INCREMENTS: u64 = 100_000_000;

/// Parameters for the worker pool run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of concurrently executing workers
    pub num_workers: usize,
    /// Tasks each worker executes sequentially
    pub tasks_per_worker: usize,
    /// Width of the prime-search window each task scans
    pub intensity: u64,
    /// Dimension of the square matrices multiplied per task
    pub matrix_size: usize,
    /// Number of matrix products per task
    pub matrix_count: usize,
    /// Number of Fibonacci terms computed per task
    pub fib_terms: usize,
    /// Index of the first Fibonacci term computed
    pub fib_start: u64,
    /// Optional deadline for collecting every worker report
    #[serde(
        with = "humantime_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub collect_timeout: Option<Duration>,
}

/// Parameters for the lock-guarded counter run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Number of concurrent increment operations
    pub increments: u64,
    /// Upper bound on increment tasks alive at once
    pub max_in_flight: usize,
}

/// Full harness configuration as read from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub workload: WorkloadConfig,
    pub counter: CounterConfig,
}

/// Number of workers to spawn when none is configured
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            num_workers: default_parallelism(),
            tasks_per_worker: 5,
            intensity: 2000,
            matrix_size: 50,
            matrix_count: 3,
            fib_terms: 100,
            fib_start: 1000,
            collect_timeout: None,
        }
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            increments: 1_000_000,
            max_in_flight: 65_536,
        }
    }
}

impl WorkloadConfig {
    /// A cheap configuration for smoke runs and tests
    pub fn small() -> Self {
        Self {
            num_workers: 4,
            tasks_per_worker: 2,
            intensity: 200,
            matrix_size: 8,
            matrix_count: 2,
            fib_terms: 10,
            fib_start: 10,
            collect_timeout: None,
        }
    }

    /// Total number of tasks across all workers
    pub fn total_tasks(&self) -> u64 {
        self.num_workers as u64 * self.tasks_per_worker as u64
    }

    /// Validate the configuration parameters
    ///
    /// Bounds are chosen so the payload cannot overflow, which keeps the
    /// hot loops free of runtime checks.
    pub fn validate(&self) -> Result<()> {
        if self.num_workers > MAX_WORKERS {
            return Err(HarnessError::ConfigError(format!(
                "Too many workers: {} (max: {})",
                self.num_workers, MAX_WORKERS
            )));
        }

        if self.tasks_per_worker > MAX_TASKS_PER_WORKER {
            return Err(HarnessError::ConfigError(format!(
                "Too many tasks per worker: {} (max: {})",
                self.tasks_per_worker, MAX_TASKS_PER_WORKER
            )));
        }

        if self.intensity > MAX_INTENSITY {
            return Err(HarnessError::ConfigError(format!(
                "Intensity too large: {} (max: {})",
                self.intensity, MAX_INTENSITY
            )));
        }

        if self.matrix_size > MAX_MATRIX_SIZE {
            return Err(HarnessError::ConfigError(format!(
                "Matrix size too large: {} (max: {})",
                self.matrix_size, MAX_MATRIX_SIZE
            )));
        }

        if self.matrix_count > MAX_MATRIX_COUNT {
            return Err(HarnessError::ConfigError(format!(
                "Too many matrices per task: {} (max: {})",
                self.matrix_count, MAX_MATRIX_COUNT
            )));
        }

        if self.fib_terms > MAX_FIB_TERMS {
            return Err(HarnessError::ConfigError(format!(
                "Too many Fibonacci terms: {} (max: {})",
                self.fib_terms, MAX_FIB_TERMS
            )));
        }

        if self.fib_start > MAX_FIB_START {
            return Err(HarnessError::ConfigError(format!(
                "Fibonacci start index too large: {} (max: {})",
                self.fib_start, MAX_FIB_START
            )));
        }

        // The highest number any task scans must be representable
        let last_window_end = self
            .total_tasks()
            .saturating_sub(1)
            .checked_mul(PRIME_STRIDE)
            .and_then(|start| start.checked_add(self.intensity));
        if last_window_end.is_none() {
            return Err(HarnessError::ConfigError(
                "Prime search range overflows u64".to_string(),
            ));
        }

        if let Some(timeout) = self.collect_timeout {
            if timeout.is_zero() {
                return Err(HarnessError::ConfigError(
                    "Collect timeout must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Set the number of workers
    pub fn with_num_workers(mut self, count: usize) -> Self {
        self.num_workers = count;
        self
    }

    /// Set the number of tasks per worker
    pub fn with_tasks_per_worker(mut self, count: usize) -> Self {
        self.tasks_per_worker = count;
        self
    }

    /// Set the prime-search window width
    pub fn with_intensity(mut self, intensity: u64) -> Self {
        self.intensity = intensity;
        self
    }

    /// Set the matrix dimension and number of products per task
    pub fn with_matrices(mut self, size: usize, count: usize) -> Self {
        self.matrix_size = size;
        self.matrix_count = count;
        self
    }

    /// Set the collection deadline
    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = Some(timeout);
        self
    }
}

impl CounterConfig {
    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.increments > MAX_INCREMENTS {
            return Err(HarnessError::ConfigError(format!(
                "Too many increments: {} (max: {})",
                self.increments, MAX_INCREMENTS
            )));
        }

        if self.max_in_flight == 0 {
            return Err(HarnessError::ConfigError(
                "Max in-flight increments must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the number of increments
    pub fn with_increments(mut self, increments: u64) -> Self {
        self.increments = increments;
        self
    }
}

impl HarnessConfig {
    /// Validate both sections
    pub fn validate(&self) -> Result<()> {
        self.workload.validate()?;
        self.counter.validate()
    }

    /// Load configuration from a TOML file
    ///
    /// Missing fields fall back to their defaults. Negative values fail to
    /// parse into the unsigned fields and are reported as configuration
    /// errors.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HarnessError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_toml(&content).map_err(|e| {
            HarnessError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            HarnessError::ConfigError(format!("Failed to serialize configuration: {}", e))
        })
    }
}

// Optional durations are written in human form ("30s", "1m 30s")
mod humantime_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => {
                serializer.serialize_str(&humantime::format_duration(*duration).to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| humantime::parse_duration(&s).map_err(<D::Error as serde::de::Error>::custom))
            .transpose()
    }
}
