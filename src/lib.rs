//! CPUORB - CPU Orchestration Rust Bench
//!
//! A synthetic CPU-bound workload harness that measures how well a
//! task-scheduling runtime spreads independent work across cores.

use std::fmt;

use crate::models::AggregateTotals;

pub mod bench;
pub mod config;
pub mod models;
pub mod report;
pub mod util;

// Common error types
#[derive(Debug)]
pub enum HarnessError {
    /// I/O operation failed
    IoError(std::io::Error),
    /// Configuration validation or parsing error
    ConfigError(String),
    /// A worker failed to deliver its report
    WorkerError(String),
    /// The collection deadline expired before every worker reported
    PartialCompletion {
        /// Reports that arrived before the deadline
        received: usize,
        /// Reports the run was configured to produce
        expected: usize,
        /// Totals reduced from the reports that did arrive
        totals: AggregateTotals,
    },
    /// Parallel totals disagree with the sequential reference
    VerificationError(String),
    /// Report serialization error
    SerializationError(String),
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessError::IoError(err) => write!(f, "I/O error: {}", err),
            HarnessError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            HarnessError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
            HarnessError::PartialCompletion { received, expected, .. } => write!(
                f,
                "Incomplete run: received {} of {} worker reports",
                received, expected
            ),
            HarnessError::VerificationError(msg) => write!(f, "Verification failed: {}", msg),
            HarnessError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HarnessError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        HarnessError::IoError(err)
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        HarnessError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<tokio::task::JoinError> for HarnessError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            HarnessError::WorkerError(format!("task panicked: {}", err))
        } else {
            HarnessError::WorkerError(format!("task aborted: {}", err))
        }
    }
}

/// Result type alias for CPUORB operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Error handling utilities
pub mod error {
    use super::HarnessError;

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &HarnessError) -> String {
        match error {
            HarnessError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            HarnessError::PartialCompletion { received, expected, .. } => format!(
                "Only {} of {} workers reported before the deadline. Raise collect_timeout or lower intensity.",
                received, expected
            ),
            HarnessError::VerificationError(_) => {
                "Parallel totals differ from the sequential reference. The run is not trustworthy."
                    .to_string()
            }
            _ => error.to_string(),
        }
    }

    /// Whether the run produced a usable, if degraded, aggregate
    pub fn is_degraded(error: &HarnessError) -> bool {
        matches!(error, HarnessError::PartialCompletion { .. })
    }
}
