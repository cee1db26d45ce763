//! Data models module
//!
//! Contains task and worker records, aggregate totals,
//! and the serializable run summaries.

pub mod result;

// Re-export commonly used types
pub use result::{
    AggregateTotals, CounterSummary, RunSummary, TaskRecord, WorkerReport, WorkerTiming,
};
