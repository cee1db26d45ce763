//! Benchmark engine module
//!
//! Contains the synthetic payload, the worker pool with its result
//! collector, and the lock-guarded counter.

pub mod counter;
pub mod payload;
pub mod worker;

// Re-export commonly used types
pub use counter::LockedCounter;
pub use payload::{run_task, sequential_totals};
pub use worker::WorkerPool;
