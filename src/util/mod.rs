//! Utility functions module
//!
//! Contains helper functions for rate calculation and for formatting
//! durations, counts and rates.

pub mod units;

// Re-export commonly used functions
pub use units::{calculate_rate, format_count, format_duration, format_rate};
