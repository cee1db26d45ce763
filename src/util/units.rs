//! Units formatting and conversion utilities
//!
//! Provides guarded rate calculation and human-readable formatting of
//! durations, counts and rates for the text report.

use std::time::Duration;

/// Elapsed times shorter than this are treated as zero when computing rates
pub const MIN_RATE_WINDOW: Duration = Duration::from_nanos(1);

/// Calculate events per second, returning 0.0 for a zero-length window
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use cpuorb::util::units::calculate_rate;
///
/// let rate = calculate_rate(1000, Duration::from_secs(2));
/// assert!((rate - 500.0).abs() < 0.01);
/// assert_eq!(calculate_rate(1000, Duration::ZERO), 0.0);
/// ```
pub fn calculate_rate(count: u64, duration: Duration) -> f64 {
    if duration < MIN_RATE_WINDOW {
        return 0.0;
    }
    count as f64 / duration.as_secs_f64()
}

/// Format duration into human-readable string
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use cpuorb::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 3600 {
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if total_secs >= 60 {
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        format!("{}m {}s", minutes, seconds)
    } else if total_secs > 0 {
        if millis > 0 {
            format!("{}.{:02}s", total_secs, millis / 10)
        } else {
            format!("{}s", total_secs)
        }
    } else if millis > 0 {
        format!("{}ms", millis)
    } else {
        format!("{}μs", duration.as_micros())
    }
}

/// Format a count with thousands separators
///
/// # Examples
/// ```
/// use cpuorb::util::units::format_count;
///
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a per-second rate with K/M suffixes
///
/// # Examples
/// ```
/// use cpuorb::util::units::format_rate;
///
/// assert_eq!(format_rate(1500.0, "ops"), "1.5K ops/s");
/// assert_eq!(format_rate(2500000.0, "ops"), "2.5M ops/s");
/// ```
pub fn format_rate(per_sec: f64, unit: &str) -> String {
    if per_sec >= 1_000_000.0 {
        format!("{:.1}M {}/s", per_sec / 1_000_000.0, unit)
    } else if per_sec >= 1_000.0 {
        format!("{:.1}K {}/s", per_sec / 1_000.0, unit)
    } else {
        format!("{:.2} {}/s", per_sec, unit)
    }
}
