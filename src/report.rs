//! Run drivers and report rendering
//!
//! Glue between the benchmark engine and the binary: runs the workload
//! behind a progress bar, checks it against the sequential reference, and
//! renders text or JSON reports.

use serde::Serialize;

use crate::bench::payload::sequential_totals;
use crate::bench::WorkerPool;
use crate::config::WorkloadConfig;
use crate::models::{AggregateTotals, CounterSummary, RunSummary};
use crate::util::units::{format_count, format_duration, format_rate};
use crate::{HarnessError, Result};

/// Run the worker pool and advance a progress bar as reports arrive
pub async fn run_workload(config: WorkloadConfig) -> Result<RunSummary> {
    let mut pool = WorkerPool::new(config)?;

    let pb = indicatif::ProgressBar::new(pool.config().num_workers as u64);
    pb.set_style(
        indicatif::ProgressStyle::with_template(
            "{spinner} {pos}/{len} workers reported ({elapsed}) {msg}",
        )
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar()),
    );

    let result = pool
        .run_with(|report| {
            pb.inc(1);
            pb.set_message(format!("worker {} done", report.worker_id));
        })
        .await;

    pb.finish_and_clear();
    result
}

/// Check parallel totals against a single-threaded pass over the same ids
pub fn verify_against_sequential(summary: &RunSummary) -> Result<()> {
    let expected = sequential_totals(&summary.config);
    if summary.totals.same_outcomes(&expected) {
        Ok(())
    } else {
        Err(HarnessError::VerificationError(format!(
            "parallel totals {:?} differ from sequential totals {:?}",
            summary.totals, expected
        )))
    }
}

/// Human-readable workload report
pub fn render_run(summary: &RunSummary) -> String {
    let config = &summary.config;
    let mut out = String::new();

    out.push_str("=== WORKLOAD RESULTS ===\n");
    out.push_str(&format!("Workers: {}\n", config.num_workers));
    out.push_str(&format!(
        "Tasks per worker: {}, Intensity: {}\n",
        config.tasks_per_worker, config.intensity
    ));
    out.push_str(&format!(
        "Total execution time: {}\n",
        format_duration(summary.elapsed)
    ));
    push_totals(&mut out, &summary.totals);
    out.push_str(&format!(
        "Throughput: {} ({})\n",
        format_rate(summary.throughput, "ops"),
        format_rate(summary.tasks_per_sec(), "tasks")
    ));
    out.push_str(&format!(
        "Parallel speedup: {:.2}x across {} workers\n",
        summary.parallel_speedup(),
        summary.workers.len()
    ));
    if let Some(slowest) = summary.slowest_worker() {
        out.push_str(&format!(
            "Slowest worker: #{} ({})\n",
            slowest.worker_id,
            format_duration(slowest.elapsed)
        ));
    }

    out
}

/// Human-readable report of the workers that made the deadline
///
/// The totals cover only `received` of `expected` workers and are labelled
/// as such; no throughput is derived from them.
pub fn render_partial(received: usize, expected: usize, totals: &AggregateTotals) -> String {
    let mut out = format!(
        "=== WORKLOAD RESULTS: INCOMPLETE ({}/{} workers reported) ===\n",
        received, expected
    );
    push_totals(&mut out, totals);
    out.push_str("Totals exclude workers cancelled at the collection deadline\n");
    out
}

fn push_totals(out: &mut String, totals: &AggregateTotals) {
    out.push_str(&format!("Total tasks: {}\n", format_count(totals.tasks)));
    out.push_str(&format!("Total primes found: {}\n", format_count(totals.primes)));
    if let Some(largest) = totals.largest_prime {
        out.push_str(&format!("Largest prime: {}\n", largest));
    }
    out.push_str(&format!(
        "Total matrices computed: {}\n",
        format_count(totals.matrices)
    ));
    out.push_str(&format!(
        "Total fibonacci numbers: {}\n",
        format_count(totals.fibs)
    ));
    out.push_str(&format!(
        "Total outcomes: {}\n",
        format_count(totals.outcome_count())
    ));
}

/// Human-readable counter report
pub fn render_counter(summary: &CounterSummary) -> String {
    format!(
        "=== COUNTER RESULTS ===\nIncrements: {}\nFinal counter: {}\nTime: {} ({})\n",
        format_count(summary.increments),
        summary.final_value,
        format_duration(summary.elapsed),
        format_rate(summary.increments_per_sec(), "increments"),
    )
}

#[derive(Serialize)]
struct JsonReport<'a> {
    run: &'a RunSummary,
    counter: &'a CounterSummary,
}

#[derive(Serialize)]
struct PartialJsonReport<'a> {
    status: &'static str,
    received: usize,
    expected: usize,
    totals: &'a AggregateTotals,
}

/// Partial totals as a JSON document marked `"status": "incomplete"`
pub fn render_partial_json(
    received: usize,
    expected: usize,
    totals: &AggregateTotals,
) -> Result<String> {
    Ok(serde_json::to_string_pretty(&PartialJsonReport {
        status: "incomplete",
        received,
        expected,
        totals,
    })?)
}

/// Both summaries as one pretty-printed JSON document
pub fn render_json(run: &RunSummary, counter: &CounterSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonReport { run, counter })?)
}
