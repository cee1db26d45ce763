//! Synthetic CPU payload
//!
//! Each task scans a window of integers for primes, multiplies a few
//! dense matrices and iterates a Fibonacci sequence. Everything is a pure
//! function of the task id and the workload configuration.

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::config::WorkloadConfig;
use crate::models::{AggregateTotals, TaskRecord};

/// Distance between the prime-search windows of consecutive tasks
pub const PRIME_STRIDE: u64 = 10_000;

/// Trial-division primality test over the 6k ± 1 candidates
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut i = 5u64;
    while i * i <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Count primes in `start..=end`, returning the count and the largest one
pub fn primes_in_range(start: u64, end: u64) -> (u64, Option<u64>) {
    let mut count = 0;
    let mut last = None;
    for n in start..=end {
        if is_prime(n) {
            count += 1;
            last = Some(n);
        }
    }
    (count, last)
}

/// Multiply two seeded random `size` x `size` matrices and return the trace
pub fn matrix_multiply(size: usize, seed: u64) -> f64 {
    let mut rng = SmallRng::seed_from_u64(seed);
    let a: Vec<f64> = (0..size * size).map(|_| rng.gen::<f64>()).collect();
    let b: Vec<f64> = (0..size * size).map(|_| rng.gen::<f64>()).collect();
    let mut product = vec![0.0f64; size * size];

    for i in 0..size {
        for k in 0..size {
            let a_ik = a[i * size + k];
            for j in 0..size {
                product[i * size + j] += a_ik * b[k * size + j];
            }
        }
    }

    (0..size).map(|i| product[i * size + i]).sum()
}

/// The `n`th Fibonacci number modulo 2^64
pub fn fibonacci(n: u64) -> u64 {
    if n <= 1 {
        return n;
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 2..=n {
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }
    b
}

/// Execute one unit of synthetic work
pub fn run_task(task_id: u64, config: &WorkloadConfig) -> TaskRecord {
    let start = task_id * PRIME_STRIDE;
    let (prime_count, last_prime) = primes_in_range(start, start + config.intensity);

    let mut trace = 0.0;
    for m in 0..config.matrix_count as u64 {
        let seed = task_id.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ m;
        trace += matrix_multiply(config.matrix_size, seed);
    }
    // Keeps the matrix work observable to the optimizer
    std::hint::black_box(trace);

    let mut fib_checksum = 0u64;
    for i in 0..config.fib_terms as u64 {
        fib_checksum = fib_checksum.wrapping_add(fibonacci(config.fib_start + i));
    }

    TaskRecord {
        task_id,
        prime_count,
        last_prime,
        matrix_count: config.matrix_count as u64,
        fib_count: config.fib_terms as u64,
        fib_checksum,
    }
}

/// Totals of a single-threaded pass over every task id of the run
pub fn sequential_totals(config: &WorkloadConfig) -> AggregateTotals {
    let mut totals = AggregateTotals::default();
    for task_id in 0..config.total_tasks() {
        totals.absorb_task(&run_task(task_id, config));
    }
    totals
}
