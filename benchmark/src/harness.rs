// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark harness for running and timing operations.

use std::time::{Duration, Instant};

/// A benchmark harness for measuring operation latency.
pub struct BenchmarkHarness {
    /// Number of warmup iterations before measurement
    warmup_iterations: u64,
    /// Number of measurement iterations
    measurement_iterations: u64,
    /// Whether to keep raw sample data
    keep_raw_samples: bool,
}

impl BenchmarkHarness {
    pub fn new() -> Self {
        Self {
            warmup_iterations: 10,
            measurement_iterations: 100,
            keep_raw_samples: true,
        }
    }

    pub fn warmup(mut self, iterations: u64) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    pub fn iterations(mut self, iterations: u64) -> Self {
        self.measurement_iterations = iterations;
        self
    }

    pub fn keep_samples(mut self, keep: bool) -> Self {
        self.keep_raw_samples = keep;
        self
    }

    pub fn should_keep_samples(&self) -> bool {
        self.keep_raw_samples
    }

    /// Time each call of `operation`. Returns samples in nanoseconds.
    pub fn run<F>(&self, mut operation: F) -> Vec<u64>
    where
        F: FnMut(),
    {
        self.run_measured(|| {
            let start = Instant::now();
            operation();
            Some(start.elapsed())
        })
    }

    /// Run an operation that measures itself, e.g. when the interesting
    /// interval ends on another thread. `None` drops the sample.
    pub fn run_measured<F>(&self, mut operation: F) -> Vec<u64>
    where
        F: FnMut() -> Option<Duration>,
    {
        for _ in 0..self.warmup_iterations {
            let _ = operation();
        }

        let mut samples = Vec::with_capacity(self.measurement_iterations as usize);
        for _ in 0..self.measurement_iterations {
            if let Some(elapsed) = operation() {
                samples.push(elapsed.as_nanos() as u64);
            }
        }
        samples
    }

    /// Call `operation` repeatedly for `duration` after warmup.
    ///
    /// Returns (total_operations, total_duration_ns).
    pub fn run_for<F>(&self, duration: Duration, mut operation: F) -> (u64, u64)
    where
        F: FnMut(),
    {
        for _ in 0..self.warmup_iterations {
            operation();
        }

        let start = Instant::now();
        let mut operations = 0u64;
        while start.elapsed() < duration {
            operation();
            operations += 1;
        }
        (operations, start.elapsed().as_nanos() as u64)
    }
}

impl Default for BenchmarkHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_harness_basic() {
        let harness = BenchmarkHarness::new().warmup(5).iterations(20);

        let samples = harness.run(|| {
            thread::sleep(Duration::from_micros(100));
        });

        assert_eq!(samples.len(), 20);
        for sample in &samples {
            assert!(*sample >= 100_000, "Sample {} < 100μs", sample);
        }
    }

    #[test]
    fn test_run_measured_drops_missing_samples() {
        let harness = BenchmarkHarness::new().warmup(0).iterations(10);
        let mut calls = 0u32;

        let samples = harness.run_measured(|| {
            calls += 1;
            (calls % 2 == 0).then(|| Duration::from_nanos(calls as u64))
        });

        assert_eq!(samples, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_run_for_counts_operations() {
        let harness = BenchmarkHarness::new().warmup(2);
        let mut calls = 0u64;

        let (ops, elapsed_ns) = harness.run_for(Duration::from_millis(20), || calls += 1);

        assert_eq!(calls, ops + 2);
        assert!(elapsed_ns >= 20_000_000);
    }
}
