// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Standardized metrics types for benchmark results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sysinfo::System;

/// Categories of benchmarks supported by the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkCategory {
    /// Shared ring append and drain
    EventStore,
    /// Publish on the service to callback on a client
    Notify,
}

impl BenchmarkCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EventStore => "event_store",
            Self::Notify => "notify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "event_store" | "store" => Some(Self::EventStore),
            "notify" => Some(Self::Notify),
            _ => None,
        }
    }
}

impl std::fmt::Display for BenchmarkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Latency distribution in nanoseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    /// p50
    pub median_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub std_dev_ns: f64,
    /// Raw samples, downsampled above 10k entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<u64>>,
}

impl LatencyMetrics {
    /// Calculate metrics from latency samples in nanoseconds.
    pub fn from_samples(mut samples: Vec<u64>, keep_raw: bool) -> Self {
        if samples.is_empty() {
            return Self {
                min_ns: 0,
                max_ns: 0,
                mean_ns: 0.0,
                median_ns: 0,
                p95_ns: 0,
                p99_ns: 0,
                std_dev_ns: 0.0,
                samples: None,
            };
        }

        samples.sort_unstable();
        let len = samples.len();
        let mean_ns = samples.iter().map(|&x| x as f64).sum::<f64>() / len as f64;
        let variance = samples
            .iter()
            .map(|&x| {
                let diff = x as f64 - mean_ns;
                diff * diff
            })
            .sum::<f64>()
            / len as f64;

        let raw = keep_raw.then(|| {
            if len > 10_000 {
                samples.iter().step_by(len / 1000).copied().collect()
            } else {
                samples.clone()
            }
        });

        Self {
            min_ns: samples[0],
            max_ns: samples[len - 1],
            mean_ns,
            median_ns: percentile(&samples, 0.50),
            p95_ns: percentile(&samples, 0.95),
            p99_ns: percentile(&samples, 0.99),
            std_dev_ns: variance.sqrt(),
            samples: raw,
        }
    }

    /// Format latency in human-readable form (auto-selects ns/μs/ms).
    pub fn format_latency(ns: u64) -> String {
        if ns < 1_000 {
            format!("{}ns", ns)
        } else if ns < 1_000_000 {
            format!("{:.2}μs", ns as f64 / 1_000.0)
        } else if ns < 1_000_000_000 {
            format!("{:.2}ms", ns as f64 / 1_000_000.0)
        } else {
            format!("{:.2}s", ns as f64 / 1_000_000_000.0)
        }
    }
}

/// Nearest-rank percentile of sorted, non-empty samples.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Sustained event rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputMetrics {
    pub events_per_sec: f64,
    pub total_events: u64,
    pub duration_ns: u64,
}

impl ThroughputMetrics {
    pub fn calculate(events: u64, duration_ns: u64) -> Self {
        let duration_secs = duration_ns as f64 / 1_000_000_000.0;
        let events_per_sec = if duration_secs > 0.0 {
            events as f64 / duration_secs
        } else {
            0.0
        };
        Self {
            events_per_sec,
            total_events: events,
            duration_ns,
        }
    }

    pub fn format_rate(events_per_sec: f64) -> String {
        if events_per_sec < 1_000.0 {
            format!("{:.2} ev/s", events_per_sec)
        } else if events_per_sec < 1_000_000.0 {
            format!("{:.2}K ev/s", events_per_sec / 1_000.0)
        } else {
            format!("{:.2}M ev/s", events_per_sec / 1_000_000.0)
        }
    }
}

/// Host the benchmarks ran on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub kernel_version: Option<String>,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub memory_bytes: u64,
    pub hostname: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let unknown = || "Unknown".to_string();
        Self {
            os: System::long_os_version().unwrap_or_else(unknown),
            kernel_version: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().to_string())
                .unwrap_or_else(unknown),
            cpu_cores: sys.cpus().len(),
            memory_bytes: sys.total_memory(),
            hostname: System::host_name().unwrap_or_else(unknown),
        }
    }
}

/// A single benchmark result with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub category: BenchmarkCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<ThroughputMetrics>,
    pub iterations: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl BenchmarkResult {
    pub fn latency(
        name: impl Into<String>,
        category: BenchmarkCategory,
        samples: Vec<u64>,
        keep_raw_samples: bool,
    ) -> Self {
        let iterations = samples.len() as u64;
        Self {
            name: name.into(),
            category,
            latency: Some(LatencyMetrics::from_samples(samples, keep_raw_samples)),
            throughput: None,
            iterations,
            metadata: HashMap::new(),
        }
    }

    pub fn throughput(
        name: impl Into<String>,
        category: BenchmarkCategory,
        events: u64,
        duration_ns: u64,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            latency: None,
            throughput: Some(ThroughputMetrics::calculate(events, duration_ns)),
            iterations: events,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata value. Values that fail to serialize are dropped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), value);
        }
        self
    }
}

/// Complete benchmark suite report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub benchmark_suite: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    /// Ring slots in the measured build
    pub ring_capacity: u32,
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkReport {
    pub fn new() -> Self {
        Self {
            benchmark_suite: "gpiocast-benchmarks".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            ring_capacity: gpiocast_core::RING_CAPACITY,
            results: Vec::new(),
        }
    }

    pub fn add_result(&mut self, result: BenchmarkResult) {
        self.results.push(result);
    }

    /// Category shared by every result, if there is exactly one.
    pub fn single_category(&self) -> Option<BenchmarkCategory> {
        let first = self.results.first()?.category;
        self.results
            .iter()
            .all(|r| r.category == first)
            .then_some(first)
    }
}

impl Default for BenchmarkReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_metrics_from_samples() {
        let samples = vec![1000, 900, 800, 700, 600, 500, 400, 300, 200, 100];
        let metrics = LatencyMetrics::from_samples(samples, false);

        assert_eq!(metrics.min_ns, 100);
        assert_eq!(metrics.max_ns, 1000);
        assert_eq!(metrics.median_ns, 600);
        assert_eq!(metrics.p99_ns, 1000);
        assert!((metrics.mean_ns - 550.0).abs() < 0.01);
        assert!(metrics.samples.is_none());
    }

    #[test]
    fn test_latency_metrics_single_sample() {
        let metrics = LatencyMetrics::from_samples(vec![42], true);
        assert_eq!(metrics.p95_ns, 42);
        assert_eq!(metrics.std_dev_ns, 0.0);
        assert_eq!(metrics.samples, Some(vec![42]));
    }

    #[test]
    fn test_latency_format() {
        assert_eq!(LatencyMetrics::format_latency(500), "500ns");
        assert_eq!(LatencyMetrics::format_latency(1500), "1.50μs");
        assert_eq!(LatencyMetrics::format_latency(1_500_000), "1.50ms");
        assert_eq!(LatencyMetrics::format_latency(1_500_000_000), "1.50s");
    }

    #[test]
    fn test_throughput_calculation() {
        let metrics = ThroughputMetrics::calculate(2000, 1_000_000_000);
        assert!((metrics.events_per_sec - 2000.0).abs() < 0.01);
        assert_eq!(ThroughputMetrics::format_rate(metrics.events_per_sec), "2.00K ev/s");
        assert_eq!(ThroughputMetrics::calculate(5, 0).events_per_sec, 0.0);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(BenchmarkCategory::parse("Notify"), Some(BenchmarkCategory::Notify));
        assert_eq!(BenchmarkCategory::parse("store"), Some(BenchmarkCategory::EventStore));
        assert_eq!(BenchmarkCategory::parse("cold_start"), None);
    }

    #[test]
    fn test_benchmark_result_serialization() {
        let result = BenchmarkResult::latency(
            "append_drain_8",
            BenchmarkCategory::EventStore,
            vec![100, 200, 300],
            false,
        )
        .with_metadata("batch", 8);

        let json = serde_json::to_string_pretty(&result).unwrap();
        assert!(json.contains("append_drain_8"));
        assert!(json.contains("event_store"));
        assert!(json.contains("batch"));
    }

    #[test]
    fn test_single_category() {
        let mut report = BenchmarkReport::new();
        assert_eq!(report.single_category(), None);

        report.add_result(BenchmarkResult::throughput("a", BenchmarkCategory::Notify, 1, 1));
        assert_eq!(report.single_category(), Some(BenchmarkCategory::Notify));

        report.add_result(BenchmarkResult::throughput("b", BenchmarkCategory::EventStore, 1, 1));
        assert_eq!(report.single_category(), None);
    }
}
