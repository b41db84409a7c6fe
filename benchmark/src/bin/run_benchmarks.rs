// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to run the benchmarks and write a JSON latency report.

use anyhow::Context;
use clap::Parser;
use gpiocast_benchmark::{
    BenchmarkCategory, BenchmarkHarness, BenchmarkReport, BenchmarkResult, JsonReporter,
    LatencyMetrics, NotifyRig, StoreRig, ThroughputMetrics,
};
use gpiocast_core::RING_CAPACITY;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Run gpiocast benchmarks and generate JSON reports")]
struct Args {
    /// Output directory for benchmark data
    #[arg(short, long, default_value = "data")]
    output: PathBuf,

    /// Number of iterations for each benchmark
    #[arg(short, long, default_value_t = 1000)]
    iterations: u64,

    /// Categories to run: event_store, notify (all if not specified)
    #[arg(short, long)]
    category: Option<Vec<String>>,

    /// Run in quick mode (fewer iterations)
    #[arg(long)]
    quick: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let iterations = if args.quick { 50 } else { args.iterations };

    let selected = match &args.category {
        None => vec![BenchmarkCategory::EventStore, BenchmarkCategory::Notify],
        Some(names) => names
            .iter()
            .map(|name| {
                BenchmarkCategory::parse(name)
                    .with_context(|| format!("Unknown benchmark category: {}", name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?,
    };

    println!("gpiocast Benchmark Suite");
    println!("========================");
    println!("Output directory: {:?}", args.output);
    println!("Iterations: {}", iterations);
    println!();

    let reporter = JsonReporter::new(&args.output)
        .with_context(|| format!("Cannot use output directory {:?}", args.output))?;
    let mut report = BenchmarkReport::new();

    if selected.contains(&BenchmarkCategory::EventStore) {
        println!("Running event store benchmarks...");
        run_event_store_benchmarks(&mut report, iterations, args.quick)?;
    }
    if selected.contains(&BenchmarkCategory::Notify) {
        println!("Running notify benchmarks...");
        run_notify_benchmarks(&mut report, iterations)?;
    }

    let path = reporter.save(&report).context("Failed to save report")?;
    println!();
    println!("Benchmark report saved to: {:?}", path);
    println!();

    print_summary(&report);
    Ok(())
}

fn run_event_store_benchmarks(
    report: &mut BenchmarkReport,
    iterations: u64,
    quick: bool,
) -> anyhow::Result<()> {
    let harness = BenchmarkHarness::new()
        .warmup(iterations / 10)
        .iterations(iterations);

    let mut rig = StoreRig::new("runner-append").context("Failed to create event store")?;
    let samples = harness.run(|| {
        rig.append();
    });
    report.add_result(BenchmarkResult::latency(
        "append",
        BenchmarkCategory::EventStore,
        samples,
        harness.should_keep_samples(),
    ));
    println!("  ✓ append");

    for batch in [1, 8, RING_CAPACITY] {
        let mut rig = StoreRig::new(&format!("runner-drain-{}", batch))
            .context("Failed to create event store")?;
        let samples = harness.run(|| {
            rig.append_batch(batch);
            rig.drain();
        });
        report.add_result(
            BenchmarkResult::latency(
                format!("append_drain_{}", batch),
                BenchmarkCategory::EventStore,
                samples,
                harness.should_keep_samples(),
            )
            .with_metadata("batch", batch),
        );
        println!("  ✓ append_drain_{}", batch);
    }

    let duration = if quick {
        Duration::from_millis(200)
    } else {
        Duration::from_secs(2)
    };
    let mut rig = StoreRig::new("runner-rate").context("Failed to create event store")?;
    let (events, duration_ns) = harness.run_for(duration, || {
        rig.append();
    });
    report.add_result(BenchmarkResult::throughput(
        "append_rate",
        BenchmarkCategory::EventStore,
        events,
        duration_ns,
    ));
    println!("  ✓ append_rate");

    Ok(())
}

fn run_notify_benchmarks(report: &mut BenchmarkReport, iterations: u64) -> anyhow::Result<()> {
    let harness = BenchmarkHarness::new()
        .warmup(10)
        .iterations(iterations.min(500));

    for clients in [1usize, 4, 16] {
        let mut rig = NotifyRig::new(&format!("runner-{}", clients), clients)
            .with_context(|| format!("Failed to start service with {} clients", clients))?;

        let mut lost = 0u64;
        let samples = harness.run_measured(|| match rig.publish_and_wait() {
            Ok(latency) => Some(latency),
            Err(_) => {
                lost += 1;
                None
            }
        });

        report.add_result(
            BenchmarkResult::latency(
                format!("publish_to_callback_{}", clients),
                BenchmarkCategory::Notify,
                samples,
                harness.should_keep_samples(),
            )
            .with_metadata("clients", clients)
            .with_metadata("timeouts", lost),
        );
        println!("  ✓ publish_to_callback_{}", clients);
    }

    Ok(())
}

fn print_summary(report: &BenchmarkReport) {
    println!("Summary");
    println!("-------");
    println!();

    for result in &report.results {
        if let Some(latency) = &result.latency {
            println!(
                "{}: median={}, p99={}",
                result.name,
                LatencyMetrics::format_latency(latency.median_ns),
                LatencyMetrics::format_latency(latency.p99_ns)
            );
        }
        if let Some(throughput) = &result.throughput {
            println!(
                "{}: {}",
                result.name,
                ThroughputMetrics::format_rate(throughput.events_per_sec)
            );
        }
    }
}
