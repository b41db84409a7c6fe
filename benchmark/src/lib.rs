// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! gpiocast Benchmarking Framework
//!
//! Measures the two costs that bound end-to-end event latency.
//!
//! # Benchmark Categories
//!
//! - **Event Store**: append into the shared ring and catch-up drains of
//!   various batch sizes
//! - **Notify**: publish on the service to callback on a subscribed client,
//!   through the notify socket and listener thread
//!
//! # Data Output
//!
//! The runner binary writes JSON reports with standardized metrics.

pub mod harness;
pub mod metrics;
pub mod reporter;
pub mod rig;

pub use harness::BenchmarkHarness;
pub use metrics::{
    BenchmarkCategory, BenchmarkReport, BenchmarkResult, LatencyMetrics, SystemInfo,
    ThroughputMetrics,
};
pub use reporter::JsonReporter;
pub use rig::{NotifyRig, RigError, StoreRig};
