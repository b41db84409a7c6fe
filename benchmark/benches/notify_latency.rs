// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Publish to callback latency.
//!
//! Each iteration publishes one event and waits until every subscribed
//! client's callback has run. Covers the datagram fan-out, the listener
//! wake-up and the ring drain.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gpiocast_benchmark::NotifyRig;
use std::time::Duration;

const CLIENT_COUNTS: &[usize] = &[1, 4, 16];

fn bench_publish_to_callback(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify_publish_to_callback");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(5));

    for &clients in CLIENT_COUNTS {
        group.bench_with_input(
            BenchmarkId::from_parameter(clients),
            &clients,
            |b, &clients| {
                let mut rig = NotifyRig::new(&format!("callback-{}", clients), clients)
                    .expect("Failed to start notify rig");

                b.iter_custom(|iters| {
                    let mut total = Duration::ZERO;
                    for _ in 0..iters {
                        total += rig.publish_and_wait().expect("Callback never ran");
                    }
                    total
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_publish_to_callback);
criterion_main!(benches);
