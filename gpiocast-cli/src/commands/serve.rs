// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `gpiocast serve` command - Run the broadcast service.
//!
//! Creates the event store, binds the control socket and monitors the GPIO
//! line until Ctrl+C.

use std::time::Duration;

use gpiocast_core::BroadcastService;

use super::load_config;

/// How often running totals are logged.
const STATS_INTERVAL: Duration = Duration::from_secs(30);

pub async fn execute(
    config_path: Option<&str>,
    gpio: Option<i32>,
    external: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?.service;
    if let Some(gpio) = gpio {
        config.gpio_number = gpio;
    }
    if external {
        config.external_events = true;
    }
    config.validate()?;

    tracing::info!(
        gpio = config.gpio_number,
        shm = %config.endpoint.shm_name,
        control = %config.endpoint.control_socket,
        external = config.external_events,
        "Starting broadcast service"
    );

    let mut service = BroadcastService::init(config)?;
    service.start()?;

    let config = service.config();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  GPIOCAST BROADCAST SERVICE                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  GPIO:           {}", config.gpio_number);
    println!("  Shared Memory:  /{}", config.endpoint.shm_name);
    println!("  Control Socket: {}", config.endpoint.control_socket);
    println!("  Max Clients:    {}", config.max_clients);
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(STATS_INTERVAL);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = ticker.tick() => {
                let stats = service.get_stats();
                tracing::info!(
                    presses = stats.total_press_count,
                    releases = stats.total_release_count,
                    errors = stats.total_error_count,
                    clients = stats.client_count,
                    write_index = stats.write_index,
                    "Service stats"
                );
            }
        }
    }

    println!();
    println!("Shutting down...");
    let stats = service.get_stats();
    service.cleanup();

    println!(
        "Service stopped after {} events.",
        stats.total_press_count + stats.total_release_count + stats.total_error_count
    );
    Ok(())
}
