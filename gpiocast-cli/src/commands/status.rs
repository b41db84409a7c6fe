// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `gpiocast status` command - Show a read-only snapshot of the event store.

use gpiocast_core::{service_alive, EventStoreView, StoreReader};

use super::load_config;

pub async fn execute(
    config_path: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?.client;

    let view = match EventStoreView::open(&config.endpoint.shm_name) {
        Ok(view) => view,
        Err(e) if e.is_absent_service() => {
            eprintln!("✗ No broadcast service at /{}", config.endpoint.shm_name);
            eprintln!("  {}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot = view.snapshot();
    let alive = service_alive(&view, config.heartbeat_grace);

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let level = match snapshot.current_level {
        Some(level) => format!("{:?}", level),
        None => "unknown".to_string(),
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                       GPIOCAST STATUS                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "  Service:        {}",
        match (snapshot.service_running, alive) {
            (true, true) => "● running",
            (true, false) => "○ stale heartbeat",
            (false, _) => "○ stopped",
        }
    );
    println!("  GPIO:           {}", snapshot.gpio_number);
    println!("  Level:          {}", level);
    println!("  Pressed:        {}", snapshot.is_pressed);
    println!("  Clients:        {}", snapshot.client_count);
    println!("  Write Index:    {}", snapshot.write_index);
    println!(
        "  Events:         {} press / {} release / {} error",
        snapshot.total_press_count, snapshot.total_release_count, snapshot.total_error_count
    );
    println!("  Heartbeat:      every {}ms", snapshot.heartbeat_interval_ms);
    match snapshot.latest_event {
        Some(event) => println!("  Latest Event:   {}", event),
        None => println!("  Latest Event:   none"),
    }

    Ok(())
}
