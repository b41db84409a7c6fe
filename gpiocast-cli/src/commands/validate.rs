// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `gpiocast validate` command - Validate configuration file.

use gpiocast_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            let service = &config.service;
            let client = &config.client;
            println!("✓ Configuration is valid");
            println!();
            println!("Endpoint:");
            println!("  Shared Memory:      /{}", service.endpoint.shm_name);
            println!("  Control Socket:     {}", service.endpoint.control_socket);
            println!();
            println!("Service Settings:");
            println!("  GPIO:               {}", service.gpio_number);
            println!(
                "  Sampling:           {}",
                if service.external_events {
                    "external".to_string()
                } else {
                    format!("every {}ms", service.poll_interval_ms)
                }
            );
            println!("  Active Low:         {}", service.active_low);
            println!("  Heartbeat:          {}ms", service.heartbeat_interval_ms);
            println!("  Max Clients:        {}", service.max_clients);
            println!("  Notify Failures:    {}", service.notify_fail_threshold);
            println!("  Sysfs Root:         {}", service.sysfs_root.display());
            println!();
            println!("Client Settings:");
            println!("  Notify Directory:   {}", client.notify_dir.display());
            println!("  Reconnect Delay:    {}ms", client.reconnect_delay_ms);
            println!("  Heartbeat Grace:    {} intervals", client.heartbeat_grace);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
