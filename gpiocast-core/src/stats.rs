// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use serde::{Deserialize, Serialize};

use crate::event::{GpioEvent, Level};

/// Point-in-time copy of the shared event store, readable by any process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub service_running: bool,
    pub gpio_number: i32,
    /// `None` until the monitor has sampled the line once.
    pub current_level: Option<Level>,
    pub is_pressed: bool,
    pub client_count: u32,
    pub write_index: u32,
    pub total_press_count: u64,
    pub total_release_count: u64,
    pub total_error_count: u64,
    pub service_start_time_us: u64,
    pub last_event_time_us: u64,
    pub last_heartbeat_time_us: u64,
    pub heartbeat_interval_ms: u32,
    pub latest_event: Option<GpioEvent>,
}

impl StoreSnapshot {
    pub fn total_events(&self) -> u64 {
        self.total_press_count + self.total_release_count + self.total_error_count
    }
}

/// Counters reported by a running broadcast service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub total_press_count: u64,
    pub total_release_count: u64,
    pub total_error_count: u64,
    pub client_count: u32,
    /// Events published so far (mod 2^32).
    pub broadcast_count: u32,
    pub write_index: u32,
}

impl From<&StoreSnapshot> for ServiceStats {
    fn from(s: &StoreSnapshot) -> Self {
        Self {
            total_press_count: s.total_press_count,
            total_release_count: s.total_release_count,
            total_error_count: s.total_error_count,
            client_count: s.client_count,
            broadcast_count: s.write_index,
            write_index: s.write_index,
        }
    }
}
