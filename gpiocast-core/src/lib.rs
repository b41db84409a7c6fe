// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! gpiocast Core Library
//!
//! Broadcasts GPIO press/release/error events from one owning process to any
//! number of local subscribers. Events travel through a shared-memory ring
//! buffer; Unix-domain sockets carry registration and wake-ups; a heartbeat
//! in shared memory tells clients whether the service is alive.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod sampler;
pub mod service;
pub mod shm;
pub mod state;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use client::{service_alive, ClientNotice, SubscriberClient};
pub use config::{ClientConfig, Config, ConfigLoader, EndpointConfig, ServiceConfig};
pub use error::{GpioCastError, GpioCastResult, HardValidationError};
pub use event::{EventKind, GpioEvent, Level};
pub use registry::{ClientRegistration, ClientRegistry};
pub use sampler::{GpioSampler, ManualSampler, SysfsSampler};
pub use service::BroadcastService;
pub use shm::{EventStore, EventStoreView, StoreReader, RING_CAPACITY};
pub use state::{ClientState, ServiceState};
pub use stats::{ServiceStats, StoreSnapshot};
pub use types::{Sequence, SocketPath};
