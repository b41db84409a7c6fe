// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Broadcast service: owns the event store and fans events out to clients.
//!
//! ```text
//! ┌───────────┐  append   ┌─────────────┐  mmap(RO)  ┌──────────┐
//! │  monitor  │──────────▶│ event store │◀───────────│ client N │
//! │  thread   │           └─────────────┘            └──────────┘
//! └─────┬─────┘                                            ▲
//!       │ notify (datagram, non-blocking)                  │
//!       └──────────────────────────────────────────────────┘
//! control thread: REGISTER / UNREGISTER on the control socket
//! heartbeat thread: last_heartbeat_time every interval
//! ```

mod control;
mod heartbeat;
mod monitor;
mod notifier;
mod signal;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub use monitor::PressTracker;
pub use notifier::{Delivery, FanOut, Notifier};
pub use signal::StopSignal;

use crate::config::ServiceConfig;
use crate::error::{GpioCastError, GpioCastResult, StateTransitionError};
use crate::event::{elapsed_ms, timestamp_us, EventDraft, EventKind, GpioEvent};
use crate::protocol::NotifyMessage;
use crate::registry::{ClientRegistration, ClientRegistry};
use crate::sampler::{GpioSampler, SysfsSampler};
use crate::shm::{EventStore, StoreReader};
use crate::state::ServiceState;
use crate::stats::ServiceStats;

/// State shared between the service handle and its threads.
pub(crate) struct ServiceInner {
    pub(crate) config: ServiceConfig,
    pub(crate) store: EventStore,
    pub(crate) registry: ClientRegistry,
    notifier: Notifier,
    pub(crate) stop: StopSignal,
    /// Serializes the writer role; maps gpio to the timestamp of its
    /// outstanding press.
    press_started: Mutex<HashMap<i32, u64>>,
}

impl ServiceInner {
    fn publish(&self, draft: EventDraft) -> GpioEvent {
        let event = {
            let mut press_started = self
                .press_started
                .lock()
                .unwrap_or_else(|e| e.into_inner());

            let draft = match draft.kind {
                EventKind::Press => {
                    press_started.insert(draft.gpio_number, draft.timestamp_us);
                    draft
                }
                EventKind::Release => {
                    let held = press_started
                        .remove(&draft.gpio_number)
                        .map(|start| elapsed_ms(start, draft.timestamp_us))
                        .unwrap_or(0);
                    draft.with_press_duration(held)
                }
                EventKind::Error => draft,
            };

            let event = self.store.append(draft);
            match event.kind {
                EventKind::Press => self.store.set_pressed(true),
                EventKind::Release => self.store.set_pressed(false),
                EventKind::Error => {}
            }
            event
        };

        tracing::debug!(event = %event, "Published event");

        let totals = self.notifier.broadcast(&self.registry, event.sequence);
        if totals.evicted > 0 {
            self.sync_client_count();
        }
        event
    }

    pub(crate) fn publish_event(&self, kind: EventKind, gpio_number: i32) -> GpioEvent {
        self.publish(EventDraft::new(kind, gpio_number, timestamp_us()))
    }

    pub(crate) fn publish_error(&self, gpio_number: i32, error_code: i32) -> GpioEvent {
        self.publish(
            EventDraft::new(EventKind::Error, gpio_number, timestamp_us())
                .with_error_code(error_code),
        )
    }

    /// Mirror the active registration count into shared memory.
    pub(crate) fn sync_client_count(&self) {
        let count = self.registry.active_count();
        self.store.set_client_count(count as u32);
    }
}

/// The broadcast service. One per GPIO line and endpoint.
///
/// Several services may coexist in one process as long as their shared
/// memory names and control sockets differ.
pub struct BroadcastService {
    inner: Arc<ServiceInner>,
    state: ServiceState,
    sampler: Option<Box<dyn GpioSampler>>,
    threads: Vec<JoinHandle<()>>,
    socket_bound: bool,
}

impl BroadcastService {
    /// Create the event store with the sysfs sampler. Does not start threads.
    pub fn init(config: ServiceConfig) -> GpioCastResult<Self> {
        let sampler = SysfsSampler::new(config.sysfs_root.clone());
        Self::init_with_sampler(config, Box::new(sampler))
    }

    /// Create the event store with a caller-supplied sampler.
    pub fn init_with_sampler(
        config: ServiceConfig,
        sampler: Box<dyn GpioSampler>,
    ) -> GpioCastResult<Self> {
        config.validate()?;

        let store = EventStore::create(
            &config.endpoint.shm_name,
            config.gpio_number,
            config.heartbeat_interval_ms,
            timestamp_us(),
        )?;
        let registry = ClientRegistry::new(config.max_clients, config.notify_fail_threshold);
        let notifier = Notifier::new().map_err(|e| GpioCastError::Io {
            context: "creating notify socket",
            source: e,
        })?;

        tracing::info!(
            gpio = config.gpio_number,
            shm = %config.endpoint.shm_name,
            max_clients = config.max_clients,
            "Broadcast service initialized"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                store,
                registry,
                notifier,
                stop: StopSignal::new(),
                press_started: Mutex::new(HashMap::new()),
            }),
            state: ServiceState::Initialized,
            sampler: Some(sampler),
            threads: Vec::new(),
            socket_bound: false,
        })
    }

    /// Bind the control socket and launch the monitor, heartbeat and control
    /// threads. Returns once they are running.
    pub fn start(&mut self) -> GpioCastResult<()> {
        if !self.state.can_transition_to(ServiceState::Running) {
            return Err(StateTransitionError::InvalidTransition {
                component: "service",
                from: self.state.name(),
                to: ServiceState::Running.name(),
            }
            .into());
        }

        let listener = control::bind(&self.inner.config.endpoint.control_socket)?;
        self.socket_bound = true;

        self.inner.store.touch_heartbeat(timestamp_us());
        self.inner.store.set_running(true);

        if let Err(e) = self.spawn_threads(listener) {
            tracing::error!(error = %e, "Service start failed, tearing down");
            self.shutdown();
            self.state = ServiceState::Stopped;
            return Err(e);
        }

        self.state = ServiceState::Running;
        tracing::info!(
            gpio = self.inner.config.gpio_number,
            socket = %self.inner.config.endpoint.control_socket,
            "Broadcast service started"
        );
        Ok(())
    }

    fn spawn_threads(&mut self, listener: std::os::unix::net::UnixListener) -> GpioCastResult<()> {
        let gpio = self.inner.config.gpio_number;
        let sampler = self
            .sampler
            .take()
            .ok_or(StateTransitionError::AlreadyInState {
                component: "service",
                state: ServiceState::Running.name(),
            })?;

        let inner = Arc::clone(&self.inner);
        self.spawn(format!("gpio-monitor-{}", gpio), "monitor", move || {
            monitor::run(inner, sampler)
        })?;

        let inner = Arc::clone(&self.inner);
        self.spawn(format!("gpio-heartbeat-{}", gpio), "heartbeat", move || {
            heartbeat::run(inner)
        })?;

        let inner = Arc::clone(&self.inner);
        self.spawn(format!("gpio-control-{}", gpio), "control", move || {
            control::run(inner, listener)
        })?;

        Ok(())
    }

    fn spawn<F>(&mut self, thread_name: String, name: &'static str, f: F) -> GpioCastResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(f)
            .map_err(|source| GpioCastError::ThreadSpawn { name, source })?;
        self.threads.push(handle);
        Ok(())
    }

    /// Stop threads, mark the store not running, wake and forget all clients.
    /// Idempotent.
    pub fn stop(&mut self) {
        if self.state == ServiceState::Stopped {
            return;
        }
        self.shutdown();
        self.state = ServiceState::Stopped;
        tracing::info!(gpio = self.inner.config.gpio_number, "Broadcast service stopped");
    }

    fn shutdown(&mut self) {
        self.inner.stop.stop();
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("service").to_string();
            if handle.join().is_err() {
                tracing::error!(thread = %name, "Service thread panicked");
            }
        }

        let store = &self.inner.store;
        store.set_running(false);

        // Wake everyone so listeners notice the shutdown without waiting for
        // their receive timeout
        let wake = NotifyMessage::Notify(store.write_index());
        for target in self.inner.registry.active_targets() {
            let _ = self.inner.notifier.send(&target, wake);
        }
        self.inner.registry.clear();
        store.set_client_count(0);

        if self.socket_bound {
            let path = self.inner.config.endpoint.control_socket.as_path();
            if let Err(e) = std::fs::remove_file(path) {
                tracing::debug!(error = %e, "Control socket already removed");
            }
            self.socket_bound = false;
        }
    }

    /// Stop if needed and release the event store.
    pub fn cleanup(mut self) {
        self.stop();
    }

    /// Append an event stamped with the current time and notify subscribers.
    pub fn publish_event(&self, kind: EventKind, gpio_number: i32) -> GpioEvent {
        self.inner.publish_event(kind, gpio_number)
    }

    /// Append an event with a caller-supplied timestamp (microseconds since
    /// the Unix epoch), e.g. from an interrupt handler.
    pub fn publish_event_at(&self, kind: EventKind, gpio_number: i32, timestamp_us: u64) -> GpioEvent {
        self.inner
            .publish(EventDraft::new(kind, gpio_number, timestamp_us))
    }

    /// Append an Error event carrying `error_code`.
    pub fn publish_error(&self, gpio_number: i32, error_code: i32) -> GpioEvent {
        self.inner.publish_error(gpio_number, error_code)
    }

    pub fn get_stats(&self) -> ServiceStats {
        ServiceStats::from(&self.inner.store.snapshot())
    }

    pub fn client_count(&self) -> usize {
        self.inner.registry.active_count()
    }

    /// Copies of the current registrations.
    pub fn registrations(&self) -> Vec<ClientRegistration> {
        self.inner.registry.registrations()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Read access to the event store.
    pub fn store(&self) -> &impl StoreReader {
        &self.inner.store
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running
    }
}

impl Drop for BroadcastService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BroadcastService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastService")
            .field("gpio_number", &self.inner.config.gpio_number)
            .field("state", &self.state)
            .field("threads", &self.threads.len())
            .finish()
    }
}
