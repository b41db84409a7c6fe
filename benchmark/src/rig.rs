// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fixtures shared by the criterion benches and the runner binary.

use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use gpiocast_core::error::{HardValidationError, SharedMemoryError};
use gpiocast_core::event::{timestamp_us, EventDraft};
use gpiocast_core::shm::{plan_catch_up, SlotRead};
use gpiocast_core::{
    BroadcastService, ClientConfig, ClientNotice, EndpointConfig, EventKind, EventStore,
    EventStoreView, GpioCastError, GpioEvent, Level, ManualSampler, Sequence, ServiceConfig,
    SocketPath, StoreReader, SubscriberClient, RING_CAPACITY,
};
use tempfile::TempDir;
use thiserror::Error;

/// Line number stamped on benchmark events.
pub const BENCH_GPIO: i32 = 75;

/// Longest wait for a single callback before the sample counts as lost.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum RigError {
    #[error(transparent)]
    Core(#[from] GpioCastError),

    #[error(transparent)]
    Store(#[from] SharedMemoryError),

    #[error(transparent)]
    Validation(#[from] HardValidationError),

    #[error("Fixture I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("No callback within {0:?}")]
    Timeout(Duration),
}

fn kind_for(n: u64) -> EventKind {
    if n % 2 == 0 {
        EventKind::Press
    } else {
        EventKind::Release
    }
}

/// A bare event store plus a reader mapping, no service threads.
pub struct StoreRig {
    store: EventStore,
    view: EventStoreView,
    cursor: Sequence,
    appended: u64,
}

impl StoreRig {
    pub fn new(tag: &str) -> Result<Self, RigError> {
        let name = format!("gpiocast-bench-store-{}-{}", tag, std::process::id());
        let store = EventStore::create(&name, BENCH_GPIO, 1000, timestamp_us())?;
        let view = EventStoreView::open(&name)?;
        Ok(Self {
            store,
            view,
            cursor: Sequence::default(),
            appended: 0,
        })
    }

    pub fn append(&mut self) -> GpioEvent {
        let draft = EventDraft::new(kind_for(self.appended), BENCH_GPIO, timestamp_us());
        self.appended += 1;
        self.store.append(draft)
    }

    pub fn append_batch(&mut self, count: u32) {
        for _ in 0..count {
            self.append();
        }
    }

    /// Read every event between the cursor and the writer, skipping
    /// whatever the ring no longer holds. Returns the number read.
    pub fn drain(&mut self) -> u32 {
        let plan = plan_catch_up(self.cursor, self.view.write_index(), RING_CAPACITY);
        let end = plan.end();
        let mut next = plan.start;
        let mut read = 0;
        while next != end {
            match self.view.read(next) {
                SlotRead::Ready(_) => {
                    read += 1;
                    next = next.advance(1);
                }
                _ => break,
            }
        }
        self.cursor = next;
        read
    }

    pub fn latest(&self) -> Option<GpioEvent> {
        self.view.latest_event()
    }
}

/// A running service with subscribed clients in this process.
pub struct NotifyRig {
    // Clients go first so they unregister while the service still listens
    clients: Vec<SubscriberClient>,
    service: BroadcastService,
    delivered: Receiver<Instant>,
    published: u64,
    _dir: TempDir,
}

impl NotifyRig {
    pub fn new(tag: &str, client_count: usize) -> Result<Self, RigError> {
        let dir = TempDir::new()?;
        let control = SocketPath::from_path(&dir.path().join("control.sock"))?;
        let endpoint = EndpointConfig::new(
            format!("gpiocast-bench-notify-{}-{}", tag, std::process::id()),
            control,
        )?;

        let config = ServiceConfig::new(BENCH_GPIO, 50, true)
            .with_endpoint(endpoint.clone())
            .with_max_clients(client_count.max(1));
        let mut service =
            BroadcastService::init_with_sampler(config, Box::new(ManualSampler::new(Level::High)))?;
        service.start()?;

        let (tx, delivered) = mpsc::channel();
        let mut clients = Vec::with_capacity(client_count);
        for _ in 0..client_count {
            let mut client = SubscriberClient::create(
                ClientConfig::new(endpoint.clone()).with_notify_dir(dir.path()),
            )?;
            client.connect()?;
            let tx = tx.clone();
            client.subscribe(move |notice| {
                if let ClientNotice::Event(_) = notice {
                    let _ = tx.send(Instant::now());
                }
            })?;
            clients.push(client);
        }

        Ok(Self {
            clients,
            service,
            delivered,
            published: 0,
            _dir: dir,
        })
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Publish one event and wait until every client's callback ran.
    /// Returns the time from publish to the last callback.
    pub fn publish_and_wait(&mut self) -> Result<Duration, RigError> {
        let kind = kind_for(self.published);
        self.published += 1;

        let start = Instant::now();
        self.service.publish_event(kind, BENCH_GPIO);

        let mut last = start;
        for _ in 0..self.clients.len() {
            let at = self
                .delivered
                .recv_timeout(DELIVERY_TIMEOUT)
                .map_err(|_| RigError::Timeout(DELIVERY_TIMEOUT))?;
            last = last.max(at);
        }
        Ok(last.duration_since(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_rig_drains_in_window() {
        let mut rig = StoreRig::new("unit-window").unwrap();
        rig.append_batch(5);
        assert_eq!(rig.drain(), 5);
        assert_eq!(rig.drain(), 0);
        assert_eq!(rig.latest().map(|e| e.sequence), Some(Sequence::new(4)));
    }

    #[test]
    fn test_store_rig_drain_skips_lapped_events() {
        let mut rig = StoreRig::new("unit-lapped").unwrap();
        rig.append_batch(RING_CAPACITY + 8);
        assert_eq!(rig.drain(), RING_CAPACITY);
    }

    #[test]
    fn test_notify_rig_round_trip() {
        let mut rig = NotifyRig::new("unit", 2).unwrap();
        assert_eq!(rig.client_count(), 2);
        for _ in 0..5 {
            let latency = rig.publish_and_wait().unwrap();
            assert!(latency < DELIVERY_TIMEOUT);
        }
    }
}
