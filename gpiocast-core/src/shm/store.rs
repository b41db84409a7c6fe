// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The shared event store: writer (service) and read-only view (clients).
//!
//! No lock guards the ring. The service is the only writer; it fills a slot,
//! then publishes the new `write_index` with release ordering, so a reader
//! that acquires `write_index` sees every slot below it fully written unless
//! the writer has since lapped it (which the slot stamp and sequence reveal).

use std::sync::atomic::Ordering;

use crate::error::SharedMemoryError;
use crate::event::{timestamp_us, EventDraft, EventKind, GpioEvent, Level};
use crate::shm::layout::{
    EventStoreLayout, SlotCopy, LEVEL_UNKNOWN, STORE_MAGIC, STORE_SIZE, STORE_VERSION,
};
use crate::shm::region::SharedMemoryRegion;
use crate::protocol::DEFAULT_HEARTBEAT_GRACE;
use crate::stats::StoreSnapshot;
use crate::types::Sequence;

/// How many times a busy slot is re-copied before giving up until the next
/// wake-up.
const TORN_READ_RETRIES: u32 = 16;

/// Outcome of reading one sequence from the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRead {
    Ready(GpioEvent),
    /// The writer kept the slot busy; try again on the next notification.
    Torn,
    /// The slot already holds a later event; the requested one is gone.
    Overwritten { found: Sequence },
    /// Nothing usable in the slot (never written, or older than requested).
    Missing,
}

/// Read access shared by the writer and read-only views.
pub trait StoreReader {
    fn layout(&self) -> &EventStoreLayout;

    /// Next sequence the service will write (acquire).
    fn write_index(&self) -> Sequence {
        self.layout().load_write_index()
    }

    /// Read the event with the given sequence from the ring.
    fn read(&self, sequence: Sequence) -> SlotRead {
        let slot = self.layout().slot(sequence);
        for _ in 0..TORN_READ_RETRIES {
            match slot.try_read() {
                SlotCopy::Ready(event) if event.sequence == sequence => {
                    return SlotRead::Ready(event)
                }
                SlotCopy::Ready(event) if event.sequence.is_after(sequence) => {
                    return SlotRead::Overwritten {
                        found: event.sequence,
                    }
                }
                SlotCopy::Ready(_) | SlotCopy::Empty => return SlotRead::Missing,
                SlotCopy::Busy => std::hint::spin_loop(),
            }
        }
        SlotRead::Torn
    }

    /// Most recently published event, if any.
    fn latest_event(&self) -> Option<GpioEvent> {
        for _ in 0..TORN_READ_RETRIES {
            match self.layout().latest_event.try_read() {
                SlotCopy::Ready(event) => return Some(event),
                SlotCopy::Empty => return None,
                SlotCopy::Busy => std::hint::spin_loop(),
            }
        }
        None
    }

    fn is_service_running(&self) -> bool {
        self.layout().service_running.load(Ordering::Acquire) != 0
    }

    fn service_start_time_us(&self) -> u64 {
        self.layout().service_start_time.load(Ordering::Acquire)
    }

    fn last_heartbeat_us(&self) -> u64 {
        self.layout().last_heartbeat_time.load(Ordering::Acquire)
    }

    fn heartbeat_interval_ms(&self) -> u32 {
        self.layout().heartbeat_interval_ms.load(Ordering::Relaxed)
    }

    fn client_count(&self) -> u32 {
        self.layout().client_count.load(Ordering::Acquire)
    }

    /// Running, with a heartbeat no older than `grace` intervals.
    fn is_live(&self, grace: u32) -> bool {
        if !self.is_service_running() {
            return false;
        }
        let window_us = grace as u64 * self.heartbeat_interval_ms() as u64 * 1000;
        timestamp_us().saturating_sub(self.last_heartbeat_us()) <= window_us
    }

    /// Point-in-time copy of the scalar fields.
    fn snapshot(&self) -> StoreSnapshot {
        let l = self.layout();
        let level = l.current_state.load(Ordering::Relaxed);
        StoreSnapshot {
            service_running: self.is_service_running(),
            gpio_number: l.gpio_number.load(Ordering::Relaxed),
            current_level: match level {
                0 => Some(Level::Low),
                1 => Some(Level::High),
                _ => None,
            },
            is_pressed: l.is_pressed.load(Ordering::Relaxed) != 0,
            client_count: self.client_count(),
            write_index: self.write_index().value(),
            total_press_count: l.total_press_count.load(Ordering::Relaxed),
            total_release_count: l.total_release_count.load(Ordering::Relaxed),
            total_error_count: l.total_error_count.load(Ordering::Relaxed),
            service_start_time_us: self.service_start_time_us(),
            last_event_time_us: l.last_event_time.load(Ordering::Relaxed),
            last_heartbeat_time_us: self.last_heartbeat_us(),
            heartbeat_interval_ms: self.heartbeat_interval_ms(),
            latest_event: self.latest_event(),
        }
    }
}

fn layout_of(region: &SharedMemoryRegion) -> &EventStoreLayout {
    // SAFETY: the region is page aligned, at least STORE_SIZE bytes (checked
    // when mapping), and all-atomic so any byte pattern is a valid value.
    unsafe { &*(region.as_ptr() as *const EventStoreLayout) }
}

/// Writer side of the store. Owned by the broadcast service.
///
/// Mutating methods take `&self` because the fields are atomics, but only one
/// thread may append at a time; the service serializes appends.
pub struct EventStore {
    region: SharedMemoryRegion,
}

impl EventStore {
    /// Create and initialize the store segment.
    pub fn create(
        name: &str,
        gpio_number: i32,
        heartbeat_interval_ms: u32,
        start_time_us: u64,
    ) -> Result<Self, SharedMemoryError> {
        // A segment left by a crashed or stopped service is reclaimed below
        if let Ok(existing) = EventStoreView::open(name) {
            if existing.is_live(DEFAULT_HEARTBEAT_GRACE) {
                return Err(SharedMemoryError::AlreadyRunning {
                    name: name.to_string(),
                    start_time_us: existing.service_start_time_us(),
                });
            }
        }

        let region = SharedMemoryRegion::create(name, STORE_SIZE)?;
        let store = Self { region };

        let l = store.layout();
        l.version.store(STORE_VERSION, Ordering::Relaxed);
        l.gpio_number.store(gpio_number, Ordering::Relaxed);
        l.current_state.store(LEVEL_UNKNOWN, Ordering::Relaxed);
        l.heartbeat_interval_ms
            .store(heartbeat_interval_ms, Ordering::Relaxed);
        l.service_start_time.store(start_time_us, Ordering::Relaxed);
        l.last_heartbeat_time.store(start_time_us, Ordering::Relaxed);
        // Magic last: openers only trust the rest once they see it
        l.magic.store(STORE_MAGIC, Ordering::Release);

        tracing::debug!(name = %name, gpio = gpio_number, "Initialized event store");
        Ok(store)
    }

    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Append an event and return it with its assigned sequence.
    pub fn append(&self, draft: EventDraft) -> GpioEvent {
        let l = self.layout();
        let sequence = Sequence::new(l.write_index.load(Ordering::Relaxed));
        let event = draft.into_event(sequence);

        l.slot(sequence).write(&event);
        l.latest_event.write(&event);

        let counter = match event.kind {
            EventKind::Press => &l.total_press_count,
            EventKind::Release => &l.total_release_count,
            EventKind::Error => &l.total_error_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        l.last_event_time
            .store(event.timestamp_us, Ordering::Relaxed);

        let next = sequence.advance(1).value();
        l.write_index.store(next, Ordering::Release);
        l.broadcast_sequence.store(next, Ordering::Release);

        event
    }

    pub fn set_running(&self, running: bool) {
        self.layout()
            .service_running
            .store(running as u32, Ordering::Release);
    }

    pub fn set_level(&self, level: Level) {
        self.layout()
            .current_state
            .store(level.as_raw(), Ordering::Relaxed);
    }

    pub fn set_pressed(&self, pressed: bool) {
        self.layout()
            .is_pressed
            .store(pressed as u32, Ordering::Relaxed);
    }

    pub fn touch_heartbeat(&self, now_us: u64) {
        self.layout()
            .last_heartbeat_time
            .store(now_us, Ordering::Release);
    }

    pub fn set_client_count(&self, count: u32) {
        self.layout()
            .client_count
            .store(count, Ordering::Release);
    }

    /// Start the sequence counter somewhere other than zero.
    #[cfg(test)]
    pub(crate) fn seed_sequence(&self, start: Sequence) {
        let l = self.layout();
        l.write_index.store(start.value(), Ordering::Release);
        l.broadcast_sequence
            .store(start.value(), Ordering::Release);
    }
}

impl StoreReader for EventStore {
    fn layout(&self) -> &EventStoreLayout {
        layout_of(&self.region)
    }
}

/// Read-only mapping of a store created by some service process.
pub struct EventStoreView {
    region: SharedMemoryRegion,
}

impl EventStoreView {
    /// Map the named store read-only and validate its header.
    pub fn open(name: &str) -> Result<Self, SharedMemoryError> {
        let region = SharedMemoryRegion::open_read_only(name, STORE_SIZE)?;
        let view = Self { region };

        let l = view.layout();
        let magic = l.magic.load(Ordering::Acquire);
        if magic != STORE_MAGIC {
            return Err(SharedMemoryError::BadMagic {
                name: name.to_string(),
                found: magic,
            });
        }
        let version = l.version.load(Ordering::Relaxed);
        if version != STORE_VERSION {
            return Err(SharedMemoryError::VersionMismatch {
                name: name.to_string(),
                found: version,
                expected: STORE_VERSION,
            });
        }

        Ok(view)
    }

    pub fn name(&self) -> &str {
        self.region.name()
    }
}

impl StoreReader for EventStoreView {
    fn layout(&self) -> &EventStoreLayout {
        layout_of(&self.region)
    }
}
