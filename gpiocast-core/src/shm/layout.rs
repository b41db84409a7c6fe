// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Binary layout of the shared event store.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ magic │ version │ running │ gpio │ level │ pressed │ hb_ms   │
//! │ clients │ write_index │ broadcast_sequence                   │
//! │ press/release/error totals │ start/event/heartbeat times     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ latest_event: EventSlot                                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ ring[0] .. ring[RING_CAPACITY - 1]: EventSlot                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every field is an atomic so that a reader in another process never
//! performs a non-atomic read of memory the service is writing. Multi-field
//! events are guarded by a per-slot stamp (seqlock): odd while a write is in
//! progress, bumped by two per write.

use std::sync::atomic::{fence, AtomicI32, AtomicU32, AtomicU64, Ordering};

use crate::event::{EventKind, GpioEvent};
use crate::shm::ring::RING_CAPACITY;
use crate::types::Sequence;

/// "GPOI" - identifies a segment initialized by a gpiocast service.
pub const STORE_MAGIC: u32 = 0x4750_4F49;

/// Bumped on any incompatible layout change.
pub const STORE_VERSION: u32 = 1;

/// Size of the shared memory segment holding the store.
pub const STORE_SIZE: usize = 4096;

const _: () = assert!(std::mem::size_of::<EventStoreLayout>() <= STORE_SIZE);

/// Sentinel for `current_state` before the first sample.
pub const LEVEL_UNKNOWN: i32 = -1;

/// Result of copying one slot out of shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCopy {
    /// Never written.
    Empty,
    /// A write was in progress or happened during the copy.
    Busy,
    Ready(GpioEvent),
}

/// One event slot with its seqlock stamp.
#[repr(C)]
pub struct EventSlot {
    stamp: AtomicU32,
    kind: AtomicU32,
    gpio_number: AtomicI32,
    sequence: AtomicU32,
    timestamp_us: AtomicU64,
    press_duration_ms: AtomicU32,
    error_code: AtomicI32,
}

impl EventSlot {
    /// Store an event. Single writer only.
    pub fn write(&self, event: &GpioEvent) {
        let s0 = self.stamp.load(Ordering::Relaxed);
        self.stamp.store(s0.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.kind.store(event.kind.as_raw(), Ordering::Relaxed);
        self.gpio_number.store(event.gpio_number, Ordering::Relaxed);
        self.sequence
            .store(event.sequence.value(), Ordering::Relaxed);
        self.timestamp_us
            .store(event.timestamp_us, Ordering::Relaxed);
        self.press_duration_ms
            .store(event.press_duration_ms, Ordering::Relaxed);
        self.error_code.store(event.error_code, Ordering::Relaxed);

        self.stamp.store(s0.wrapping_add(2), Ordering::Release);
    }

    /// Copy the slot once. Callers decide how often to retry a `Busy` copy.
    pub fn try_read(&self) -> SlotCopy {
        let s1 = self.stamp.load(Ordering::Acquire);
        if s1 & 1 == 1 {
            return SlotCopy::Busy;
        }

        let kind = self.kind.load(Ordering::Relaxed);
        let gpio_number = self.gpio_number.load(Ordering::Relaxed);
        let sequence = self.sequence.load(Ordering::Relaxed);
        let timestamp_us = self.timestamp_us.load(Ordering::Relaxed);
        let press_duration_ms = self.press_duration_ms.load(Ordering::Relaxed);
        let error_code = self.error_code.load(Ordering::Relaxed);

        fence(Ordering::Acquire);
        let s2 = self.stamp.load(Ordering::Relaxed);
        if s1 != s2 {
            return SlotCopy::Busy;
        }
        if s1 == 0 {
            return SlotCopy::Empty;
        }

        match EventKind::from_raw(kind) {
            Some(kind) => SlotCopy::Ready(GpioEvent {
                kind,
                gpio_number,
                timestamp_us,
                sequence: Sequence::new(sequence),
                press_duration_ms,
                error_code,
            }),
            // A stable stamp with an unknown kind means foreign data
            None => SlotCopy::Empty,
        }
    }
}

/// The whole shared store. Zeroed memory is a valid (uninitialized) store.
#[repr(C)]
pub struct EventStoreLayout {
    pub magic: AtomicU32,
    pub version: AtomicU32,
    pub service_running: AtomicU32,
    pub gpio_number: AtomicI32,
    /// Raw line level, or [`LEVEL_UNKNOWN`].
    pub current_state: AtomicI32,
    pub is_pressed: AtomicU32,
    pub heartbeat_interval_ms: AtomicU32,
    pub client_count: AtomicU32,
    /// Next slot to be written; only the service stores it.
    pub write_index: AtomicU32,
    /// Mirrors `write_index`; kept as a separate field for readers that only
    /// want the "events so far" counter.
    pub broadcast_sequence: AtomicU32,
    pub total_press_count: AtomicU64,
    pub total_release_count: AtomicU64,
    pub total_error_count: AtomicU64,
    /// Microseconds since the Unix epoch.
    pub service_start_time: AtomicU64,
    pub last_event_time: AtomicU64,
    pub last_heartbeat_time: AtomicU64,
    pub latest_event: EventSlot,
    pub ring: [EventSlot; RING_CAPACITY as usize],
}

impl EventStoreLayout {
    /// Slot holding `sequence`.
    pub fn slot(&self, sequence: Sequence) -> &EventSlot {
        &self.ring[sequence.slot(RING_CAPACITY - 1)]
    }

    /// Acquire-load of the writer position.
    pub fn load_write_index(&self) -> Sequence {
        Sequence::new(self.write_index.load(Ordering::Acquire))
    }

    pub fn is_initialized(&self) -> bool {
        self.magic.load(Ordering::Acquire) == STORE_MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed_slot() -> EventSlot {
        // SAFETY: all-zero bytes are valid for atomics
        unsafe { std::mem::zeroed() }
    }

    fn sample_event(seq: u32) -> GpioEvent {
        GpioEvent {
            kind: EventKind::Release,
            gpio_number: 75,
            timestamp_us: 1_700_000_000_000_000,
            sequence: Sequence::new(seq),
            press_duration_ms: 120,
            error_code: 0,
        }
    }

    #[test]
    fn test_layout_fits_segment() {
        assert!(std::mem::size_of::<EventStoreLayout>() <= STORE_SIZE);
        assert_eq!(std::mem::size_of::<EventSlot>(), 32);
    }

    #[test]
    fn test_empty_slot() {
        let slot = zeroed_slot();
        assert_eq!(slot.try_read(), SlotCopy::Empty);
    }

    #[test]
    fn test_slot_write_then_read() {
        let slot = zeroed_slot();
        let event = sample_event(9);
        slot.write(&event);
        assert_eq!(slot.try_read(), SlotCopy::Ready(event));
        assert_eq!(slot.stamp.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_odd_stamp_reads_busy() {
        let slot = zeroed_slot();
        slot.write(&sample_event(1));
        slot.stamp.store(3, Ordering::Relaxed);
        assert_eq!(slot.try_read(), SlotCopy::Busy);
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let slot = zeroed_slot();
        slot.write(&sample_event(1));
        slot.write(&sample_event(33));
        match slot.try_read() {
            SlotCopy::Ready(event) => assert_eq!(event.sequence, Sequence::new(33)),
            other => panic!("unexpected slot copy {:?}", other),
        }
    }
}
