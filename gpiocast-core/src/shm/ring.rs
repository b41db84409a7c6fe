// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Ring geometry and catch-up planning.
//!
//! The ring has no read index of its own: each subscriber keeps a private
//! cursor and plans how much of the window it can still replay.

use crate::types::Sequence;

/// Number of event slots in the shared ring. Must be a power of two.
pub const RING_CAPACITY: u32 = 32;

/// Mask turning a sequence into a slot index.
pub const RING_MASK: u32 = RING_CAPACITY - 1;

const _: () = assert!(RING_CAPACITY.is_power_of_two());

/// What a subscriber has to do to get from its cursor to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUp {
    /// First sequence to read.
    pub start: Sequence,
    /// Number of events readable from `start`, at most the ring capacity.
    pub count: u32,
    /// Events already overwritten and therefore skipped.
    pub lost: u32,
    /// The cursor was ahead of the writer, which only happens when the
    /// service restarted from zero underneath the subscriber.
    pub rebased: bool,
}

impl CatchUp {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Cursor value once every planned event has been consumed.
    pub fn end(&self) -> Sequence {
        self.start.advance(self.count)
    }
}

/// Plan a catch-up from `cursor` to `write_index`.
///
/// If the subscriber is more than `capacity` events behind, the oldest events
/// are gone; it fast-forwards to `write_index - capacity` and reports the
/// difference as lost:
///
/// ```text
/// capacity = 32, cursor = 0, write_index = 40
/// behind = 40, lost = 8, start = 8, count = 32
/// ```
pub fn plan_catch_up(cursor: Sequence, write_index: Sequence, capacity: u32) -> CatchUp {
    if cursor.is_after(write_index) {
        return CatchUp {
            start: write_index,
            count: 0,
            lost: 0,
            rebased: true,
        };
    }

    let behind = cursor.distance_to(write_index);
    if behind > capacity {
        CatchUp {
            start: write_index.rewind(capacity),
            count: capacity,
            lost: behind - capacity,
            rebased: false,
        }
    } else {
        CatchUp {
            start: cursor,
            count: behind,
            lost: 0,
            rebased: false,
        }
    }
}
