// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared memory event store.
//!
//! POSIX shared memory holding a fixed-layout block of atomics: service
//! status, statistics and a single-writer, many-reader ring of GPIO events.

mod layout;
mod region;
mod ring;
mod store;

pub use layout::{
    EventSlot, EventStoreLayout, SlotCopy, LEVEL_UNKNOWN, STORE_MAGIC, STORE_SIZE, STORE_VERSION,
};
pub use region::{MapAccess, SharedMemoryRegion};
pub use ring::{plan_catch_up, CatchUp, RING_CAPACITY, RING_MASK};
pub use store::{EventStore, EventStoreView, SlotRead, StoreReader};
