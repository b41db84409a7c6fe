// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Thread-safe subscriber registry using DashMap.
//!
//! Keyed by notify socket path. The control thread adds and removes entries;
//! the publishing thread records delivery results. Capacity counts active
//! entries only, so a client that was dropped for failing notifications does
//! not hold a slot.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::types::{Sequence, SocketPath};

/// One subscriber as seen by the service.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub notify_socket_path: SocketPath,
    /// Sequence of the last event this client was notified about.
    pub last_sequence: Sequence,
    pub is_active: bool,
    /// Consecutive failed notifications.
    pub notify_fail_count: u32,
    pub registered_at: Instant,
}

impl ClientRegistration {
    fn new(notify_socket_path: SocketPath, write_index: Sequence) -> Self {
        Self {
            notify_socket_path,
            last_sequence: write_index,
            is_active: true,
            notify_fail_count: 0,
            registered_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.registered_at.elapsed()
    }
}

/// Result of a REGISTER request, with the write index the client starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Added(Sequence),
    /// The path was already known; it is active again with a fresh cursor.
    Reactivated(Sequence),
    /// Capacity reached; nothing changed.
    Full,
}

impl RegisterOutcome {
    pub fn write_index(self) -> Option<Sequence> {
        match self {
            Self::Added(index) | Self::Reactivated(index) => Some(index),
            Self::Full => None,
        }
    }
}

/// Result of recording a failed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still active, failure counted.
    Counted(u32),
    /// Threshold exceeded; the client was deactivated by this call.
    Evicted,
    /// Unknown or already inactive.
    Ignored,
}

/// Registry of subscribers, bounded by `capacity` active entries.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: DashMap<SocketPath, ClientRegistration>,
    capacity: usize,
    fail_threshold: u32,
}

impl ClientRegistry {
    pub fn new(capacity: usize, fail_threshold: u32) -> Self {
        Self {
            clients: DashMap::new(),
            capacity,
            fail_threshold,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register (or reactivate) a notify path.
    ///
    /// `current_index` is read while the entry's shard lock is held, so a
    /// concurrent fan-out either already sees the client or published its
    /// event below the returned index.
    ///
    /// Called from the control thread only, so the capacity check and the
    /// insert cannot interleave with another registration.
    pub fn register<F>(&self, path: SocketPath, current_index: F) -> RegisterOutcome
    where
        F: FnOnce() -> Sequence,
    {
        let known = match self.clients.get_mut(&path) {
            Some(mut entry) if entry.is_active => {
                let write_index = current_index();
                entry.last_sequence = write_index;
                entry.notify_fail_count = 0;
                return RegisterOutcome::Reactivated(write_index);
            }
            Some(_) => true,
            None => false,
        };

        if self.active_count() >= self.capacity {
            return RegisterOutcome::Full;
        }

        // Dropped clients keep their entry until the space is needed
        self.clients.retain(|_, entry| entry.is_active);

        let slot = self.clients.entry(path.clone());
        let write_index = current_index();
        slot.insert(ClientRegistration::new(path, write_index));
        if known {
            RegisterOutcome::Reactivated(write_index)
        } else {
            RegisterOutcome::Added(write_index)
        }
    }

    /// Remove a notify path. Returns false if it was not registered.
    pub fn unregister(&self, path: &SocketPath) -> bool {
        self.clients.remove(path).is_some()
    }

    /// Paths of every active client.
    pub fn active_targets(&self) -> Vec<SocketPath> {
        self.clients
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.key().clone())
            .collect()
    }

    /// Clear the failure count; `last_sequence` never moves backwards when
    /// fan-outs for consecutive events finish out of order.
    pub fn record_delivery(&self, path: &SocketPath, sequence: Sequence) {
        if let Some(mut entry) = self.clients.get_mut(path) {
            entry.notify_fail_count = 0;
            if !entry.last_sequence.is_after(sequence) {
                entry.last_sequence = sequence;
            }
        }
    }

    /// Count a failed notification against `path`.
    ///
    /// The transition to inactive happens under the entry's shard lock, so
    /// only one caller ever observes [`FailureOutcome::Evicted`] per client.
    pub fn record_failure(&self, path: &SocketPath) -> FailureOutcome {
        let Some(mut entry) = self.clients.get_mut(path) else {
            return FailureOutcome::Ignored;
        };
        if !entry.is_active {
            return FailureOutcome::Ignored;
        }

        entry.notify_fail_count += 1;
        if entry.notify_fail_count > self.fail_threshold {
            entry.is_active = false;
            FailureOutcome::Evicted
        } else {
            FailureOutcome::Counted(entry.notify_fail_count)
        }
    }

    pub fn get(&self, path: &SocketPath) -> Option<ClientRegistration> {
        self.clients.get(path).map(|r| r.value().clone())
    }

    pub fn active_count(&self) -> usize {
        self.clients.iter().filter(|r| r.is_active).count()
    }

    /// Number of entries, inactive ones included.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Copies of all entries.
    pub fn registrations(&self) -> Vec<ClientRegistration> {
        self.clients.iter().map(|r| r.value().clone()).collect()
    }

    pub fn clear(&self) {
        self.clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str) -> SocketPath {
        SocketPath::new(format!("/tmp/{}.sock", name)).unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = ClientRegistry::new(4, 3);
        assert_eq!(
            registry.register(path("a"), || Sequence::new(7)),
            RegisterOutcome::Added(Sequence::new(7))
        );
        let entry = registry.get(&path("a")).unwrap();
        assert!(entry.is_active);
        assert_eq!(entry.last_sequence, Sequence::new(7));
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_repeat_register_reactivates() {
        let registry = ClientRegistry::new(1, 3);
        registry.register(path("a"), || Sequence::new(1));
        registry.record_failure(&path("a"));
        assert_eq!(
            registry.register(path("a"), || Sequence::new(9)),
            RegisterOutcome::Reactivated(Sequence::new(9))
        );
        let entry = registry.get(&path("a")).unwrap();
        assert_eq!(entry.notify_fail_count, 0);
        assert_eq!(entry.last_sequence, Sequence::new(9));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_full_registry_rejects_without_side_effects() {
        let registry = ClientRegistry::new(2, 3);
        registry.register(path("a"), || Sequence::new(0));
        registry.register(path("b"), || Sequence::new(0));

        assert_eq!(
            registry.register(path("c"), || Sequence::new(5)),
            RegisterOutcome::Full
        );
        assert!(registry.get(&path("c")).is_none());
        assert_eq!(registry.active_count(), 2);
        assert_eq!(
            registry.get(&path("a")).unwrap().last_sequence,
            Sequence::new(0)
        );
    }

    #[test]
    fn test_eviction_after_threshold() {
        let registry = ClientRegistry::new(4, 3);
        registry.register(path("a"), || Sequence::new(0));

        assert_eq!(registry.record_failure(&path("a")), FailureOutcome::Counted(1));
        assert_eq!(registry.record_failure(&path("a")), FailureOutcome::Counted(2));
        assert_eq!(registry.record_failure(&path("a")), FailureOutcome::Counted(3));
        assert_eq!(registry.record_failure(&path("a")), FailureOutcome::Evicted);
        // Already inactive: never evicted twice
        assert_eq!(registry.record_failure(&path("a")), FailureOutcome::Ignored);

        assert_eq!(registry.active_count(), 0);
        assert!(registry.active_targets().is_empty());
    }

    #[test]
    fn test_delivery_resets_failures() {
        let registry = ClientRegistry::new(4, 3);
        registry.register(path("a"), || Sequence::new(0));
        registry.record_failure(&path("a"));
        registry.record_failure(&path("a"));
        registry.record_delivery(&path("a"), Sequence::new(3));

        let entry = registry.get(&path("a")).unwrap();
        assert_eq!(entry.notify_fail_count, 0);
        assert_eq!(entry.last_sequence, Sequence::new(3));
    }

    #[test]
    fn test_evicted_slot_is_reusable() {
        let registry = ClientRegistry::new(1, 0);
        registry.register(path("a"), || Sequence::new(0));
        assert_eq!(registry.record_failure(&path("a")), FailureOutcome::Evicted);

        assert_eq!(
            registry.register(path("b"), || Sequence::new(2)),
            RegisterOutcome::Added(Sequence::new(2))
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&path("a")).is_none());
    }

    #[test]
    fn test_out_of_order_delivery_keeps_newest() {
        let registry = ClientRegistry::new(4, 3);
        registry.register(path("a"), || Sequence::new(0));
        registry.record_delivery(&path("a"), Sequence::new(6));
        registry.record_failure(&path("a"));
        registry.record_delivery(&path("a"), Sequence::new(5));

        let entry = registry.get(&path("a")).unwrap();
        assert_eq!(entry.last_sequence, Sequence::new(6));
        assert_eq!(entry.notify_fail_count, 0);
    }

    #[test]
    fn test_delivery_before_registration_ignored() {
        let registry = ClientRegistry::new(4, 3);
        registry.register(path("a"), || Sequence::new(10));
        registry.record_delivery(&path("a"), Sequence::new(9));
        assert_eq!(
            registry.get(&path("a")).unwrap().last_sequence,
            Sequence::new(10)
        );
    }

    #[test]
    fn test_register_reads_index_after_capacity_check() {
        let registry = ClientRegistry::new(1, 3);
        registry.register(path("a"), || Sequence::new(0));

        let mut read = false;
        let outcome = registry.register(path("b"), || {
            read = true;
            Sequence::new(4)
        });
        assert_eq!(outcome, RegisterOutcome::Full);
        assert_eq!(outcome.write_index(), None);
        assert!(!read);
    }

    #[test]
    fn test_reregister_dropped_client_reports_reactivated() {
        let registry = ClientRegistry::new(2, 0);
        registry.register(path("a"), || Sequence::new(0));
        assert_eq!(registry.record_failure(&path("a")), FailureOutcome::Evicted);

        let outcome = registry.register(path("a"), || Sequence::new(3));
        assert_eq!(outcome, RegisterOutcome::Reactivated(Sequence::new(3)));
        assert!(registry.get(&path("a")).unwrap().is_active);
    }

    #[test]
    fn test_unregister_idempotent() {
        let registry = ClientRegistry::new(4, 3);
        registry.register(path("a"), || Sequence::new(0));
        assert!(registry.unregister(&path("a")));
        assert!(!registry.unregister(&path("a")));
        assert!(registry.is_empty());
    }
}
