// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Subscriber wake-ups over Unix datagram sockets.
//!
//! One unbound, non-blocking datagram socket sends to every client. The
//! payload is informational: clients always re-read `write_index` from shared
//! memory, so a wake-up dropped because the client's queue is full loses
//! nothing.

use std::io;
use std::os::unix::net::UnixDatagram;

use crate::error::NotifyError;
use crate::protocol::NotifyMessage;
use crate::registry::{ClientRegistry, FailureOutcome};
use crate::types::{Sequence, SocketPath};

/// How a single wake-up was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The client's queue was full; a pending wake-up already covers this one.
    Coalesced,
}

/// Totals of one fan-out round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub sent: usize,
    pub coalesced: usize,
    pub failed: usize,
    pub evicted: usize,
}

#[derive(Debug)]
pub struct Notifier {
    socket: UnixDatagram,
}

impl Notifier {
    pub fn new() -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    /// Send one datagram without blocking.
    pub fn send(&self, target: &SocketPath, message: NotifyMessage) -> Result<Delivery, NotifyError> {
        match self
            .socket
            .send_to(message.encode().as_bytes(), target.as_path())
        {
            Ok(_) => Ok(Delivery::Sent),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Delivery::Coalesced),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) =>
            {
                Err(NotifyError::Unreachable {
                    path: target.to_path_buf(),
                    source: e,
                })
            }
            Err(e) => Err(NotifyError::Io {
                path: target.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Wake every active client and record the results in the registry.
    ///
    /// The registry is not locked while sending; targets are snapshotted
    /// first and results written back per entry.
    pub fn broadcast(&self, registry: &ClientRegistry, sequence: Sequence) -> FanOut {
        let message = NotifyMessage::Notify(sequence.advance(1));
        let mut totals = FanOut::default();

        for target in registry.active_targets() {
            match self.send(&target, message) {
                Ok(delivery) => {
                    match delivery {
                        Delivery::Sent => totals.sent += 1,
                        Delivery::Coalesced => totals.coalesced += 1,
                    }
                    registry.record_delivery(&target, sequence);
                }
                Err(e) => {
                    totals.failed += 1;
                    match registry.record_failure(&target) {
                        FailureOutcome::Evicted => {
                            totals.evicted += 1;
                            tracing::warn!(
                                client = %target,
                                error = %e,
                                "Dropping unreachable subscriber"
                            );
                        }
                        FailureOutcome::Counted(failures) => {
                            tracing::debug!(
                                client = %target,
                                failures = failures,
                                error = %e,
                                "Notify failed"
                            );
                        }
                        FailureOutcome::Ignored => {}
                    }
                }
            }
        }

        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn socket_path(dir: &TempDir, name: &str) -> SocketPath {
        SocketPath::from_path(&dir.path().join(name)).unwrap()
    }

    #[test]
    fn test_send_to_bound_socket() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir, "client.sock");
        let receiver = UnixDatagram::bind(path.as_path()).unwrap();

        let notifier = Notifier::new().unwrap();
        let delivery = notifier
            .send(&path, NotifyMessage::Notify(Sequence::new(4)))
            .unwrap();
        assert_eq!(delivery, Delivery::Sent);

        let mut buf = [0u8; 64];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(
            NotifyMessage::parse(&buf[..n]),
            Some(NotifyMessage::Notify(Sequence::new(4)))
        );
    }

    #[test]
    fn test_send_to_missing_socket() {
        let dir = TempDir::new().unwrap();
        let notifier = Notifier::new().unwrap();
        let err = notifier
            .send(&socket_path(&dir, "gone.sock"), NotifyMessage::Wake)
            .unwrap_err();
        assert!(matches!(err, NotifyError::Unreachable { .. }));
    }

    #[test]
    fn test_full_queue_coalesces() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir, "slow.sock");
        let _receiver = UnixDatagram::bind(path.as_path()).unwrap();
        let notifier = Notifier::new().unwrap();

        // Never read: the receive queue eventually fills
        let mut coalesced = false;
        for i in 0..100_000u32 {
            match notifier.send(&path, NotifyMessage::Notify(Sequence::new(i))) {
                Ok(Delivery::Coalesced) => {
                    coalesced = true;
                    break;
                }
                Ok(Delivery::Sent) => {}
                Err(e) => panic!("unexpected notify error {}", e),
            }
        }
        assert!(coalesced);
    }

    #[test]
    fn test_broadcast_evicts_unreachable() {
        let dir = TempDir::new().unwrap();
        let live = socket_path(&dir, "live.sock");
        let dead = socket_path(&dir, "dead.sock");
        let _receiver = UnixDatagram::bind(live.as_path()).unwrap();

        let registry = ClientRegistry::new(8, 2);
        registry.register(live.clone(), || Sequence::new(0));
        registry.register(dead.clone(), || Sequence::new(0));
        let notifier = Notifier::new().unwrap();

        let mut evicted = 0;
        for seq in 0..5 {
            let totals = notifier.broadcast(&registry, Sequence::new(seq));
            evicted += totals.evicted;
        }

        assert_eq!(evicted, 1);
        assert_eq!(registry.active_count(), 1);
        assert!(!registry.get(&dead).unwrap().is_active);
        assert_eq!(
            registry.get(&live).unwrap().last_sequence,
            Sequence::new(4)
        );
    }
}
