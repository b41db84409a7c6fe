// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Client listener thread: waits on the notify socket and drains the ring.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::client::{service_alive, ClientNotice, ClientShared};
use crate::config::ClientConfig;
use crate::protocol::{self, ControlCommand, ControlReply, NotifyMessage};
use crate::shm::{plan_catch_up, EventStoreView, SlotRead, StoreReader, RING_CAPACITY};
use crate::types::SocketPath;

pub(crate) type NoticeSink = Box<dyn FnMut(ClientNotice) + Send + 'static>;

pub(crate) struct Listener {
    pub(crate) socket: UnixDatagram,
    pub(crate) shared: Arc<ClientShared>,
    pub(crate) config: ClientConfig,
    pub(crate) notify_path: SocketPath,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) sink: NoticeSink,
    /// ServiceLost was delivered and no restore has happened since.
    pub(crate) service_lost: bool,
}

impl Listener {
    pub(crate) fn run(mut self) {
        tracing::debug!(socket = %self.notify_path, "Listener started");

        self.drain();
        let mut buf = [0u8; 64];

        while !self.stop.load(Ordering::Acquire) {
            match self.socket.recv(&mut buf) {
                Ok(n) => {
                    if self.stop.load(Ordering::Acquire) {
                        break;
                    }
                    if let Some(message) = NotifyMessage::parse(&buf[..n]) {
                        tracing::trace!(message = ?message, "Wake-up");
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(socket = %self.notify_path, error = %e, "Notify socket error");
                    std::thread::sleep(self.config.reconnect_delay());
                }
            }

            // Events already in the ring go out before any liveness notice
            if !self.service_lost {
                self.drain();
            }
            self.check_service();
        }

        tracing::debug!(socket = %self.notify_path, "Listener stopped");
    }

    fn deliver(&mut self, notice: ClientNotice) {
        (self.sink)(notice);
    }

    /// Deliver every event between the cursor and the writer, in order.
    fn drain(&mut self) {
        let view = self.shared.view();
        let cursor = self.shared.cursor();
        let plan = plan_catch_up(cursor, view.write_index(), RING_CAPACITY);

        if plan.rebased {
            tracing::warn!(
                cursor = %cursor,
                write_index = %plan.start,
                "Cursor ahead of service, rebasing"
            );
            self.shared.set_cursor(plan.start);
            return;
        }
        if plan.lost > 0 {
            tracing::warn!(lost = plan.lost, "Fell behind the event ring");
            self.deliver(ClientNotice::Resync { lost: plan.lost });
        }

        let mut next = plan.start;
        let mut end = plan.end();
        while next != end {
            match view.read(next) {
                SlotRead::Ready(event) => {
                    next = next.advance(1);
                    self.shared.set_cursor(next);
                    self.deliver(ClientNotice::Event(event));
                }
                SlotRead::Overwritten { .. } => {
                    // Lapped while draining: skip to the oldest event still held
                    let replan = plan_catch_up(next, view.write_index(), RING_CAPACITY);
                    if replan.lost == 0 {
                        break;
                    }
                    tracing::warn!(lost = replan.lost, "Lapped by the writer while draining");
                    self.deliver(ClientNotice::Resync { lost: replan.lost });
                    next = replan.start;
                    end = replan.end();
                    self.shared.set_cursor(next);
                }
                // Retry on the next wake-up
                SlotRead::Torn | SlotRead::Missing => break,
            }
        }
        self.shared.set_cursor(next);
    }

    /// Track service liveness; reattach to a restarted service.
    fn check_service(&mut self) {
        let view = self.shared.view();
        let grace = self.config.heartbeat_grace;

        if service_alive(view.as_ref(), grace) {
            if self.service_lost {
                tracing::info!("Service heartbeat resumed");
                self.service_lost = false;
                self.deliver(ClientNotice::ServiceRestored {
                    write_index: view.write_index(),
                });
                self.drain();
            }
            return;
        }

        if !self.service_lost {
            // Anything published before the stop is still held by the ring
            self.drain();
            tracing::warn!(shm = %self.config.endpoint.shm_name, "Broadcast service lost");
            self.service_lost = true;
            self.deliver(ClientNotice::ServiceLost);
        }

        let fresh = match EventStoreView::open(&self.config.endpoint.shm_name) {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::trace!(error = %e, "Service not back yet");
                return;
            }
        };
        if fresh.service_start_time_us() == view.service_start_time_us()
            || !service_alive(&fresh, grace)
        {
            return;
        }

        let command = ControlCommand::Register(self.notify_path.clone());
        match protocol::request(self.config.endpoint.control_socket.as_path(), &command) {
            Ok(ControlReply::Ok(write_index)) => {
                self.shared.replace_view(Arc::new(fresh), write_index);
                self.service_lost = false;
                tracing::info!(write_index = %write_index, "Reattached to restarted service");
                self.deliver(ClientNotice::ServiceRestored { write_index });
                self.drain();
            }
            Ok(reply) => tracing::debug!(reply = ?reply, "Re-register declined"),
            Err(e) => tracing::debug!(error = %e, "Re-register failed"),
        }
    }
}
