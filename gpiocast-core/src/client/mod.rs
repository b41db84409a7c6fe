// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Subscriber client: maps the event store read-only, registers a private
//! notify socket with the service and delivers events from a listener thread.

mod listener;

use std::os::unix::net::UnixDatagram;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::{ControlError, GpioCastError, GpioCastResult};
use crate::event::GpioEvent;
use crate::protocol::{self, ControlCommand, ControlReply, NotifyMessage};
use crate::shm::{EventStoreView, StoreReader};
use crate::state::{ClientState, ClientStateMachine};
use crate::types::{Sequence, SocketPath};

use listener::{Listener, NoticeSink};

/// Something the listener thread reports to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum ClientNotice {
    Event(GpioEvent),
    /// The client fell more than one ring behind; `lost` events were skipped.
    Resync { lost: u32 },
    /// Heartbeat went stale or the service stopped.
    ServiceLost,
    /// The service is reachable again; delivery resumes from `write_index`.
    ServiceRestored { write_index: Sequence },
}

/// True if the service is running and its heartbeat is fresher than
/// `grace` heartbeat intervals.
pub fn service_alive<S: StoreReader + ?Sized>(store: &S, grace: u32) -> bool {
    store.is_live(grace)
}

/// Mapping and cursor shared with the listener thread.
pub(crate) struct ClientShared {
    view: Mutex<Arc<EventStoreView>>,
    cursor: AtomicU32,
}

impl ClientShared {
    fn new(view: EventStoreView) -> Self {
        Self {
            view: Mutex::new(Arc::new(view)),
            cursor: AtomicU32::new(0),
        }
    }

    pub(crate) fn view(&self) -> Arc<EventStoreView> {
        Arc::clone(&self.view.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn replace_view(&self, view: Arc<EventStoreView>, cursor: Sequence) {
        *self.view.lock().unwrap_or_else(|e| e.into_inner()) = view;
        self.set_cursor(cursor);
    }

    pub(crate) fn cursor(&self) -> Sequence {
        Sequence::new(self.cursor.load(Ordering::Acquire))
    }

    pub(crate) fn set_cursor(&self, cursor: Sequence) {
        self.cursor.store(cursor.value(), Ordering::Release);
    }
}

/// Running listener thread and the means to stop it.
struct ListenerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Unique suffix for notify socket paths within this process.
static NEXT_SOCKET_ID: AtomicU32 = AtomicU32::new(0);

/// A subscriber of one broadcast service.
///
/// Lifecycle: `create` → `connect` → `subscribe` → `unsubscribe` →
/// `disconnect` → `destroy`. The notice callback runs on the listener
/// thread, never on the caller's thread.
pub struct SubscriberClient {
    config: ClientConfig,
    state: ClientStateMachine,
    shared: Option<Arc<ClientShared>>,
    /// Service instance (start time) the cursor belongs to.
    cursor_instance: Option<u64>,
    notify_path: Option<SocketPath>,
    listener: Option<ListenerHandle>,
}

impl SubscriberClient {
    /// Local state only; nothing is opened.
    pub fn create(config: ClientConfig) -> GpioCastResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: ClientStateMachine::new(),
            shared: None,
            cursor_instance: None,
            notify_path: None,
            listener: None,
        })
    }

    /// Map the event store read-only and validate it.
    pub fn connect(&mut self) -> GpioCastResult<()> {
        self.state.check(ClientState::Connected)?;

        let grace = self.config.heartbeat_grace;
        let instance = self.cursor_instance;
        let reusable = self.shared.as_ref().is_some_and(|shared| {
            let current = shared.view();
            instance == Some(current.service_start_time_us())
                && service_alive(current.as_ref(), grace)
        });

        if !reusable {
            let store = EventStoreView::open(&self.config.endpoint.shm_name)?;
            tracing::info!(
                shm = %self.config.endpoint.shm_name,
                gpio = store.snapshot().gpio_number,
                "Connected to event store"
            );
            self.shared = Some(Arc::new(ClientShared::new(store)));
            self.cursor_instance = None;
        }

        self.state.transition_to(ClientState::Connected)?;
        Ok(())
    }

    /// Register with the service and deliver notices to `callback` on the
    /// listener thread.
    pub fn subscribe<F>(&mut self, callback: F) -> GpioCastResult<()>
    where
        F: FnMut(ClientNotice) + Send + 'static,
    {
        self.subscribe_with_sink(Box::new(callback))
    }

    /// Register with the service and deliver notices through a channel.
    pub fn subscribe_channel(&mut self) -> GpioCastResult<Receiver<ClientNotice>> {
        let (tx, rx) = mpsc::channel();
        self.subscribe_with_sink(Box::new(move |notice| {
            // Receiver gone: the application stopped listening
            let _ = tx.send(notice);
        }))?;
        Ok(rx)
    }

    fn subscribe_with_sink(&mut self, sink: NoticeSink) -> GpioCastResult<()> {
        self.state.check(ClientState::Subscribed)?;
        let shared = match &self.shared {
            Some(shared) => Arc::clone(shared),
            None => {
                return Err(ControlError::Rejected {
                    reason: "client is not connected".to_string(),
                }
                .into())
            }
        };

        let notify_path = self.next_notify_path()?;
        let socket = bind_notify_socket(&notify_path)?;
        if let Err(e) = socket.set_read_timeout(Some(self.config.reconnect_delay())) {
            let _ = std::fs::remove_file(notify_path.as_path());
            return Err(GpioCastError::Io {
                context: "setting notify socket timeout",
                source: e,
            });
        }

        let control_socket = self.config.endpoint.control_socket.clone();
        let command = ControlCommand::Register(notify_path.clone());
        let accepted = match protocol::request(control_socket.as_path(), &command) {
            Ok(ControlReply::Ok(write_index)) => Ok(write_index),
            Ok(ControlReply::Full) => Err(ControlError::RegistryFull),
            Ok(ControlReply::Err(reason)) => Err(ControlError::Rejected { reason }),
            Err(e) => Err(e),
        };
        let write_index = match accepted {
            Ok(write_index) => write_index,
            Err(e) => {
                let _ = std::fs::remove_file(notify_path.as_path());
                return Err(e.into());
            }
        };

        // Resubscribing to the same service instance keeps the cursor, so
        // events published in between are caught up (or reported lost)
        let instance = shared.view().service_start_time_us();
        if self.cursor_instance != Some(instance) {
            shared.set_cursor(write_index);
            self.cursor_instance = Some(instance);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let listener = Listener {
            socket,
            shared: Arc::clone(&shared),
            config: self.config.clone(),
            notify_path: notify_path.clone(),
            stop: Arc::clone(&stop),
            sink,
            service_lost: false,
        };

        let spawned = std::thread::Builder::new()
            .name("gpio-listener".to_string())
            .spawn(move || listener.run());
        let thread = match spawned {
            Ok(thread) => thread,
            Err(source) => {
                let _ = protocol::request(
                    control_socket.as_path(),
                    &ControlCommand::Unregister(notify_path.clone()),
                );
                let _ = std::fs::remove_file(notify_path.as_path());
                return Err(GpioCastError::ThreadSpawn {
                    name: "listener",
                    source,
                });
            }
        };

        tracing::info!(
            socket = %notify_path,
            cursor = %shared.cursor(),
            "Subscribed to broadcast service"
        );

        self.notify_path = Some(notify_path);
        self.listener = Some(ListenerHandle { stop, thread });
        self.state.transition_to(ClientState::Subscribed)?;
        Ok(())
    }

    fn next_notify_path(&self) -> GpioCastResult<SocketPath> {
        let id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
        let pid = nix::unistd::getpid();
        let path = self
            .config
            .notify_dir
            .join(format!("gpiocast-{}-{}.sock", pid, id));
        Ok(SocketPath::from_path(&path)?)
    }

    /// Unregister, stop the listener and remove the notify socket.
    pub fn unsubscribe(&mut self) -> GpioCastResult<()> {
        self.state.check(ClientState::Unsubscribed)?;
        self.stop_listener();
        self.state.transition_to(ClientState::Unsubscribed)?;
        Ok(())
    }

    fn stop_listener(&mut self) {
        let Some(path) = self.notify_path.take() else {
            return;
        };

        let command = ControlCommand::Unregister(path.clone());
        if let Err(e) = protocol::request(self.config.endpoint.control_socket.as_path(), &command) {
            tracing::debug!(error = %e, "Unregister failed, service may be gone");
        }

        if let Some(handle) = self.listener.take() {
            handle.stop.store(true, Ordering::Release);
            // Wake the blocked receive
            if let Ok(waker) = UnixDatagram::unbound() {
                let _ = waker.send_to(NotifyMessage::Wake.encode().as_bytes(), path.as_path());
            }
            if handle.thread.join().is_err() {
                tracing::error!("Listener thread panicked");
            }
        }

        let _ = std::fs::remove_file(path.as_path());
        tracing::info!(socket = %path, "Unsubscribed");
    }

    /// Leave the service. The mapping is kept for a later `connect`.
    pub fn disconnect(&mut self) -> GpioCastResult<()> {
        self.state.check(ClientState::Disconnected)?;
        self.stop_listener();
        self.state.transition_to(ClientState::Disconnected)?;
        Ok(())
    }

    /// Release everything. Not allowed while subscribed.
    pub fn destroy(&mut self) -> GpioCastResult<()> {
        self.state.transition_to(ClientState::Destroyed)?;
        self.shared = None;
        self.cursor_instance = None;
        Ok(())
    }

    /// Service running and heartbeat fresh.
    pub fn is_service_alive(&self) -> bool {
        match (&self.shared, self.state.is_mapped()) {
            (Some(shared), true) => {
                service_alive(shared.view().as_ref(), self.config.heartbeat_grace)
            }
            _ => false,
        }
    }

    /// Most recently published event, if connected.
    pub fn latest_event(&self) -> Option<GpioEvent> {
        match (&self.shared, self.state.is_mapped()) {
            (Some(shared), true) => shared.view().latest_event(),
            _ => None,
        }
    }

    /// Next sequence this client expects.
    pub fn last_sequence(&self) -> Option<Sequence> {
        self.shared.as_ref().map(|shared| shared.cursor())
    }

    pub fn notify_socket_path(&self) -> Option<&SocketPath> {
        self.notify_path.as_ref()
    }

    pub fn state(&self) -> ClientState {
        self.state.state()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Drop for SubscriberClient {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

impl std::fmt::Debug for SubscriberClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberClient")
            .field("state", &self.state.state())
            .field("notify_path", &self.notify_path)
            .finish()
    }
}

fn bind_notify_socket(path: &SocketPath) -> GpioCastResult<UnixDatagram> {
    let _ = std::fs::remove_file(path.as_path());
    UnixDatagram::bind(path.as_path()).map_err(|e| GpioCastError::Io {
        context: "binding notify socket",
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::event::timestamp_us;
    use crate::shm::EventStore;
    use tempfile::TempDir;

    fn endpoint(dir: &TempDir, tag: &str) -> EndpointConfig {
        EndpointConfig::new(
            format!("gpiocast-client-{}-{}", tag, std::process::id()),
            SocketPath::from_path(&dir.path().join("control.sock")).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_connect_without_service() {
        let dir = TempDir::new().unwrap();
        let mut client =
            SubscriberClient::create(ClientConfig::new(endpoint(&dir, "absent"))).unwrap();
        let err = client.connect().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(client.state(), ClientState::Created);
        assert!(!client.is_service_alive());
    }

    #[test]
    fn test_notice_json_is_tagged() {
        let json = serde_json::to_string(&ClientNotice::Resync { lost: 8 }).unwrap();
        assert_eq!(json, r#"{"notice":"resync","lost":8}"#);

        let lost = serde_json::to_string(&ClientNotice::ServiceLost).unwrap();
        assert_eq!(lost, r#"{"notice":"service_lost"}"#);
    }

    #[test]
    fn test_subscribe_requires_connect() {
        let dir = TempDir::new().unwrap();
        let mut client =
            SubscriberClient::create(ClientConfig::new(endpoint(&dir, "order"))).unwrap();
        assert!(matches!(
            client.subscribe(|_| {}),
            Err(GpioCastError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn test_liveness_window() {
        let dir = TempDir::new().unwrap();
        let ep = endpoint(&dir, "alive");
        let store = EventStore::create(&ep.shm_name, 75, 100, timestamp_us()).unwrap();
        assert!(!service_alive(&store, 3));

        store.set_running(true);
        store.touch_heartbeat(timestamp_us());
        assert!(service_alive(&store, 3));

        // Older than 3 x 100ms
        store.touch_heartbeat(timestamp_us() - 400_000);
        assert!(!service_alive(&store, 3));
    }

    #[test]
    fn test_connect_to_initialized_store() {
        let dir = TempDir::new().unwrap();
        let ep = endpoint(&dir, "connect");
        let store = EventStore::create(&ep.shm_name, 75, 1000, timestamp_us()).unwrap();
        store.set_running(true);

        let config = ClientConfig::new(ep).with_notify_dir(dir.path());
        let mut client = SubscriberClient::create(config).unwrap();
        client.connect().unwrap();
        assert_eq!(client.state(), ClientState::Connected);
        assert!(client.is_service_alive());
        assert_eq!(client.latest_event(), None);

        // No control socket: subscribe fails and leaves the client connected
        assert!(client.subscribe(|_| {}).is_err());
        assert_eq!(client.state(), ClientState::Connected);

        client.disconnect().unwrap();
        assert!(!client.is_service_alive());
        client.destroy().unwrap();
    }
}
