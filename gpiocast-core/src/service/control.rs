// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Control socket: REGISTER / UNREGISTER requests from subscribers.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ControlError;
use crate::protocol::{ControlCommand, ControlReply, CONTROL_IO_TIMEOUT, MAX_CONTROL_LINE};
use crate::registry::RegisterOutcome;
use crate::service::ServiceInner;
use crate::shm::StoreReader;
use crate::types::SocketPath;

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Bind the control socket, replacing a stale socket file.
///
/// A socket file that still accepts connections belongs to another service
/// and is left alone.
pub(crate) fn bind(path: &SocketPath) -> Result<UnixListener, ControlError> {
    if path.as_path().exists() {
        if UnixStream::connect(path.as_path()).is_ok() {
            return Err(ControlError::Bind {
                path: path.to_path_buf(),
                reason: "socket is in use by another service".to_string(),
            });
        }
        tracing::warn!(socket = %path, "Removing stale control socket");
        let _ = std::fs::remove_file(path.as_path());
    }

    let listener = UnixListener::bind(path.as_path()).map_err(|e| ControlError::Bind {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    // Non-blocking so the loop can observe the stop signal
    listener
        .set_nonblocking(true)
        .map_err(|e| ControlError::Bind {
            path: path.to_path_buf(),
            reason: format!("Failed to set non-blocking: {}", e),
        })?;

    Ok(listener)
}

pub(crate) fn run(inner: Arc<ServiceInner>, listener: UnixListener) {
    tracing::info!(
        socket = %inner.config.endpoint.control_socket,
        "Control listener started"
    );

    while !inner.stop.is_stopped() {
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(e) = handle_connection(&inner, stream) {
                    tracing::debug!(error = %e, "Control request failed");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if inner.stop.wait_timeout(ACCEPT_POLL) {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Control accept error");
                if inner.stop.wait_timeout(ACCEPT_POLL) {
                    break;
                }
            }
        }
    }

    tracing::debug!("Control listener stopped");
}

/// Read one command line, apply it, write one reply line.
fn handle_connection(inner: &ServiceInner, stream: UnixStream) -> Result<(), ControlError> {
    let io = |context: &'static str| move |source: std::io::Error| ControlError::Io { context, source };

    stream.set_nonblocking(false).map_err(io("set blocking"))?;
    stream
        .set_read_timeout(Some(CONTROL_IO_TIMEOUT))
        .map_err(io("set read timeout"))?;
    stream
        .set_write_timeout(Some(CONTROL_IO_TIMEOUT))
        .map_err(io("set write timeout"))?;

    let mut line = String::new();
    BufReader::new((&stream).take(MAX_CONTROL_LINE as u64))
        .read_line(&mut line)
        .map_err(io("read command"))?;

    let reply = match ControlCommand::parse(&line) {
        Ok(command) => apply(inner, command),
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting control line");
            ControlReply::Err("malformed request".to_string())
        }
    };

    (&stream)
        .write_all(reply.encode().as_bytes())
        .map_err(io("write reply"))
}

fn apply(inner: &ServiceInner, command: ControlCommand) -> ControlReply {
    let write_index = match command {
        ControlCommand::Register(path) => {
            let outcome = inner
                .registry
                .register(path.clone(), || inner.store.write_index());
            let Some(write_index) = outcome.write_index() else {
                tracing::warn!(
                    client = %path,
                    capacity = inner.registry.capacity(),
                    "Client registry full"
                );
                return ControlReply::Full;
            };
            tracing::info!(
                client = %path,
                write_index = %write_index,
                reactivated = matches!(outcome, RegisterOutcome::Reactivated(_)),
                "Client registered"
            );
            write_index
        }
        ControlCommand::Unregister(path) => {
            let removed = inner.registry.unregister(&path);
            tracing::info!(client = %path, known = removed, "Client unregistered");
            inner.store.write_index()
        }
    };

    inner.sync_client_count();
    ControlReply::Ok(write_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn socket_path(dir: &TempDir) -> SocketPath {
        SocketPath::from_path(&dir.path().join("control.sock")).unwrap()
    }

    #[test]
    fn test_bind_replaces_stale_socket_file() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);
        drop(UnixListener::bind(path.as_path()).unwrap());
        assert!(path.as_path().exists());

        let listener = bind(&path).unwrap();
        assert!(UnixStream::connect(path.as_path()).is_ok());
        drop(listener);
    }

    #[test]
    fn test_bind_refuses_live_socket() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);
        let _live = bind(&path).unwrap();

        let err = bind(&path).unwrap_err();
        assert!(matches!(err, ControlError::Bind { .. }));
        assert!(UnixStream::connect(path.as_path()).is_ok());
    }
}
