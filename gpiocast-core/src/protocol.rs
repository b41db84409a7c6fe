// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Control and notify socket wire formats.
//!
//! Control socket (stream, one request line, one reply line):
//!
//! ```text
//! -> GPIO_EVENT_REGISTER /tmp/gpiocast-123-0.sock\n
//! <- OK 42\n          (42 = write index at registration)
//! <- FULL\n           (registry at capacity)
//! <- ERR <reason>\n
//! ```
//!
//! Notify socket (datagram, informational payload only):
//! `GPIO_EVENT_NOTIFY <sequence>` from the service, `GPIO_EVENT_WAKE` when a
//! client wakes its own listener.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use crate::error::ControlError;
use crate::types::{Sequence, SocketPath};

/// Default POSIX shared memory name of the event store.
pub const DEFAULT_SHM_NAME: &str = "ai_gpio_event_shm";

/// Default path of the service control socket.
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/ai_gpio_event_broadcast";

pub const DEFAULT_MAX_CLIENTS: usize = 64;
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 50;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u32 = 1000;
pub const DEFAULT_RECONNECT_DELAY_MS: u32 = 500;
pub const DEFAULT_NOTIFY_FAIL_THRESHOLD: u32 = 3;
pub const DEFAULT_HEARTBEAT_GRACE: u32 = 3;

/// Read/write timeout on a single control connection.
pub const CONTROL_IO_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest control line accepted, newline included.
pub const MAX_CONTROL_LINE: usize = 256;

const REGISTER: &str = "GPIO_EVENT_REGISTER";
const UNREGISTER: &str = "GPIO_EVENT_UNREGISTER";
const NOTIFY: &str = "GPIO_EVENT_NOTIFY";
const WAKE: &str = "GPIO_EVENT_WAKE";

/// Request sent to the control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Register(SocketPath),
    Unregister(SocketPath),
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        let malformed = || ControlError::Malformed {
            line: line.to_string(),
        };
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let (verb, arg) = trimmed.split_once(' ').ok_or_else(malformed)?;
        let path = SocketPath::new(arg).map_err(|_| malformed())?;

        match verb {
            REGISTER => Ok(Self::Register(path)),
            UNREGISTER => Ok(Self::Unregister(path)),
            _ => Err(malformed()),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Register(path) => format!("{} {}\n", REGISTER, path),
            Self::Unregister(path) => format!("{} {}\n", UNREGISTER, path),
        }
    }

    pub fn path(&self) -> &SocketPath {
        match self {
            Self::Register(path) | Self::Unregister(path) => path,
        }
    }
}

/// Reply line from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    /// Accepted; carries the write index at the time of the request.
    Ok(Sequence),
    Full,
    Err(String),
}

impl ControlReply {
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        let malformed = || ControlError::Malformed {
            line: line.to_string(),
        };
        let trimmed = line.trim_end_matches(['\r', '\n']);

        if trimmed == "FULL" {
            return Ok(Self::Full);
        }
        if let Some(reason) = trimmed.strip_prefix("ERR ") {
            return Ok(Self::Err(reason.to_string()));
        }
        let index = trimmed.strip_prefix("OK ").ok_or_else(malformed)?;
        index
            .parse::<u32>()
            .map(|v| Self::Ok(Sequence::new(v)))
            .map_err(|_| malformed())
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Ok(index) => format!("OK {}\n", index.value()),
            Self::Full => "FULL\n".to_string(),
            Self::Err(reason) => format!("ERR {}\n", reason.replace('\n', " ")),
        }
    }
}

/// Datagram payload on a notify socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMessage {
    /// New events up to (excluding) the given write index.
    Notify(Sequence),
    Wake,
}

impl NotifyMessage {
    pub fn encode(&self) -> String {
        match self {
            Self::Notify(seq) => format!("{} {}", NOTIFY, seq.value()),
            Self::Wake => WAKE.to_string(),
        }
    }

    pub fn parse(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        if text == WAKE {
            return Some(Self::Wake);
        }
        let seq = text.strip_prefix(NOTIFY)?.trim().parse::<u32>().ok()?;
        Some(Self::Notify(Sequence::new(seq)))
    }
}

/// Send one command to the control socket and wait for its reply.
pub fn request(control_socket: &Path, command: &ControlCommand) -> Result<ControlReply, ControlError> {
    let mut stream = UnixStream::connect(control_socket).map_err(|e| ControlError::Connect {
        path: control_socket.to_path_buf(),
        reason: e.to_string(),
    })?;
    let io = |context: &'static str| move |source: std::io::Error| ControlError::Io { context, source };

    stream
        .set_read_timeout(Some(CONTROL_IO_TIMEOUT))
        .map_err(io("set read timeout"))?;
    stream
        .set_write_timeout(Some(CONTROL_IO_TIMEOUT))
        .map_err(io("set write timeout"))?;
    stream
        .write_all(command.encode().as_bytes())
        .map_err(io("send command"))?;

    let mut line = String::new();
    BufReader::new(stream.take(MAX_CONTROL_LINE as u64))
        .read_line(&mut line)
        .map_err(io("read reply"))?;
    if line.is_empty() {
        return Err(ControlError::Malformed { line });
    }
    ControlReply::parse(&line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register() {
        let cmd = ControlCommand::parse("GPIO_EVENT_REGISTER /tmp/a.sock\n").unwrap();
        assert_eq!(
            cmd,
            ControlCommand::Register(SocketPath::new("/tmp/a.sock").unwrap())
        );
        assert_eq!(cmd.encode(), "GPIO_EVENT_REGISTER /tmp/a.sock\n");
    }

    #[test]
    fn test_parse_unregister_crlf() {
        let cmd = ControlCommand::parse("GPIO_EVENT_UNREGISTER /tmp/a.sock\r\n").unwrap();
        assert_eq!(cmd.path().as_str(), "/tmp/a.sock");
        assert!(matches!(cmd, ControlCommand::Unregister(_)));
    }

    #[test]
    fn test_reject_malformed_commands() {
        for line in [
            "",
            "GPIO_EVENT_REGISTER",
            "GPIO_EVENT_REGISTER ",
            "GPIO_EVENT_REGISTER /tmp/a b",
            "HELLO /tmp/a.sock",
        ] {
            assert!(
                matches!(
                    ControlCommand::parse(line),
                    Err(ControlError::Malformed { .. })
                ),
                "accepted {:?}",
                line
            );
        }
    }

    #[test]
    fn test_replies() {
        assert_eq!(
            ControlReply::parse("OK 42\n").unwrap(),
            ControlReply::Ok(Sequence::new(42))
        );
        assert_eq!(ControlReply::parse("FULL\n").unwrap(), ControlReply::Full);
        assert_eq!(
            ControlReply::parse("ERR bad path\n").unwrap(),
            ControlReply::Err("bad path".to_string())
        );
        assert!(ControlReply::parse("OK x\n").is_err());
        assert!(ControlReply::parse("YES\n").is_err());
        assert_eq!(ControlReply::Ok(Sequence::new(7)).encode(), "OK 7\n");
    }

    #[test]
    fn test_notify_payloads() {
        let msg = NotifyMessage::Notify(Sequence::new(9));
        assert_eq!(msg.encode(), "GPIO_EVENT_NOTIFY 9");
        assert_eq!(NotifyMessage::parse(msg.encode().as_bytes()), Some(msg));
        assert_eq!(
            NotifyMessage::parse(b"GPIO_EVENT_WAKE"),
            Some(NotifyMessage::Wake)
        );
        assert_eq!(NotifyMessage::parse(b"garbage"), None);
    }

    #[test]
    fn test_request_without_service() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.sock");
        let cmd = ControlCommand::Register(SocketPath::new("/tmp/x.sock").unwrap());
        let err = request(&path, &cmd).unwrap_err();
        assert!(err.is_retryable());
    }
}
