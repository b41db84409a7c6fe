// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! GPIO event records and timestamp helpers.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::Sequence;

/// Kind of a GPIO transition. Discriminants are the on-the-wire values stored
/// in shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum EventKind {
    Press = 1,
    Release = 2,
    Error = 3,
}

impl EventKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Press => "press",
            Self::Release => "release",
            Self::Error => "error",
        }
    }

    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Press),
            2 => Some(Self::Release),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Electrical level of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

/// A published GPIO event. Immutable once created by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioEvent {
    pub kind: EventKind,
    pub gpio_number: i32,
    /// Wall-clock microseconds since the Unix epoch.
    pub timestamp_us: u64,
    pub sequence: Sequence,
    /// Hold time; only meaningful for [`EventKind::Release`].
    pub press_duration_ms: u32,
    /// Only meaningful for [`EventKind::Error`].
    pub error_code: i32,
}

impl fmt::Display for GpioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} gpio{} {} @{}us",
            self.sequence, self.gpio_number, self.kind, self.timestamp_us
        )?;
        match self.kind {
            EventKind::Release => write!(f, " held {}ms", self.press_duration_ms),
            EventKind::Error => write!(f, " code {}", self.error_code),
            EventKind::Press => Ok(()),
        }
    }
}

/// Everything the service knows about an event before the store assigns its
/// sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDraft {
    pub kind: EventKind,
    pub gpio_number: i32,
    pub timestamp_us: u64,
    pub press_duration_ms: u32,
    pub error_code: i32,
}

impl EventDraft {
    pub fn new(kind: EventKind, gpio_number: i32, timestamp_us: u64) -> Self {
        Self {
            kind,
            gpio_number,
            timestamp_us,
            press_duration_ms: 0,
            error_code: 0,
        }
    }

    pub fn with_press_duration(mut self, press_duration_ms: u32) -> Self {
        self.press_duration_ms = press_duration_ms;
        self
    }

    pub fn with_error_code(mut self, error_code: i32) -> Self {
        self.error_code = error_code;
        self
    }

    pub fn into_event(self, sequence: Sequence) -> GpioEvent {
        GpioEvent {
            kind: self.kind,
            gpio_number: self.gpio_number,
            timestamp_us: self.timestamp_us,
            sequence,
            press_duration_ms: self.press_duration_ms,
            error_code: self.error_code,
        }
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Wall-clock rather than monotonic so that timestamps written by the service
/// are comparable in every client process.
pub fn timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Milliseconds between two microsecond timestamps, saturating at zero and
/// rounded to the nearest millisecond.
pub fn elapsed_ms(from_us: u64, to_us: u64) -> u32 {
    let micros = to_us.saturating_sub(from_us);
    u32::try_from((micros + 500) / 1000).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_raw_values() {
        assert_eq!(EventKind::Press.as_raw(), 1);
        assert_eq!(EventKind::Release.as_raw(), 2);
        assert_eq!(EventKind::Error.as_raw(), 3);
        assert_eq!(EventKind::from_raw(2), Some(EventKind::Release));
        assert_eq!(EventKind::from_raw(0), None);
        assert_eq!(EventKind::from_raw(4), None);
    }

    #[test]
    fn test_elapsed_ms() {
        assert_eq!(elapsed_ms(1_000_000, 1_120_000), 120);
        assert_eq!(elapsed_ms(1_000_000, 1_000_499), 0);
        assert_eq!(elapsed_ms(1_000_000, 1_000_500), 1);
        // Clock stepped backwards
        assert_eq!(elapsed_ms(2_000_000, 1_000_000), 0);
    }

    #[test]
    fn test_draft_into_event() {
        let event = EventDraft::new(EventKind::Release, 75, 42)
            .with_press_duration(120)
            .into_event(Sequence::new(7));
        assert_eq!(event.kind, EventKind::Release);
        assert_eq!(event.gpio_number, 75);
        assert_eq!(event.press_duration_ms, 120);
        assert_eq!(event.sequence, Sequence::new(7));
        assert_eq!(event.to_string(), "#7 gpio75 release @42us held 120ms");
    }

    #[test]
    fn test_event_json_shape() {
        let event = EventDraft::new(EventKind::Press, 75, 1).into_event(Sequence::new(3));
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["kind"], "press");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["gpio_number"], 75);
    }
}
