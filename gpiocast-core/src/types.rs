// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Following the "Newtype" pattern in Rust to ensure valid state by construction.
//! All types validate their invariants at creation time.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Size of `sockaddr_un.sun_path`, including the trailing NUL.
pub const SOCKET_PATH_MAX: usize = 108;

/// Validated Unix-domain socket path.
///
/// Must be non-empty, valid UTF-8 without whitespace or NUL bytes (it travels
/// inside a whitespace-delimited control line), and shorter than
/// [`SOCKET_PATH_MAX`] bytes so it fits `sun_path`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SocketPath(String);

impl SocketPath {
    /// Create a new SocketPath with validation.
    pub fn new(path: impl Into<String>) -> Result<Self, HardValidationError> {
        let path = path.into();

        if path.is_empty() {
            return Err(HardValidationError::InvalidSocketPath {
                path,
                reason: "Socket path cannot be empty".to_string(),
            });
        }

        if path.len() >= SOCKET_PATH_MAX {
            return Err(HardValidationError::SocketPathTooLong {
                len: path.len(),
                max: SOCKET_PATH_MAX - 1,
            });
        }

        if path.chars().any(|c| c.is_whitespace() || c == '\0') {
            return Err(HardValidationError::InvalidSocketPath {
                path,
                reason: "Socket path cannot contain whitespace or NUL".to_string(),
            });
        }

        Ok(Self(path))
    }

    /// Create without validation, for compile-time constants known to be valid.
    pub(crate) fn new_unchecked(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Create from a filesystem path, rejecting non-UTF-8 paths.
    pub fn from_path(path: &Path) -> Result<Self, HardValidationError> {
        match path.to_str() {
            Some(s) => Self::new(s),
            None => Err(HardValidationError::InvalidSocketPath {
                path: path.display().to_string(),
                reason: "Socket path must be valid UTF-8".to_string(),
            }),
        }
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the path as a Path.
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Convert into an owned PathBuf.
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl TryFrom<String> for SocketPath {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SocketPath> for String {
    fn from(path: SocketPath) -> Self {
        path.0
    }
}

impl fmt::Display for SocketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<Path> for SocketPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

/// Service-wide 32-bit event sequence number.
///
/// Wraps at 2^32. Ordering is defined with modular arithmetic only: `b` is
/// after `a` when `b - a (mod 2^32)` is in `1..2^31`. Never compare raw
/// values with `<`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u32);

impl Sequence {
    /// Half the sequence space; distances at or beyond this read as "behind".
    const HALF_RANGE: u32 = 1 << 31;

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// The sequence `n` steps later (wrapping).
    pub const fn advance(self, n: u32) -> Self {
        Self(self.0.wrapping_add(n))
    }

    /// The sequence `n` steps earlier (wrapping).
    pub const fn rewind(self, n: u32) -> Self {
        Self(self.0.wrapping_sub(n))
    }

    /// Forward distance from `self` to `later`, modulo 2^32.
    pub const fn distance_to(self, later: Sequence) -> u32 {
        later.0.wrapping_sub(self.0)
    }

    /// True if `self` comes strictly after `other` in modular order.
    pub const fn is_after(self, other: Sequence) -> bool {
        let d = other.distance_to(self);
        d != 0 && d < Self::HALF_RANGE
    }

    /// Slot index in a power-of-two ring with the given mask.
    pub const fn slot(self, mask: u32) -> usize {
        (self.0 & mask) as usize
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_socket_path() {
        let path = SocketPath::new("/tmp/gpiocast-1.sock").unwrap();
        assert_eq!(path.as_str(), "/tmp/gpiocast-1.sock");
        assert_eq!(path.as_path(), Path::new("/tmp/gpiocast-1.sock"));
    }

    #[test]
    fn test_invalid_socket_paths() {
        assert!(SocketPath::new("").is_err());
        assert!(SocketPath::new("/tmp/with space.sock").is_err());
        assert!(SocketPath::new("/tmp/nul\0.sock").is_err());
        assert!(SocketPath::new("/tmp/line\nbreak").is_err());
    }

    #[test]
    fn test_socket_path_length_limit() {
        let ok = format!("/{}", "a".repeat(SOCKET_PATH_MAX - 2));
        assert_eq!(ok.len(), SOCKET_PATH_MAX - 1);
        assert!(SocketPath::new(ok).is_ok());

        let too_long = format!("/{}", "a".repeat(SOCKET_PATH_MAX - 1));
        assert!(matches!(
            SocketPath::new(too_long),
            Err(HardValidationError::SocketPathTooLong { .. })
        ));
    }

    #[test]
    fn test_sequence_ordering() {
        let a = Sequence::new(10);
        let b = Sequence::new(15);
        assert!(b.is_after(a));
        assert!(!a.is_after(b));
        assert!(!a.is_after(a));
        assert_eq!(a.distance_to(b), 5);
    }

    #[test]
    fn test_sequence_ordering_across_wrap() {
        let before = Sequence::new(u32::MAX - 2);
        let after = before.advance(5);
        assert_eq!(after.value(), 2);
        assert!(after.is_after(before));
        assert!(!before.is_after(after));
        assert_eq!(before.distance_to(after), 5);
        assert_eq!(after.rewind(5), before);
    }

    #[test]
    fn test_sequence_slot() {
        assert_eq!(Sequence::new(33).slot(31), 1);
        assert_eq!(Sequence::new(u32::MAX).slot(31), 31);
        assert_eq!(Sequence::new(u32::MAX).advance(1).slot(31), 0);
    }
}
