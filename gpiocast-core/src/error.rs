//! Custom error types for gpiocast.
//!
//! This module defines explicit enum error types as per coding guidelines.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.
//!
//! Stale services and data loss are deliberately absent: they are liveness
//! and delivery notices, not failures (see `ClientNotice`).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for gpiocast.
/// All errors are explicit variants - no catch-all or generic handling.
#[derive(Debug, Error)]
pub enum GpioCastError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    // =========================================================================
    // Shared Memory Errors - fatal to init, never retried silently
    // =========================================================================
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] SharedMemoryError),

    // =========================================================================
    // Control Socket Errors
    // =========================================================================
    #[error("Control socket error: {0}")]
    Control(#[from] ControlError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl GpioCastError {
    /// True for failures a client should retry with backoff (service not up
    /// yet, registry momentarily full).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Control(e) => e.is_retryable(),
            Self::SharedMemory(e) => e.is_absent_service(),
            _ => false,
        }
    }
}

/// Hard validation errors cause immediate startup failure.
/// Used when configuration is invalid and the system cannot safely start.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Socket path too long: {len} bytes (max {max})")]
    SocketPathTooLong { len: usize, max: usize },

    #[error("Invalid socket path '{path}': {reason}")]
    InvalidSocketPath { path: String, reason: String },
}

/// Lifecycle transition errors for the service and the subscriber client.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition {component} from {from} to {to}")]
    InvalidTransition {
        component: &'static str,
        from: &'static str,
        to: &'static str,
    },

    #[error("{component} is already {state}")]
    AlreadyInState {
        component: &'static str,
        state: &'static str,
    },
}

/// Shared memory errors - critical failures with no fallback.
#[derive(Debug, Error)]
pub enum SharedMemoryError {
    #[error("Failed to create shared memory region: {name} - {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Failed to open shared memory region: {name} - {reason}")]
    OpenFailed { name: String, reason: String },

    #[error("Failed to map shared memory: {reason}")]
    MapFailed { reason: String },

    #[error("Event store {name} has bad magic {found:#010x} (service never initialized it)")]
    BadMagic { name: String, found: u32 },

    #[error("Event store {name} layout version {found}, expected {expected}")]
    VersionMismatch {
        name: String,
        found: u32,
        expected: u32,
    },

    #[error("Event store {name} belongs to a running service (started at {start_time_us}us)")]
    AlreadyRunning { name: String, start_time_us: u64 },
}

impl SharedMemoryError {
    /// True when the segment is missing or not yet initialized by a service.
    pub fn is_absent_service(&self) -> bool {
        matches!(self, Self::OpenFailed { .. } | Self::BadMagic { .. })
    }
}

/// Control socket errors (register/unregister path).
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to bind control socket {path}: {reason}")]
    Bind { path: PathBuf, reason: String },

    #[error("Cannot reach broadcast service at {path}: {reason}")]
    Connect { path: PathBuf, reason: String },

    #[error("Client registry full - retry later")]
    RegistryFull,

    #[error("Request rejected by service: {reason}")]
    Rejected { reason: String },

    #[error("Malformed control message: {line:?}")]
    Malformed { line: String },

    #[error("Control socket IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ControlError {
    /// Connect failures and a full registry are transient by nature.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::RegistryFull)
    }
}

/// Failure to wake a single subscriber. Counted against that client only.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notify socket {path} unreachable: {source}")]
    Unreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Notify send to {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using GpioCastError.
pub type GpioCastResult<T> = Result<T, GpioCastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::InvalidFieldValue {
            field: "poll_interval_ms",
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        assert!(err.to_string().contains("poll_interval_ms"));
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_error_chain() {
        let shm_err = SharedMemoryError::BadMagic {
            name: "gpio".to_string(),
            found: 0,
        };
        let err: GpioCastError = shm_err.into();
        assert!(matches!(err, GpioCastError::SharedMemory(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retry_classification() {
        let full: GpioCastError = ControlError::RegistryFull.into();
        assert!(full.is_retryable());

        let bind: GpioCastError = ControlError::Bind {
            path: PathBuf::from("/nonexistent/sock"),
            reason: "ENOENT".to_string(),
        }
        .into();
        assert!(!bind.is_retryable());
    }
}
