// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Every section and field is optional; omitted values fall back to the
//! service defaults. Any out-of-range field results in a HardValidationError
//! that prevents startup.

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GpioCastError, GpioCastResult, HardValidationError};
use crate::protocol::{
    DEFAULT_CONTROL_SOCKET, DEFAULT_HEARTBEAT_GRACE, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_MAX_CLIENTS, DEFAULT_NOTIFY_FAIL_THRESHOLD, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RECONNECT_DELAY_MS, DEFAULT_SHM_NAME,
};
use crate::types::SocketPath;

const POLL_INTERVAL_RANGE: RangeInclusive<u32> = 1..=10_000;
const HEARTBEAT_INTERVAL_RANGE: RangeInclusive<u32> = 10..=60_000;
const MAX_CLIENTS_RANGE: RangeInclusive<usize> = 1..=1024;
const NOTIFY_FAIL_THRESHOLD_RANGE: RangeInclusive<u32> = 1..=100;
const RECONNECT_DELAY_RANGE: RangeInclusive<u32> = 10..=60_000;
const HEARTBEAT_GRACE_RANGE: RangeInclusive<u32> = 1..=100;

/// Longest shared memory name accepted (NAME_MAX minus the leading slash).
const SHM_NAME_MAX: usize = 254;

/// GPIO of the main button on the reference board.
pub const DEFAULT_GPIO_NUMBER: i32 = 75;

/// Raw endpoint section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEndpointConfig {
    #[serde(default = "default_shm_name")]
    shm_name: String,
    #[serde(default = "default_control_socket")]
    control_socket: String,
}

fn default_shm_name() -> String {
    DEFAULT_SHM_NAME.to_string()
}

fn default_control_socket() -> String {
    DEFAULT_CONTROL_SOCKET.to_string()
}

impl Default for RawEndpointConfig {
    fn default() -> Self {
        Self {
            shm_name: default_shm_name(),
            control_socket: default_control_socket(),
        }
    }
}

/// Raw service section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServiceConfig {
    #[serde(default = "default_gpio_number")]
    gpio_number: i32,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u32,
    #[serde(default)]
    external_events: bool,
    #[serde(default = "default_true")]
    active_low: bool,
    #[serde(default = "default_heartbeat_interval_ms")]
    heartbeat_interval_ms: u32,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_notify_fail_threshold")]
    notify_fail_threshold: u32,
    #[serde(default = "default_sysfs_root")]
    sysfs_root: String,
}

fn default_gpio_number() -> i32 {
    DEFAULT_GPIO_NUMBER
}

fn default_poll_interval_ms() -> u32 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval_ms() -> u32 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_max_clients() -> usize {
    DEFAULT_MAX_CLIENTS
}

fn default_notify_fail_threshold() -> u32 {
    DEFAULT_NOTIFY_FAIL_THRESHOLD
}

fn default_sysfs_root() -> String {
    "/sys/class/gpio".to_string()
}

impl Default for RawServiceConfig {
    fn default() -> Self {
        Self {
            gpio_number: default_gpio_number(),
            poll_interval_ms: default_poll_interval_ms(),
            external_events: false,
            active_low: true,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_clients: default_max_clients(),
            notify_fail_threshold: default_notify_fail_threshold(),
            sysfs_root: default_sysfs_root(),
        }
    }
}

/// Raw client section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClientConfig {
    #[serde(default = "default_notify_dir")]
    notify_dir: String,
    #[serde(default = "default_reconnect_delay_ms")]
    reconnect_delay_ms: u32,
    #[serde(default = "default_heartbeat_grace")]
    heartbeat_grace: u32,
}

fn default_notify_dir() -> String {
    "/tmp".to_string()
}

fn default_reconnect_delay_ms() -> u32 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_heartbeat_grace() -> u32 {
    DEFAULT_HEARTBEAT_GRACE
}

impl Default for RawClientConfig {
    fn default() -> Self {
        Self {
            notify_dir: default_notify_dir(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_grace: default_heartbeat_grace(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    endpoint: RawEndpointConfig,
    #[serde(default)]
    service: RawServiceConfig,
    #[serde(default)]
    client: RawClientConfig,
}

/// Where the service lives: shared memory name and control socket path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub shm_name: String,
    pub control_socket: SocketPath,
}

impl EndpointConfig {
    pub fn new(
        shm_name: impl Into<String>,
        control_socket: SocketPath,
    ) -> Result<Self, HardValidationError> {
        let endpoint = Self {
            shm_name: shm_name.into(),
            control_socket,
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    pub fn validate(&self) -> Result<(), HardValidationError> {
        let name = &self.shm_name;
        let reason = if name.is_empty() {
            Some("Shared memory name cannot be empty")
        } else if name.len() > SHM_NAME_MAX {
            Some("Shared memory name is too long")
        } else if name.contains('/') || name.contains('\0') {
            Some("Shared memory name cannot contain '/' or NUL")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(HardValidationError::InvalidFieldValue {
                field: "shm_name",
                value: name.clone(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            shm_name: DEFAULT_SHM_NAME.to_string(),
            control_socket: SocketPath::new_unchecked(DEFAULT_CONTROL_SOCKET),
        }
    }
}

/// Validated broadcast service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub endpoint: EndpointConfig,
    pub gpio_number: i32,
    pub poll_interval_ms: u32,
    /// Events come only from `publish_*`; the monitor does not sample.
    pub external_events: bool,
    /// HIGH→LOW is a press (button pulls the line to ground).
    pub active_low: bool,
    pub heartbeat_interval_ms: u32,
    pub max_clients: usize,
    /// Consecutive notify failures tolerated before a client is dropped.
    pub notify_fail_threshold: u32,
    pub sysfs_root: PathBuf,
}

impl ServiceConfig {
    /// Configuration with default endpoint and timing.
    pub fn new(gpio_number: i32, poll_interval_ms: u32, external_events: bool) -> Self {
        Self {
            gpio_number,
            poll_interval_ms,
            external_events,
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, heartbeat_interval_ms: u32) -> Self {
        self.heartbeat_interval_ms = heartbeat_interval_ms;
        self
    }

    pub fn with_notify_fail_threshold(mut self, threshold: u32) -> Self {
        self.notify_fail_threshold = threshold;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms as u64)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms as u64)
    }

    pub fn validate(&self) -> Result<(), HardValidationError> {
        self.endpoint.validate()?;
        check_range("poll_interval_ms", self.poll_interval_ms, POLL_INTERVAL_RANGE)?;
        check_range(
            "heartbeat_interval_ms",
            self.heartbeat_interval_ms,
            HEARTBEAT_INTERVAL_RANGE,
        )?;
        check_range("max_clients", self.max_clients, MAX_CLIENTS_RANGE)?;
        check_range(
            "notify_fail_threshold",
            self.notify_fail_threshold,
            NOTIFY_FAIL_THRESHOLD_RANGE,
        )?;
        if self.gpio_number < 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "gpio_number",
                value: self.gpio_number.to_string(),
                reason: "GPIO number cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            gpio_number: DEFAULT_GPIO_NUMBER,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            external_events: false,
            active_low: true,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            max_clients: DEFAULT_MAX_CLIENTS,
            notify_fail_threshold: DEFAULT_NOTIFY_FAIL_THRESHOLD,
            sysfs_root: PathBuf::from(default_sysfs_root()),
        }
    }
}

/// Validated subscriber client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub endpoint: EndpointConfig,
    /// Directory for per-client notify sockets.
    pub notify_dir: PathBuf,
    /// Listener receive timeout and reconnect retry period.
    pub reconnect_delay_ms: u32,
    /// Heartbeat intervals that may pass before the service counts as stale.
    pub heartbeat_grace: u32,
}

impl ClientConfig {
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    pub fn with_notify_dir(mut self, notify_dir: impl Into<PathBuf>) -> Self {
        self.notify_dir = notify_dir.into();
        self
    }

    pub fn with_reconnect_delay_ms(mut self, reconnect_delay_ms: u32) -> Self {
        self.reconnect_delay_ms = reconnect_delay_ms;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms as u64)
    }

    pub fn validate(&self) -> Result<(), HardValidationError> {
        self.endpoint.validate()?;
        check_range(
            "reconnect_delay_ms",
            self.reconnect_delay_ms,
            RECONNECT_DELAY_RANGE,
        )?;
        check_range("heartbeat_grace", self.heartbeat_grace, HEARTBEAT_GRACE_RANGE)?;
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            notify_dir: PathBuf::from(default_notify_dir()),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            heartbeat_grace: DEFAULT_HEARTBEAT_GRACE,
        }
    }
}

/// Complete validated configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub client: ClientConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    /// Returns HardValidationError for any invalid fields.
    pub fn load_file(path: impl AsRef<Path>) -> GpioCastResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(GpioCastError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| GpioCastError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> GpioCastResult<Config> {
        // An empty document means "all defaults"
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| GpioCastError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Self::validate(raw)
    }

    /// Validate raw configuration and convert to validated types.
    fn validate(raw: RawConfig) -> GpioCastResult<Config> {
        let control_socket = SocketPath::new(&raw.endpoint.control_socket)?;
        let endpoint = EndpointConfig::new(raw.endpoint.shm_name, control_socket)?;

        let service = ServiceConfig {
            endpoint: endpoint.clone(),
            gpio_number: raw.service.gpio_number,
            poll_interval_ms: raw.service.poll_interval_ms,
            external_events: raw.service.external_events,
            active_low: raw.service.active_low,
            heartbeat_interval_ms: raw.service.heartbeat_interval_ms,
            max_clients: raw.service.max_clients,
            notify_fail_threshold: raw.service.notify_fail_threshold,
            sysfs_root: PathBuf::from(raw.service.sysfs_root),
        };
        service.validate()?;

        let client = ClientConfig {
            endpoint,
            notify_dir: PathBuf::from(raw.client.notify_dir),
            reconnect_delay_ms: raw.client.reconnect_delay_ms,
            heartbeat_grace: raw.client.heartbeat_grace,
        };
        client.validate()?;

        Ok(Config { service, client })
    }
}

fn check_range<T>(
    field: &'static str,
    value: T,
    range: RangeInclusive<T>,
) -> Result<(), HardValidationError>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        return Ok(());
    }
    Err(HardValidationError::InvalidFieldValue {
        field,
        value: value.to_string(),
        reason: format!("Must be between {} and {}", range.start(), range.end()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
endpoint:
  shm_name: test_gpio_shm
  control_socket: /tmp/test_gpio_broadcast
service:
  gpio_number: 17
  poll_interval_ms: 20
  external_events: true
  active_low: false
  heartbeat_interval_ms: 250
  max_clients: 8
  notify_fail_threshold: 5
client:
  notify_dir: /run/gpiocast
  reconnect_delay_ms: 100
  heartbeat_grace: 4
"#;

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        assert_eq!(config.service.gpio_number, 17);
        assert_eq!(config.service.poll_interval(), Duration::from_millis(20));
        assert!(config.service.external_events);
        assert!(!config.service.active_low);
        assert_eq!(config.service.max_clients, 8);
        assert_eq!(config.service.endpoint.shm_name, "test_gpio_shm");
        assert_eq!(
            config.client.endpoint.control_socket.as_str(),
            "/tmp/test_gpio_broadcast"
        );
        assert_eq!(config.client.notify_dir, PathBuf::from("/run/gpiocast"));
        assert_eq!(config.client.heartbeat_grace, 4);
    }

    #[test]
    fn test_defaults_applied() {
        let config = ConfigLoader::load_string("service:\n  gpio_number: 3\n").unwrap();
        assert_eq!(config.service.gpio_number, 3);
        assert_eq!(config.service.poll_interval_ms, 50);
        assert_eq!(config.service.heartbeat_interval_ms, 1000);
        assert_eq!(config.service.max_clients, 64);
        assert_eq!(config.service.notify_fail_threshold, 3);
        assert!(config.service.active_low);
        assert_eq!(config.service.endpoint.shm_name, "ai_gpio_event_shm");
        assert_eq!(config.client.reconnect_delay_ms, 500);
        assert_eq!(config.client.heartbeat_grace, 3);
    }

    #[test]
    fn test_empty_document() {
        let config = ConfigLoader::load_string("").unwrap();
        assert_eq!(config.service, ServiceConfig::default());
        assert_eq!(config.client, ClientConfig::default());
    }

    #[test]
    fn test_poll_interval_zero() {
        let yaml = "service:\n  poll_interval_ms: 0\n";
        let err = ConfigLoader::load_string(yaml).unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn test_max_clients_out_of_range() {
        let yaml = "service:\n  max_clients: 5000\n";
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_reconnect_delay_too_small() {
        let yaml = "client:\n  reconnect_delay_ms: 1\n";
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_control_socket_too_long() {
        let yaml = format!("endpoint:\n  control_socket: /tmp/{}\n", "s".repeat(120));
        let err = ConfigLoader::load_string(&yaml).unwrap_err();
        assert!(matches!(
            err,
            GpioCastError::HardValidation(HardValidationError::SocketPathTooLong { .. })
        ));
    }

    #[test]
    fn test_shm_name_with_slash() {
        let yaml = "endpoint:\n  shm_name: a/b\n";
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "service:\n  poll_interval: 20\n";
        assert!(matches!(
            ConfigLoader::load_string(yaml),
            Err(GpioCastError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_file("/nonexistent/gpiocast.yaml").unwrap_err();
        assert!(matches!(err, GpioCastError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gpiocast.yaml");
        std::fs::write(&path, VALID_CONFIG).unwrap();
        let config = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(config.service.gpio_number, 17);
    }

    #[test]
    fn test_programmatic_config() {
        let config = ServiceConfig::new(75, 10, true).with_max_clients(2);
        assert!(config.validate().is_ok());
        assert_eq!(config.max_clients, 2);
        assert!(ServiceConfig::new(75, 0, false).validate().is_err());
        assert!(ServiceConfig::new(-1, 10, false).validate().is_err());
    }
}
