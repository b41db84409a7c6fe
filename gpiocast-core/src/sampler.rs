// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! GPIO line samplers used by the service monitor loop.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::event::Level;

/// Reads the current level of a GPIO line.
pub trait GpioSampler: Send + 'static {
    /// One-time line setup before the first read.
    fn prepare(&mut self, gpio_number: i32) -> io::Result<()>;

    fn read_level(&mut self, gpio_number: i32) -> io::Result<Level>;
}

/// Sampler over the legacy sysfs interface (`/sys/class/gpio/gpioN/value`).
#[derive(Debug, Clone)]
pub struct SysfsSampler {
    root: PathBuf,
}

impl SysfsSampler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn line_dir(&self, gpio_number: i32) -> PathBuf {
        self.root.join(format!("gpio{}", gpio_number))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for SysfsSampler {
    fn default() -> Self {
        Self::new("/sys/class/gpio")
    }
}

impl GpioSampler for SysfsSampler {
    fn prepare(&mut self, gpio_number: i32) -> io::Result<()> {
        let line = self.line_dir(gpio_number);
        if !line.exists() {
            std::fs::write(self.root.join("export"), gpio_number.to_string())?;
            tracing::debug!(gpio = gpio_number, "Exported GPIO line");
        }

        if let Err(e) = std::fs::write(line.join("direction"), "in") {
            // Some boards expose input-only lines without a writable direction
            tracing::warn!(gpio = gpio_number, error = %e, "Could not set GPIO direction");
        }
        Ok(())
    }

    fn read_level(&mut self, gpio_number: i32) -> io::Result<Level> {
        let raw = std::fs::read_to_string(self.line_dir(gpio_number).join("value"))?;
        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected GPIO value {:?}", other),
            )),
        }
    }
}

/// Sampler driven by the embedding program; clones share one line.
#[derive(Debug, Clone)]
pub struct ManualSampler {
    /// 0/1 for a level, a negative errno for a failing read.
    state: Arc<AtomicI32>,
}

impl ManualSampler {
    pub fn new(initial: Level) -> Self {
        Self {
            state: Arc::new(AtomicI32::new(initial.as_raw())),
        }
    }

    pub fn set_level(&self, level: Level) {
        self.state.store(level.as_raw(), Ordering::Release);
    }

    /// Make subsequent reads fail with the given OS error code.
    pub fn fail_with(&self, errno: i32) {
        self.state.store(-errno.abs().max(1), Ordering::Release);
    }
}

impl GpioSampler for ManualSampler {
    fn prepare(&mut self, _gpio_number: i32) -> io::Result<()> {
        Ok(())
    }

    fn read_level(&mut self, _gpio_number: i32) -> io::Result<Level> {
        match self.state.load(Ordering::Acquire) {
            0 => Ok(Level::Low),
            1 => Ok(Level::High),
            errno => Err(io::Error::from_raw_os_error(-errno)),
        }
    }
}
