// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// One-shot stop flag that sleeping loops can wait on.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A panicking holder cannot leave a bool inconsistent
        self.stopped.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stop(&self) {
        *self.lock() = true;
        self.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.lock()
    }

    /// Sleep for `timeout` or until stopped. Returns true if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.lock();
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = match self.cond.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }

    /// Block until stopped.
    pub fn wait(&self) {
        let mut stopped = self.lock();
        while !*stopped {
            stopped = match self.cond.wait(stopped) {
                Ok(guard) => guard,
                Err(e) => e.into_inner(),
            };
        }
    }
}
