// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! GPIO monitor loop: samples the line and turns transitions into events.

use std::sync::Arc;

use crate::event::{EventKind, Level};
use crate::sampler::GpioSampler;
use crate::service::ServiceInner;

/// Classifies level samples into press/release transitions.
#[derive(Debug, Clone)]
pub struct PressTracker {
    active_low: bool,
    last: Option<Level>,
    failing: bool,
}

impl PressTracker {
    pub fn new(active_low: bool) -> Self {
        Self {
            active_low,
            last: None,
            failing: false,
        }
    }

    fn pressed_level(&self) -> Level {
        if self.active_low {
            Level::Low
        } else {
            Level::High
        }
    }

    /// Feed one successful sample.
    ///
    /// The first sample, and the first after a failure streak, only sets the
    /// baseline.
    pub fn observe(&mut self, level: Level) -> Option<EventKind> {
        self.failing = false;
        let previous = self.last.replace(level)?;
        if previous == level {
            return None;
        }
        if level == self.pressed_level() {
            Some(EventKind::Press)
        } else {
            Some(EventKind::Release)
        }
    }

    /// Feed one failed sample. Returns true only for the first failure of a
    /// streak.
    pub fn observe_error(&mut self) -> bool {
        self.last = None;
        !std::mem::replace(&mut self.failing, true)
    }

    pub fn is_pressed(&self) -> bool {
        self.last == Some(self.pressed_level())
    }
}

pub(crate) fn run(inner: Arc<ServiceInner>, mut sampler: Box<dyn GpioSampler>) {
    let config = &inner.config;
    let gpio = config.gpio_number;

    if config.external_events {
        tracing::debug!(gpio = gpio, "Monitor idle, events are pushed externally");
        inner.stop.wait();
        return;
    }

    if let Err(e) = sampler.prepare(gpio) {
        tracing::warn!(gpio = gpio, error = %e, "GPIO line setup failed");
    }

    let mut tracker = PressTracker::new(config.active_low);
    let poll_interval = config.poll_interval();
    tracing::info!(
        gpio = gpio,
        poll_ms = config.poll_interval_ms,
        active_low = config.active_low,
        "Monitor started"
    );

    loop {
        match sampler.read_level(gpio) {
            Ok(level) => {
                inner.store.set_level(level);
                if let Some(kind) = tracker.observe(level) {
                    inner.publish_event(kind, gpio);
                }
            }
            Err(e) => {
                if tracker.observe_error() {
                    tracing::warn!(gpio = gpio, error = %e, "GPIO read failed");
                    inner.publish_error(gpio, e.raw_os_error().unwrap_or(-1));
                }
            }
        }

        if inner.stop.wait_timeout(poll_interval) {
            break;
        }
    }

    tracing::debug!(gpio = gpio, "Monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_baseline() {
        let mut tracker = PressTracker::new(true);
        assert_eq!(tracker.observe(Level::Low), None);
        assert!(tracker.is_pressed());
        assert_eq!(tracker.observe(Level::Low), None);
    }

    #[test]
    fn test_active_low_transitions() {
        let mut tracker = PressTracker::new(true);
        tracker.observe(Level::High);
        assert_eq!(tracker.observe(Level::Low), Some(EventKind::Press));
        assert_eq!(tracker.observe(Level::Low), None);
        assert_eq!(tracker.observe(Level::High), Some(EventKind::Release));
    }

    #[test]
    fn test_active_high_transitions() {
        let mut tracker = PressTracker::new(false);
        tracker.observe(Level::Low);
        assert_eq!(tracker.observe(Level::High), Some(EventKind::Press));
        assert_eq!(tracker.observe(Level::Low), Some(EventKind::Release));
    }

    #[test]
    fn test_error_streak_reports_once_and_rebaselines() {
        let mut tracker = PressTracker::new(true);
        tracker.observe(Level::High);
        assert!(tracker.observe_error());
        assert!(!tracker.observe_error());
        assert!(!tracker.observe_error());

        // Recovery only re-establishes the baseline
        assert_eq!(tracker.observe(Level::Low), None);
        assert_eq!(tracker.observe(Level::High), Some(EventKind::Release));

        assert!(tracker.observe_error());
    }
}
