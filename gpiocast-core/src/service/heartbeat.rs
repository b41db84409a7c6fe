// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use std::sync::Arc;

use crate::event::timestamp_us;
use crate::service::ServiceInner;

/// Stamp `last_heartbeat_time` every heartbeat interval until stopped.
pub(crate) fn run(inner: Arc<ServiceInner>) {
    let interval = inner.config.heartbeat_interval();
    loop {
        inner.store.touch_heartbeat(timestamp_us());
        inner.store.set_running(true);

        if inner.stop.wait_timeout(interval) {
            break;
        }
    }
    tracing::debug!("Heartbeat stopped");
}
