// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod serve;
pub mod status;
pub mod validate;
pub mod watch;

use gpiocast_core::{Config, ConfigLoader, GpioCastResult};

/// Load the configuration file if one was given, otherwise use defaults.
pub fn load_config(path: Option<&str>) -> GpioCastResult<Config> {
    match path {
        Some(path) => {
            tracing::debug!(config = %path, "Loading configuration");
            ConfigLoader::load_file(path)
        }
        None => Ok(Config::default()),
    }
}
