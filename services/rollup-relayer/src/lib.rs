// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Rollup Relayer
//!
//! Starts the long running relayer tasks against two chain clients and
//! serves their state over HTTP.

use std::path::Path;

use rollup_relayer_config::RollupRelayerConfig;

/// Relayer service wiring.
pub mod service;

pub use rollup_relayer_utils::{Error, Result};

/// Sets up the global logger, `verbosity` going from errors only (`0`) to
/// everything (`4` and up).
///
/// With the `integration-tests` feature the logs are json, which is easy
/// to parse.
pub fn setup_logger(verbosity: i32) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("rollup_relayer={log_level}").parse()?)
        .add_directive(
            format!("{}={log_level}", rollup_relayer_utils::probe::TARGET)
                .parse()?,
        );
    let logger = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter);
    #[cfg(not(feature = "integration-tests"))]
    let logger = logger.pretty();
    #[cfg(feature = "integration-tests")]
    let logger = logger.json().flatten_event(true).with_current_span(false);

    logger.try_init().map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

/// Loads the `.env` file, if any, then the configuration in `config_dir`.
///
/// Private keys given as `$VAR` may come from the `.env` file.
pub fn load_config<P: AsRef<Path>>(
    config_dir: P,
) -> Result<RollupRelayerConfig> {
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }
    let config = rollup_relayer_config::utils::load(config_dir)?;
    tracing::trace!(
        "Relayer configuration: {}",
        serde_json::to_string_pretty(&config)?
    );
    Ok(config)
}
