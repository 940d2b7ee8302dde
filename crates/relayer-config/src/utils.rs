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

use std::path::{Path, PathBuf};

use config::{Config, File};
use rollup_relayer_utils::Error;

use crate::RollupRelayerConfig;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> rollup_relayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(Error::from))
        .collect()
}

/// Try to parse the [`RollupRelayerConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> rollup_relayer_utils::Result<RollupRelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        // get file extension
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of ROLLUP_RELAYER).
    let builder = builder.add_source(
        config::Environment::with_prefix("ROLLUP_RELAYER").separator("_"),
    );
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        RollupRelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and
///
/// Returns `Ok(RollupRelayerConfig)` on success, or `Err(Error)` on failure.
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> rollup_relayer_utils::Result<RollupRelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: RollupRelayerConfig,
) -> rollup_relayer_utils::Result<RollupRelayerConfig> {
    tracing::trace!("Checking configration sanity ...");

    if config.l1.chain_id == config.l2.chain_id {
        return Err(Error::InvalidConfig(format!(
            "l1 and l2 share the chain id {}",
            config.l1.chain_id
        )));
    }
    for chain in [&config.l1, &config.l2] {
        let sender = &chain.sender;
        if sender.fee_bump_percent == 0 {
            return Err(Error::InvalidConfig(format!(
                "fee-bump-percent of {} must be positive",
                chain.name
            )));
        }
        if sender.fee_bump_ceiling < sender.min_fee_per_gas {
            return Err(Error::InvalidConfig(format!(
                "fee-bump-ceiling of {} is below its min-fee-per-gas",
                chain.name
            )));
        }
        if chain.max_blocks_per_step == 0 {
            return Err(Error::InvalidConfig(format!(
                "max-blocks-per-step of {} must be positive",
                chain.name
            )));
        }
        if chain.private_key.is_none() {
            tracing::warn!(
                "!!WARNING!!: no private-key configured for {}, \
                the relayer will not be able to send transactions on it",
                chain.name
            );
        }
    }
    if config.batch.batch_blocks_threshold == 0 {
        return Err(Error::InvalidConfig(
            "batch-blocks-threshold must be positive".into(),
        ));
    }
    if config.batch.max_inflight_commits == 0 {
        return Err(Error::InvalidConfig(
            "max-inflight-commits must be positive".into(),
        ));
    }

    // revert reasons are matched case-insensitively.
    for reason in config.permanent_revert_reasons.iter_mut() {
        *reason = reason.trim().to_lowercase();
    }
    config.permanent_revert_reasons.retain(|r| !r.is_empty());

    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );

    Ok(config)
}
