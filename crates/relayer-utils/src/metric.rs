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

use prometheus::core::{AtomicF64, GenericCounter, GenericGauge};
use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};

/// A struct definition for collecting metrics in the relayer.
///
/// Every instance owns its own [`Registry`], so several relayers
/// (or tests) can live in one process.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Batches whose commit transaction got confirmed.
    pub batches_committed: GenericCounter<AtomicF64>,
    /// Batches whose finalize transaction got confirmed.
    pub batches_finalized: GenericCounter<AtomicF64>,
    /// Batches given up on.
    pub batches_skipped: GenericCounter<AtomicF64>,
    /// Relay messages confirmed on the counterpart chain.
    pub messages_confirmed: GenericCounter<AtomicF64>,
    /// Relay messages that failed permanently.
    pub messages_failed: GenericCounter<AtomicF64>,
    /// Relay messages that ran out of fee bumps.
    pub messages_expired: GenericCounter<AtomicF64>,
    /// Total transactions broadcast by the relayer.
    pub total_transaction_made: GenericCounter<AtomicF64>,
    /// Fee bump replacements broadcast.
    pub transactions_bumped: GenericCounter<AtomicF64>,
    /// How many times a relayer loop backed off.
    pub relayer_back_off: GenericCounter<AtomicF64>,
    /// Bytes the store takes on disk.
    pub total_amount_of_data_stored: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("rollup_relayer".into()), None)?;
        let counter = |name: &str, help: &str| -> Result<Counter, prometheus::Error> {
            let c = Counter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        Ok(Self {
            batches_committed: counter(
                "batches_committed",
                "The total number of batches committed",
            )?,
            batches_finalized: counter(
                "batches_finalized",
                "The total number of batches finalized",
            )?,
            batches_skipped: counter(
                "batches_skipped",
                "The total number of batches skipped",
            )?,
            messages_confirmed: counter(
                "messages_confirmed",
                "The total number of relayed messages confirmed",
            )?,
            messages_failed: counter(
                "messages_failed",
                "The total number of relayed messages failed",
            )?,
            messages_expired: counter(
                "messages_expired",
                "The total number of relayed messages expired",
            )?,
            total_transaction_made: counter(
                "total_transaction_made",
                "The total number of transaction made",
            )?,
            transactions_bumped: counter(
                "transactions_bumped",
                "The total number of fee bump replacements",
            )?,
            relayer_back_off: counter(
                "relayer_back_off",
                "specifies how many times the relayer loops backed off",
            )?,
            total_amount_of_data_stored: {
                let g = Gauge::with_opts(Opts::new(
                    "total_amount_of_data_stored",
                    "The total amount of data stored on disk, in bytes",
                ))?;
                registry.register(Box::new(g.clone()))?;
                g
            },
            registry,
        })
    }

    /// Gathers the whole relayer metrics in prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_instances_do_not_collide() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.batches_committed.inc();
        assert_eq!(a.batches_committed.get(), 1.0);
        assert_eq!(b.batches_committed.get(), 0.0);
        let text = a.gather_metrics().unwrap();
        assert!(text.contains("rollup_relayer_batches_committed 1"));
    }
}
