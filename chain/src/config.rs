//! Top-level configuration for a chain node.
//!
//! This module aggregates configuration for:
//!
//! - the network whose consensus rules apply (`network`),
//! - storage (RocksDB path and creation flags),
//! - metrics exporter (enable flag + listen address),
//! - the default log filter.
//!
//! Consensus parameters are not configurable: they are fixed per network
//! and looked up through [`ChainConfig::consensus`].

use std::net::SocketAddr;

use thiserror::Error;

use crate::consensus::{ConfigError, ConsensusConfig, Network};
use crate::storage::RocksDbConfig;

/// Errors raised while reading node configuration.
#[derive(Debug, Error)]
pub enum ChainConfigError {
    #[error(transparent)]
    Consensus(#[from] ConfigError),

    #[error("invalid value {value:?} for {var}")]
    InvalidVar { var: &'static str, value: String },
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9898)),
        }
    }
}

/// Top-level configuration for a chain node.
#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub network: Network,
    pub storage: RocksDbConfig,
    pub metrics: MetricsConfig,
    /// `tracing_subscriber::EnvFilter` directives used when `RUST_LOG`
    /// is unset.
    pub log_filter: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network: Network::Main,
            storage: RocksDbConfig::default(),
            metrics: MetricsConfig::default(),
            log_filter: "yoda_chain=info".to_string(),
        }
    }
}

impl ChainConfig {
    /// Reads overrides from `YODA_NETWORK`, `YODA_DATA_DIR`,
    /// `YODA_METRICS_ENABLED`, `YODA_METRICS_ADDR` and `YODA_LOG`.
    pub fn from_env() -> Result<Self, ChainConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ChainConfigError> {
        let mut cfg = ChainConfig::default();

        if let Some(network) = lookup("YODA_NETWORK") {
            cfg.network = network.parse()?;
            if cfg.network != Network::Main {
                cfg.storage.path = format!("{}-{}", cfg.storage.path, cfg.network);
            }
        }
        if let Some(path) = lookup("YODA_DATA_DIR") {
            cfg.storage.path = path;
        }
        if let Some(value) = lookup("YODA_METRICS_ENABLED") {
            cfg.metrics.enabled = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ChainConfigError::InvalidVar {
                        var: "YODA_METRICS_ENABLED",
                        value,
                    });
                }
            };
        }
        if let Some(value) = lookup("YODA_METRICS_ADDR") {
            cfg.metrics.listen_addr = value.parse().map_err(|_| ChainConfigError::InvalidVar {
                var: "YODA_METRICS_ADDR",
                value,
            })?;
        }
        if let Some(filter) = lookup("YODA_LOG") {
            cfg.log_filter = filter;
        }
        Ok(cfg)
    }

    /// Consensus rules of the configured network.
    pub fn consensus(&self) -> Result<&'static ConsensusConfig, ConfigError> {
        ConsensusConfig::for_network(self.network)
    }
}
