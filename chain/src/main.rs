// src/main.rs
//
// Node binary that wires up the chain library:
//
// - RocksDB-backed storage
// - the standard validator stack (commitment-only zerocoin checks, no
//   masternode list)
// - chain-work fork choice
// - Prometheus metrics exporter on /metrics
//
// Block relay lives outside this crate; the node opens its chain, reports
// the tip and serves metrics until interrupted.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use yoda_chain::{
    ChainConfig, ChainWorkForkChoice, CommitmentOnlyVerifier, ConsensusEngine, MetricsRegistry,
    NoMasternodes, RocksDbBlockStore, ZerocoinEngine, run_prometheus_http_server,
    standard_validator,
};

#[tokio::main]
async fn main() {
    let cfg = match ChainConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run_node(cfg).await {
        error!(error = %err, "fatal error");
        std::process::exit(1);
    }
}

async fn run_node(cfg: ChainConfig) -> Result<(), String> {
    let consensus = cfg
        .consensus()
        .map_err(|e| format!("failed to load {} consensus rules: {e}", cfg.network))?;

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                warn!(error = %e, "metrics HTTP server stopped");
            }
        });
    }

    // ---------------------------
    // Storage backend (RocksDB)
    // ---------------------------

    let store = RocksDbBlockStore::open(&cfg.storage).map_err(|e| {
        format!(
            "failed to open RocksDB store at {}: {e}",
            cfg.storage.path
        )
    })?;

    // ---------------------------
    // Validators, fork choice + engine
    // ---------------------------

    let zerocoin = ZerocoinEngine::new(CommitmentOnlyVerifier)
        .with_proof_timer(metrics.consensus.zerocoin_proof_seconds.clone());
    let validator = standard_validator(zerocoin, NoMasternodes);

    let engine = ConsensusEngine::new(consensus, store, validator, ChainWorkForkChoice)
        .map_err(|e| format!("failed to open chain: {e}"))?
        .with_metrics(metrics);

    if let Some(tip) = engine.tip() {
        info!(
            network = %cfg.network,
            height = tip.height,
            tip = %tip.hash,
            "node ready"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for shutdown signal: {e}"))?;
    info!("shutting down");
    Ok(())
}
