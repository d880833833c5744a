//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed consensus metrics, and an
//! async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, header::HeaderValue,
    server::conn::http1, service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Consensus-related Prometheus metrics.
///
/// These are registered into a [`Registry`] and updated by the consensus
/// engine and the zerocoin validator.
#[derive(Clone)]
pub struct ConsensusMetrics {
    /// Latency of full block validation, in seconds.
    pub block_validation_seconds: Histogram,
    /// Time spent verifying the zerocoin spend proofs of one block.
    pub zerocoin_proof_seconds: Histogram,
    /// Rejected blocks, labelled by [`crate::ConsensusError::reason`].
    pub blocks_rejected: IntCounterVec,
    pub blocks_connected: IntCounter,
    pub reorganizations: IntCounter,
    /// Height of the active tip.
    pub chain_height: IntGauge,
}

impl ConsensusMetrics {
    /// Registers consensus metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let block_validation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_block_validation_seconds",
                "Time to validate a block in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(block_validation_seconds.clone()))?;

        // Proof checks are the slow part of validation; the buckets reach
        // further.
        let zerocoin_proof_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_zerocoin_proof_seconds",
                "Time spent verifying zerocoin spend proofs per block in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
        )?;
        registry.register(Box::new(zerocoin_proof_seconds.clone()))?;

        let blocks_rejected = IntCounterVec::new(
            Opts::new(
                "consensus_blocks_rejected",
                "Total number of rejected blocks by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(blocks_rejected.clone()))?;

        let blocks_connected = IntCounter::with_opts(Opts::new(
            "consensus_blocks_connected",
            "Total number of blocks connected to the active chain",
        ))?;
        registry.register(Box::new(blocks_connected.clone()))?;

        let reorganizations = IntCounter::with_opts(Opts::new(
            "consensus_reorganizations",
            "Total number of chain reorganizations",
        ))?;
        registry.register(Box::new(reorganizations.clone()))?;

        let chain_height = IntGauge::with_opts(Opts::new(
            "consensus_chain_height",
            "Height of the active chain tip",
        ))?;
        registry.register(Box::new(chain_height.clone()))?;

        Ok(Self {
            block_validation_seconds,
            zerocoin_proof_seconds,
            blocks_rejected,
            blocks_connected,
            reorganizations,
            chain_height,
        })
    }
}

/// Wrapper around a Prometheus registry and the consensus metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub consensus: ConsensusMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the consensus metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("yoda".to_string()), None)?;
        let consensus = ConsensusMetrics::register(&registry)?;
        Ok(Self {
            registry,
            consensus,
        })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a Tokio
/// runtime, e.g.:
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9898".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics exporter listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "metrics scrape connection");
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                warn!(error = %err, "prometheus HTTP connection failed");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), &metrics))
}

fn route(method: &Method, path: &str, metrics: &MetricsRegistry) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => {
            let mut resp = Response::new(Full::new(Bytes::from(metrics.gather_text())));
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            resp
        }
        _ => {
            let mut resp = Response::new(Full::new(Bytes::from("not found")));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            resp
        }
    }
}
