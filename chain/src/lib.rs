//! Chain library crate.
//!
//! This crate provides the consensus validation engine of a chain that
//! starts under proof-of-work, switches to proof-of-stake and carries a
//! zerocoin mint/spend extension:
//!
//! - strongly-typed domain types (`types`),
//! - zerocoin parameters, accumulators and proof verification (`zerocoin`),
//! - a modular consensus engine (`consensus`),
//! - block validity predicates (`validation`),
//! - storage backends (`storage`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! Higher-level binaries compose these pieces into nodes, block relays
//! and tooling.

pub mod config;
pub mod consensus;
pub mod metrics;
pub mod storage;
pub mod types;
pub mod validation;
pub mod zerocoin;

#[cfg(test)]
mod testkit;

// Re-export top-level configuration types.
pub use config::{ChainConfig, ChainConfigError, MetricsConfig};

// Re-export "core" consensus types and traits.
pub use consensus::{
    AcceptAllValidator, BlockStore, BlockValidator, ChainState, ChainTip, ChainWorkForkChoice,
    CombinedValidator, ConsensusConfig, ConsensusEngine, ConsensusError, ForkChoice, Network,
    TimeSource, ValidationError,
};

// Re-export storage backends.
pub use storage::{InMemoryBlockStore, RocksDbBlockStore, RocksDbConfig, StorageError};

// Re-export validators and their plug-in capabilities.
pub use validation::{
    BaseValidity, BlockSignatureVerifier, MasternodePaymentValidator, MasternodeRegistry,
    NoMasternodes, RequiredPayee, StakeKernelEngine, StandardValidator, ZerocoinEngine,
    standard_validator,
};
pub use zerocoin::{CommitmentOnlyVerifier, ZerocoinVerifier};

// Re-export metrics registry and consensus metrics.
pub use metrics::{ConsensusMetrics, MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Validator stack of a node without a proof library or masternode list.
pub type DefaultBlockValidator = StandardValidator<CommitmentOnlyVerifier, NoMasternodes>;

/// Type alias for the default fork-choice rule.
pub type DefaultForkChoice = ChainWorkForkChoice;

/// Type alias for the default block store backend.
pub type DefaultBlockStore = RocksDbBlockStore;

/// Type alias for the default consensus engine stack.
///
/// This uses:
///
/// - [`DefaultBlockStore`] (RocksDB),
/// - [`DefaultBlockValidator`] (full rule set),
/// - [`DefaultForkChoice`] (most cumulative work).
pub type DefaultConsensusEngine =
    ConsensusEngine<DefaultBlockStore, DefaultBlockValidator, DefaultForkChoice>;
