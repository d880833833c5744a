//! Consensus engine and related abstractions.
//!
//! This module provides a modular, testable consensus layer consisting of:
//!
//! - per-network parameters and derived height rules ([`config::ConsensusConfig`]),
//! - the in-memory active-chain state with reversible deltas ([`chain_state`]),
//! - difficulty retargeting ([`difficulty`]),
//! - pluggable block validators ([`validator::BlockValidator`]),
//! - pluggable fork-choice rules ([`fork_choice::ForkChoice`]),
//! - a storage abstraction ([`store::BlockStore`]), and
//! - the engine that ties them together ([`engine::ConsensusEngine`]).

pub mod chain_state;
pub mod config;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod fork_choice;
pub mod genesis;
pub mod networks;
pub mod store;
pub mod validator;

pub use chain_state::{ActiveBlock, BlockDelta, ChainState, Coin};
pub use config::{ConsensusConfig, ConsensusParams, Network};
pub use engine::{
    BlockIndexEntry, BlockStatus, ConsensusEngine, SystemTimeSource, TimeSource, ValidatedBlock,
};
pub use error::{ConfigError, ConsensusError, ValidationError};
pub use fork_choice::{ChainTip, ChainWorkForkChoice, ForkChoice};
pub use store::BlockStore;
pub use validator::{AcceptAllValidator, BlockValidator, CombinedValidator, ValidationContext};
