use thiserror::Error;

use crate::types::BlockHash;

/// Error returned when a block or transaction fails a validity predicate.
///
/// Every variant is final for the chain state it was produced against:
/// re-validating the same block on the same parent yields the same error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Malformed header, transaction or script.
    #[error("malformed block: {0}")]
    Structural(String),

    /// Wrong difficulty, bad kernel, bad signature, stale version and
    /// every other consensus rule.
    #[error("consensus rule violated: {0}")]
    ConsensusRule(String),

    /// A zerocoin commitment or spend proof failed verification.
    #[error("zerocoin proof invalid: {0}")]
    ZerocoinProofInvalid(String),

    /// A serial number that is already spent (or spent twice in the block).
    #[error("double spend of zerocoin serial {serial}")]
    DoubleSpend { serial: String },

    /// The block hash disagrees with a hard-coded checkpoint.
    #[error("block {hash} conflicts with checkpoint at height {height}")]
    CheckpointViolation { height: u32, hash: BlockHash },
}

impl ValidationError {
    pub fn structural(msg: impl Into<String>) -> Self {
        ValidationError::Structural(msg.into())
    }

    pub fn rule(msg: impl Into<String>) -> Self {
        ValidationError::ConsensusRule(msg.into())
    }

    pub fn proof(msg: impl Into<String>) -> Self {
        ValidationError::ZerocoinProofInvalid(msg.into())
    }

    /// Stable label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::Structural(_) => "structural",
            ValidationError::ConsensusRule(_) => "consensus_rule",
            ValidationError::ZerocoinProofInvalid(_) => "zerocoin_proof",
            ValidationError::DoubleSpend { .. } => "double_spend",
            ValidationError::CheckpointViolation { .. } => "checkpoint",
        }
    }
}

/// Errors raised while building a network's consensus configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown network {0:?} (expected main, test or regtest)")]
    UnknownNetwork(String),

    #[error("zerocoin modulus is not valid {0}")]
    Modulus(&'static str),

    #[error("invalid hash constant {name}: {value}")]
    BadConstant { name: &'static str, value: String },

    #[error("{network} genesis {what} mismatch: computed {computed}, expected {expected}")]
    GenesisMismatch {
        network: String,
        what: &'static str,
        computed: String,
        expected: String,
    },

    #[error("inconsistent parameters: {0}")]
    Parameters(String),
}

/// High-level errors that can occur in the consensus engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Underlying validation failure.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("reorganization of {depth} blocks exceeds the maximum of {max}")]
    ReorgDepthExceeded { depth: u32, max: u32 },

    #[error("reorganization would replace checkpointed block at height {height}")]
    CheckpointViolation { height: u32 },

    /// The rule set itself is broken; the process must not continue.
    #[error("configuration inconsistency: {0}")]
    ConfigInconsistency(#[from] ConfigError),

    /// Storage-related failure, e.g. a missing ancestor.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("orphan block {hash}: parent {parent} is unknown")]
    OrphanBlock { hash: BlockHash, parent: BlockHash },

    #[error("block {0} is already known")]
    AlreadyKnown(BlockHash),

    #[error("block {0} was previously rejected")]
    KnownInvalid(BlockHash),

    /// The chain state moved on between validation and commit.
    #[error("validation ran against generation {checked}, state is at {current}")]
    StaleValidation { checked: u64, current: u64 },
}

impl ConsensusError {
    /// Stable label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ConsensusError::Validation(e) => e.reason(),
            ConsensusError::ReorgDepthExceeded { .. } => "reorg_depth",
            ConsensusError::CheckpointViolation { .. } => "checkpoint",
            ConsensusError::ConfigInconsistency(_) => "config",
            ConsensusError::Storage(_) => "storage",
            ConsensusError::OrphanBlock { .. } => "orphan",
            ConsensusError::AlreadyKnown(_) => "already_known",
            ConsensusError::KnownInvalid(_) => "known_invalid",
            ConsensusError::StaleValidation { .. } => "stale",
        }
    }
}
