//! Block validity predicates used by consensus.

use crate::types::{Block, BlockHash};

use super::chain_state::{ActiveBlock, BlockDelta, ChainState};
use super::config::ConsensusConfig;
use super::error::ValidationError;

/// Everything a predicate may consult about the block's position.
///
/// `state` is the chain state whose tip is `parent`; `delta` is what
/// connecting the block to it would change.
pub struct ValidationContext<'a> {
    pub config: &'a ConsensusConfig,
    pub state: &'a ChainState,
    pub parent: &'a ActiveBlock,
    pub delta: &'a BlockDelta,
    pub hash: BlockHash,
    pub height: u32,
    /// Network-adjusted current time, seconds since the Unix epoch.
    pub adjusted_time: i64,
}

/// Pluggable validity predicate for blocks.
///
/// Implementations must be deterministic and side-effect free: the same
/// block against the same context always yields the same verdict.
pub trait BlockValidator: Send + Sync {
    fn validate(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError>;
}

/// A trivial validator that accepts every block.
///
/// Useful for isolating the engine's chain handling in tests.
pub struct AcceptAllValidator;

impl BlockValidator for AcceptAllValidator {
    fn validate(&self, _ctx: &ValidationContext<'_>, _block: &Block) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// A validator that composes two other validators.
///
/// `CombinedValidator { first, second }` runs `first.validate` and then
/// `second.validate`, failing fast on the first error. Nest it to build
/// longer pipelines.
pub struct CombinedValidator<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> CombinedValidator<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> BlockValidator for CombinedValidator<A, B>
where
    A: BlockValidator,
    B: BlockValidator,
{
    fn validate(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError> {
        self.first.validate(ctx, block)?;
        self.second.validate(ctx, block)?;
        Ok(())
    }
}
