//! Fork-choice rule for selecting the best chain.

use crate::types::{BlockHash, U256};

use super::config::ConsensusConfig;
use super::error::ConsensusError;

/// A candidate chain tip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: BlockHash,
    pub height: u32,
    /// Cumulative work of the chain ending at this tip.
    pub chain_work: U256,
    /// Arrival order of the tip's block; lower arrived first.
    pub sequence_id: u64,
}

/// Abstraction over fork-choice rules.
pub trait ForkChoice: Send + Sync {
    /// Returns `true` if `candidate` should replace `current`.
    fn is_better(&self, candidate: &ChainTip, current: &ChainTip) -> bool;

    /// Best of `tips`, or `None` if empty.
    fn select_best_chain<'a>(&self, tips: &'a [ChainTip]) -> Option<&'a ChainTip> {
        tips.iter().fold(None, |best, tip| match best {
            Some(b) if !self.is_better(tip, b) => Some(b),
            _ => Some(tip),
        })
    }

    /// Refuses reorganizations from `tip_height` back to `fork_height`
    /// that are too deep or would replace a checkpointed block.
    ///
    /// A branch forking at the tip itself replaces nothing.
    fn check_reorg(
        &self,
        config: &ConsensusConfig,
        tip_height: u32,
        fork_height: u32,
    ) -> Result<(), ConsensusError> {
        if fork_height >= tip_height {
            return Ok(());
        }
        let depth = tip_height - fork_height;
        if depth > config.max_reorganization_depth {
            return Err(ConsensusError::ReorgDepthExceeded {
                depth,
                max: config.max_reorganization_depth,
            });
        }
        if let Some((&height, _)) = config
            .checkpoints()
            .range(fork_height + 1..=tip_height)
            .next()
        {
            return Err(ConsensusError::CheckpointViolation { height });
        }
        Ok(())
    }
}

/// Most cumulative work wins; ties go to the tip that arrived first.
///
/// Height plays no part: a shorter chain with more work beats a longer,
/// lighter one.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChainWorkForkChoice;

impl ForkChoice for ChainWorkForkChoice {
    fn is_better(&self, candidate: &ChainTip, current: &ChainTip) -> bool {
        match candidate.chain_work.cmp(&current.chain_work) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => candidate.sequence_id < current.sequence_id,
        }
    }
}
