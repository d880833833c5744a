//! Storage abstraction used by the consensus engine.

use crate::types::{Block, BlockHash};

/// Abstract storage interface used by the consensus engine.
///
/// Implementations can be backed by in-memory maps, RocksDB, etc. The
/// engine keeps its chain state in memory and only needs the raw blocks,
/// the tip and a height index of the active chain so it can rebuild that
/// state on startup.
///
/// Block hashes are passed in rather than recomputed: hashing legacy
/// headers needs the network's configuration.
pub trait BlockStore: Send + Sync {
    /// Fetches a block by hash, if present.
    fn get_block(&self, hash: &BlockHash) -> Option<Block>;

    /// Persists a block under `hash`.
    fn put_block(&mut self, hash: BlockHash, block: &Block);

    /// Returns the hash of the current tip of the best chain, if any.
    fn tip(&self) -> Option<BlockHash>;

    /// Updates the current tip of the best chain.
    fn set_tip(&mut self, hash: BlockHash);

    /// Hash of the active-chain block at `height`.
    fn hash_at_height(&self, height: u32) -> Option<BlockHash>;

    /// Records (`Some`) or clears (`None`) the active block at `height`.
    fn set_active(&mut self, height: u32, hash: Option<BlockHash>);
}
