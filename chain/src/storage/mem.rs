//! In-memory block store.
//!
//! This implementation is useful for unit tests, benchmarks, and small
//! devnets. It keeps all blocks in a `HashMap` keyed by `BlockHash`, the
//! active chain as a height-indexed `Vec`, and tracks the current tip
//! separately.

use std::collections::HashMap;

use tracing::warn;

use crate::consensus::store::BlockStore;
use crate::types::{Block, BlockHash};

/// In-memory implementation of [`BlockStore`].
#[derive(Default)]
pub struct InMemoryBlockStore {
    blocks: HashMap<BlockHash, Block>,
    active: Vec<BlockHash>,
    tip: Option<BlockHash>,
}

impl InMemoryBlockStore {
    /// Creates a new, empty in-memory block store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no blocks are stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn get_block(&self, hash: &BlockHash) -> Option<Block> {
        self.blocks.get(hash).cloned()
    }

    fn put_block(&mut self, hash: BlockHash, block: &Block) {
        self.blocks.insert(hash, block.clone());
    }

    fn tip(&self) -> Option<BlockHash> {
        self.tip
    }

    fn set_tip(&mut self, hash: BlockHash) {
        self.tip = Some(hash);
    }

    fn hash_at_height(&self, height: u32) -> Option<BlockHash> {
        self.active.get(height as usize).copied()
    }

    /// The active chain is contiguous: recording a height drops every
    /// height above it.
    fn set_active(&mut self, height: u32, hash: Option<BlockHash>) {
        self.active.truncate(height as usize);
        if let Some(hash) = hash {
            if self.active.len() == height as usize {
                self.active.push(hash);
            } else {
                warn!(height, len = self.active.len(), "active chain gap; ignoring block");
            }
        }
    }
}
