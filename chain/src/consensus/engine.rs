//! High-level consensus engine orchestration.
//!
//! The consensus engine wires together:
//!
//! - a [`BlockStore`] for persistence,
//! - a [`BlockValidator`] holding the full rule set,
//! - a [`ForkChoice`] implementation, and
//! - the in-memory [`ChainState`] of the active chain.
//!
//! Block intake is split in two. [`ConsensusEngine::validate_block`] runs
//! under a read lock, so several blocks can be checked at once; it
//! records the chain-state generation it looked at. [`ConsensusEngine::commit`]
//! takes the write lock and refuses results computed against an older
//! generation. [`ConsensusEngine::process_block`] does both and retries
//! once when it loses that race.
//!
//! Blocks that extend the active tip are fully validated and connected.
//! Blocks on another branch only get their context-free checks until the
//! fork-choice rule prefers their branch; the engine then disconnects back
//! to the fork point and connects the branch with full validation,
//! restoring the previous chain if any branch block fails.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::metrics::MetricsRegistry;
use crate::types::uint::block_proof;
use crate::types::{Block, BlockHash, BlockHeader, U256};
use crate::validation::base::{check_header, check_structure};

use super::chain_state::{BlockDelta, ChainState};
use super::config::ConsensusConfig;
use super::error::ConsensusError;
use super::fork_choice::{ChainTip, ForkChoice};
use super::store::BlockStore;
use super::validator::{BlockValidator, ValidationContext};

/// Source of the network-adjusted time used for the future-drift rule.
pub trait TimeSource: Send + Sync {
    /// Seconds since the Unix epoch.
    fn adjusted_time(&self) -> i64;
}

/// Local wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn adjusted_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }
}

/// How far a known block got through validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockStatus {
    /// Context-free checks passed; the block was never connected.
    HeaderValid,
    /// Connected at least once with the full rule set.
    FullyValid,
    /// The block, or one of its ancestors, broke a rule.
    Failed,
}

/// Everything the engine remembers about a known block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockIndexEntry {
    pub hash: BlockHash,
    pub header: BlockHeader,
    pub height: u32,
    pub chain_work: U256,
    pub sequence_id: u64,
    pub status: BlockStatus,
}

impl BlockIndexEntry {
    pub fn as_tip(&self) -> ChainTip {
        ChainTip {
            hash: self.hash,
            height: self.height,
            chain_work: self.chain_work,
            sequence_id: self.sequence_id,
        }
    }
}

/// Outcome of [`ConsensusEngine::validate_block`], ready to commit.
#[derive(Debug)]
pub struct ValidatedBlock {
    pub hash: BlockHash,
    pub height: u32,
    pub block: Block,
    /// Present when the block extended the tip and passed every rule.
    delta: Option<BlockDelta>,
    generation: u64,
}

impl ValidatedBlock {
    /// Whether the full rule set ran, as opposed to the header checks
    /// applied to side-branch blocks.
    pub fn is_fully_validated(&self) -> bool {
        self.delta.is_some()
    }
}

struct EngineState<S> {
    store: S,
    chain: ChainState,
    index: HashMap<BlockHash, BlockIndexEntry>,
    next_sequence: u64,
}

impl<S> EngineState<S> {
    fn insert_entry(
        &mut self,
        hash: BlockHash,
        header: BlockHeader,
        height: u32,
        chain_work: U256,
        status: BlockStatus,
    ) -> ChainTip {
        let entry = BlockIndexEntry {
            hash,
            header,
            height,
            chain_work,
            sequence_id: self.next_sequence,
            status,
        };
        self.next_sequence += 1;
        let tip = entry.as_tip();
        self.index.insert(hash, entry);
        tip
    }

    fn active_tip(&self) -> Result<ChainTip, ConsensusError> {
        let tip = self
            .chain
            .tip()
            .ok_or_else(|| ConsensusError::Storage("chain state is empty".into()))?;
        self.index
            .get(&tip.hash)
            .map(BlockIndexEntry::as_tip)
            .ok_or_else(|| ConsensusError::Storage(format!("tip {} is not indexed", tip.hash)))
    }

    fn set_status(&mut self, hash: &BlockHash, status: BlockStatus) {
        if let Some(entry) = self.index.get_mut(hash) {
            entry.status = status;
        }
    }

    /// Marks `hash` and every known descendant as failed.
    fn mark_failed(&mut self, hash: BlockHash) {
        let mut failed = vec![hash];
        let mut next = 0;
        while let Some(&parent) = failed.get(next) {
            next += 1;
            failed.extend(
                self.index
                    .values()
                    .filter(|e| e.header.prev_block == parent)
                    .map(|e| e.hash),
            );
        }
        for h in &failed {
            self.set_status(h, BlockStatus::Failed);
        }
    }
}

/// Fully-configurable consensus engine.
///
/// This struct is generic over:
///
/// - `S`: storage backend implementing [`BlockStore`],
/// - `V`: block validator implementing [`BlockValidator`],
/// - `F`: fork-choice rule implementing [`ForkChoice`].
pub struct ConsensusEngine<S, V, F> {
    config: &'static ConsensusConfig,
    validator: V,
    fork_choice: F,
    clock: Box<dyn TimeSource>,
    metrics: Option<Arc<MetricsRegistry>>,
    inner: RwLock<EngineState<S>>,
}

impl<S, V, F> ConsensusEngine<S, V, F>
where
    S: BlockStore,
    V: BlockValidator,
    F: ForkChoice,
{
    /// Creates a new consensus engine.
    ///
    /// An empty store is seeded with the network's genesis block. A
    /// populated one has its active chain replayed into memory; those
    /// blocks were validated before they were stored, so only the
    /// bookkeeping in [`ChainState::prepare`] runs again.
    pub fn new(
        config: &'static ConsensusConfig,
        mut store: S,
        validator: V,
        fork_choice: F,
    ) -> Result<Self, ConsensusError> {
        let genesis_hash = config.genesis_hash();
        match store.hash_at_height(0) {
            None => {
                store.put_block(genesis_hash, config.genesis_block());
                store.set_active(0, Some(genesis_hash));
                store.set_tip(genesis_hash);
            }
            Some(stored) if stored != genesis_hash => {
                return Err(ConsensusError::Storage(format!(
                    "stored genesis {stored} is not the {} genesis {genesis_hash}",
                    config.network
                )));
            }
            Some(_) => {}
        }

        let mut state = EngineState {
            store,
            chain: ChainState::new(config),
            index: HashMap::new(),
            next_sequence: 0,
        };
        let mut height = 0;
        while let Some(hash) = state.store.hash_at_height(height) {
            let block = state.store.get_block(&hash).ok_or_else(|| {
                ConsensusError::Storage(format!("active block {hash} at height {height} is missing"))
            })?;
            let delta = state.chain.prepare(config, &block, hash)?;
            state.insert_entry(
                hash,
                block.header,
                height,
                delta.entry.chain_work,
                BlockStatus::FullyValid,
            );
            state.chain.connect(delta);
            height += 1;
        }

        let tip = state.active_tip()?;
        if state.store.tip() != Some(tip.hash) {
            warn!(tip = %tip.hash, "stored tip disagrees with the active chain; repairing");
            state.store.set_tip(tip.hash);
        }
        info!(
            network = %config.network,
            height = tip.height,
            tip = %tip.hash,
            "consensus engine ready"
        );

        Ok(Self {
            config,
            validator,
            fork_choice,
            clock: Box::new(SystemTimeSource),
            metrics: None,
            inner: RwLock::new(state),
        })
    }

    pub fn with_clock(mut self, clock: impl TimeSource + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        let height = self.inner.get_mut().chain.height().unwrap_or(0);
        metrics.consensus.chain_height.set(i64::from(height));
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &'static ConsensusConfig {
        self.config
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    // ---------------------------
    // Block intake
    // ---------------------------

    /// Checks `block` against the current chain without changing it.
    pub fn validate_block(&self, block: Block) -> Result<ValidatedBlock, ConsensusError> {
        let _timer = self
            .metrics
            .as_ref()
            .map(|m| m.consensus.block_validation_seconds.start_timer());
        let inner = self.inner.read();

        let hash = self.config.block_hash(&block.header);
        if let Some(entry) = inner.index.get(&hash) {
            return Err(match entry.status {
                BlockStatus::Failed => ConsensusError::KnownInvalid(hash),
                _ => ConsensusError::AlreadyKnown(hash),
            });
        }
        let prev = block.header.prev_block;
        let parent = inner.index.get(&prev).ok_or(ConsensusError::OrphanBlock {
            hash,
            parent: prev,
        })?;
        if parent.status == BlockStatus::Failed {
            return Err(ConsensusError::KnownInvalid(hash));
        }
        let height = parent.height + 1;
        let adjusted_time = self.clock.adjusted_time();
        let generation = inner.chain.generation();

        let delta = match inner.chain.tip() {
            Some(tip) if tip.hash == prev => {
                let delta = inner.chain.prepare(self.config, &block, hash)?;
                let ctx = ValidationContext {
                    config: self.config,
                    state: &inner.chain,
                    parent: tip,
                    delta: &delta,
                    hash,
                    height,
                    adjusted_time,
                };
                self.validator.validate(&ctx, &block)?;
                Some(delta)
            }
            _ => {
                check_structure(self.config, &block)?;
                check_header(self.config, &block, hash, height, adjusted_time)?;
                None
            }
        };
        debug!(%hash, height, full = delta.is_some(), "block validated");

        Ok(ValidatedBlock {
            hash,
            height,
            block,
            delta,
            generation,
        })
    }

    /// Stores a validated block and updates the active chain.
    pub fn commit(&self, validated: ValidatedBlock) -> Result<BlockHash, ConsensusError> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let ValidatedBlock {
            hash,
            height,
            block,
            delta,
            generation,
        } = validated;

        if inner.index.contains_key(&hash) {
            return Err(ConsensusError::AlreadyKnown(hash));
        }
        let current = inner.chain.generation();
        let extends_tip = inner
            .chain
            .tip()
            .is_some_and(|t| t.hash == block.header.prev_block);
        let stale = match delta {
            Some(_) => generation != current,
            None => extends_tip,
        };
        if stale {
            return Err(ConsensusError::StaleValidation {
                checked: generation,
                current,
            });
        }
        let parent_work = inner
            .index
            .get(&block.header.prev_block)
            .map(|p| p.chain_work)
            .ok_or(ConsensusError::OrphanBlock {
                hash,
                parent: block.header.prev_block,
            })?;

        inner.store.put_block(hash, &block);
        match delta {
            Some(delta) => {
                inner.insert_entry(
                    hash,
                    block.header,
                    height,
                    delta.entry.chain_work,
                    BlockStatus::FullyValid,
                );
                inner.chain.connect(delta);
                inner.store.set_active(height, Some(hash));
                inner.store.set_tip(hash);
                self.record_connected(1, height);
                info!(%hash, height, "connected block");
            }
            None => {
                let work = parent_work.saturating_add(block_proof(block.header.bits));
                let candidate =
                    inner.insert_entry(hash, block.header, height, work, BlockStatus::HeaderValid);
                let current_tip = inner.active_tip()?;
                if self.fork_choice.is_better(&candidate, &current_tip) {
                    self.reorganize(inner, &candidate)?;
                } else {
                    debug!(%hash, height, "stored side-branch block");
                }
            }
        }
        Ok(hash)
    }

    /// Validates and commits `block`. This is the entry point for blocks
    /// received from the network or produced locally.
    pub fn process_block(&self, block: Block) -> Result<BlockHash, ConsensusError> {
        let mut retried = false;
        loop {
            match self
                .validate_block(block.clone())
                .and_then(|validated| self.commit(validated))
            {
                Ok(hash) => return Ok(hash),
                Err(ConsensusError::StaleValidation { checked, current }) if !retried => {
                    debug!(checked, current, "chain moved during validation; retrying");
                    retried = true;
                }
                Err(err) => {
                    self.reject(&block, &err);
                    return Err(err);
                }
            }
        }
    }

    fn reject(&self, block: &Block, err: &ConsensusError) {
        if let Some(m) = &self.metrics {
            m.consensus
                .blocks_rejected
                .with_label_values(&[err.reason()])
                .inc();
        }
        let hash = self.config.block_hash(&block.header);
        match err {
            ConsensusError::Validation(_) => {
                warn!(%hash, reason = err.reason(), error = %err, "block rejected");
                // A block ahead of our clock may become acceptable later.
                if i64::from(block.header.time) > self.clock.adjusted_time() {
                    return;
                }
                let mut inner = self.inner.write();
                if inner.index.contains_key(&hash) {
                    return;
                }
                let Some((height, work)) = inner.index.get(&block.header.prev_block).map(|p| {
                    (
                        p.height + 1,
                        p.chain_work.saturating_add(block_proof(block.header.bits)),
                    )
                }) else {
                    return;
                };
                inner.insert_entry(hash, block.header.clone(), height, work, BlockStatus::Failed);
            }
            ConsensusError::AlreadyKnown(_) | ConsensusError::OrphanBlock { .. } => {
                debug!(%hash, error = %err, "block not accepted");
            }
            _ => warn!(%hash, reason = err.reason(), error = %err, "block not accepted"),
        }
    }

    // ---------------------------
    // Reorganization
    // ---------------------------

    fn reorganize(
        &self,
        inner: &mut EngineState<S>,
        candidate: &ChainTip,
    ) -> Result<(), ConsensusError> {
        let mut branch = Vec::new();
        let mut cursor = candidate.hash;
        while !inner.chain.contains(&cursor) {
            let entry = inner.index.get(&cursor).ok_or_else(|| {
                ConsensusError::Storage(format!("block {cursor} is missing from the index"))
            })?;
            branch.push(cursor);
            cursor = entry.header.prev_block;
        }
        branch.reverse();
        let fork_height = inner
            .chain
            .height_of(&cursor)
            .ok_or_else(|| ConsensusError::Storage(format!("fork point {cursor} is not active")))?;
        let tip_height = inner.chain.height().unwrap_or(0);
        self.fork_choice
            .check_reorg(self.config, tip_height, fork_height)?;

        let mut detached = Vec::new();
        while inner.chain.height().is_some_and(|h| h > fork_height) {
            if let Some(entry) = inner.chain.disconnect_tip() {
                detached.push(entry.hash);
            }
        }

        for hash in &branch {
            if let Err(err) = self.connect_stored(inner, *hash, true) {
                warn!(%hash, error = %err, "reorganization failed; restoring previous chain");
                if matches!(err, ConsensusError::Validation(_)) {
                    inner.mark_failed(*hash);
                }
                while inner.chain.height().is_some_and(|h| h > fork_height) {
                    inner.chain.disconnect_tip();
                }
                for old in detached.iter().rev() {
                    self.connect_stored(inner, *old, false)?;
                }
                return Err(err);
            }
        }

        for height in (fork_height + 1..=tip_height).rev() {
            inner.store.set_active(height, None);
        }
        for (offset, hash) in branch.iter().enumerate() {
            inner
                .store
                .set_active(fork_height + 1 + offset as u32, Some(*hash));
            inner.set_status(hash, BlockStatus::FullyValid);
        }
        inner.store.set_tip(candidate.hash);

        if let Some(m) = &self.metrics {
            m.consensus.reorganizations.inc();
        }
        self.record_connected(branch.len(), candidate.height);
        info!(
            depth = tip_height - fork_height,
            fork_height,
            tip = %candidate.hash,
            height = candidate.height,
            "reorganized to a heavier chain"
        );
        Ok(())
    }

    /// Connects a stored block on top of the current tip, running the
    /// validators when `validate` is set.
    fn connect_stored(
        &self,
        inner: &mut EngineState<S>,
        hash: BlockHash,
        validate: bool,
    ) -> Result<(), ConsensusError> {
        let block = inner
            .store
            .get_block(&hash)
            .ok_or_else(|| ConsensusError::Storage(format!("block {hash} is missing from the store")))?;
        let delta = inner.chain.prepare(self.config, &block, hash)?;
        if validate {
            let parent = inner
                .chain
                .tip()
                .ok_or_else(|| ConsensusError::Storage("chain state is empty".into()))?;
            let ctx = ValidationContext {
                config: self.config,
                state: &inner.chain,
                parent,
                delta: &delta,
                hash,
                height: delta.entry.height,
                adjusted_time: self.clock.adjusted_time(),
            };
            self.validator.validate(&ctx, &block)?;
        }
        inner.chain.connect(delta);
        Ok(())
    }

    fn record_connected(&self, blocks: usize, height: u32) {
        if let Some(m) = &self.metrics {
            m.consensus.blocks_connected.inc_by(blocks as u64);
            m.consensus.chain_height.set(i64::from(height));
        }
    }

    /// Disconnects the active tip, making its parent the tip again.
    ///
    /// Checkpointed blocks, genesis included, cannot be disconnected.
    pub fn disconnect_tip(&self) -> Result<BlockHash, ConsensusError> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let height = inner
            .chain
            .height()
            .ok_or_else(|| ConsensusError::Storage("chain state is empty".into()))?;
        if height == 0 || self.config.checkpoint(height).is_some() {
            return Err(ConsensusError::CheckpointViolation { height });
        }
        let entry = inner
            .chain
            .disconnect_tip()
            .ok_or_else(|| ConsensusError::Storage("no block to disconnect".into()))?;
        let parent = inner.active_tip()?;
        inner.store.set_active(height, None);
        inner.store.set_tip(parent.hash);
        if let Some(m) = &self.metrics {
            m.consensus.chain_height.set(i64::from(parent.height));
        }
        info!(hash = %entry.hash, height, "disconnected tip");
        Ok(entry.hash)
    }

    // ---------------------------
    // Queries
    // ---------------------------

    pub fn tip(&self) -> Option<ChainTip> {
        self.inner.read().active_tip().ok()
    }

    pub fn height(&self) -> u32 {
        self.inner.read().chain.height().unwrap_or(0)
    }

    pub fn block_index(&self, hash: &BlockHash) -> Option<BlockIndexEntry> {
        self.inner.read().index.get(hash).cloned()
    }

    pub fn get_block(&self, hash: &BlockHash) -> Option<Block> {
        self.inner.read().store.get_block(hash)
    }

    /// Whether `serial` is spent on the active chain.
    pub fn is_serial_spent(&self, serial: &BigUint) -> bool {
        self.inner.read().chain.is_serial_spent(serial)
    }

    /// Runs `f` against a consistent view of the active chain.
    pub fn with_state<T>(&self, f: impl FnOnce(&ChainState) -> T) -> T {
        f(&self.inner.read().chain)
    }

    /// Leaves of the block tree that are not known to be invalid.
    pub fn candidate_tips(&self) -> Vec<ChainTip> {
        let inner = self.inner.read();
        let live = || {
            inner
                .index
                .values()
                .filter(|e| e.status != BlockStatus::Failed)
        };
        let parents: HashSet<BlockHash> = live().map(|e| e.header.prev_block).collect();
        live()
            .filter(|e| !parents.contains(&e.hash))
            .map(BlockIndexEntry::as_tip)
            .collect()
    }

    /// Best of [`Self::candidate_tips`] under the fork-choice rule.
    pub fn select_best_chain(&self) -> Option<ChainTip> {
        let tips = self.candidate_tips();
        self.fork_choice.select_best_chain(&tips).cloned()
    }

    /// Consumes the engine, handing back its store.
    pub fn into_store(self) -> S {
        self.inner.into_inner().store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    use crate::consensus::config::ConsensusParams;
    use crate::consensus::fork_choice::ChainWorkForkChoice;
    use crate::storage::InMemoryBlockStore;
    use crate::testkit::{self, FixedRegistry, TestChain, TestValidator};
    use crate::types::Hash256;
    use crate::validation::signature::sign_hash;

    struct FixedTime(i64);

    impl TimeSource for FixedTime {
        fn adjusted_time(&self) -> i64 {
            self.0
        }
    }

    const NOW: i64 = u32::MAX as i64;

    type TestEngine = ConsensusEngine<InMemoryBlockStore, TestValidator, ChainWorkForkChoice>;

    static SHALLOW: Lazy<ConsensusConfig> = Lazy::new(|| {
        ConsensusConfig::build(ConsensusParams {
            max_reorganization_depth: 2,
            ..testkit::base_params()
        })
        .expect("shallow config")
    });

    fn engine_with_store(config: &'static ConsensusConfig, store: InMemoryBlockStore) -> TestEngine {
        ConsensusEngine::new(
            config,
            store,
            testkit::test_validator(FixedRegistry::default()),
            ChainWorkForkChoice,
        )
        .expect("engine")
        .with_clock(FixedTime(NOW))
    }

    fn engine_for(chain: &TestChain) -> TestEngine {
        engine_with_store(chain.config(), InMemoryBlockStore::new())
    }

    fn feed(engine: &TestEngine, blocks: &[Block]) {
        for block in blocks {
            engine.process_block(block.clone()).expect("block accepted");
        }
    }

    fn tagged(tag: i64, config: &'static ConsensusConfig, blocks: u32) -> TestChain {
        let mut chain = TestChain::with_config(config);
        chain.set_tag(tag);
        chain.mine_pow_blocks(blocks);
        chain
    }

    /// Copy of `block` whose signature covers something else.
    fn badly_signed(chain: &TestChain, mut block: Block) -> Block {
        block.signature =
            sign_hash(&Hash256::sha256d(b"not the block"), &chain.keys().staker).expect("sign");
        block
    }

    #[test]
    fn new_engine_starts_at_genesis() {
        let chain = TestChain::new();
        let engine = engine_for(&chain);
        let genesis = chain.config().genesis_hash();

        let tip = engine.tip().expect("tip");
        assert_eq!(tip.hash, genesis);
        assert_eq!(engine.height(), 0);
        assert_eq!(
            engine.block_index(&genesis).map(|e| e.status),
            Some(BlockStatus::FullyValid)
        );
        assert!(engine.get_block(&genesis).is_some());
    }

    #[test]
    fn blocks_extend_the_active_chain() {
        let chain = tagged(0, testkit::config(), 4);
        let engine = engine_for(&chain);
        feed(&engine, &chain.blocks()[1..]);

        let last = chain.blocks().last().expect("blocks");
        assert_eq!(engine.tip().map(|t| t.hash), Some(chain.hash(last)));
        assert_eq!(engine.height(), 4);
        let outpoint = chain.coinbase_outpoint(4);
        assert!(engine.with_state(|s| s.coin(&outpoint).is_some()));
    }

    #[test]
    fn known_and_orphan_blocks_are_reported() {
        let chain = tagged(0, testkit::config(), 2);
        let engine = engine_for(&chain);
        let blocks = chain.blocks();

        let orphan = engine
            .process_block(blocks[2].clone())
            .expect_err("parent unknown");
        assert_eq!(
            orphan,
            ConsensusError::OrphanBlock {
                hash: chain.hash(&blocks[2]),
                parent: chain.hash(&blocks[1]),
            }
        );

        feed(&engine, &blocks[1..]);
        assert_eq!(
            engine.process_block(blocks[2].clone()),
            Err(ConsensusError::AlreadyKnown(chain.hash(&blocks[2])))
        );
    }

    #[test]
    fn invalid_blocks_are_remembered() {
        let chain = TestChain::new();
        let metrics = Arc::new(MetricsRegistry::new().expect("metrics"));
        let engine = engine_for(&chain).with_metrics(metrics.clone());
        let block = badly_signed(&chain, chain.next_pow_block(Vec::new()));
        let hash = chain.hash(&block);

        let err = engine.process_block(block.clone()).expect_err("bad signature");
        assert!(matches!(err, ConsensusError::Validation(_)));
        assert_eq!(
            engine.process_block(block),
            Err(ConsensusError::KnownInvalid(hash))
        );
        assert_eq!(engine.height(), 0);
        assert_eq!(
            metrics
                .consensus
                .blocks_rejected
                .with_label_values(&[err.reason()])
                .get(),
            1
        );
    }

    #[test]
    fn heavier_branch_triggers_a_reorganization() {
        let a = tagged(0, testkit::config(), 3);
        let b = tagged(1, testkit::config(), 5);
        let metrics = Arc::new(MetricsRegistry::new().expect("metrics"));
        let engine = engine_for(&a).with_metrics(metrics.clone());
        feed(&engine, &a.blocks()[1..]);

        // Equal work keeps the branch seen first.
        feed(&engine, &b.blocks()[1..=3]);
        assert_eq!(engine.tip().map(|t| t.hash), Some(a.hash(&a.blocks()[3])));
        assert_eq!(
            engine.block_index(&b.hash(&b.blocks()[3])).map(|e| e.status),
            Some(BlockStatus::HeaderValid)
        );

        feed(&engine, &b.blocks()[4..]);
        assert_eq!(engine.tip().map(|t| t.hash), Some(b.hash(&b.blocks()[5])));
        assert_eq!(engine.height(), 5);
        assert_eq!(metrics.consensus.reorganizations.get(), 1);
        assert_eq!(metrics.consensus.chain_height.get(), 5);

        let (old, new) = (a.coinbase_outpoint(2), b.coinbase_outpoint(2));
        assert!(engine.with_state(|s| s.coin(&old).is_none() && s.coin(&new).is_some()));
        assert_eq!(engine.select_best_chain().map(|t| t.height), Some(5));

        let store = engine.into_store();
        assert_eq!(store.hash_at_height(3), Some(b.hash(&b.blocks()[3])));
        assert_eq!(store.tip(), Some(b.hash(&b.blocks()[5])));
    }

    #[test]
    fn reorganizations_are_bounded_by_depth() {
        let a = tagged(0, &SHALLOW, 3);
        let b = tagged(1, &SHALLOW, 5);
        let engine = engine_for(&a);
        feed(&engine, &a.blocks()[1..]);
        feed(&engine, &b.blocks()[1..=3]);

        assert_eq!(
            engine.process_block(b.blocks()[4].clone()),
            Err(ConsensusError::ReorgDepthExceeded { depth: 3, max: 2 })
        );
        assert_eq!(engine.tip().map(|t| t.hash), Some(a.hash(&a.blocks()[3])));
    }

    #[test]
    fn invalid_branch_is_rolled_back() {
        let a = tagged(0, testkit::config(), 3);
        let mut b = tagged(1, testkit::config(), 1);
        let bad = badly_signed(&b, b.next_pow_block(Vec::new()));
        b.force_connect(bad);
        b.mine_pow_blocks(3);

        let engine = engine_for(&a);
        feed(&engine, &a.blocks()[1..]);
        feed(&engine, &b.blocks()[1..=3]);

        let err = engine
            .process_block(b.blocks()[4].clone())
            .expect_err("branch contains a bad block");
        assert!(matches!(err, ConsensusError::Validation(_)));
        assert_eq!(engine.tip().map(|t| t.hash), Some(a.hash(&a.blocks()[3])));
        let outpoint = a.coinbase_outpoint(3);
        assert!(engine.with_state(|s| s.coin(&outpoint).is_some()));

        for height in 2..=4 {
            let hash = b.hash(&b.blocks()[height]);
            assert_eq!(
                engine.block_index(&hash).map(|e| e.status),
                Some(BlockStatus::Failed)
            );
        }
        assert_eq!(
            engine.process_block(b.blocks()[5].clone()),
            Err(ConsensusError::KnownInvalid(b.hash(&b.blocks()[5])))
        );
    }

    #[test]
    fn stale_validation_is_refused_at_commit() {
        let a = TestChain::new();
        let mut b = TestChain::new();
        b.set_tag(1);
        let engine = engine_for(&a);
        let x = a.next_pow_block(Vec::new());
        let y = b.next_pow_block(Vec::new());

        let validated = engine.validate_block(x.clone()).expect("valid");
        assert!(validated.is_fully_validated());
        engine.process_block(y.clone()).expect("y");
        assert!(matches!(
            engine.commit(validated),
            Err(ConsensusError::StaleValidation { .. })
        ));

        // Resubmitted, it is now a side-branch block of equal work.
        engine.process_block(x).expect("x as side branch");
        assert_eq!(engine.tip().map(|t| t.hash), Some(b.hash(&y)));
        assert_eq!(engine.candidate_tips().len(), 2);
    }

    #[test]
    fn disconnect_stops_at_checkpoints() {
        let chain = tagged(0, testkit::config(), 3);
        let blocks = chain.blocks();
        let engine = engine_for(&chain);
        feed(&engine, &blocks[1..=2]);

        assert_eq!(engine.disconnect_tip(), Ok(chain.hash(&blocks[2])));
        assert_eq!(engine.height(), 1);

        // Building on the detached block makes its branch heavier again.
        engine.process_block(blocks[3].clone()).expect("reconnect");
        assert_eq!(engine.tip().map(|t| t.hash), Some(chain.hash(&blocks[3])));

        for _ in 0..3 {
            engine.disconnect_tip().expect("disconnect");
        }
        assert_eq!(
            engine.disconnect_tip(),
            Err(ConsensusError::CheckpointViolation { height: 0 })
        );
    }

    #[test]
    fn child_of_a_detached_tip_reconnects_its_branch() {
        let chain = tagged(0, testkit::config(), 4);
        let blocks = chain.blocks();
        let store = InMemoryBlockStore::new();
        let engine = engine_with_store(chain.config(), store);
        feed(&engine, &blocks[1..=3]);

        engine.disconnect_tip().expect("disconnect 3");
        engine.disconnect_tip().expect("disconnect 2");
        assert_eq!(engine.height(), 1);

        // Forks at the current tip: nothing is replaced.
        engine.process_block(blocks[4].clone()).expect("reconnect");
        assert_eq!(engine.height(), 4);
        assert_eq!(engine.tip().map(|t| t.hash), Some(chain.hash(&blocks[4])));
        for height in 2..=4 {
            assert_eq!(
                engine.block_index(&chain.hash(&blocks[height])).map(|e| e.status),
                Some(BlockStatus::FullyValid)
            );
        }

        let store = engine.into_store();
        for height in 0..=4u32 {
            assert_eq!(
                store.hash_at_height(height),
                Some(chain.hash(&blocks[height as usize]))
            );
        }
        assert_eq!(store.tip(), Some(chain.hash(&blocks[4])));
    }

    #[test]
    fn restart_replays_the_active_chain() {
        let chain = tagged(0, testkit::config(), 3);
        let engine = engine_for(&chain);
        feed(&engine, &chain.blocks()[1..]);
        let tip = engine.tip();

        let restarted = engine_with_store(chain.config(), engine.into_store());
        assert_eq!(restarted.tip(), tip);
        assert_eq!(restarted.height(), 3);
        let outpoint = chain.coinbase_outpoint(3);
        assert!(restarted.with_state(|s| s.coin(&outpoint).is_some()));
    }

    #[test]
    fn foreign_genesis_is_refused() {
        let mut store = InMemoryBlockStore::new();
        let bogus = BlockHash(Hash256([7; 32]));
        store.set_active(0, Some(bogus));
        let result = ConsensusEngine::new(
            testkit::config(),
            store,
            testkit::test_validator(FixedRegistry::default()),
            ChainWorkForkChoice,
        );
        assert!(matches!(result, Err(ConsensusError::Storage(_))));
    }

    #[test]
    fn blocks_validate_concurrently() {
        let blocks: Vec<(BlockHash, Block)> = (1..=4)
            .map(|tag| {
                let mut chain = TestChain::new();
                chain.set_tag(tag);
                let block = chain.next_pow_block(Vec::new());
                (chain.hash(&block), block)
            })
            .collect();
        let engine = engine_for(&TestChain::new());

        std::thread::scope(|s| {
            for (_, block) in &blocks {
                let engine = &engine;
                s.spawn(move || {
                    let validated = engine.validate_block(block.clone()).expect("valid");
                    assert!(validated.is_fully_validated());
                });
            }
        });

        for (_, block) in &blocks {
            engine.process_block(block.clone()).expect("accepted");
        }
        assert_eq!(engine.tip().map(|t| t.hash), Some(blocks[0].0));
        assert_eq!(engine.candidate_tips().len(), blocks.len());
    }
}
