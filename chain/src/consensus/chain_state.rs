//! In-memory chain state with reversible per-block deltas.
//!
//! Everything consensus needs to know about the active chain lives here:
//! the active block list, unspent coins, spent zerocoin serials, minted
//! commitments, accumulators and their checkpoints, and the zerocoin
//! supply. Validation reads a consistent snapshot and produces a
//! [`BlockDelta`]; [`ChainState::connect`] applies it and pushes the
//! matching undo record, [`ChainState::disconnect_tip`] pops and reverses
//! it. Nothing cryptographic is recomputed on disconnect.

use std::collections::{BTreeMap, HashMap};
use std::mem;

use num_bigint::BigUint;
use tracing::debug;

use super::config::ConsensusConfig;
use super::error::ValidationError;
use crate::types::uint::block_proof;
use crate::types::{
    Amount, Block, BlockHash, Denomination, Hash256, OutPoint, PublicCoin, ScriptKind, TxOut,
    U256,
};
use crate::validation::kernel::{self, StakeModifier};
use crate::zerocoin::AccumulatorMap;

/// An unspent output together with what maturity and staking rules need.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coin {
    pub output: TxOut,
    pub height: u32,
    pub block_time: u32,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
}

/// Per-block record of the active chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveBlock {
    pub hash: BlockHash,
    pub height: u32,
    pub version: i32,
    pub time: u32,
    pub bits: u32,
    pub proof_of_stake: bool,
    pub stake_modifier: StakeModifier,
    pub chain_work: U256,
    /// Accumulator checkpoint in force after this block.
    pub accumulator_checkpoint: Hash256,
}

/// Accumulator values the chain held when a checkpoint was first reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub height: u32,
    pub accumulators: AccumulatorMap,
}

/// Accumulator change a checkpoint block applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccumulatorUpdate {
    pub accumulators: AccumulatorMap,
    pub checkpoint: Hash256,
    /// Pending mints at or below this height are absorbed.
    pub fold_up_to: u32,
}

/// An input spent by a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpentCoin {
    pub tx_index: usize,
    pub outpoint: OutPoint,
    pub coin: Coin,
}

/// Everything connecting one block changes, computed during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockDelta {
    pub entry: ActiveBlock,
    pub spent: Vec<SpentCoin>,
    pub created: Vec<(OutPoint, Coin)>,
    /// Value entering each transaction: spent coins plus zerocoin spends.
    pub value_in: Vec<Amount>,
    pub serials: Vec<BigUint>,
    pub mints: Vec<PublicCoin>,
    pub zerocoin_supply_change: Amount,
    pub accumulator: Option<AccumulatorUpdate>,
}

struct AccumulatorUndo {
    previous: AccumulatorMap,
    previous_checkpoint: Hash256,
    folded: BTreeMap<u32, Vec<PublicCoin>>,
    inserted_checkpoint: bool,
}

struct BlockUndo {
    spent: Vec<(OutPoint, Coin)>,
    created: Vec<OutPoint>,
    serials: Vec<(BigUint, Option<u32>)>,
    mints: Vec<(BigUint, Option<u32>)>,
    accumulator: Option<AccumulatorUndo>,
    supply_change: Amount,
}

/// Active-chain state.
pub struct ChainState {
    active: Vec<ActiveBlock>,
    active_heights: HashMap<BlockHash, u32>,
    coins: HashMap<OutPoint, Coin>,
    spent_serials: HashMap<BigUint, u32>,
    mint_commitments: HashMap<BigUint, u32>,
    pending_mints: BTreeMap<u32, Vec<PublicCoin>>,
    accumulators: AccumulatorMap,
    accumulator_checkpoint: Hash256,
    checkpoints: HashMap<Hash256, CheckpointRecord>,
    zerocoin_supply: Amount,
    generation: u64,
    undo: Vec<BlockUndo>,
}

impl ChainState {
    /// Empty state; the first connected block must be genesis.
    pub fn new(config: &ConsensusConfig) -> Self {
        ChainState {
            active: Vec::new(),
            active_heights: HashMap::new(),
            coins: HashMap::new(),
            spent_serials: HashMap::new(),
            mint_commitments: HashMap::new(),
            pending_mints: BTreeMap::new(),
            accumulators: AccumulatorMap::new(config.zerocoin_params(false)),
            accumulator_checkpoint: Hash256::ZERO,
            checkpoints: HashMap::new(),
            zerocoin_supply: 0,
            generation: 0,
            undo: Vec::new(),
        }
    }

    // ---------------------------
    // Reads
    // ---------------------------

    /// Bumped by every connect and disconnect.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tip(&self) -> Option<&ActiveBlock> {
        self.active.last()
    }

    pub fn height(&self) -> Option<u32> {
        self.tip().map(|t| t.height)
    }

    pub fn block_at(&self, height: u32) -> Option<&ActiveBlock> {
        self.active.get(height as usize)
    }

    pub fn height_of(&self, hash: &BlockHash) -> Option<u32> {
        self.active_heights.get(hash).copied()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.active_heights.contains_key(hash)
    }

    /// Up to `n` active blocks ending at the tip, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ActiveBlock> {
        self.active.iter().rev().take(n)
    }

    /// Median time of the last eleven active blocks.
    pub fn median_time_past(&self) -> Option<u32> {
        let mut times: Vec<u32> = self.recent(11).map(|b| b.time).collect();
        if times.is_empty() {
            return None;
        }
        times.sort_unstable();
        Some(times[times.len() / 2])
    }

    pub fn coin(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.coins.get(outpoint)
    }

    pub fn coin_count(&self) -> usize {
        self.coins.len()
    }

    pub fn serial_spent_height(&self, serial: &BigUint) -> Option<u32> {
        self.spent_serials.get(serial).copied()
    }

    pub fn is_serial_spent(&self, serial: &BigUint) -> bool {
        self.spent_serials.contains_key(serial)
    }

    pub fn mint_height(&self, commitment: &BigUint) -> Option<u32> {
        self.mint_commitments.get(commitment).copied()
    }

    pub fn accumulators(&self) -> &AccumulatorMap {
        &self.accumulators
    }

    pub fn accumulator_checkpoint(&self) -> Hash256 {
        self.accumulator_checkpoint
    }

    pub fn checkpoint_record(&self, checkpoint: &Hash256) -> Option<&CheckpointRecord> {
        self.checkpoints.get(checkpoint)
    }

    pub fn zerocoin_supply(&self) -> Amount {
        self.zerocoin_supply
    }

    pub fn pending_mint_count(&self) -> usize {
        self.pending_mints.values().map(Vec::len).sum()
    }

    // ---------------------------
    // Delta construction
    // ---------------------------

    /// Computes the delta of connecting `block` (hashing to `hash`) on
    /// top of the current tip.
    ///
    /// Fails on inputs that are missing or spent twice and on payloads
    /// that do not decode; all other rules are left to the validators.
    pub fn prepare(
        &self,
        config: &ConsensusConfig,
        block: &Block,
        hash: BlockHash,
    ) -> Result<BlockDelta, ValidationError> {
        let parent = self.tip();
        let height = parent.map_or(0, |p| p.height + 1);
        let time = block.header.time;

        let mut spent: Vec<SpentCoin> = Vec::new();
        let mut created: Vec<(OutPoint, Coin)> = Vec::new();
        let mut created_index: HashMap<OutPoint, usize> = HashMap::new();
        let mut value_in = Vec::with_capacity(block.txs.len());
        let mut serials = Vec::new();
        let mut mints = Vec::new();
        let mut supply_change: Amount = 0;

        for (tx_index, tx) in block.txs.iter().enumerate() {
            let is_coinbase = tx_index == 0 && tx.is_coinbase();
            let mut tx_in: Amount = 0;

            if !is_coinbase {
                for input in &tx.vin {
                    if input.is_zerocoin_spend() {
                        let spend = input.coin_spend().map_err(|e| {
                            ValidationError::structural(format!("tx {tx_index}: {e}"))
                        })?;
                        let amount = spend.denomination.amount();
                        if spend.spend_type.moves_value() {
                            tx_in = tx_in.saturating_add(amount);
                            supply_change -= amount;
                        }
                        serials.push(spend.coin_serial);
                        continue;
                    }
                    let outpoint = input.prevout;
                    if spent.iter().any(|s| s.outpoint == outpoint) {
                        return Err(ValidationError::rule(format!(
                            "input {}:{} spent twice in block",
                            outpoint.txid, outpoint.vout
                        )));
                    }
                    let coin = match created_index.get(&outpoint) {
                        Some(&i) => created[i].1.clone(),
                        None => self.coins.get(&outpoint).cloned().ok_or_else(|| {
                            ValidationError::rule(format!(
                                "input {}:{} missing or spent",
                                outpoint.txid, outpoint.vout
                            ))
                        })?,
                    };
                    tx_in = tx_in.saturating_add(coin.output.value);
                    spent.push(SpentCoin {
                        tx_index,
                        outpoint,
                        coin,
                    });
                }
            }
            value_in.push(tx_in);

            // Genesis outputs never entered the coin set.
            if height == 0 {
                continue;
            }

            let txid = tx.txid();
            let is_coinstake = tx.is_coinstake();
            for (vout, output) in tx.vout.iter().enumerate() {
                match output.script_pubkey.classify() {
                    ScriptKind::ZerocoinMint(commitment) => {
                        let denomination =
                            Denomination::from_amount(output.value).ok_or_else(|| {
                                ValidationError::proof(format!(
                                    "tx {tx_index} mints {} which is not a denomination",
                                    output.value
                                ))
                            })?;
                        supply_change += output.value;
                        mints.push(PublicCoin::from_bytes_be(denomination, &commitment));
                    }
                    _ if output.is_zerocoin_mint() => {
                        return Err(ValidationError::structural(format!(
                            "tx {tx_index} output {vout}: malformed mint script"
                        )));
                    }
                    _ if output.is_empty() => {}
                    _ => {
                        let outpoint = OutPoint::new(txid, vout as u32);
                        created_index.insert(outpoint, created.len());
                        created.push((
                            outpoint,
                            Coin {
                                output: output.clone(),
                                height,
                                block_time: time,
                                is_coinbase,
                                is_coinstake,
                            },
                        ));
                    }
                }
            }
        }

        let accumulator = self.accumulator_update(config, height);
        let accumulator_checkpoint = accumulator
            .as_ref()
            .map_or(self.accumulator_checkpoint, |u| u.checkpoint);

        let entry = ActiveBlock {
            hash,
            height,
            version: block.header.version,
            time,
            bits: block.header.bits,
            proof_of_stake: block.is_proof_of_stake(),
            stake_modifier: kernel::next_stake_modifier(config, parent, height, &hash, block),
            chain_work: parent.map_or(U256::zero(), |p| p.chain_work)
                .saturating_add(block_proof(block.header.bits)),
            accumulator_checkpoint,
        };

        Ok(BlockDelta {
            entry,
            spent,
            created,
            value_in,
            serials,
            mints,
            zerocoin_supply_change: supply_change,
            accumulator,
        })
    }

    /// Accumulator state after a block at `height`, if it folds any mints.
    fn accumulator_update(&self, config: &ConsensusConfig, height: u32) -> Option<AccumulatorUpdate> {
        if !config.is_zerocoin_active(height)
            || !config.is_accumulator_checkpoint_height(height)
        {
            return None;
        }
        let fold_up_to = height.checked_sub(config.mint_required_confirmations.max(1))?;
        let mut folded = self.pending_mints.range(..=fold_up_to).peekable();
        folded.peek()?;

        let params = config.zerocoin_params(false);
        let mut accumulators = self.accumulators.clone();
        for (_, coins) in folded {
            for coin in coins {
                accumulators.accumulate(params, coin);
            }
        }
        let checkpoint = accumulators.checkpoint();
        Some(AccumulatorUpdate {
            accumulators,
            checkpoint,
            fold_up_to,
        })
    }

    // ---------------------------
    // Connect / disconnect
    // ---------------------------

    /// Applies a delta prepared against the current generation.
    pub fn connect(&mut self, delta: BlockDelta) {
        let height = delta.entry.height;

        for (outpoint, coin) in &delta.created {
            self.coins.insert(*outpoint, coin.clone());
        }
        let mut spent = Vec::with_capacity(delta.spent.len());
        for s in delta.spent {
            self.coins.remove(&s.outpoint);
            spent.push((s.outpoint, s.coin));
        }

        let serials = delta
            .serials
            .into_iter()
            .map(|serial| {
                let previous = self.spent_serials.insert(serial.clone(), height);
                (serial, previous)
            })
            .collect();

        let accumulator = delta.accumulator.map(|update| {
            let rest = self.pending_mints.split_off(&(update.fold_up_to + 1));
            let folded = mem::replace(&mut self.pending_mints, rest);
            let inserted_checkpoint = !self.checkpoints.contains_key(&update.checkpoint);
            if inserted_checkpoint {
                self.checkpoints.insert(
                    update.checkpoint,
                    CheckpointRecord {
                        height,
                        accumulators: update.accumulators.clone(),
                    },
                );
            }
            AccumulatorUndo {
                previous: mem::replace(&mut self.accumulators, update.accumulators),
                previous_checkpoint: mem::replace(
                    &mut self.accumulator_checkpoint,
                    update.checkpoint,
                ),
                folded,
                inserted_checkpoint,
            }
        });

        let mints = delta
            .mints
            .iter()
            .map(|coin| {
                let previous = self.mint_commitments.insert(coin.value.clone(), height);
                (coin.value.clone(), previous)
            })
            .collect();
        if !delta.mints.is_empty() {
            self.pending_mints.insert(height, delta.mints);
        }

        self.zerocoin_supply += delta.zerocoin_supply_change;

        self.active_heights.insert(delta.entry.hash, height);
        self.active.push(delta.entry);
        self.undo.push(BlockUndo {
            spent,
            created: delta.created.into_iter().map(|(o, _)| o).collect(),
            serials,
            mints,
            accumulator,
            supply_change: delta.zerocoin_supply_change,
        });
        self.generation += 1;
        debug!(height, generation = self.generation, "chain state connected block");
    }

    /// Reverses the most recent connect. Returns the disconnected entry.
    pub fn disconnect_tip(&mut self) -> Option<ActiveBlock> {
        let undo = self.undo.pop()?;
        let entry = self.active.pop()?;
        self.active_heights.remove(&entry.hash);

        self.zerocoin_supply -= undo.supply_change;

        self.pending_mints.remove(&entry.height);
        for (commitment, previous) in undo.mints.into_iter().rev() {
            match previous {
                Some(h) => self.mint_commitments.insert(commitment, h),
                None => self.mint_commitments.remove(&commitment),
            };
        }

        if let Some(acc) = undo.accumulator {
            if acc.inserted_checkpoint {
                self.checkpoints.remove(&self.accumulator_checkpoint);
            }
            self.accumulators = acc.previous;
            self.accumulator_checkpoint = acc.previous_checkpoint;
            self.pending_mints.extend(acc.folded);
        }

        for (serial, previous) in undo.serials.into_iter().rev() {
            match previous {
                Some(h) => self.spent_serials.insert(serial, h),
                None => self.spent_serials.remove(&serial),
            };
        }

        for (outpoint, coin) in undo.spent {
            self.coins.insert(outpoint, coin);
        }
        for outpoint in undo.created {
            self.coins.remove(&outpoint);
        }

        self.generation += 1;
        debug!(height = entry.height, generation = self.generation, "chain state disconnected block");
        Some(entry)
    }
}
