//! Base validity predicate for blocks.
//!
//! This validator enforces the structural, header and value rules every
//! block must satisfy regardless of how it was produced:
//!
//! - transaction layout, merkle root and money range,
//! - minimum header version and the version supermajority,
//! - timestamps, difficulty bits and (for PoW heights) the header hash,
//! - hard-coded checkpoints and header accumulator checkpoints,
//! - coinbase/coinstake maturity and no value creation.
//!
//! [`check_structure`] and [`check_header`] only need the block, its
//! height and the clock, so side-branch blocks are screened with them
//! before their parent state is available.

use std::collections::HashSet;

use crate::consensus::config::ConsensusConfig;
use crate::consensus::difficulty;
use crate::consensus::error::ValidationError;
use crate::consensus::validator::{BlockValidator, ValidationContext};
use crate::types::uint::decode_compact;
use crate::types::{Block, BlockHash, OutPoint, Txid, money_range};

/// Base validity predicate for blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct BaseValidity;

impl BaseValidity {
    pub fn new() -> Self {
        BaseValidity
    }
}

/// Block-local layout rules.
pub fn check_structure(config: &ConsensusConfig, block: &Block) -> Result<(), ValidationError> {
    let coinbase = block
        .txs
        .first()
        .ok_or_else(|| ValidationError::structural("block has no transactions"))?;
    if !coinbase.is_coinbase() {
        return Err(ValidationError::structural("first transaction is not a coinbase"));
    }
    let script_len = coinbase.vin[0].script_sig.len();
    if !(2..=100).contains(&script_len) {
        return Err(ValidationError::structural(format!(
            "coinbase script length {script_len} outside 2..=100"
        )));
    }

    let proof_of_stake = block.is_proof_of_stake();
    if proof_of_stake && (coinbase.vout.len() != 1 || !coinbase.vout[0].is_empty()) {
        return Err(ValidationError::structural(
            "coinbase of a proof-of-stake block must pay nothing",
        ));
    }

    let mut txids: HashSet<Txid> = HashSet::with_capacity(block.txs.len());
    for (i, tx) in block.txs.iter().enumerate() {
        if i > 0 && tx.is_coinbase() {
            return Err(ValidationError::structural(format!("tx {i} is a second coinbase")));
        }
        if tx.is_coinstake() && !(i == 1 && proof_of_stake) {
            return Err(ValidationError::structural(format!("coinstake at position {i}")));
        }
        if tx.vin.is_empty() || tx.vout.is_empty() {
            return Err(ValidationError::structural(format!("tx {i} has no inputs or outputs")));
        }

        let mut total: i64 = 0;
        for out in &tx.vout {
            if !money_range(out.value, config.max_money_out) {
                return Err(ValidationError::structural(format!(
                    "tx {i} output value {} out of range",
                    out.value
                )));
            }
            total = total.saturating_add(out.value);
            if !money_range(total, config.max_money_out) {
                return Err(ValidationError::structural(format!("tx {i} total output out of range")));
            }
        }

        if i > 0 {
            let mut prevouts: HashSet<OutPoint> = HashSet::new();
            for input in tx.vin.iter().filter(|i| !i.is_zerocoin_spend()) {
                if input.prevout.is_null() {
                    return Err(ValidationError::structural(format!("tx {i} has a null input")));
                }
                if !prevouts.insert(input.prevout) {
                    return Err(ValidationError::structural(format!("tx {i} spends an input twice")));
                }
            }
        }

        if !txids.insert(tx.txid()) {
            return Err(ValidationError::structural(format!("duplicate transaction at {i}")));
        }
    }

    let (root, mutated) = block.compute_merkle_root();
    if mutated {
        return Err(ValidationError::structural("merkle tree is mutated"));
    }
    if root != block.header.merkle_root {
        return Err(ValidationError::structural(format!(
            "merkle root {} does not match header {}",
            root, block.header.merkle_root
        )));
    }
    Ok(())
}

/// Header rules that need only the block's hash, height and the clock.
pub fn check_header(
    config: &ConsensusConfig,
    block: &Block,
    hash: BlockHash,
    height: u32,
    adjusted_time: i64,
) -> Result<(), ValidationError> {
    let header = &block.header;

    if let Some(expected) = config.checkpoint(height) {
        if expected != hash {
            return Err(ValidationError::CheckpointViolation { height, hash });
        }
    }

    let min_version = config.min_block_version(height);
    if header.version < min_version {
        return Err(ValidationError::rule(format!(
            "header version {} below {min_version} required at height {height}",
            header.version
        )));
    }

    let time = i64::from(header.time);
    let drift = config.future_time_drift(height);
    if time > adjusted_time + drift {
        return Err(ValidationError::rule(format!(
            "block time {time} more than {drift}s ahead of adjusted time {adjusted_time}"
        )));
    }
    if !config.is_valid_block_timestamp(time, height) {
        return Err(ValidationError::rule(format!(
            "block time {time} is not on a {}s slot",
            config.time_slot_length
        )));
    }

    if !config.is_pos_height(height) && !config.skip_pow_check {
        let target = decode_compact(header.bits)
            .valid()
            .filter(|t| *t <= config.pow_limit)
            .ok_or_else(|| {
                ValidationError::rule(format!("bits {:#010x} not a valid PoW target", header.bits))
            })?;
        if hash.0.to_u256() > target {
            return Err(ValidationError::rule(format!(
                "header hash {hash} above PoW target"
            )));
        }
    }
    Ok(())
}

/// Rejects `version` once enough recent blocks advertise a newer one.
///
/// `recent` yields ancestor versions newest first; only the last
/// `to_check_block_upgrade_majority` are counted. Reaching
/// `reject_block_outdated_majority` marks the version obsolete, reaching
/// the lower `enforce_block_upgrade_majority` marks it outdated. Both are
/// rejected.
pub fn check_version_majority(
    config: &ConsensusConfig,
    version: i32,
    recent: impl IntoIterator<Item = i32>,
) -> Result<(), ValidationError> {
    let window = config.to_check_block_upgrade_majority as usize;
    let upgraded = recent
        .into_iter()
        .take(window)
        .filter(|v| *v > version)
        .count();
    if upgraded >= config.reject_block_outdated_majority as usize {
        return Err(ValidationError::rule(format!(
            "version {version} obsolete: {upgraded} of the last {window} blocks upgraded"
        )));
    }
    if upgraded >= config.enforce_block_upgrade_majority as usize {
        return Err(ValidationError::rule(format!(
            "version {version} outdated: {upgraded} of the last {window} blocks upgraded"
        )));
    }
    Ok(())
}

impl BaseValidity {
    fn check_context(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError> {
        let config = ctx.config;
        let header = &block.header;

        if header.prev_block != ctx.parent.hash {
            return Err(ValidationError::structural("block does not extend its context parent"));
        }

        let required = difficulty::next_work_required(config, ctx.state)
            .ok_or_else(|| ValidationError::rule("no parent to derive difficulty from"))?;
        if header.bits != required {
            return Err(ValidationError::rule(format!(
                "bits {:#010x} differ from required {required:#010x}",
                header.bits
            )));
        }

        if config.is_time_protocol_v2(ctx.height) {
            if header.time <= ctx.parent.time {
                return Err(ValidationError::rule("block time not after its parent"));
            }
        } else if let Some(median) = ctx.state.median_time_past() {
            if header.time <= median {
                return Err(ValidationError::rule(format!(
                    "block time {} not after median time past {median}",
                    header.time
                )));
            }
        }

        check_version_majority(config, header.version, ctx.state.recent(usize::MAX).map(|b| b.version))?;

        if header.carries_accumulator_checkpoint()
            && config.is_zerocoin_active(ctx.height)
            && ctx.height < config.block_last_accumulator_checkpoint
            && header.accumulator_checkpoint != ctx.delta.entry.accumulator_checkpoint
        {
            return Err(ValidationError::rule(format!(
                "header accumulator checkpoint {} differs from {}",
                header.accumulator_checkpoint, ctx.delta.entry.accumulator_checkpoint
            )));
        }

        for spent in &ctx.delta.spent {
            let coin = &spent.coin;
            if (coin.is_coinbase || coin.is_coinstake)
                && ctx.height.saturating_sub(coin.height) < config.coinbase_maturity
            {
                return Err(ValidationError::rule(format!(
                    "tx {} spends immature output from height {}",
                    spent.tx_index, coin.height
                )));
            }
        }

        for (i, tx) in block.txs.iter().enumerate().skip(1) {
            let value_in = ctx.delta.value_in.get(i).copied().unwrap_or_default();
            if !money_range(value_in, config.max_money_out) {
                return Err(ValidationError::rule(format!("tx {i} input value out of range")));
            }
            if tx.is_coinstake() {
                continue;
            }
            let value_out = tx.value_out().unwrap_or(i64::MAX);
            if value_out > value_in {
                return Err(ValidationError::rule(format!(
                    "tx {i} creates value: {value_out} out, {value_in} in"
                )));
            }
        }
        Ok(())
    }
}

impl BlockValidator for BaseValidity {
    fn validate(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError> {
        check_structure(ctx.config, block)?;
        check_header(ctx.config, block, ctx.hash, ctx.height, ctx.adjusted_time)?;
        self.check_context(ctx, block)?;
        Ok(())
    }
}
