//! Stake kernel and stake modifier.
//!
//! A proof-of-stake block is valid when the kernel hash of its staked
//! input, read as a 256-bit integer, does not exceed the block's target
//! weighted by the staked value. The kernel mixes in a chain-derived
//! stake modifier so kernels cannot be ground in advance.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consensus::chain_state::{ActiveBlock, ChainState};
use crate::consensus::config::ConsensusConfig;
use crate::consensus::error::ValidationError;
use crate::consensus::validator::{BlockValidator, ValidationContext};
use crate::types::uint::decode_compact;
use crate::types::{Amount, Block, BlockHash, Encodable, Hash256, SpendType, Transaction, U256, U512};

/// Seconds per v1 modifier interval; one entropy bit per new interval.
pub const MODIFIER_INTERVAL: i64 = 60;

/// A v1 kernel uses the modifier of the first block at least this many
/// seconds younger than the block holding the staked output.
pub const MODIFIER_SELECTION_INTERVAL: i64 = 2087;

/// Chain-derived entropy mixed into every kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakeModifier {
    V1(u64),
    V2(Hash256),
}

impl StakeModifier {
    fn encode(&self, w: &mut Vec<u8>) {
        match self {
            StakeModifier::V1(v) => w.extend_from_slice(&v.to_le_bytes()),
            StakeModifier::V2(h) => w.extend_from_slice(h.as_bytes()),
        }
    }

    fn low_u64(&self) -> u64 {
        match self {
            StakeModifier::V1(v) => *v,
            StakeModifier::V2(h) => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&h.0[..8]);
                u64::from_le_bytes(b)
            }
        }
    }
}

/// The staked output as the kernel sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeInput {
    /// Serialized outpoint, or the little-endian serial of a zerocoin stake.
    pub uniqueness: Vec<u8>,
    pub value: Amount,
    /// Time and height of the block the stake originates from.
    pub from_time: u32,
    pub from_height: u32,
    pub zerocoin: bool,
}

pub fn kernel_hash(
    modifier: &StakeModifier,
    from_time: u32,
    uniqueness: &[u8],
    block_time: u32,
) -> Hash256 {
    let mut buf = Vec::with_capacity(32 + 8 + uniqueness.len());
    modifier.encode(&mut buf);
    buf.extend_from_slice(&from_time.to_le_bytes());
    buf.extend_from_slice(uniqueness);
    buf.extend_from_slice(&block_time.to_le_bytes());
    Hash256::sha256d(&buf)
}

/// `target(bits) * (value / 100)`, saturated at `2^256 - 1`.
///
/// `None` when `bits` is not a usable target.
pub fn stake_target(bits: u32, value: Amount) -> Option<U256> {
    let target = decode_compact(bits).valid()?;
    let weight = U512::from((value.max(0) / 100) as u64);
    Some((target.widen() * weight).saturating_narrow())
}

pub fn check_kernel_target(kernel: &Hash256, bits: u32, value: Amount) -> bool {
    stake_target(bits, value).is_some_and(|target| kernel.to_u256() <= target)
}

/// Modifier a block at `height` carries, given its parent.
///
/// Genesis starts at `V1(0)`. Below the v2 activation height the 64-bit
/// modifier shifts in the low bit of the block hash whenever the block
/// opens a new [`MODIFIER_INTERVAL`]; from it on the modifier is
/// `sha256d(seed || previous)`.
pub fn next_stake_modifier(
    config: &ConsensusConfig,
    parent: Option<&ActiveBlock>,
    height: u32,
    hash: &BlockHash,
    block: &Block,
) -> StakeModifier {
    let Some(parent) = parent else {
        return StakeModifier::V1(0);
    };

    if config.is_stake_modifier_v2(height) {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(modifier_seed(block, hash).as_bytes());
        parent.stake_modifier.encode(&mut buf);
        return StakeModifier::V2(Hash256::sha256d(&buf));
    }

    let previous = parent.stake_modifier.low_u64();
    let interval = i64::from(block.header.time) / MODIFIER_INTERVAL;
    if interval == i64::from(parent.time) / MODIFIER_INTERVAL {
        StakeModifier::V1(previous)
    } else {
        StakeModifier::V1((previous << 1) | u64::from(hash.0.0[0] & 1))
    }
}

/// Staked txid for PoS blocks, hashed serial for zerocoin stakes, the
/// block hash otherwise.
fn modifier_seed(block: &Block, hash: &BlockHash) -> Hash256 {
    let stake_in = block
        .txs
        .get(1)
        .filter(|tx| tx.is_coinstake())
        .and_then(|tx| tx.vin.first());
    match stake_in {
        Some(input) if input.is_zerocoin_spend() => input
            .coin_spend()
            .map(|s| Hash256::sha256d(&s.coin_serial.to_bytes_le()))
            .unwrap_or(hash.0),
        Some(input) => input.prevout.txid.0,
        None => hash.0,
    }
}

/// Modifier a kernel at `height` must use for `stake`.
pub fn kernel_modifier(
    config: &ConsensusConfig,
    state: &ChainState,
    height: u32,
    stake: &StakeInput,
) -> Result<StakeModifier, ValidationError> {
    let parent = state
        .tip()
        .ok_or_else(|| ValidationError::rule("no parent for stake modifier"))?;
    if config.is_stake_modifier_v2(height) {
        return Ok(parent.stake_modifier);
    }
    let wanted = i64::from(stake.from_time) + MODIFIER_SELECTION_INTERVAL;
    (stake.from_height..=parent.height)
        .filter_map(|h| state.block_at(h))
        .find(|b| i64::from(b.time) >= wanted)
        .map(|b| b.stake_modifier)
        .ok_or_else(|| {
            ValidationError::rule(format!(
                "stake modifier for stake from height {} not yet available",
                stake.from_height
            ))
        })
}

/// Stake kernel predicate: picks PoW or PoS rules by height and checks
/// the coinstake's kernel for proof-of-stake blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct StakeKernelEngine;

impl StakeKernelEngine {
    pub fn new() -> Self {
        StakeKernelEngine
    }

    /// Resolves what the coinstake stakes.
    pub fn stake_input(
        &self,
        ctx: &ValidationContext<'_>,
        coinstake: &Transaction,
    ) -> Result<StakeInput, ValidationError> {
        let input = coinstake
            .vin
            .first()
            .ok_or_else(|| ValidationError::structural("coinstake without inputs"))?;

        if input.is_zerocoin_spend() {
            let spend = input
                .coin_spend()
                .map_err(|e| ValidationError::structural(format!("zerocoin stake: {e}")))?;
            if spend.spend_type != SpendType::Stake {
                return Err(ValidationError::rule("zerocoin stake input is not a stake spend"));
            }
            let record = ctx
                .state
                .checkpoint_record(&spend.accumulator_checkpoint)
                .ok_or_else(|| {
                    ValidationError::rule(format!(
                        "zerocoin stake references unknown checkpoint {}",
                        spend.accumulator_checkpoint
                    ))
                })?;
            let from = ctx.state.block_at(record.height).ok_or_else(|| {
                ValidationError::rule("zerocoin stake checkpoint is not on the active chain")
            })?;
            return Ok(StakeInput {
                uniqueness: spend.coin_serial.to_bytes_le(),
                value: spend.denomination.amount(),
                from_time: from.time,
                from_height: from.height,
                zerocoin: true,
            });
        }

        let spent = ctx
            .delta
            .spent
            .iter()
            .find(|s| s.tx_index == 1 && s.outpoint == input.prevout)
            .ok_or_else(|| ValidationError::rule("staked output is missing or spent"))?;
        Ok(StakeInput {
            uniqueness: input.prevout.consensus_bytes(),
            value: spent.coin.output.value,
            from_time: spent.coin.block_time,
            from_height: spent.coin.height,
            zerocoin: false,
        })
    }

    fn check_stake(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError> {
        let config = ctx.config;
        let coinstake = &block.txs[1];
        let stake = self.stake_input(ctx, coinstake)?;

        let min_depth = if stake.zerocoin {
            config.zerocoin_required_stake_depth
        } else {
            config.stake_min_depth
        };
        let depth = ctx.height.saturating_sub(stake.from_height);
        if depth < min_depth {
            return Err(ValidationError::rule(format!(
                "stake depth {depth} below minimum {min_depth}"
            )));
        }

        let time = block.header.time;
        let age = i64::from(time) - i64::from(stake.from_time);
        if age < config.stake_min_age {
            return Err(ValidationError::rule(format!(
                "stake age {age}s below minimum {}s",
                config.stake_min_age
            )));
        }

        if !config.is_valid_block_timestamp(i64::from(time), ctx.height) {
            return Err(ValidationError::rule(format!(
                "kernel time {time} is not on a {}s slot",
                config.time_slot_length
            )));
        }

        let modifier = kernel_modifier(config, ctx.state, ctx.height, &stake)?;
        let kernel = kernel_hash(&modifier, stake.from_time, &stake.uniqueness, time);
        if !check_kernel_target(&kernel, block.header.bits, stake.value) {
            return Err(ValidationError::rule(format!(
                "kernel {kernel} above target for bits {:#010x} and stake {}",
                block.header.bits, stake.value
            )));
        }
        debug!(height = ctx.height, %kernel, value = stake.value, "stake kernel accepted");
        Ok(())
    }
}

impl BlockValidator for StakeKernelEngine {
    fn validate(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError> {
        match (ctx.config.is_pos_height(ctx.height), block.is_proof_of_stake()) {
            (false, false) => Ok(()),
            (false, true) => Err(ValidationError::rule(format!(
                "proof-of-stake block at proof-of-work height {}",
                ctx.height
            ))),
            (true, false) => Err(ValidationError::rule(format!(
                "proof-of-work block after last PoW height {}",
                ctx.config.height_last_pow
            ))),
            (true, true) => self.check_stake(ctx, block),
        }
    }
}
