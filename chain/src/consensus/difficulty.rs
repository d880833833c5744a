//! Difficulty retargeting.
//!
//! Proof-of-work heights use DarkGravityWave v3 over the last 24 blocks.
//! Proof-of-stake heights retarget every block with an exponential
//! moving average toward the target spacing.

use super::chain_state::{ActiveBlock, ChainState};
use super::config::ConsensusConfig;
use crate::types::U512;
use crate::types::uint::{decode_compact, encode_compact};

/// Blocks averaged by DarkGravityWave.
pub const DGW_PAST_BLOCKS: u32 = 24;

/// Compact bits required for the block following the current tip.
///
/// Returns `None` on an empty chain.
pub fn next_work_required(config: &ConsensusConfig, state: &ChainState) -> Option<u32> {
    let parent = state.tip()?;
    let height = parent.height + 1;

    if config.is_pos_height(height) {
        let grandparent = parent.height.checked_sub(1).and_then(|h| state.block_at(h));
        return Some(pos_retarget(config, parent, grandparent, height));
    }
    if config.pow_no_retargeting {
        return Some(parent.bits);
    }
    Some(dark_gravity_wave(config, state, parent))
}

fn pos_retarget(
    config: &ConsensusConfig,
    parent: &ActiveBlock,
    grandparent: Option<&ActiveBlock>,
    height: u32,
) -> u32 {
    let time_v2 = config.is_time_protocol_v2(height);
    let limit = config.pos_limit(height);
    let spacing = config.target_spacing;
    let timespan = config.target_timespan(height);

    let mut actual = grandparent.map_or(0, |g| i64::from(parent.time) - i64::from(g.time));
    if actual < 0 {
        actual = 1;
    }
    if time_v2 && actual > spacing * 10 {
        actual = spacing * 10;
    }

    let mut target = decode_compact(parent.bits).value.widen();
    // First block under time protocol v2 relaxes difficulty sixteenfold.
    if time_v2 && !config.is_time_protocol_v2(parent.height) {
        target <<= 4;
    }

    let interval = timespan / spacing;
    let numerator = (interval - 1) * spacing + 2 * actual;
    let denominator = (interval + 1) * spacing;
    target = target * U512::from(numerator as u64) / U512::from(denominator as u64);

    let target = target.saturating_narrow();
    if target.is_zero() || target > limit {
        encode_compact(&limit)
    } else {
        encode_compact(&target)
    }
}

fn dark_gravity_wave(config: &ConsensusConfig, state: &ChainState, parent: &ActiveBlock) -> u32 {
    let limit = config.pow_limit;
    if parent.height < DGW_PAST_BLOCKS {
        return encode_compact(&limit);
    }

    let mut count: u64 = 0;
    let mut average = U512::zero();
    let mut actual_timespan: i64 = 0;
    let mut last_time: Option<i64> = None;

    for block in state
        .recent(DGW_PAST_BLOCKS as usize)
        .filter(|b| b.height > 0)
    {
        count += 1;
        let target = decode_compact(block.bits).value.widen();
        average = if count == 1 {
            target
        } else {
            (average * U512::from(count) + target) / U512::from(count + 1)
        };
        if let Some(last) = last_time {
            actual_timespan += last - i64::from(block.time);
        }
        last_time = Some(i64::from(block.time));
    }

    let target_timespan = count as i64 * config.target_spacing;
    let actual_timespan = actual_timespan.clamp(target_timespan / 3, target_timespan * 3);

    let next = (average * U512::from(actual_timespan as u64) / U512::from(target_timespan as u64))
        .saturating_narrow();
    if next > limit {
        encode_compact(&limit)
    } else {
        encode_compact(&next)
    }
}
