//! Wide unsigned integers and the compact ("nBits") target encoding.
//!
//! Difficulty targets, chain work and stake-kernel targets are all
//! 256-bit quantities. The weighted stake target is computed in 512 bits
//! so the multiplication by the staked value can never wrap.

use serde::{Deserialize, Serialize};
use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer, 4 x 64-bit limbs.
    #[derive(Serialize, Deserialize)]
    pub struct U256(4);
}

construct_uint! {
    /// 512-bit unsigned integer used for overflow-free intermediate products.
    pub struct U512(8);
}

impl U256 {
    /// Zero-extends into a [`U512`].
    pub fn widen(&self) -> U512 {
        let mut bytes = [0u8; 32];
        self.to_little_endian(&mut bytes);
        let mut wide = [0u8; 64];
        wide[..32].copy_from_slice(&bytes);
        U512::from_little_endian(&wide)
    }
}

impl U512 {
    /// Narrows to a [`U256`], saturating at `U256::MAX`.
    pub fn saturating_narrow(&self) -> U256 {
        if self.bits() > 256 {
            return U256::MAX;
        }
        let mut wide = [0u8; 64];
        self.to_little_endian(&mut wide);
        U256::from_little_endian(&wide[..32])
    }
}

/// Decoded form of a compact difficulty encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CompactTarget {
    pub value: U256,
    pub negative: bool,
    pub overflow: bool,
}

impl CompactTarget {
    /// A target usable for comparisons: positive, non-zero and in range.
    pub fn valid(&self) -> Option<U256> {
        if self.negative || self.overflow || self.value.is_zero() {
            None
        } else {
            Some(self.value)
        }
    }
}

/// Decodes a compact target (`nBits`).
pub fn decode_compact(bits: u32) -> CompactTarget {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;
    let value = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from(word)
    } else {
        U256::from(word) << (8 * (size as usize - 3))
    };
    let negative = word != 0 && (bits & 0x0080_0000) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
    CompactTarget {
        value,
        negative,
        overflow,
    }
}

/// Encodes a 256-bit target into compact form.
pub fn encode_compact(value: &U256) -> u32 {
    let mut size = value.bits().div_ceil(8) as u32;
    let mut compact: u32 = if size <= 3 {
        (value.low_u64() << (8 * (3 - size))) as u32
    } else {
        (*value >> (8 * (size as usize - 3))).low_u32()
    };
    // The sign bit is reserved; move one byte into the exponent instead.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Expected number of hashes needed to meet `bits`: `2^256 / (target + 1)`.
///
/// Returns zero for invalid encodings so they never add chain work.
pub fn block_proof(bits: u32) -> U256 {
    let Some(target) = decode_compact(bits).valid() else {
        return U256::zero();
    };
    if target == U256::MAX {
        return U256::one();
    }
    // 2^256 does not fit, so use (~target / (target + 1)) + 1.
    (!target / (target + U256::one())) + U256::one()
}
