//! Core domain types used by the chain
//!
//! This module defines strongly-typed hashes, amounts and the consensus
//! primitives (scripts, transactions, blocks, zerocoin payloads) shared
//! across the validation engine. The goal is to avoid "naked" byte
//! buffers in public APIs and instead use domain-specific newtypes.

use std::fmt;

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod block;
pub mod encode;
pub mod quark;
pub mod script;
pub mod tx;
pub mod uint;
pub mod zerocoin;

pub use block::{Block, BlockHeader, LegacyHeaderHasher};
pub use encode::Encodable;
pub use quark::{QuarkHasher, quark_hash};
pub use script::{Script, ScriptKind};
pub use tx::{OutPoint, Transaction, TxIn, TxOut};
pub use uint::{U256, U512};
pub use zerocoin::{CoinSpend, Denomination, PublicCoin, SpendType};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Monetary amount in the smallest unit.
pub type Amount = i64;

/// One coin in smallest units.
pub const COIN: Amount = 100_000_000;

/// One hundredth of a coin.
pub const CENT: Amount = 1_000_000;

/// Strongly-typed 256-bit hash wrapper (double SHA-256).
///
/// The bytes are kept in the order the hash function produced them,
/// which is also the order they are serialized in. `Display` and
/// [`Hash256::from_hex`] use the byte-reversed form block explorers
/// show, so `00000efa...` style constants can be pasted verbatim.
#[derive(
    Clone, Copy, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// The all-zero hash.
    pub const ZERO: Hash256 = Hash256([0u8; HASH_LEN]);

    /// Computes `SHA256(SHA256(data))`.
    pub fn sha256d(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&second);
        Hash256(out)
    }

    /// Parses the byte-reversed hex form (optionally `0x`-prefixed).
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; HASH_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        bytes.reverse();
        Ok(Hash256(bytes))
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// Interprets the hash as a little-endian 256-bit integer.
    pub fn to_u256(&self) -> U256 {
        U256::from_little_endian(&self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rev = self.0;
        rev.reverse();
        f.write_str(&hex::encode(rev))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({self})")
    }
}

/// Strongly-typed block hash.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockHash(pub Hash256);

impl BlockHash {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Hash256::from_hex(s).map(BlockHash)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Strongly-typed transaction id.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Txid(pub Hash256);

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// `RIPEMD160(SHA256(data))`, the key hash used by pay-to-pubkey-hash.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let rip = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&rip);
    out
}

/// Returns `true` if `value` is within `[0, max_money]`.
pub fn money_range(value: Amount, max_money: Amount) -> bool {
    (0..=max_money).contains(&value)
}
