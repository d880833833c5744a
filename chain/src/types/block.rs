//! Block types and hashing.
//!
//! Headers are hashed over their consensus encoding. From version 4 the
//! header hash is double SHA-256; older headers were hashed with Quark
//! (see [`super::quark`]), reached through [`LegacyHeaderHasher`].
//!
//! The block itself is stored with **bincode 2** (see `storage`), but
//! everything consensus hashes goes through [`Encodable`].

use serde::{Deserialize, Serialize};

use super::encode::Encodable;
use super::{BlockHash, Hash256, Transaction};

/// First header version hashed with double SHA-256.
pub const SHA256D_HEADER_VERSION: i32 = 4;

/// Hash function for headers older than [`SHA256D_HEADER_VERSION`].
pub trait LegacyHeaderHasher: Send + Sync {
    /// Hashes the 80-byte consensus encoding of a legacy header.
    fn hash_header(&self, header_bytes: &[u8]) -> Hash256;
}

/// Block header.
///
/// The height is not stored: it follows from the position of the
/// header in the chain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,

    /// Hash of the parent block.
    pub prev_block: BlockHash,

    pub merkle_root: Hash256,

    /// Block time in seconds since the Unix epoch.
    pub time: u32,

    /// Compact difficulty target.
    pub bits: u32,

    pub nonce: u32,

    /// Zerocoin accumulator checkpoint. Only part of the encoding for
    /// versions 4 to 6; kept zero otherwise.
    pub accumulator_checkpoint: Hash256,
}

impl BlockHeader {
    pub fn carries_accumulator_checkpoint(&self) -> bool {
        (4..=6).contains(&self.version)
    }

    /// Double SHA-256 of the consensus encoding, regardless of version.
    pub fn sha256d(&self) -> Hash256 {
        Hash256::sha256d(&self.consensus_bytes())
    }

    /// Hash of this header; `legacy` hashes versions below 4.
    pub fn hash_with(&self, legacy: &dyn LegacyHeaderHasher) -> BlockHash {
        if self.version >= SHA256D_HEADER_VERSION {
            return BlockHash(self.sha256d());
        }
        BlockHash(legacy.hash_header(&self.consensus_bytes()))
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        self.version.consensus_encode(w);
        self.prev_block.0.consensus_encode(w);
        self.merkle_root.consensus_encode(w);
        self.time.consensus_encode(w);
        self.bits.consensus_encode(w);
        self.nonce.consensus_encode(w);
        if self.carries_accumulator_checkpoint() {
            self.accumulator_checkpoint.consensus_encode(w);
        }
    }
}

/// Block = header + transactions + producer signature.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,

    /// Ordered transactions; the first is always the coinbase and, for
    /// proof-of-stake blocks, the second is the coinstake.
    pub txs: Vec<Transaction>,

    /// DER signature over the block hash. Empty for unsigned PoW blocks.
    pub signature: Vec<u8>,
}

impl Block {
    pub fn is_proof_of_stake(&self) -> bool {
        self.txs.get(1).is_some_and(Transaction::is_coinstake)
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    /// Merkle root over the transaction ids and whether the tree was
    /// mutated (two identical sibling hashes).
    pub fn compute_merkle_root(&self) -> (Hash256, bool) {
        let leaves: Vec<Hash256> = self.txs.iter().map(|tx| tx.txid().0).collect();
        merkle_root(leaves)
    }
}

/// Bitcoin-style merkle root: odd levels duplicate their last hash.
///
/// The flag reports whether any level paired a hash with an identical
/// sibling, which lets a block with duplicated transactions share a root
/// with a valid one.
pub fn merkle_root(mut level: Vec<Hash256>) -> (Hash256, bool) {
    if level.is_empty() {
        return (Hash256::ZERO, false);
    }
    let mut mutated = false;
    while level.len() > 1 {
        for pair in level.chunks(2) {
            if pair.len() == 2 && pair[0] == pair[1] {
                mutated = true;
            }
        }
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(pair[0].as_bytes());
                buf[32..].copy_from_slice(pair[1].as_bytes());
                Hash256::sha256d(&buf)
            })
            .collect();
    }
    (level[0], mutated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_hash(byte: u8) -> Hash256 {
        Hash256([byte; 32])
    }

    fn header(version: i32) -> BlockHeader {
        BlockHeader {
            version,
            prev_block: BlockHash(dummy_hash(1)),
            merkle_root: dummy_hash(2),
            time: 1_700_000_000,
            bits: 0x1e0f_fff0,
            nonce: 7,
            accumulator_checkpoint: dummy_hash(3),
        }
    }

    #[test]
    fn header_encoding_length_depends_on_version() {
        assert_eq!(header(3).consensus_bytes().len(), 80);
        assert_eq!(header(4).consensus_bytes().len(), 112);
        assert_eq!(header(6).consensus_bytes().len(), 112);
        assert_eq!(header(7).consensus_bytes().len(), 80);
    }

    #[test]
    fn legacy_hasher_only_applies_below_version_4() {
        struct Fixed;
        impl LegacyHeaderHasher for Fixed {
            fn hash_header(&self, _: &[u8]) -> Hash256 {
                Hash256([0xab; 32])
            }
        }
        assert_eq!(header(3).hash_with(&Fixed), BlockHash(Hash256([0xab; 32])));
        assert_eq!(header(4).hash_with(&Fixed), BlockHash(header(4).sha256d()));
        assert_eq!(header(7).hash_with(&Fixed), BlockHash(header(7).sha256d()));
    }

    #[test]
    fn merkle_of_single_leaf_is_the_leaf() {
        let (root, mutated) = merkle_root(vec![dummy_hash(4)]);
        assert_eq!(root, dummy_hash(4));
        assert!(!mutated);
    }

    #[test]
    fn duplicated_leaves_flag_mutation() {
        let (root_odd, m1) = merkle_root(vec![dummy_hash(1), dummy_hash(2), dummy_hash(3)]);
        let (root_dup, m2) = merkle_root(vec![
            dummy_hash(1),
            dummy_hash(2),
            dummy_hash(3),
            dummy_hash(3),
        ]);
        assert_eq!(root_odd, root_dup);
        assert!(!m1);
        assert!(m2);
    }
}
