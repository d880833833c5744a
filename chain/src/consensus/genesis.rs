//! Genesis block construction.

use super::config::GenesisParams;
use crate::types::{
    Block, BlockHash, BlockHeader, Hash256, OutPoint, Script, Transaction, TxIn, TxOut,
};

const GENESIS_TIMESTAMP: &str =
    "Coronavirus Projected to Trigger Worst Economic Downturn Since 1940s";

const GENESIS_OUTPUT_PUBKEY: &str = "047d65ca6b189b89bf53e00d328392ba157410d84938c927c5c295569b633b7d5e3989237e9a773b2d871887688f8b0f564e75d9477c4fd24a36335ea3a304022a";

fn genesis_pubkey() -> Vec<u8> {
    // Compile-time constant; a decode failure would be caught by the
    // merkle root self-check.
    hex::decode(GENESIS_OUTPUT_PUBKEY).unwrap_or_default()
}

/// Builds the genesis block of a network from its parameters.
pub fn create_genesis_block(p: &GenesisParams) -> Block {
    let script_sig = Script::new()
        .push_int(486_604_799)
        .push_script_num(4)
        .push_slice(GENESIS_TIMESTAMP.as_bytes());

    let coinbase = Transaction {
        version: 1,
        vin: vec![TxIn::new(OutPoint::NULL, script_sig)],
        vout: vec![TxOut::new(p.reward, Script::p2pk(&genesis_pubkey()))],
        lock_time: 0,
    };

    let mut block = Block {
        header: BlockHeader {
            version: p.version,
            prev_block: BlockHash(Hash256::ZERO),
            merkle_root: Hash256::ZERO,
            time: p.time,
            bits: p.bits,
            nonce: p.nonce,
            accumulator_checkpoint: Hash256::ZERO,
        },
        txs: vec![coinbase],
        signature: Vec::new(),
    };
    block.header.merkle_root = block.compute_merkle_root().0;
    block
}
