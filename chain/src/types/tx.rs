//! Transaction types for the consensus layer.
//!
//! Transactions follow the UTXO model: inputs reference previous
//! outputs by [`OutPoint`], outputs carry a value and a locking script.
//! Zerocoin spends ride in input scripts and zerocoin mints in output
//! scripts, so no separate transaction variants are needed.

use serde::{Deserialize, Serialize};

use super::encode::Encodable;
use super::script::{Script, ScriptKind};
use super::zerocoin::{CoinSpend, SpendPayloadError};
use super::{Amount, Hash256, Txid};

/// Reference to a previous transaction output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl OutPoint {
    /// The null outpoint used by coinbase inputs.
    pub const NULL: OutPoint = OutPoint {
        txid: Txid(Hash256::ZERO),
        vout: u32::MAX,
    };

    pub fn new(txid: Txid, vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    pub fn is_null(&self) -> bool {
        self.txid.0.is_zero() && self.vout == u32::MAX
    }
}

impl Encodable for OutPoint {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        self.txid.0.consensus_encode(w);
        self.vout.consensus_encode(w);
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxIn {
    /// Output being spent; null for coinbase and private zerocoin spends.
    pub prevout: OutPoint,

    /// Unlocking script. For zerocoin spends this is the spend opcode
    /// followed by one push of the encoded [`CoinSpend`].
    pub script_sig: Script,

    pub sequence: u32,
}

impl TxIn {
    pub fn new(prevout: OutPoint, script_sig: Script) -> Self {
        TxIn {
            prevout,
            script_sig,
            sequence: u32::MAX,
        }
    }

    /// Builds a zerocoin spend input. Private spends use a null prevout
    /// and carry the denomination in the sequence field.
    pub fn zerocoin_spend(
        spend: &CoinSpend,
        public: bool,
        prevout: OutPoint,
    ) -> Result<Self, SpendPayloadError> {
        let op = if public {
            super::script::OP_ZEROCOINPUBLICSPEND
        } else {
            super::script::OP_ZEROCOINSPEND
        };
        let script = Script::new().push_opcode(op).push_slice(&spend.to_bytes()?);
        Ok(TxIn {
            prevout: if public { prevout } else { OutPoint::NULL },
            script_sig: script,
            sequence: spend.denomination.units(),
        })
    }

    pub fn is_zerocoin_spend(&self) -> bool {
        self.script_sig.is_zerocoin_spend()
    }

    /// Decodes the zerocoin spend payload of this input.
    pub fn coin_spend(&self) -> Result<CoinSpend, SpendPayloadError> {
        let payload = self
            .script_sig
            .as_bytes()
            .get(1..)
            .map(|rest| Script(rest.to_vec()))
            .ok_or(SpendPayloadError::Missing)?;
        let bytes = payload.last_push().ok_or(SpendPayloadError::Missing)?;
        CoinSpend::from_bytes(bytes)
    }
}

impl Encodable for TxIn {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        self.prevout.consensus_encode(w);
        self.script_sig.consensus_encode(w);
        self.sequence.consensus_encode(w);
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(value: Amount, script_pubkey: Script) -> Self {
        TxOut {
            value,
            script_pubkey,
        }
    }

    /// The zero-value, empty-script marker output opening a coinstake.
    pub fn empty() -> Self {
        TxOut::new(0, Script::new())
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }

    pub fn is_zerocoin_mint(&self) -> bool {
        self.script_pubkey.is_zerocoin_mint()
    }
}

impl Encodable for TxOut {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        self.value.consensus_encode(w);
        self.script_pubkey.consensus_encode(w);
    }
}

/// A UTXO transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Encodable for Transaction {
    fn consensus_encode(&self, w: &mut Vec<u8>) {
        self.version.consensus_encode(w);
        self.vin[..].consensus_encode(w);
        self.vout[..].consensus_encode(w);
        self.lock_time.consensus_encode(w);
    }
}

impl Transaction {
    pub fn new(vin: Vec<TxIn>, vout: Vec<TxOut>) -> Self {
        Transaction {
            version: 1,
            vin,
            vout,
            lock_time: 0,
        }
    }

    pub fn txid(&self) -> Txid {
        Txid(Hash256::sha256d(&self.consensus_bytes()))
    }

    pub fn has_zerocoin_spends(&self) -> bool {
        self.vin.iter().any(TxIn::is_zerocoin_spend)
    }

    pub fn has_zerocoin_mints(&self) -> bool {
        self.vout.iter().any(TxOut::is_zerocoin_mint)
    }

    pub fn has_public_spends(&self) -> bool {
        self.vin.iter().any(|i| i.script_sig.is_zerocoin_public_spend())
    }

    /// A single null-prevout input that is not a zerocoin spend.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null() && !self.has_zerocoin_spends()
    }

    /// First input spends a real output (or is a zerocoin stake), there
    /// are at least two outputs and the first one is empty.
    pub fn is_coinstake(&self) -> bool {
        let Some(first) = self.vin.first() else {
            return false;
        };
        if first.prevout.is_null() && !first.is_zerocoin_spend() {
            return false;
        }
        self.vout.len() >= 2 && self.vout[0].is_empty()
    }

    pub fn is_zerocoin_stake(&self) -> bool {
        self.is_coinstake() && self.vin[0].is_zerocoin_spend()
    }

    /// Sum of output values, `None` on overflow.
    pub fn value_out(&self) -> Option<Amount> {
        self.vout
            .iter()
            .try_fold(0 as Amount, |acc, o| acc.checked_add(o.value))
    }

    /// Decodes every zerocoin spend carried by this transaction, in input order.
    pub fn coin_spends(&self) -> Result<Vec<CoinSpend>, SpendPayloadError> {
        self.vin
            .iter()
            .filter(|i| i.is_zerocoin_spend())
            .map(TxIn::coin_spend)
            .collect()
    }

    /// `(output index, commitment bytes)` for every mint output.
    pub fn zerocoin_mints(&self) -> Vec<(usize, Vec<u8>)> {
        self.vout
            .iter()
            .enumerate()
            .filter_map(|(i, o)| match o.script_pubkey.classify() {
                ScriptKind::ZerocoinMint(c) => Some((i, c)),
                _ => None,
            })
            .collect()
    }

    /// Hash a public spend commits to: the transaction with every zerocoin
    /// spend script blanked, so the spend can sign it before being embedded.
    pub fn binding_hash(&self) -> Hash256 {
        let mut stripped = self.clone();
        for input in stripped.vin.iter_mut().filter(|i| i.is_zerocoin_spend()) {
            input.script_sig = Script::new();
        }
        Hash256::sha256d(&stripped.consensus_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Denomination, SpendType};
    use num_bigint::BigUint;

    fn dummy_hash(byte: u8) -> Hash256 {
        Hash256([byte; 32])
    }

    fn sample_spend() -> CoinSpend {
        CoinSpend {
            version: 2,
            denomination: Denomination::One,
            coin_serial: BigUint::from(7u32),
            accumulator_checkpoint: dummy_hash(1),
            tx_binding: Hash256::ZERO,
            spend_type: SpendType::Spend,
            pubkey: vec![2u8; 33],
            signature: Vec::new(),
            proof: vec![0xaa; 16],
        }
    }

    #[test]
    fn coinbase_and_coinstake_shapes() {
        let coinbase = Transaction::new(
            vec![TxIn::new(OutPoint::NULL, Script::new().push_int(1).push_int(1))],
            vec![TxOut::new(50, Script::p2pk(&[2u8; 33]))],
        );
        assert!(coinbase.is_coinbase());
        assert!(!coinbase.is_coinstake());

        let stake_in = OutPoint::new(Txid(dummy_hash(3)), 0);
        let coinstake = Transaction::new(
            vec![TxIn::new(stake_in, Script::new())],
            vec![TxOut::empty(), TxOut::new(100, Script::p2pk(&[2u8; 33]))],
        );
        assert!(coinstake.is_coinstake());
        assert!(!coinstake.is_coinbase());
        assert!(!coinstake.is_zerocoin_stake());
    }

    #[test]
    fn private_spend_is_not_a_coinbase() {
        let input = TxIn::zerocoin_spend(&sample_spend(), false, OutPoint::NULL).expect("encode");
        let tx = Transaction::new(vec![input], vec![TxOut::new(COIN_ONE, Script::new())]);
        assert!(!tx.is_coinbase());
        assert!(tx.has_zerocoin_spends());
        assert_eq!(tx.coin_spends().expect("decode"), vec![sample_spend()]);
        assert_eq!(tx.vin[0].sequence, 1);
    }

    const COIN_ONE: Amount = crate::types::COIN;

    #[test]
    fn binding_hash_ignores_spend_scripts() {
        let a = TxIn::zerocoin_spend(&sample_spend(), true, OutPoint::new(Txid(dummy_hash(5)), 1))
            .expect("encode");
        let mut other = sample_spend();
        other.proof = vec![0xbb; 4];
        let b = TxIn::zerocoin_spend(&other, true, OutPoint::new(Txid(dummy_hash(5)), 1))
            .expect("encode");
        let out = vec![TxOut::new(COIN_ONE, Script::p2pk(&[2u8; 33]))];
        let tx_a = Transaction::new(vec![a], out.clone());
        let tx_b = Transaction::new(vec![b], out);
        assert_ne!(tx_a.txid(), tx_b.txid());
        assert_eq!(tx_a.binding_hash(), tx_b.binding_hash());
    }

    #[test]
    fn mints_are_listed_with_their_index() {
        let tx = Transaction::new(
            vec![TxIn::new(OutPoint::new(Txid(dummy_hash(1)), 0), Script::new())],
            vec![
                TxOut::new(1, Script::p2pk(&[2u8; 33])),
                TxOut::new(COIN_ONE, Script::zerocoin_mint(&[4u8; 32])),
            ],
        );
        assert!(tx.has_zerocoin_mints());
        assert_eq!(tx.zerocoin_mints(), vec![(1, vec![4u8; 32])]);
        assert_eq!(tx.value_out(), Some(COIN_ONE + 1));
    }
}
