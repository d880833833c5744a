//! Zerocoin domain types: denominations, public coins and spend payloads.

use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Amount, COIN, Hash256};

/// Number of low bits freed in a v2 serial for the 0xF marker nibble.
pub const V2_SERIAL_SHIFT: usize = 4;

/// The fixed zerocoin denominations, in whole coins.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Denomination {
    One,
    Five,
    Ten,
    Fifty,
    OneHundred,
    FiveHundred,
    OneThousand,
    FiveThousand,
}

impl Denomination {
    pub const ALL: [Denomination; 8] = [
        Denomination::One,
        Denomination::Five,
        Denomination::Ten,
        Denomination::Fifty,
        Denomination::OneHundred,
        Denomination::FiveHundred,
        Denomination::OneThousand,
        Denomination::FiveThousand,
    ];

    /// Whole-coin face value.
    pub fn units(self) -> u32 {
        match self {
            Denomination::One => 1,
            Denomination::Five => 5,
            Denomination::Ten => 10,
            Denomination::Fifty => 50,
            Denomination::OneHundred => 100,
            Denomination::FiveHundred => 500,
            Denomination::OneThousand => 1000,
            Denomination::FiveThousand => 5000,
        }
    }

    pub fn amount(self) -> Amount {
        Amount::from(self.units()) * COIN
    }

    /// Position in [`Denomination::ALL`]; accumulators are indexed by it.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_units(units: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.units() == units)
    }

    /// Exact match only: 5 coins plus one satoshi is not a denomination.
    pub fn from_amount(amount: Amount) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.amount() == amount)
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.units())
    }
}

/// What a revealed zerocoin spend is used for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SpendType {
    /// Ordinary value transfer.
    Spend = 0,
    /// Input of a zerocoin coinstake.
    Stake = 1,
    /// Proves masternode collateral ownership; moves no value.
    MnCollateral = 2,
    /// Authorises signing an off-chain message; moves no value.
    SignMessage = 3,
}

impl SpendType {
    /// Whether a spend of this type may appear inside a block.
    pub fn moves_value(self) -> bool {
        matches!(self, SpendType::Spend | SpendType::Stake)
    }
}

/// A minted commitment as seen on chain.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PublicCoin {
    pub denomination: Denomination,
    pub value: BigUint,
}

impl PublicCoin {
    pub fn from_bytes_be(denomination: Denomination, bytes: &[u8]) -> Self {
        PublicCoin {
            denomination,
            value: BigUint::from_bytes_be(bytes),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpendPayloadError {
    #[error("zerocoin spend input carries no payload")]
    Missing,

    #[error("zerocoin spend payload does not decode: {0}")]
    Decode(String),

    #[error("zerocoin spend payload does not encode: {0}")]
    Encode(String),
}

/// Payload of a zerocoin spend input.
///
/// The zero-knowledge proof itself is an opaque blob checked by a
/// `ZerocoinVerifier`; everything consensus needs to reason about
/// (serial, checkpoint, binding, type) sits next to it in the clear.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CoinSpend {
    /// Version of the spent coin. Coins below version 2 were minted
    /// against the hex-parsed modulus group.
    pub version: u8,

    pub denomination: Denomination,

    /// Serial number revealed by this spend.
    pub coin_serial: BigUint,

    /// Accumulator checkpoint the proof was made against.
    pub accumulator_checkpoint: Hash256,

    /// Binding to the carrying transaction (see `Transaction::binding_hash`).
    /// Zero for legacy private spends.
    pub tx_binding: Hash256,

    pub spend_type: SpendType,

    /// Coin public key; the v2 serial is derived from it.
    pub pubkey: Vec<u8>,

    /// DER signature of the coin key over [`CoinSpend::signature_hash`].
    pub signature: Vec<u8>,

    /// Opaque proof blob.
    pub proof: Vec<u8>,
}

impl CoinSpend {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SpendPayloadError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| SpendPayloadError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SpendPayloadError> {
        let (spend, read) =
            bincode::serde::decode_from_slice::<CoinSpend, _>(bytes, bincode::config::standard())
                .map_err(|e| SpendPayloadError::Decode(e.to_string()))?;
        if read != bytes.len() {
            return Err(SpendPayloadError::Decode(format!(
                "{} trailing bytes",
                bytes.len() - read
            )));
        }
        Ok(spend)
    }

    /// Message signed by the coin key: binds serial, binding and type.
    pub fn signature_hash(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(self.tx_binding.as_bytes());
        buf.extend_from_slice(&self.coin_serial.to_bytes_be());
        buf.extend_from_slice(self.accumulator_checkpoint.as_bytes());
        buf.push(self.denomination.index() as u8);
        buf.push(self.spend_type as u8);
        Hash256::sha256d(&buf)
    }

    pub fn has_v2_serial(&self) -> bool {
        is_v2_serial(&self.coin_serial)
    }
}

/// Derives the v2 serial of a coin from its public key: the top nibble
/// is `0xF`, the rest is `sha256d(pubkey) >> 4`.
pub fn v2_serial_from_pubkey(pubkey: &[u8]) -> BigUint {
    let hashed = Hash256::sha256d(pubkey);
    let value = BigUint::from_bytes_le(hashed.as_bytes()) >> V2_SERIAL_SHIFT;
    let marker = BigUint::from(0xFu8) << (256 - V2_SERIAL_SHIFT);
    value | marker
}

pub fn is_v2_serial(serial: &BigUint) -> bool {
    serial.bits() == 256 && (serial >> (256 - V2_SERIAL_SHIFT)) == BigUint::from(0xFu8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denominations_are_exact() {
        assert_eq!(Denomination::from_amount(5 * COIN), Some(Denomination::Five));
        assert_eq!(Denomination::from_amount(5 * COIN + 1), None);
        assert_eq!(Denomination::from_units(5000), Some(Denomination::FiveThousand));
        assert_eq!(Denomination::from_units(2), None);
        assert_eq!(Denomination::FiveThousand.index(), 7);
    }

    #[test]
    fn v2_serial_has_marker_nibble() {
        let serial = v2_serial_from_pubkey(&[3u8; 33]);
        assert!(is_v2_serial(&serial));
        assert!(!is_v2_serial(&BigUint::from(12345u32)));
    }

    #[test]
    fn spend_payload_roundtrips_and_rejects_trailing_bytes() {
        let spend = CoinSpend {
            version: 2,
            denomination: Denomination::Ten,
            coin_serial: BigUint::from(42u32),
            accumulator_checkpoint: Hash256([9u8; 32]),
            tx_binding: Hash256::ZERO,
            spend_type: SpendType::Spend,
            pubkey: vec![2u8; 33],
            signature: Vec::new(),
            proof: vec![1, 2, 3],
        };
        let mut bytes = spend.to_bytes().expect("encode");
        assert_eq!(CoinSpend::from_bytes(&bytes).expect("decode"), spend);
        bytes.push(0);
        assert!(matches!(
            CoinSpend::from_bytes(&bytes),
            Err(SpendPayloadError::Decode(_))
        ));
    }

    #[test]
    fn only_transfers_move_value() {
        assert!(SpendType::Spend.moves_value());
        assert!(SpendType::Stake.moves_value());
        assert!(!SpendType::MnCollateral.moves_value());
        assert!(!SpendType::SignMessage.moves_value());
    }
}
