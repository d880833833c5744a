use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use super::params::ZerocoinParams;
use crate::types::encode::write_var_bytes;
use crate::types::{Denomination, Hash256, PublicCoin};

/// One accumulator per denomination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorMap {
    values: Vec<BigUint>,
}

impl AccumulatorMap {
    /// Every denomination starts at the group's accumulator base.
    pub fn new(params: &ZerocoinParams) -> Self {
        AccumulatorMap {
            values: vec![params.accumulator_base.clone(); Denomination::ALL.len()],
        }
    }

    pub fn value(&self, denomination: Denomination) -> &BigUint {
        &self.values[denomination.index()]
    }

    /// `acc = acc ^ commitment mod N`.
    pub fn accumulate(&mut self, params: &ZerocoinParams, coin: &PublicCoin) {
        let slot = &mut self.values[coin.denomination.index()];
        *slot = slot.modpow(&coin.value, &params.modulus);
    }

    /// Checkpoint id: double SHA-256 over the eight accumulator values.
    pub fn checkpoint(&self) -> Hash256 {
        let mut buf = Vec::new();
        for value in &self.values {
            write_var_bytes(&mut buf, &value.to_bytes_le());
        }
        Hash256::sha256d(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::networks::ZEROCOIN_MODULUS;
    use crate::zerocoin::{ModulusEncoding, ZerocoinParams};

    fn params() -> ZerocoinParams {
        ZerocoinParams::parse(ZEROCOIN_MODULUS, ModulusEncoding::Decimal, 100).expect("params")
    }

    #[test]
    fn accumulation_changes_only_its_denomination() {
        let p = params();
        let mut acc = AccumulatorMap::new(&p);
        let before = acc.checkpoint();
        let coin = PublicCoin {
            denomination: Denomination::Ten,
            value: BigUint::from(1_000_003u32),
        };
        acc.accumulate(&p, &coin);
        assert_ne!(acc.checkpoint(), before);
        assert_eq!(acc.value(Denomination::One), &p.accumulator_base);
        assert_eq!(
            acc.value(Denomination::Ten),
            &p.accumulator_base.modpow(&coin.value, &p.modulus)
        );
    }

    #[test]
    fn accumulation_order_does_not_matter() {
        let p = params();
        let a = PublicCoin {
            denomination: Denomination::One,
            value: BigUint::from(101u32),
        };
        let b = PublicCoin {
            denomination: Denomination::One,
            value: BigUint::from(103u32),
        };
        let mut x = AccumulatorMap::new(&p);
        x.accumulate(&p, &a);
        x.accumulate(&p, &b);
        let mut y = AccumulatorMap::new(&p);
        y.accumulate(&p, &b);
        y.accumulate(&p, &a);
        assert_eq!(x.checkpoint(), y.checkpoint());
    }
}
