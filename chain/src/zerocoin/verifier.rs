use num_bigint::BigUint;

use super::params::ZerocoinParams;
use crate::types::{CoinSpend, PublicCoin};

/// Opaque zero-knowledge capability.
///
/// Implementations wrap the commitment, accumulator-membership and
/// serial-number proofs of the zerocoin protocol. Calls may take several
/// milliseconds and are made from worker threads.
pub trait ZerocoinVerifier: Send + Sync {
    /// Whether `coin` is a well-formed commitment in `params`' group.
    fn verify_commitment(&self, params: &ZerocoinParams, coin: &PublicCoin) -> bool;

    /// Whether `spend.proof` proves membership in `accumulator` and
    /// knowledge of the revealed serial.
    fn verify_spend(
        &self,
        params: &ZerocoinParams,
        spend: &CoinSpend,
        accumulator: &BigUint,
    ) -> bool;
}

/// Range-checks commitments and rejects every spend proof.
///
/// Used when no proof library is linked: the node still tracks mints and
/// accumulators, but cannot accept zerocoin spends.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommitmentOnlyVerifier;

impl ZerocoinVerifier for CommitmentOnlyVerifier {
    fn verify_commitment(&self, params: &ZerocoinParams, coin: &PublicCoin) -> bool {
        coin.value > BigUint::from(1u8) && coin.value < params.modulus
    }

    fn verify_spend(&self, _: &ZerocoinParams, _: &CoinSpend, _: &BigUint) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::networks::ZEROCOIN_MODULUS;
    use crate::types::Denomination;
    use crate::zerocoin::ModulusEncoding;

    #[test]
    fn commitments_must_lie_inside_the_group() {
        let p = ZerocoinParams::parse(ZEROCOIN_MODULUS, ModulusEncoding::Decimal, 100)
            .expect("params");
        let v = CommitmentOnlyVerifier;
        let coin = |value: BigUint| PublicCoin {
            denomination: Denomination::One,
            value,
        };
        assert!(v.verify_commitment(&p, &coin(BigUint::from(12345u32))));
        assert!(!v.verify_commitment(&p, &coin(BigUint::from(1u32))));
        assert!(!v.verify_commitment(&p, &coin(p.modulus.clone())));
    }
}
