use std::sync::Arc;

use num_bigint::BigUint;
use tracing::debug;

use crate::consensus::error::ConfigError;

/// Initial value of every accumulator.
pub const ACCUMULATOR_BASE: u32 = 961;

/// How the modulus text was interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModulusEncoding {
    /// The original (v1) coins were minted against the digits read as hex.
    Hex,
    Decimal,
}

/// Group parameters derived from one interpretation of the modulus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZerocoinParams {
    pub encoding: ModulusEncoding,
    pub modulus: BigUint,
    pub accumulator_base: BigUint,
    pub security_level: u32,
}

impl ZerocoinParams {
    pub fn parse(
        text: &str,
        encoding: ModulusEncoding,
        security_level: u32,
    ) -> Result<Self, ConfigError> {
        let (radix, label) = match encoding {
            ModulusEncoding::Hex => (16, "hex"),
            ModulusEncoding::Decimal => (10, "decimal"),
        };
        let modulus =
            BigUint::parse_bytes(text.as_bytes(), radix).ok_or(ConfigError::Modulus(label))?;
        if modulus.bits() < 1024 {
            return Err(ConfigError::Modulus(label));
        }
        debug!(encoding = label, bits = modulus.bits(), "parsed zerocoin modulus");
        Ok(ZerocoinParams {
            encoding,
            modulus,
            accumulator_base: BigUint::from(ACCUMULATOR_BASE),
            security_level,
        })
    }
}

/// Both interpretations of a network's modulus, built once and shared.
#[derive(Clone, Debug)]
pub struct ZerocoinGroups {
    hex: Arc<ZerocoinParams>,
    decimal: Arc<ZerocoinParams>,
}

impl ZerocoinGroups {
    pub fn new(modulus_text: &str, security_level: u32) -> Result<Self, ConfigError> {
        Ok(ZerocoinGroups {
            hex: Arc::new(ZerocoinParams::parse(
                modulus_text,
                ModulusEncoding::Hex,
                security_level,
            )?),
            decimal: Arc::new(ZerocoinParams::parse(
                modulus_text,
                ModulusEncoding::Decimal,
                security_level,
            )?),
        })
    }

    /// `use_v1` selects the hex-parsed group of the original coins.
    pub fn params(&self, use_v1: bool) -> &Arc<ZerocoinParams> {
        if use_v1 { &self.hex } else { &self.decimal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::networks::ZEROCOIN_MODULUS;

    #[test]
    fn both_interpretations_differ() {
        let groups = ZerocoinGroups::new(ZEROCOIN_MODULUS, 100).expect("groups");
        let v1 = groups.params(true);
        let v2 = groups.params(false);
        assert_eq!(v1.encoding, ModulusEncoding::Hex);
        assert_eq!(v2.encoding, ModulusEncoding::Decimal);
        assert_ne!(v1.modulus, v2.modulus);
        assert_eq!(v2.modulus.bits(), 2048);
        assert!(Arc::ptr_eq(v1, groups.params(true)));
    }

    #[test]
    fn short_or_garbage_modulus_is_rejected() {
        assert_eq!(
            ZerocoinParams::parse("12345", ModulusEncoding::Decimal, 100),
            Err(ConfigError::Modulus("decimal"))
        );
        assert!(ZerocoinParams::parse("xyz", ModulusEncoding::Hex, 100).is_err());
    }
}
