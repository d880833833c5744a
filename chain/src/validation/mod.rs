//! Block validity predicates for the chain.
//!
//! This module implements concrete block validators that plug into the
//! consensus layer via [`crate::consensus::validator::BlockValidator`]:
//!
//! - [`base::BaseValidity`]: structure, header, timestamp, difficulty,
//!   checkpoint and value rules.
//! - [`kernel::StakeKernelEngine`]: proof-of-work / proof-of-stake
//!   selection and the stake kernel.
//! - [`signature::BlockSignatureVerifier`]: producer signatures.
//! - [`zerocoin::ZerocoinEngine`]: zerocoin spends and mints, generic
//!   over a [`crate::zerocoin::ZerocoinVerifier`].
//! - [`masternode::MasternodePaymentValidator`]: scheduled payouts,
//!   generic over a [`masternode::MasternodeRegistry`].

pub mod base;
pub mod kernel;
pub mod masternode;
pub mod signature;
pub mod zerocoin;

pub use base::BaseValidity;
pub use kernel::{StakeKernelEngine, StakeModifier};
pub use masternode::{MasternodePaymentValidator, MasternodeRegistry, NoMasternodes, Payee, RequiredPayee};
pub use signature::BlockSignatureVerifier;
pub use zerocoin::{SpendStage, ZerocoinEngine};

use crate::consensus::validator::CombinedValidator;
use crate::zerocoin::ZerocoinVerifier;

/// Full rule set of a node, cheapest checks first.
pub type StandardValidator<Z, R> = CombinedValidator<
    CombinedValidator<BaseValidity, StakeKernelEngine>,
    CombinedValidator<
        BlockSignatureVerifier,
        CombinedValidator<ZerocoinEngine<Z>, MasternodePaymentValidator<R>>,
    >,
>;

/// Builds the [`StandardValidator`] around a proof verifier and a
/// masternode registry.
pub fn standard_validator<Z, R>(zerocoin: ZerocoinEngine<Z>, registry: R) -> StandardValidator<Z, R>
where
    Z: ZerocoinVerifier,
    R: MasternodeRegistry,
{
    CombinedValidator::new(
        CombinedValidator::new(BaseValidity::new(), StakeKernelEngine::new()),
        CombinedValidator::new(
            BlockSignatureVerifier::new(),
            CombinedValidator::new(zerocoin, MasternodePaymentValidator::new(registry)),
        ),
    )
}
