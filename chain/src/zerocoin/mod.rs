//! Zerocoin group parameters, accumulators and the proof-verification
//! capability.
//!
//! The zero-knowledge proofs themselves are produced and checked by an
//! external big-integer proof library; this module only models what the
//! consensus rules need around them.

pub mod accumulator;
pub mod params;
pub mod verifier;

pub use accumulator::AccumulatorMap;
pub use params::{ModulusEncoding, ZerocoinGroups, ZerocoinParams};
pub use verifier::{CommitmentOnlyVerifier, ZerocoinVerifier};
