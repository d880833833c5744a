//! Block signature verification.
//!
//! Proof-of-stake blocks are signed by the key that owns the staked
//! output; proof-of-work blocks by the key their coinbase pays. The
//! signature is a DER-encoded ECDSA signature over the block hash.

use once_cell::sync::Lazy;
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use crate::consensus::chain_state::SpentCoin;
use crate::consensus::error::ValidationError;
use crate::consensus::validator::{BlockValidator, ValidationContext};
use crate::types::{Block, BlockHash, Hash256, ScriptKind, hash160};

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Shared verification/signing context.
pub fn secp() -> &'static Secp256k1<All> {
    &SECP
}

/// Signs `block` over `hash` with `key`, replacing any old signature.
pub fn sign_block(block: &mut Block, hash: &BlockHash, key: &SecretKey) -> Result<(), secp256k1::Error> {
    block.signature = sign_hash(&hash.0, key)?;
    Ok(())
}

/// DER signature of `key` over a 32-byte message hash.
pub fn sign_hash(msg: &Hash256, key: &SecretKey) -> Result<Vec<u8>, secp256k1::Error> {
    let msg = Message::from_slice(msg.as_bytes())?;
    Ok(SECP.sign_ecdsa(&msg, key).serialize_der().to_vec())
}

/// Checks a DER signature of `pubkey` over `msg`.
///
/// Strict mode wants canonical DER with a low S value. Lax mode accepts
/// loosely encoded DER and normalizes S before verifying.
pub fn verify_der(pubkey: &[u8], msg: &Hash256, sig: &[u8], strict: bool) -> bool {
    let Ok(key) = PublicKey::from_slice(pubkey) else {
        return false;
    };
    let Ok(msg) = Message::from_slice(msg.as_bytes()) else {
        return false;
    };
    let sig = if strict {
        let Ok(sig) = Signature::from_der(sig) else {
            return false;
        };
        let mut normalized = sig;
        normalized.normalize_s();
        if normalized != sig {
            return false;
        }
        sig
    } else {
        let Ok(mut sig) = Signature::from_der_lax(sig) else {
            return false;
        };
        sig.normalize_s();
        sig
    };
    SECP.verify_ecdsa(&msg, &sig, &key).is_ok()
}

/// Public key that must have signed `block`.
///
/// `spent` holds the coins the block spends; a proof-of-stake block is
/// signed by the key controlling the coin its coinstake stakes, and the
/// coinstake must pay the stake back to that coin's script.
pub fn block_signing_key(block: &Block, spent: &[SpentCoin]) -> Result<Vec<u8>, ValidationError> {
    if block.is_proof_of_stake() {
        let coinstake = &block.txs[1];
        let input = &coinstake.vin[0];
        if input.is_zerocoin_spend() {
            let spend = input
                .coin_spend()
                .map_err(|e| ValidationError::structural(format!("zerocoin stake: {e}")))?;
            return Ok(spend.pubkey);
        }
        let staked = spent
            .iter()
            .find(|s| s.tx_index == 1 && s.outpoint == input.prevout)
            .ok_or_else(|| ValidationError::rule("coinstake input is not a known coin"))?;
        let script = &staked.coin.output.script_pubkey;
        if coinstake.vout[1].script_pubkey != *script {
            return Err(ValidationError::rule(
                "coinstake does not pay the stake back to the staked coin's script",
            ));
        }
        return match script.classify() {
            ScriptKind::PubKey(key) => Ok(key),
            ScriptKind::PubKeyHash(key_hash) => input
                .script_sig
                .last_push()
                .filter(|key| hash160(key) == key_hash)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| {
                    ValidationError::rule("coinstake input does not reveal the staking key")
                }),
            _ => Err(ValidationError::rule("staked coin has an unsupported script")),
        };
    }

    let payout = block
        .txs
        .first()
        .and_then(|cb| cb.vout.first())
        .ok_or_else(|| ValidationError::structural("coinbase without outputs"))?;
    match payout.script_pubkey.classify() {
        ScriptKind::PubKey(key) => Ok(key),
        _ => Err(ValidationError::rule(
            "signed proof-of-work block must pay its coinbase to a public key",
        )),
    }
}

/// Verifies the producer signature of every block.
///
/// Unsigned proof-of-work blocks are tolerated until the new message
/// signature rules are enforced; from then on every block is signed and
/// checked strictly.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockSignatureVerifier;

impl BlockSignatureVerifier {
    pub fn new() -> Self {
        BlockSignatureVerifier
    }
}

impl BlockValidator for BlockSignatureVerifier {
    fn validate(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError> {
        let strict = ctx.config.enforces_new_signatures(ctx.height);
        if block.is_proof_of_work() && block.signature.is_empty() && !strict {
            return Ok(());
        }
        if block.signature.is_empty() {
            return Err(ValidationError::rule("block is not signed"));
        }
        let key = block_signing_key(block, &ctx.delta.spent)?;
        if !verify_der(&key, &ctx.hash.0, &block.signature, strict) {
            return Err(ValidationError::rule(format!(
                "bad block signature at height {}",
                ctx.height
            )));
        }
        Ok(())
    }
}
