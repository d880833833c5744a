//! Zerocoin spend and mint validity.
//!
//! Every zerocoin spend in a block moves through
//! [`SpendStage::Unverified`] → [`SpendStage::ProofChecked`] →
//! [`SpendStage::SerialChecked`] → [`SpendStage::Accepted`]. Cheap
//! contextual rules run first, the expensive zero-knowledge proofs are
//! then verified in parallel, and serial uniqueness is decided last
//! against both the block and the chain.
//!
//! Mints are checked for activation, denomination, commitment validity,
//! uniqueness and the minimum mint fee.

use std::collections::HashSet;
use std::sync::Arc;

use num_bigint::BigUint;
use prometheus::Histogram;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::consensus::chain_state::ChainState;
use crate::consensus::config::ConsensusConfig;
use crate::consensus::error::ValidationError;
use crate::consensus::validator::{BlockValidator, ValidationContext};
use crate::types::zerocoin::v2_serial_from_pubkey;
use crate::types::{Block, CoinSpend, SpendType, Transaction};
use crate::validation::signature::verify_der;
use crate::zerocoin::{ZerocoinParams, ZerocoinVerifier};

/// Progress of one spend through block validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpendStage {
    Unverified,
    ProofChecked,
    SerialChecked,
    Accepted,
}

struct PendingSpend {
    tx_index: usize,
    spend: CoinSpend,
    params: Arc<ZerocoinParams>,
    accumulator: BigUint,
    stage: SpendStage,
}

/// Zerocoin validity predicate, generic over the proof capability.
pub struct ZerocoinEngine<V> {
    verifier: V,
    proof_seconds: Option<Histogram>,
}

impl<V> ZerocoinEngine<V> {
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
            proof_seconds: None,
        }
    }

    /// Records proof verification time per block into `histogram`.
    pub fn with_proof_timer(mut self, histogram: Histogram) -> Self {
        self.proof_seconds = Some(histogram);
        self
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }
}

fn serial_label(serial: &BigUint) -> String {
    serial.to_str_radix(16)
}

/// Serial and signature rules shared by block spends and ownership proofs.
fn check_coin_key(
    config: &ConsensusConfig,
    height: u32,
    spend: &CoinSpend,
) -> Result<(), ValidationError> {
    if spend.version >= 2 {
        if !config.is_zerocoin_v2(height) {
            return Err(ValidationError::rule(format!(
                "version {} coin spent before zerocoin v2",
                spend.version
            )));
        }
        if spend.coin_serial != v2_serial_from_pubkey(&spend.pubkey) {
            return Err(ValidationError::rule("serial does not match the coin public key"));
        }
    }
    Ok(())
}

fn check_coin_signature(spend: &CoinSpend) -> Result<(), ValidationError> {
    if !verify_der(&spend.pubkey, &spend.signature_hash(), &spend.signature, true) {
        return Err(ValidationError::rule("coin spend signature invalid"));
    }
    Ok(())
}

impl<V: ZerocoinVerifier> ZerocoinEngine<V> {
    /// Collects the block's spends and applies every rule that does not
    /// need a proof or the serial set.
    fn collect_spends(
        &self,
        ctx: &ValidationContext<'_>,
        block: &Block,
    ) -> Result<Vec<PendingSpend>, ValidationError> {
        let config = ctx.config;
        let height = ctx.height;
        let mut pending = Vec::new();

        for (tx_index, tx) in block.txs.iter().enumerate() {
            if !tx.has_zerocoin_spends() {
                continue;
            }
            if !config.is_zerocoin_active(height) {
                return Err(ValidationError::rule(format!(
                    "zerocoin spend at height {height} before activation"
                )));
            }
            self.check_spend_count(config, tx_index, tx)?;

            for (input_index, input) in tx.vin.iter().enumerate() {
                if !input.is_zerocoin_spend() {
                    continue;
                }
                let spend = input.coin_spend().map_err(|e| {
                    ValidationError::structural(format!("tx {tx_index} input {input_index}: {e}"))
                })?;

                let stake_slot = tx_index == 1 && input_index == 0 && tx.is_coinstake();
                match spend.spend_type {
                    SpendType::Stake if !stake_slot => {
                        return Err(ValidationError::rule(format!(
                            "stake spend outside the coinstake in tx {tx_index}"
                        )));
                    }
                    SpendType::Spend if stake_slot => {
                        return Err(ValidationError::rule("coinstake input is not a stake spend"));
                    }
                    t if !t.moves_value() => {
                        return Err(ValidationError::rule(format!(
                            "{t:?} spends are not allowed in blocks"
                        )));
                    }
                    _ => {}
                }

                let public = input.script_sig.is_zerocoin_public_spend();
                if public && !config.is_public_spend_active(height) {
                    return Err(ValidationError::rule("public zerocoin spend before activation"));
                }
                if !public && config.is_public_spend_active(height) {
                    return Err(ValidationError::rule(
                        "private zerocoin spends are disabled at this height",
                    ));
                }

                check_coin_key(config, height, &spend)?;
                if public {
                    let binding = tx.binding_hash();
                    if spend.tx_binding != binding {
                        return Err(ValidationError::rule(format!(
                            "public spend bound to {} instead of {binding}",
                            spend.tx_binding
                        )));
                    }
                    check_coin_signature(&spend)?;
                }

                if config.is_known_bad_serial(&spend.coin_serial)
                    && !config.in_fake_serial_window(height)
                {
                    return Err(ValidationError::rule(format!(
                        "known bad serial {}",
                        serial_label(&spend.coin_serial)
                    )));
                }

                let record = ctx
                    .state
                    .checkpoint_record(&spend.accumulator_checkpoint)
                    .ok_or_else(|| {
                        ValidationError::rule(format!(
                            "spend references unknown accumulator checkpoint {}",
                            spend.accumulator_checkpoint
                        ))
                    })?;
                pending.push(PendingSpend {
                    tx_index,
                    params: config.zerocoin_params(spend.version < 2).clone(),
                    accumulator: record.accumulators.value(spend.denomination).clone(),
                    spend,
                    stage: SpendStage::Unverified,
                });
            }
        }
        Ok(pending)
    }

    fn check_spend_count(
        &self,
        config: &ConsensusConfig,
        tx_index: usize,
        tx: &Transaction,
    ) -> Result<(), ValidationError> {
        let count = tx.vin.iter().filter(|i| i.is_zerocoin_spend()).count();
        let limit = if tx.has_public_spends() {
            config.max_zerocoin_public_spends_per_transaction
        } else {
            config.max_zerocoin_spends_per_transaction
        };
        if count > limit {
            return Err(ValidationError::rule(format!(
                "tx {tx_index} has {count} zerocoin spends, limit is {limit}"
            )));
        }
        Ok(())
    }

    fn verify_proofs(&self, pending: &mut [PendingSpend]) -> Result<(), ValidationError> {
        let _timer = self.proof_seconds.as_ref().map(Histogram::start_timer);
        pending.par_iter_mut().try_for_each(|p| {
            if self.verifier.verify_spend(&p.params, &p.spend, &p.accumulator) {
                p.stage = SpendStage::ProofChecked;
                Ok(())
            } else {
                Err(ValidationError::proof(format!(
                    "spend proof for serial {} in tx {} does not verify",
                    serial_label(&p.spend.coin_serial),
                    p.tx_index
                )))
            }
        })
    }

    fn check_serials(
        &self,
        ctx: &ValidationContext<'_>,
        pending: &mut [PendingSpend],
    ) -> Result<(), ValidationError> {
        let mut seen: HashSet<&BigUint> = HashSet::with_capacity(pending.len());
        for p in pending.iter() {
            if !seen.insert(&p.spend.coin_serial) {
                return Err(ValidationError::DoubleSpend {
                    serial: serial_label(&p.spend.coin_serial),
                });
            }
            let Some(spent_at) = ctx.state.serial_spent_height(&p.spend.coin_serial) else {
                continue;
            };
            let tolerated = ctx.config.in_fake_serial_window(ctx.height)
                && ctx.state.zerocoin_supply() <= ctx.config.supply_before_fake_serial;
            if !tolerated {
                return Err(ValidationError::DoubleSpend {
                    serial: serial_label(&p.spend.coin_serial),
                });
            }
            warn!(
                height = ctx.height,
                spent_at,
                serial = %serial_label(&p.spend.coin_serial),
                "tolerating serial re-spend inside the fake serial window"
            );
        }
        for p in pending.iter_mut() {
            p.stage = SpendStage::SerialChecked;
        }
        Ok(())
    }

    fn check_mints(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError> {
        let config = ctx.config;
        let params = config.zerocoin_params(false);
        let mut coins = ctx.delta.mints.iter();
        let mut seen: HashSet<&BigUint> = HashSet::new();

        for (tx_index, tx) in block.txs.iter().enumerate() {
            let minted = tx.zerocoin_mints().len();
            if minted == 0 {
                continue;
            }
            if !config.is_zerocoin_active(ctx.height) {
                return Err(ValidationError::rule(format!(
                    "zerocoin mint at height {} before activation",
                    ctx.height
                )));
            }
            if tx_index == 0 {
                return Err(ValidationError::rule("coinbase cannot mint zerocoins"));
            }

            for coin in coins.by_ref().take(minted) {
                if !self.verifier.verify_commitment(params, coin) {
                    return Err(ValidationError::proof(format!(
                        "tx {tx_index} mints an invalid commitment"
                    )));
                }
                if !seen.insert(&coin.value) || ctx.state.mint_height(&coin.value).is_some() {
                    return Err(ValidationError::rule(format!(
                        "tx {tx_index} mints an existing commitment"
                    )));
                }
            }

            if tx.is_coinstake() {
                continue;
            }
            let value_in = ctx.delta.value_in.get(tx_index).copied().unwrap_or_default();
            let fee = value_in - tx.value_out().unwrap_or(i64::MAX);
            let required = config.min_zerocoin_mint_fee * minted as i64;
            if fee < required {
                return Err(ValidationError::rule(format!(
                    "tx {tx_index} pays mint fee {fee}, needs {required}"
                )));
            }
        }
        Ok(())
    }

    /// Checks a non-value-moving spend (masternode collateral or message
    /// signing) against the current chain, outside of any block.
    pub fn verify_ownership_proof(
        &self,
        config: &ConsensusConfig,
        state: &ChainState,
        spend: &CoinSpend,
    ) -> Result<(), ValidationError> {
        if spend.spend_type.moves_value() {
            return Err(ValidationError::rule(format!(
                "{:?} spend is not an ownership proof",
                spend.spend_type
            )));
        }
        let height = state.height().map_or(0, |h| h + 1);
        if !config.is_zerocoin_active(height) {
            return Err(ValidationError::rule("zerocoin is not active"));
        }
        check_coin_key(config, height, spend)?;
        check_coin_signature(spend)?;
        if state.is_serial_spent(&spend.coin_serial) {
            return Err(ValidationError::DoubleSpend {
                serial: serial_label(&spend.coin_serial),
            });
        }
        let record = state
            .checkpoint_record(&spend.accumulator_checkpoint)
            .ok_or_else(|| ValidationError::rule("unknown accumulator checkpoint"))?;
        let params = config.zerocoin_params(spend.version < 2);
        let accumulator = record.accumulators.value(spend.denomination);
        if !self.verifier.verify_spend(params, spend, accumulator) {
            return Err(ValidationError::proof("ownership proof does not verify"));
        }
        Ok(())
    }
}

impl<V: ZerocoinVerifier> BlockValidator for ZerocoinEngine<V> {
    fn validate(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError> {
        let mut pending = self.collect_spends(ctx, block)?;
        if !pending.is_empty() {
            self.verify_proofs(&mut pending)?;
            self.check_serials(ctx, &mut pending)?;
            for p in pending.iter_mut() {
                p.stage = SpendStage::Accepted;
            }
            debug!(
                height = ctx.height,
                spends = pending.len(),
                "zerocoin spends accepted"
            );
        }
        self.check_mints(ctx, block)
    }
}
