//! Masternode and budget payment checks.
//!
//! The masternode list and budget proposals live outside consensus; this
//! module only consumes them through [`MasternodeRegistry`] and decides,
//! per height, which payout a block must contain.

use tracing::trace;

use crate::consensus::config::ConsensusConfig;
use crate::consensus::error::ValidationError;
use crate::consensus::validator::{BlockValidator, ValidationContext};
use crate::types::{Amount, Block, Script, TxOut};

/// A payout recipient. `amount` of `None` accepts any positive value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payee {
    pub script: Script,
    pub amount: Option<Amount>,
}

impl Payee {
    fn is_paid_by(&self, out: &TxOut) -> bool {
        out.script_pubkey == self.script && out.value >= self.amount.unwrap_or(1)
    }
}

/// Source of scheduled payees.
pub trait MasternodeRegistry: Send + Sync {
    /// Masternodes eligible at `height`, best ranked first.
    fn ranked_payees(&self, height: u32) -> Vec<Payee>;

    /// Approved budget payment scheduled for the superblock at `height`.
    fn budget_payee(&self, height: u32) -> Option<Payee>;
}

/// Registry of a node that tracks no masternodes; disables the check.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMasternodes;

impl MasternodeRegistry for NoMasternodes {
    fn ranked_payees(&self, _height: u32) -> Vec<Payee> {
        Vec::new()
    }

    fn budget_payee(&self, _height: u32) -> Option<Payee> {
        None
    }
}

/// Who must be paid at a height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequiredPayee {
    /// Superblock paying an approved budget proposal.
    Budget(Payee),
    /// The scheduled masternode; `tolerated` are the next ranked payees
    /// accepted to absorb masternode count drift between nodes.
    Masternode { scheduled: Payee, tolerated: Vec<Payee> },
    /// Nobody is scheduled.
    None,
}

pub struct MasternodePaymentValidator<R> {
    registry: R,
}

impl<R: MasternodeRegistry> MasternodePaymentValidator<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Payee a block at `height` must pay.
    pub fn required_payee(&self, config: &ConsensusConfig, height: u32) -> RequiredPayee {
        if config.budget_cycle_blocks > 0 && height % config.budget_cycle_blocks == 0 {
            if let Some(budget) = self.registry.budget_payee(height) {
                return RequiredPayee::Budget(budget);
            }
        }
        let ranked = self.registry.ranked_payees(height);
        if ranked.is_empty() {
            return RequiredPayee::None;
        }
        let start = height as usize % ranked.len();
        let drift = (config.masternode_count_drift as usize).min(ranked.len() - 1);
        let mut rotation = ranked.iter().cycle().skip(start).take(drift + 1).cloned();
        match rotation.next() {
            Some(scheduled) => RequiredPayee::Masternode {
                scheduled,
                tolerated: rotation.collect(),
            },
            None => RequiredPayee::None,
        }
    }

    /// Checks the payout of `block` at `height`.
    pub fn check_payment(
        &self,
        config: &ConsensusConfig,
        height: u32,
        block: &Block,
    ) -> Result<(), ValidationError> {
        if i64::from(block.header.time) < config.start_masternode_payments {
            return Ok(());
        }
        let payout = if block.is_proof_of_stake() {
            block.txs.get(1)
        } else {
            block.txs.first()
        };
        let outputs = payout.map_or(&[][..], |tx| tx.vout.as_slice());

        match self.required_payee(config, height) {
            RequiredPayee::None => Ok(()),
            RequiredPayee::Budget(payee) => {
                if outputs.iter().any(|o| payee.is_paid_by(o)) {
                    Ok(())
                } else {
                    Err(ValidationError::rule(format!(
                        "superblock at height {height} does not pay the budget"
                    )))
                }
            }
            RequiredPayee::Masternode {
                scheduled,
                tolerated,
            } => {
                let paid = std::iter::once(&scheduled)
                    .chain(tolerated.iter())
                    .position(|p| outputs.iter().any(|o| p.is_paid_by(o)));
                match paid {
                    Some(rank) => {
                        trace!(height, rank, "masternode payment found");
                        Ok(())
                    }
                    None => Err(ValidationError::rule(format!(
                        "block at height {height} omits the masternode payment"
                    ))),
                }
            }
        }
    }
}

impl<R: MasternodeRegistry> BlockValidator for MasternodePaymentValidator<R> {
    fn validate(&self, ctx: &ValidationContext<'_>, block: &Block) -> Result<(), ValidationError> {
        self.check_payment(ctx.config, ctx.height, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{self, FixedRegistry, TestChain};
    use crate::types::COIN;

    fn payee(tag: u8, amount: Option<Amount>) -> Payee {
        Payee {
            script: Script::new().push_slice(&[tag; 20]),
            amount,
        }
    }

    fn registry(n: u8) -> FixedRegistry {
        FixedRegistry {
            payees: (1..=n).map(|t| payee(t, Some(COIN))).collect(),
            budget: None,
        }
    }

    #[test]
    fn schedule_rotates_by_height_with_drift() {
        let cfg = testkit::config();
        let v = MasternodePaymentValidator::new(registry(30));
        let RequiredPayee::Masternode { scheduled, tolerated } = v.required_payee(cfg, 33) else {
            panic!("masternode payee expected");
        };
        assert_eq!(scheduled, payee(4, Some(COIN)));
        assert_eq!(tolerated.len(), cfg.masternode_count_drift as usize);
        assert_eq!(tolerated[0], payee(5, Some(COIN)));

        let small = MasternodePaymentValidator::new(registry(2));
        let RequiredPayee::Masternode { tolerated, .. } = small.required_payee(cfg, 3) else {
            panic!("masternode payee expected");
        };
        assert_eq!(tolerated, vec![payee(1, Some(COIN))]);

        assert_eq!(
            MasternodePaymentValidator::new(NoMasternodes).required_payee(cfg, 3),
            RequiredPayee::None
        );
    }

    #[test]
    fn superblocks_pay_the_budget() {
        let cfg = testkit::config();
        let mut reg = registry(3);
        reg.budget = Some(payee(99, None));
        let v = MasternodePaymentValidator::new(reg);
        let cycle = cfg.budget_cycle_blocks;
        assert_eq!(v.required_payee(cfg, cycle), RequiredPayee::Budget(payee(99, None)));
        assert!(matches!(v.required_payee(cfg, cycle + 1), RequiredPayee::Masternode { .. }));
    }

    #[test]
    fn blocks_must_include_the_scheduled_payment() {
        let chain = TestChain::new();
        let cfg = chain.config();
        let v = MasternodePaymentValidator::new(registry(3));
        let height = chain.state().height().expect("height") + 1;

        let mut block = chain.next_pow_block(Vec::new());
        let err = v.check_payment(cfg, height, &block).expect_err("unpaid");
        assert!(matches!(err, ValidationError::ConsensusRule(msg) if msg.contains("masternode payment")));

        let RequiredPayee::Masternode { scheduled, .. } = v.required_payee(cfg, height) else {
            panic!("masternode payee expected");
        };
        block.txs[0].vout.push(TxOut::new(COIN - 1, scheduled.script.clone()));
        assert!(v.check_payment(cfg, height, &block).is_err());
        block.txs[0].vout.push(TxOut::new(COIN, scheduled.script));
        assert!(v.check_payment(cfg, height, &block).is_ok());
    }

    #[test]
    fn payments_are_not_required_before_the_start_time() {
        let chain = TestChain::new();
        let mut block = chain.next_pow_block(Vec::new());
        block.header.time = (chain.config().start_masternode_payments - 1) as u32;
        let v = MasternodePaymentValidator::new(registry(3));
        assert!(v.check_payment(chain.config(), 1, &block).is_ok());
    }

    #[test]
    fn chain_with_registry_enforces_payments() {
        let mut chain = TestChain::new().with_registry(registry(2));
        let block = chain.next_pow_block(Vec::new());
        assert!(chain.connect(block).is_err());
        let block = chain.next_pow_block_paying(COIN);
        chain.connect(block).expect("paid block");
    }
}
