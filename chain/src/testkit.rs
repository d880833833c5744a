//! Deterministic chains for unit tests.
//!
//! [`TestChain`] mines fully valid blocks on top of a [`ChainState`]
//! with small consensus constants: maturity 3, stake depth 5 and the
//! switch to proof-of-stake after height 40. Blocks are ground to their
//! PoW target and signed with fixed keys.

use num_bigint::BigUint;
use once_cell::sync::Lazy;
use secp256k1::{PublicKey, SecretKey};

use crate::consensus::chain_state::ChainState;
use crate::consensus::config::{ConsensusConfig, ConsensusParams};
use crate::consensus::difficulty::next_work_required;
use crate::consensus::error::ValidationError;
use crate::consensus::networks::regtest_params;
use crate::consensus::validator::{BlockValidator, ValidationContext};
use crate::types::uint::decode_compact;
use crate::types::zerocoin::v2_serial_from_pubkey;
use crate::types::{
    Amount, Block, BlockHash, BlockHeader, COIN, CoinSpend, Denomination, Hash256, OutPoint,
    PublicCoin, Script, SpendType, Transaction, TxIn, TxOut, U256,
};
use crate::validation::masternode::{MasternodeRegistry, Payee, RequiredPayee};
use crate::validation::signature::{secp, sign_block, sign_hash};
use crate::validation::{
    MasternodePaymentValidator, StandardValidator, ZerocoinEngine, standard_validator,
};
use crate::zerocoin::{CommitmentOnlyVerifier, ZerocoinParams, ZerocoinVerifier};

pub const BLOCK_REWARD: Amount = 250 * COIN;

/// Proof blob [`TestVerifier`] accepts.
pub const VALID_PROOF: &[u8] = b"valid-proof";

/// Parameters of [`config`]; start here for one-off configurations.
pub fn base_params() -> ConsensusParams {
    let limit = U256::MAX >> 1;
    ConsensusParams {
        pow_limit: limit,
        pos_limit_v1: limit,
        pos_limit_v2: limit,
        pow_no_retargeting: false,
        skip_pow_check: false,
        coinbase_maturity: 3,
        stake_min_age: 0,
        stake_min_depth: 5,
        height_last_pow: 40,
        height_start_stake_modifier_v2: 41,
        block_enforce_new_message_signatures: 1,
        block_v7_start_height: 1,
        zerocoin_start_height: 1_000_000,
        block_zerocoin_v2: 1_000_000,
        public_zc_spends: 1_000_000,
        ..regtest_params()
    }
}

fn zerocoin_params() -> ConsensusParams {
    ConsensusParams {
        zerocoin_start_height: 1,
        mint_required_confirmations: 2,
        block_last_accumulator_checkpoint: 0,
        height_last_pow: 200,
        height_start_stake_modifier_v2: 201,
        ..base_params()
    }
}

fn build(params: ConsensusParams) -> ConsensusConfig {
    ConsensusConfig::build(params).expect("test consensus config")
}

static DEFAULT: Lazy<ConsensusConfig> = Lazy::new(|| build(base_params()));
static ZEROCOIN: Lazy<ConsensusConfig> = Lazy::new(|| build(zerocoin_params()));
static FRAUD: Lazy<ConsensusConfig> = Lazy::new(|| {
    build(ConsensusParams {
        fake_serial_blockheight_end: Some(30),
        supply_before_fake_serial: 1000 * COIN,
        known_bad_serials: vec!["424242"],
        ..zerocoin_params()
    })
});
static PUBLIC: Lazy<ConsensusConfig> = Lazy::new(|| {
    build(ConsensusParams {
        block_zerocoin_v2: 1,
        public_zc_spends: 1,
        ..zerocoin_params()
    })
});

pub fn config() -> &'static ConsensusConfig {
    &DEFAULT
}

pub fn zerocoin_config() -> &'static ConsensusConfig {
    &ZEROCOIN
}

/// Spends `prevout` into a single output.
pub fn spend_tx(prevout: OutPoint, value: Amount, script: &Script) -> Transaction {
    Transaction::new(
        vec![TxIn::new(prevout, Script::new())],
        vec![TxOut::new(value, script.clone())],
    )
}

/// Mints `coins` from `prevout`, paying `fee` and the rest to `change`.
pub fn mint_tx(
    prevout: OutPoint,
    input_value: Amount,
    coins: &[PublicCoin],
    fee: Amount,
    change: &Script,
) -> Transaction {
    let mut vout: Vec<TxOut> = coins
        .iter()
        .map(|c| {
            TxOut::new(
                c.denomination.amount(),
                Script::zerocoin_mint(&c.value.to_bytes_be()),
            )
        })
        .collect();
    let rest = input_value - vout.iter().map(|o| o.value).sum::<Amount>() - fee;
    if rest > 0 {
        vout.push(TxOut::new(rest, change.clone()));
    }
    Transaction::new(vec![TxIn::new(prevout, Script::new())], vout)
}

pub fn sign_coin_spend(spend: &mut CoinSpend, key: &SecretKey) {
    spend.signature = sign_hash(&spend.signature_hash(), key).expect("sign coin spend");
}

/// Commitments like [`CommitmentOnlyVerifier`]; spends whose proof is
/// [`VALID_PROOF`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TestVerifier;

impl ZerocoinVerifier for TestVerifier {
    fn verify_commitment(&self, params: &ZerocoinParams, coin: &PublicCoin) -> bool {
        CommitmentOnlyVerifier.verify_commitment(params, coin)
    }

    fn verify_spend(&self, _: &ZerocoinParams, spend: &CoinSpend, _: &BigUint) -> bool {
        spend.proof == VALID_PROOF
    }
}

#[derive(Clone, Debug, Default)]
pub struct FixedRegistry {
    pub payees: Vec<Payee>,
    pub budget: Option<Payee>,
}

impl MasternodeRegistry for FixedRegistry {
    fn ranked_payees(&self, _height: u32) -> Vec<Payee> {
        self.payees.clone()
    }

    fn budget_payee(&self, _height: u32) -> Option<Payee> {
        self.budget.clone()
    }
}

pub struct TestKeys {
    pub staker: SecretKey,
    pub coin: SecretKey,
}

impl TestKeys {
    fn new() -> Self {
        TestKeys {
            staker: SecretKey::from_slice(&[0x11; 32]).expect("staker key"),
            coin: SecretKey::from_slice(&[0x22; 32]).expect("coin key"),
        }
    }

    pub fn staker_pubkey(&self) -> Vec<u8> {
        PublicKey::from_secret_key(secp(), &self.staker).serialize().to_vec()
    }

    pub fn coin_pubkey(&self) -> Vec<u8> {
        PublicKey::from_secret_key(secp(), &self.coin).serialize().to_vec()
    }

    pub fn staker_script(&self) -> Script {
        Script::p2pk(&self.staker_pubkey())
    }
}

pub type TestValidator = StandardValidator<TestVerifier, FixedRegistry>;

pub fn test_validator(registry: FixedRegistry) -> TestValidator {
    standard_validator(ZerocoinEngine::new(TestVerifier), registry)
}

/// A chain state plus the blocks that built it.
pub struct TestChain {
    config: &'static ConsensusConfig,
    state: ChainState,
    validator: TestValidator,
    registry: FixedRegistry,
    keys: TestKeys,
    blocks: Vec<Block>,
    tag: i64,
    funding: usize,
    commitments: u64,
}

impl TestChain {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn zerocoin() -> Self {
        Self::with_config(zerocoin_config())
    }

    /// Zerocoin chain with a fake-serial window up to height 30.
    pub fn fraud() -> Self {
        Self::with_config(&FRAUD)
    }

    /// Zerocoin chain with v2 serials and public spends from height 1.
    pub fn public() -> Self {
        Self::with_config(&PUBLIC)
    }

    pub fn with_config(config: &'static ConsensusConfig) -> Self {
        let mut state = ChainState::new(config);
        let genesis = config.genesis_block().clone();
        let delta = state
            .prepare(config, &genesis, config.genesis_hash())
            .expect("genesis delta");
        state.connect(delta);
        TestChain {
            config,
            state,
            validator: test_validator(FixedRegistry::default()),
            registry: FixedRegistry::default(),
            keys: TestKeys::new(),
            blocks: vec![genesis],
            tag: 0,
            funding: 1,
            commitments: 0,
        }
    }

    pub fn with_registry(mut self, registry: FixedRegistry) -> Self {
        self.validator = test_validator(registry.clone());
        self.registry = registry;
        self
    }

    /// Distinguishes coinbases of otherwise identical chains.
    pub fn set_tag(&mut self, tag: i64) {
        self.tag = tag;
    }

    pub fn config(&self) -> &'static ConsensusConfig {
        self.config
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn take_state(self) -> ChainState {
        self.state
    }

    pub fn keys(&self) -> &TestKeys {
        &self.keys
    }

    /// Active blocks by height, genesis first.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn hash(&self, block: &Block) -> BlockHash {
        self.config.block_hash(&block.header)
    }

    pub fn coinbase_outpoint(&self, height: u32) -> OutPoint {
        OutPoint::new(self.blocks[height as usize].txs[0].txid(), 0)
    }

    // ---------------------------
    // Block construction
    // ---------------------------

    fn next_height(&self) -> u32 {
        self.state.height().expect("chain has genesis") + 1
    }

    fn coinbase(&self, outputs: Vec<TxOut>) -> Transaction {
        let script = Script::new()
            .push_int(i64::from(self.next_height()))
            .push_int(self.tag);
        Transaction::new(vec![TxIn::new(OutPoint::NULL, script)], outputs)
    }

    fn assemble(&self, mut txs: Vec<Transaction>, extra: Vec<Transaction>) -> Block {
        let parent = self.state.tip().expect("chain has genesis");
        txs.extend(extra);
        let header = BlockHeader {
            version: 7,
            prev_block: parent.hash,
            merkle_root: Hash256::ZERO,
            time: parent.time + self.config.target_spacing as u32,
            bits: next_work_required(self.config, &self.state).expect("bits"),
            nonce: 0,
            accumulator_checkpoint: Hash256::ZERO,
        };
        self.resign(Block {
            header,
            txs,
            signature: Vec::new(),
        })
    }

    /// Recomputes the merkle root, regrinds the nonce and signs again
    /// after a test edited `block`.
    pub fn resign(&self, mut block: Block) -> Block {
        block.header.merkle_root = block.compute_merkle_root().0;
        if !self.config.is_pos_height(self.next_height()) && !self.config.skip_pow_check {
            if let Some(target) = decode_compact(block.header.bits).valid() {
                while self.hash(&block).0.to_u256() > target {
                    block.header.nonce = block.header.nonce.wrapping_add(1);
                }
            }
        }
        let hash = self.hash(&block);
        let key = if block.txs.get(1).is_some_and(Transaction::is_zerocoin_stake) {
            &self.keys.coin
        } else {
            &self.keys.staker
        };
        sign_block(&mut block, &hash, key).expect("sign block");
        block
    }

    pub fn next_pow_block(&self, extra: Vec<Transaction>) -> Block {
        let coinbase = self.coinbase(vec![TxOut::new(BLOCK_REWARD, self.keys.staker_script())]);
        self.assemble(vec![coinbase], extra)
    }

    /// PoW block that also pays `amount` to the scheduled masternode.
    pub fn next_pow_block_paying(&self, amount: Amount) -> Block {
        let mut outputs = vec![TxOut::new(BLOCK_REWARD, self.keys.staker_script())];
        let schedule = MasternodePaymentValidator::new(self.registry.clone());
        match schedule.required_payee(self.config, self.next_height()) {
            RequiredPayee::Budget(p) | RequiredPayee::Masternode { scheduled: p, .. } => {
                outputs.push(TxOut::new(amount, p.script));
            }
            RequiredPayee::None => {}
        }
        self.assemble(vec![self.coinbase(outputs)], Vec::new())
    }

    /// PoS block staking the output created at exactly minimum depth.
    pub fn next_pos_block(&self, extra: Vec<Transaction>) -> Block {
        let source = self.next_height() - self.config.stake_min_depth;
        self.next_pos_block_from(source, extra)
    }

    /// PoS block staking the reward output of the block at `source_height`.
    pub fn next_pos_block_from(&self, source_height: u32, extra: Vec<Transaction>) -> Block {
        let source = &self.blocks[source_height as usize];
        let (prevout, value) = if source.is_proof_of_stake() {
            let cs = &source.txs[1];
            (OutPoint::new(cs.txid(), 1), cs.vout[1].value)
        } else {
            let cb = &source.txs[0];
            (OutPoint::new(cb.txid(), 0), cb.vout[0].value)
        };
        let coinstake = Transaction::new(
            vec![TxIn::new(prevout, Script::new())],
            vec![
                TxOut::empty(),
                TxOut::new(value + BLOCK_REWARD, self.keys.staker_script()),
            ],
        );
        let coinbase = self.coinbase(vec![TxOut::empty()]);
        self.assemble(vec![coinbase, coinstake], extra)
    }

    /// Validates `block` with the full rule set and connects it.
    pub fn connect(&mut self, block: Block) -> Result<BlockHash, ValidationError> {
        let hash = self.hash(&block);
        let delta = self.state.prepare(self.config, &block, hash)?;
        {
            let parent = self.state.tip().expect("chain has genesis");
            let ctx = ValidationContext {
                config: self.config,
                state: &self.state,
                parent,
                delta: &delta,
                hash,
                height: delta.entry.height,
                adjusted_time: i64::from(block.header.time),
            };
            self.validator.validate(&ctx, &block)?;
        }
        let height = delta.entry.height as usize;
        self.state.connect(delta);
        self.blocks.truncate(height);
        self.blocks.push(block);
        Ok(hash)
    }

    /// Connects `block` without running the validators, so tests can
    /// build on top of a block that breaks a rule.
    pub fn force_connect(&mut self, block: Block) -> BlockHash {
        let hash = self.hash(&block);
        let delta = self.state.prepare(self.config, &block, hash).expect("prepare");
        let height = delta.entry.height as usize;
        self.state.connect(delta);
        self.blocks.truncate(height);
        self.blocks.push(block);
        hash
    }

    pub fn mine_pow_blocks(&mut self, n: u32) {
        for _ in 0..n {
            let block = self.next_pow_block(Vec::new());
            self.connect(block).expect("pow block");
        }
    }

    pub fn mine_pos_blocks(&mut self, n: u32) {
        for _ in 0..n {
            let block = self.next_pos_block(Vec::new());
            self.connect(block).expect("pos block");
        }
    }

    // ---------------------------
    // Zerocoin helpers
    // ---------------------------

    /// Next unused PoW coinbase output, oldest first.
    pub fn next_funding(&mut self) -> (OutPoint, Amount) {
        let height = self.funding;
        self.funding += 1;
        let out = &self.blocks[height].txs[0].vout[0];
        (self.coinbase_outpoint(height as u32), out.value)
    }

    pub fn fresh_coin(&mut self, denomination: Denomination) -> PublicCoin {
        self.commitments += 1;
        PublicCoin {
            denomination,
            value: BigUint::from(0x1_0000_0000u64 + self.commitments),
        }
    }

    pub fn mint_block(&mut self, denominations: &[Denomination]) -> Block {
        let (prevout, value) = self.next_funding();
        let coins: Vec<PublicCoin> = denominations.iter().map(|d| self.fresh_coin(*d)).collect();
        let fee = self.config.min_zerocoin_mint_fee * coins.len() as Amount;
        let tx = mint_tx(prevout, value, &coins, fee, &self.keys.staker_script());
        self.next_pow_block(vec![tx])
    }

    pub fn v2_serial(&self) -> BigUint {
        v2_serial_from_pubkey(&self.keys.coin_pubkey())
    }

    /// Unsigned spend against the current accumulator checkpoint.
    pub fn coin_spend(
        &self,
        serial: BigUint,
        denomination: Denomination,
        spend_type: SpendType,
    ) -> CoinSpend {
        let version = if self.config.is_zerocoin_v2(self.next_height()) {
            2
        } else {
            1
        };
        CoinSpend {
            version,
            denomination,
            coin_serial: serial,
            accumulator_checkpoint: self.state.accumulator_checkpoint(),
            tx_binding: Hash256::ZERO,
            spend_type,
            pubkey: self.keys.coin_pubkey(),
            signature: Vec::new(),
            proof: VALID_PROOF.to_vec(),
        }
    }

    /// Transaction redeeming `spend` to the staker. Public spends are
    /// bound to the transaction and signed with the coin key.
    pub fn spend_tx(&self, mut spend: CoinSpend, public: bool) -> Transaction {
        let vout = vec![TxOut::new(
            spend.denomination.amount(),
            self.keys.staker_script(),
        )];
        if public {
            let placeholder = TxIn {
                prevout: OutPoint::NULL,
                script_sig: Script::new(),
                sequence: spend.denomination.units(),
            };
            spend.tx_binding = Transaction::new(vec![placeholder], vout.clone()).binding_hash();
            sign_coin_spend(&mut spend, &self.keys.coin);
        }
        let input = TxIn::zerocoin_spend(&spend, public, OutPoint::NULL).expect("spend input");
        Transaction::new(vec![input], vout)
    }

    pub fn spend_block(
        &self,
        serial: BigUint,
        denomination: Denomination,
        spend_type: SpendType,
    ) -> Block {
        let public = self.config.is_public_spend_active(self.next_height());
        let spend = self.coin_spend(serial, denomination, spend_type);
        self.next_pow_block(vec![self.spend_tx(spend, public)])
    }
}
