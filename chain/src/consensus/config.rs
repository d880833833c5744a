//! Consensus configuration.
//!
//! A network's rule set is a flat [`ConsensusParams`] record. Networks
//! derived from another one (testnet from main, regtest from testnet)
//! are written as struct-update overrides of the parent record, see
//! [`crate::consensus::networks`]. [`ConsensusConfig`] is the validated,
//! immutable form every validation entry point receives: it owns the
//! parsed zerocoin groups, the checkpoint map and the genesis block.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

use num_bigint::BigUint;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::ConfigError;
use super::genesis;
use super::networks;
use crate::types::{
    Amount, Block, BlockHash, BlockHeader, Hash256, LegacyHeaderHasher, QuarkHasher, U256,
};
use crate::zerocoin::{ZerocoinGroups, ZerocoinParams};

/// Network identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
    Regtest,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            "regtest" => Ok(Network::Regtest),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Inputs of the genesis block and the constants it must reproduce.
#[derive(Clone, Debug)]
pub struct GenesisParams {
    pub time: u32,
    pub nonce: u32,
    pub bits: u32,
    pub version: i32,
    pub reward: Amount,
    pub hash: &'static str,
    pub merkle_root: &'static str,
}

/// Flat per-network parameter record.
#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,

    // Difficulty
    pub pow_limit: U256,
    pub pos_limit_v1: U256,
    pub pos_limit_v2: U256,
    /// Keep the parent's bits for every PoW block.
    pub pow_no_retargeting: bool,
    /// Skip the header-hash-versus-target check for PoW blocks.
    pub skip_pow_check: bool,
    pub target_timespan: i64,
    pub target_timespan_v2: i64,
    pub target_spacing: i64,
    pub time_slot_length: i64,

    // Money and maturity
    pub coinbase_maturity: u32,
    pub max_money_out: Amount,

    // Timestamps
    pub future_time_drift_pow: i64,
    pub future_time_drift_pos: i64,

    // Staking
    pub stake_min_age: i64,
    pub stake_min_depth: u32,

    // Height activations
    pub height_last_pow: u32,
    pub height_start_bip65: u32,
    pub height_start_stake_modifier_v2: u32,
    pub height_start_time_proto_v2: u32,
    pub block_enforce_new_message_signatures: u32,
    pub block_v7_start_height: u32,

    // Version majority
    pub enforce_block_upgrade_majority: u32,
    pub reject_block_outdated_majority: u32,
    pub to_check_block_upgrade_majority: u32,

    // Zerocoin
    pub zerocoin_modulus: &'static str,
    pub zerocoin_start_height: u32,
    pub block_zerocoin_v2: u32,
    pub public_zc_spends: u32,
    pub block_last_accumulator_checkpoint: u32,
    pub max_zerocoin_spends_per_transaction: usize,
    pub max_zerocoin_public_spends_per_transaction: usize,
    pub min_zerocoin_mint_fee: Amount,
    pub mint_required_confirmations: u32,
    /// Blocks between accumulator checkpoints.
    pub required_accumulation: u32,
    pub zerocoin_security_level: u32,
    pub zerocoin_required_stake_depth: u32,

    // Fake serial attack
    /// Last height at which previously seen serials may be re-spent.
    /// `None` when the network never had the attack.
    pub fake_serial_blockheight_end: Option<u32>,
    pub supply_before_fake_serial: Amount,
    /// Decimal serials forged during the attack.
    pub known_bad_serials: Vec<&'static str>,

    // Masternodes and budget
    pub masternode_count_drift: u32,
    pub budget_cycle_blocks: u32,
    pub start_masternode_payments: i64,

    // Chain selection
    pub max_reorganization_depth: u32,
    pub checkpoints: Vec<(u32, &'static str)>,

    pub genesis: GenesisParams,
}

/// Immutable, validated consensus rules of one network.
pub struct ConsensusConfig {
    params: ConsensusParams,
    checkpoints: BTreeMap<u32, BlockHash>,
    known_bad_serials: BTreeSet<BigUint>,
    zerocoin: ZerocoinGroups,
    genesis: Block,
    genesis_hash: BlockHash,
    legacy_hasher: Arc<dyn LegacyHeaderHasher>,
}

impl fmt::Debug for ConsensusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusConfig")
            .field("network", &self.params.network)
            .field("genesis_hash", &self.genesis_hash)
            .field("checkpoints", &self.checkpoints.len())
            .finish()
    }
}

impl Deref for ConsensusConfig {
    type Target = ConsensusParams;

    fn deref(&self) -> &ConsensusParams {
        &self.params
    }
}

static MAIN: Lazy<Result<ConsensusConfig, ConfigError>> =
    Lazy::new(|| ConsensusConfig::build(networks::main_params()));
static TEST: Lazy<Result<ConsensusConfig, ConfigError>> =
    Lazy::new(|| ConsensusConfig::build(networks::testnet_params()));
static REGTEST: Lazy<Result<ConsensusConfig, ConfigError>> =
    Lazy::new(|| ConsensusConfig::build(networks::regtest_params()));

fn parse_hash(name: &'static str, value: &str) -> Result<Hash256, ConfigError> {
    Hash256::from_hex(value).map_err(|_| ConfigError::BadConstant {
        name,
        value: value.to_string(),
    })
}

impl ConsensusConfig {
    /// Process-wide instance for `network`, built on first use.
    pub fn for_network(network: Network) -> Result<&'static ConsensusConfig, ConfigError> {
        let cell = match network {
            Network::Main => &MAIN,
            Network::Test => &TEST,
            Network::Regtest => &REGTEST,
        };
        Lazy::force(cell).as_ref().map_err(Clone::clone)
    }

    /// Builds and self-checks a configuration, hashing legacy headers
    /// with [`QuarkHasher`].
    pub fn build(params: ConsensusParams) -> Result<Self, ConfigError> {
        Self::build_with(params, Arc::new(QuarkHasher))
    }

    /// Builds a configuration, eagerly parsing both zerocoin groups and
    /// checking the genesis block against its hard-coded constants.
    ///
    /// Both the merkle root and the header hash of the genesis block are
    /// recomputed; any mismatch is fatal.
    pub fn build_with(
        params: ConsensusParams,
        legacy_hasher: Arc<dyn LegacyHeaderHasher>,
    ) -> Result<Self, ConfigError> {
        check_params(&params)?;

        let zerocoin = ZerocoinGroups::new(params.zerocoin_modulus, params.zerocoin_security_level)?;

        let mut checkpoints = BTreeMap::new();
        for (height, hex) in &params.checkpoints {
            checkpoints.insert(*height, BlockHash(parse_hash("checkpoint", hex)?));
        }

        let mut known_bad_serials = BTreeSet::new();
        for serial in &params.known_bad_serials {
            let value = BigUint::parse_bytes(serial.as_bytes(), 10).ok_or_else(|| {
                ConfigError::BadConstant {
                    name: "known_bad_serial",
                    value: serial.to_string(),
                }
            })?;
            known_bad_serials.insert(value);
        }

        let genesis = genesis::create_genesis_block(&params.genesis);
        let expected_root = parse_hash("genesis merkle root", params.genesis.merkle_root)?;
        let (root, _) = genesis.compute_merkle_root();
        if root != expected_root || genesis.header.merkle_root != expected_root {
            return Err(ConfigError::GenesisMismatch {
                network: params.network.to_string(),
                what: "merkle root",
                computed: root.to_string(),
                expected: expected_root.to_string(),
            });
        }

        let expected_hash = BlockHash(parse_hash("genesis hash", params.genesis.hash)?);
        let computed = genesis.header.hash_with(legacy_hasher.as_ref());
        if computed != expected_hash {
            return Err(ConfigError::GenesisMismatch {
                network: params.network.to_string(),
                what: "hash",
                computed: computed.to_string(),
                expected: expected_hash.to_string(),
            });
        }

        if let Some(cp) = checkpoints.get(&0) {
            if *cp != expected_hash {
                return Err(ConfigError::GenesisMismatch {
                    network: params.network.to_string(),
                    what: "checkpoint at height 0",
                    computed: cp.to_string(),
                    expected: expected_hash.to_string(),
                });
            }
        }

        if params.skip_pow_check && params.network != Network::Regtest {
            warn!(network = %params.network, "proof-of-work check disabled for PoW blocks");
        }

        info!(
            network = %params.network,
            genesis = %expected_hash,
            checkpoints = checkpoints.len(),
            "consensus configuration ready"
        );

        Ok(ConsensusConfig {
            params,
            checkpoints,
            known_bad_serials,
            zerocoin,
            genesis,
            genesis_hash: expected_hash,
            legacy_hasher,
        })
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn network(&self) -> Network {
        self.params.network
    }

    pub fn genesis_block(&self) -> &Block {
        &self.genesis
    }

    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis_hash
    }

    /// Hash of `header`.
    pub fn block_hash(&self, header: &BlockHeader) -> BlockHash {
        header.hash_with(self.legacy_hasher.as_ref())
    }

    // ---------------------------
    // Height-based rule selection
    // ---------------------------

    pub fn is_pos_height(&self, height: u32) -> bool {
        height > self.params.height_last_pow
    }

    pub fn is_stake_modifier_v2(&self, height: u32) -> bool {
        height >= self.params.height_start_stake_modifier_v2
    }

    pub fn is_time_protocol_v2(&self, height: u32) -> bool {
        height >= self.params.height_start_time_proto_v2
    }

    pub fn is_zerocoin_active(&self, height: u32) -> bool {
        height >= self.params.zerocoin_start_height
    }

    /// Heights whose block folds matured mints into the accumulators.
    pub fn is_accumulator_checkpoint_height(&self, height: u32) -> bool {
        height % self.params.required_accumulation == 0
    }

    pub fn is_zerocoin_v2(&self, height: u32) -> bool {
        height >= self.params.block_zerocoin_v2
    }

    pub fn is_public_spend_active(&self, height: u32) -> bool {
        height >= self.params.public_zc_spends
    }

    pub fn enforces_new_signatures(&self, height: u32) -> bool {
        height >= self.params.block_enforce_new_message_signatures
    }

    /// Lowest header version accepted at `height`.
    pub fn min_block_version(&self, height: u32) -> i32 {
        if height >= self.params.block_v7_start_height || self.is_time_protocol_v2(height) {
            7
        } else if height >= self.params.height_start_bip65 {
            5
        } else if self.is_zerocoin_active(height) {
            4
        } else {
            1
        }
    }

    pub fn pos_limit(&self, height: u32) -> U256 {
        if self.is_time_protocol_v2(height) {
            self.params.pos_limit_v2
        } else {
            self.params.pos_limit_v1
        }
    }

    pub fn target_timespan(&self, height: u32) -> i64 {
        if self.is_time_protocol_v2(height) {
            self.params.target_timespan_v2
        } else {
            self.params.target_timespan
        }
    }

    /// Seconds a block at `height` may run ahead of adjusted time.
    pub fn future_time_drift(&self, height: u32) -> i64 {
        if self.is_time_protocol_v2(height) {
            self.params.time_slot_length - 1
        } else if self.is_pos_height(height) {
            self.params.future_time_drift_pos
        } else {
            self.params.future_time_drift_pow
        }
    }

    /// Under time protocol v2 timestamps must fall on a slot boundary.
    pub fn is_valid_block_timestamp(&self, time: i64, height: u32) -> bool {
        !self.is_time_protocol_v2(height) || time % self.params.time_slot_length == 0
    }

    /// Whether the fake-serial exclusion window still covers `height`.
    pub fn in_fake_serial_window(&self, height: u32) -> bool {
        self.params
            .fake_serial_blockheight_end
            .is_some_and(|end| height <= end)
    }

    pub fn is_known_bad_serial(&self, serial: &BigUint) -> bool {
        self.known_bad_serials.contains(serial)
    }

    pub fn checkpoint(&self, height: u32) -> Option<BlockHash> {
        self.checkpoints.get(&height).copied()
    }

    pub fn checkpoints(&self) -> &BTreeMap<u32, BlockHash> {
        &self.checkpoints
    }

    pub fn last_checkpoint_height(&self) -> Option<u32> {
        self.checkpoints.keys().next_back().copied()
    }

    pub fn zerocoin_groups(&self) -> &ZerocoinGroups {
        &self.zerocoin
    }

    /// Group for a coin: `use_v1` picks the hex-parsed original group.
    pub fn zerocoin_params(&self, use_v1: bool) -> &Arc<ZerocoinParams> {
        self.zerocoin.params(use_v1)
    }
}

fn check_params(p: &ConsensusParams) -> Result<(), ConfigError> {
    if p.target_spacing <= 0 || p.time_slot_length <= 0 {
        return Err(ConfigError::Parameters(
            "target spacing and time slot length must be positive".into(),
        ));
    }
    if p.target_timespan < p.target_spacing || p.target_timespan_v2 < p.target_spacing {
        return Err(ConfigError::Parameters(
            "target timespan shorter than spacing".into(),
        ));
    }
    if p.enforce_block_upgrade_majority > p.reject_block_outdated_majority
        || p.reject_block_outdated_majority > p.to_check_block_upgrade_majority
    {
        return Err(ConfigError::Parameters(
            "version majority thresholds out of order".into(),
        ));
    }
    if p.required_accumulation == 0 {
        return Err(ConfigError::Parameters(
            "accumulator checkpoint interval must be non-zero".into(),
        ));
    }
    if p.budget_cycle_blocks == 0 {
        return Err(ConfigError::Parameters("budget cycle must be non-zero".into()));
    }
    if p.pow_limit.is_zero() || p.pos_limit_v1.is_zero() || p.pos_limit_v2.is_zero() {
        return Err(ConfigError::Parameters("difficulty limits must be non-zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_parses_from_identifiers() {
        assert_eq!("main".parse::<Network>(), Ok(Network::Main));
        assert_eq!("TESTNET".parse::<Network>(), Ok(Network::Test));
        assert_eq!("regtest".parse::<Network>(), Ok(Network::Regtest));
        assert!(matches!(
            "signet".parse::<Network>(),
            Err(ConfigError::UnknownNetwork(_))
        ));
        assert_eq!(
            serde_json::to_string(&Network::Regtest).expect("serialize"),
            "\"regtest\""
        );
        let net: Network = serde_json::from_str("\"test\"").expect("deserialize");
        assert_eq!(net, Network::Test);
    }

    #[test]
    fn every_network_builds_and_is_cached() {
        for net in [Network::Main, Network::Test, Network::Regtest] {
            let a = ConsensusConfig::for_network(net).expect("config");
            let b = ConsensusConfig::for_network(net).expect("config");
            assert!(std::ptr::eq(a, b));
            assert_eq!(a.network(), net);
            assert_eq!(
                a.genesis_block().header.merkle_root.to_string(),
                "06af04fe6d2a16e4203ea63fa0373fdba9c80641f62679d1087bb7743e435d19"
            );
        }
    }

    #[test]
    fn genesis_headers_hash_to_their_constants() {
        for (params, expected) in [
            (
                networks::main_params(),
                "00000efafc5fb67134178c707a37ccedb5e9d22c8955b0324665470561d22284",
            ),
            (
                networks::testnet_params(),
                "000000af6424c4c4fd2587d2809cd03b9bc01080b76f18e82c32f429cd3dd7b7",
            ),
            (
                networks::regtest_params(),
                "00000d8f061636f64ad94e3be3f1f7ba421f6af1f18d289835c2a5b96fd3ac4e",
            ),
        ] {
            let block = genesis::create_genesis_block(&params.genesis);
            assert_eq!(block.header.hash_with(&QuarkHasher).to_string(), expected);
        }
    }

    #[test]
    fn wrong_genesis_hash_constant_is_fatal() {
        let mut params = networks::testnet_params();
        params.genesis.hash = networks::main_params().genesis.hash;
        params.checkpoints.clear();
        assert!(matches!(
            ConsensusConfig::build(params),
            Err(ConfigError::GenesisMismatch { what: "hash", .. })
        ));
    }

    #[test]
    fn main_genesis_constants() {
        let cfg = ConsensusConfig::for_network(Network::Main).expect("main");
        assert_eq!(
            cfg.genesis_hash().to_string(),
            "00000efafc5fb67134178c707a37ccedb5e9d22c8955b0324665470561d22284"
        );
        assert_eq!(
            cfg.block_hash(&cfg.genesis_block().header),
            cfg.genesis_hash()
        );
        assert_eq!(cfg.checkpoint(0), Some(cfg.genesis_hash()));
    }

    #[test]
    fn height_activations_on_main() {
        let cfg = ConsensusConfig::for_network(Network::Main).expect("main");
        assert!(!cfg.is_pos_height(1000));
        assert!(cfg.is_pos_height(1001));
        assert!(cfg.is_stake_modifier_v2(1001));
        assert!(!cfg.is_stake_modifier_v2(1000));
        assert_eq!(cfg.future_time_drift(500), 7200);
        assert_eq!(cfg.future_time_drift(1001), 14);
        assert_eq!(cfg.min_block_version(1), 7);
        assert_eq!(cfg.pos_limit(1001), U256::MAX >> 20);
        assert!(cfg.is_valid_block_timestamp(1_700_000_010, 2000));
        assert!(!cfg.is_valid_block_timestamp(1_700_000_011, 2000));
        assert!(cfg.is_valid_block_timestamp(1_700_000_011, 900));
    }

    #[test]
    fn accumulator_checkpoints_follow_the_network_interval() {
        let main = ConsensusConfig::for_network(Network::Main).expect("main");
        assert_eq!(main.required_accumulation, 10);
        assert!(main.is_accumulator_checkpoint_height(0));
        assert!(main.is_accumulator_checkpoint_height(310));
        assert!(!main.is_accumulator_checkpoint_height(311));

        let five = ConsensusConfig::build(ConsensusParams {
            required_accumulation: 5,
            ..networks::regtest_params()
        })
        .expect("config");
        assert!(five.is_accumulator_checkpoint_height(305));
        assert!(!five.is_accumulator_checkpoint_height(306));

        let err = ConsensusConfig::build(ConsensusParams {
            required_accumulation: 0,
            ..networks::regtest_params()
        })
        .expect_err("zero interval");
        assert!(matches!(err, ConfigError::Parameters(msg) if msg.contains("accumulator")));
    }

    #[test]
    fn pow_is_checked_on_public_networks() {
        for network in [Network::Main, Network::Test] {
            let cfg = ConsensusConfig::for_network(network).expect("network");
            assert!(!cfg.skip_pow_check, "{network}");
        }
        assert!(ConsensusConfig::for_network(Network::Regtest).expect("regtest").skip_pow_check);
    }

    #[test]
    fn drift_depends_on_block_kind_before_time_protocol_v2() {
        let cfg = ConsensusConfig::for_network(Network::Test).expect("test");
        assert_eq!(cfg.future_time_drift(100), 7200);
        assert_eq!(cfg.future_time_drift(201), 180);
        assert_eq!(cfg.future_time_drift(1_347_000), 14);
        assert!(cfg.is_valid_block_timestamp(1_700_000_001, 1000));
    }

    #[test]
    fn wrong_merkle_constant_is_a_config_inconsistency() {
        let mut params = networks::regtest_params();
        params.genesis.merkle_root =
            "0000000000000000000000000000000000000000000000000000000000000001";
        assert!(matches!(
            ConsensusConfig::build(params),
            Err(ConfigError::GenesisMismatch {
                what: "merkle root",
                ..
            })
        ));
    }

    #[test]
    fn legacy_hasher_mismatch_is_fatal() {
        struct Zero;
        impl LegacyHeaderHasher for Zero {
            fn hash_header(&self, _: &[u8]) -> Hash256 {
                Hash256::ZERO
            }
        }
        let err = ConsensusConfig::build_with(networks::main_params(), Arc::new(Zero))
            .expect_err("mismatch");
        assert!(matches!(err, ConfigError::GenesisMismatch { what: "hash", .. }));
    }
}
