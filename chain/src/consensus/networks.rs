//! Per-network parameter records.
//!
//! Testnet is main with overrides, regtest is testnet with overrides.

use super::config::{ConsensusParams, GenesisParams, Network};
use crate::types::{CENT, COIN, U256};

/// RSA-2048 challenge modulus shared by every network.
pub const ZEROCOIN_MODULUS: &str = concat!(
    "25195908475657893494027183240048398571429282126204032027777137836043662020707595",
    "55626401852588078440691829064124951508218929855914917618450280848912007284499268",
    "73928072877767359714183472702618963750149718246911650776133798590957000973304597",
    "48808428401797429100642458691817195118746121515172654632282216869987549182422433",
    "63725908514186546204357679842338718477444792073993423658482382428119816381501067",
    "48104516603773060562016196762561338441436038339044149526344321901146575444541784",
    "24020924616515723350778707749817125772467962926386356373289912154831438167899885",
    "040445364023527381951378636564391212010397122822120720357",
);

const GENESIS_MERKLE_ROOT: &str =
    "06af04fe6d2a16e4203ea63fa0373fdba9c80641f62679d1087bb7743e435d19";

pub fn main_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Main,

        pow_limit: U256::MAX >> 20,
        pos_limit_v1: U256::MAX >> 24,
        pos_limit_v2: U256::MAX >> 20,
        pow_no_retargeting: false,
        // Enforced on every public network; see the warning in
        // `ConsensusConfig::build_with`.
        skip_pow_check: false,
        target_timespan: 40 * 60,
        target_timespan_v2: 30 * 60,
        target_spacing: 60,
        time_slot_length: 15,

        coinbase_maturity: 100,
        max_money_out: 20_000_000_010 * COIN,

        future_time_drift_pow: 7200,
        future_time_drift_pos: 180,

        stake_min_age: 60 * 60,
        stake_min_depth: 600,

        height_last_pow: 1000,
        height_start_bip65: 1,
        height_start_stake_modifier_v2: 1001,
        height_start_time_proto_v2: 1001,
        block_enforce_new_message_signatures: 1,
        block_v7_start_height: 1,

        enforce_block_upgrade_majority: 8100,
        reject_block_outdated_majority: 10260,
        to_check_block_upgrade_majority: 10800,

        zerocoin_modulus: ZEROCOIN_MODULUS,
        zerocoin_start_height: 2_594_451,
        block_zerocoin_v2: 2_594_451,
        public_zc_spends: 0,
        block_last_accumulator_checkpoint: 1,
        max_zerocoin_spends_per_transaction: 7,
        max_zerocoin_public_spends_per_transaction: 637,
        min_zerocoin_mint_fee: CENT,
        mint_required_confirmations: 20,
        required_accumulation: 10,
        zerocoin_security_level: 100,
        zerocoin_required_stake_depth: 200,

        fake_serial_blockheight_end: Some(0),
        supply_before_fake_serial: 4_131_563 * COIN,
        known_bad_serials: Vec::new(),

        masternode_count_drift: 20,
        budget_cycle_blocks: 43_200,
        start_masternode_payments: 1_403_728_576,

        max_reorganization_depth: 100,
        checkpoints: vec![(
            0,
            "00000efafc5fb67134178c707a37ccedb5e9d22c8955b0324665470561d22284",
        )],

        genesis: GenesisParams {
            time: 1_587_927_600,
            nonce: 5_416_048,
            bits: 0x1e0f_fff0,
            version: 1,
            reward: 250 * COIN,
            hash: "00000efafc5fb67134178c707a37ccedb5e9d22c8955b0324665470561d22284",
            merkle_root: GENESIS_MERKLE_ROOT,
        },
    }
}

pub fn testnet_params() -> ConsensusParams {
    let main = main_params();
    ConsensusParams {
        network: Network::Test,

        coinbase_maturity: 15,
        max_money_out: 43_199_500 * COIN,
        stake_min_depth: 100,

        height_last_pow: 200,
        height_start_bip65: 851_019,
        height_start_stake_modifier_v2: 1_214_000,
        height_start_time_proto_v2: 1_347_000,
        block_enforce_new_message_signatures: 1_347_000,
        block_v7_start_height: 1_347_000,

        enforce_block_upgrade_majority: 4320,
        reject_block_outdated_majority: 5472,
        to_check_block_upgrade_majority: 5760,

        zerocoin_start_height: 201_576,
        block_zerocoin_v2: 444_020,
        public_zc_spends: 1_106_100,
        block_last_accumulator_checkpoint: 1_106_100 - 10,

        fake_serial_blockheight_end: None,
        supply_before_fake_serial: 0,

        masternode_count_drift: 4,
        budget_cycle_blocks: 144,
        start_masternode_payments: 1_420_837_558,

        checkpoints: vec![(
            0,
            "000000af6424c4c4fd2587d2809cd03b9bc01080b76f18e82c32f429cd3dd7b7",
        )],

        genesis: GenesisParams {
            time: 1_587_927_601,
            nonce: 5_450_020,
            hash: "000000af6424c4c4fd2587d2809cd03b9bc01080b76f18e82c32f429cd3dd7b7",
            ..main.genesis.clone()
        },
        ..main
    }
}

pub fn regtest_params() -> ConsensusParams {
    let test = testnet_params();
    ConsensusParams {
        network: Network::Regtest,

        pow_no_retargeting: true,
        skip_pow_check: true,
        coinbase_maturity: 100,
        stake_min_age: 0,
        stake_min_depth: 0,

        height_last_pow: 250,
        height_start_stake_modifier_v2: 251,
        height_start_time_proto_v2: 999_999_999,
        block_enforce_new_message_signatures: 1,
        block_v7_start_height: 300,

        enforce_block_upgrade_majority: 750,
        reject_block_outdated_majority: 950,
        to_check_block_upgrade_majority: 1000,

        zerocoin_start_height: 300,
        block_zerocoin_v2: 300,
        public_zc_spends: 400,
        block_last_accumulator_checkpoint: 301,
        mint_required_confirmations: 10,
        zerocoin_required_stake_depth: 10,

        fake_serial_blockheight_end: None,

        checkpoints: vec![(
            0,
            "00000d8f061636f64ad94e3be3f1f7ba421f6af1f18d289835c2a5b96fd3ac4e",
        )],

        genesis: GenesisParams {
            time: 1_587_927_602,
            nonce: 6_469_769,
            hash: "00000d8f061636f64ad94e3be3f1f7ba421f6af1f18d289835c2a5b96fd3ac4e",
            ..test.genesis.clone()
        },
        ..test
    }
}
