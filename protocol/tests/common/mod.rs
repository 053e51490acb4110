//! Shared two-chain fixture for the integration tests.
//!
//! `noble` issues `uusdc` under compliance control and charges a 1 bps
//! transfer fee; `gaia` is the counterparty holding `uatom`. They are joined
//! by `transfer/channel-0` (noble) <-> `transfer/channel-1` (gaia).

#![allow(dead_code)]

use chrono::{TimeZone, Utc};

use tokengate_protocol::address::Address;
use tokengate_protocol::chain::{BlockInfo, Chain};
use tokengate_protocol::compliance::{AdminOp, Role};
use tokengate_protocol::config::{
    ChainConfig, ChannelConfig, ComplianceGenesis, FeePolicy, DEFAULT_TRANSFER_FEE_BPS,
};
use tokengate_protocol::packet::{Resolution, TransferRequest};
use tokengate_protocol::relayer::Relayer;

pub const USDC: &str = "uusdc";
pub const ATOM: &str = "uatom";

/// Mint allowance the original interchain test gives its minter.
pub const MINTER_ALLOWANCE: u64 = 1_000_000_000_000_000;

pub fn addr(label: &str) -> Address {
    Address::from_label(label)
}

pub fn owner() -> Address {
    addr("owner")
}
pub fn master_minter() -> Address {
    addr("master-minter")
}
pub fn minter_controller() -> Address {
    addr("minter-controller")
}
pub fn minter() -> Address {
    addr("minter")
}
pub fn blacklister() -> Address {
    addr("blacklister")
}
pub fn pauser() -> Address {
    addr("pauser")
}
pub fn user() -> Address {
    addr("user")
}
pub fn user2() -> Address {
    addr("user2")
}
pub fn grantee() -> Address {
    addr("grantee")
}
pub fn gaia_blacklister() -> Address {
    addr("gaia-blacklister")
}
pub fn gaia_pauser() -> Address {
    addr("gaia-pauser")
}
pub fn gaia_minter() -> Address {
    addr("gaia-minter")
}

pub fn noble_config() -> ChainConfig {
    ChainConfig {
        chain_id: "noble-1".into(),
        bech32_prefix: "noble".into(),
        denom: USDC.into(),
        channel: ChannelConfig::transfer("channel-0", "channel-1"),
        fee: FeePolicy {
            bps: DEFAULT_TRANSFER_FEE_BPS,
            max_fee: None,
            denom: USDC.into(),
        },
    }
}

pub fn gaia_config() -> ChainConfig {
    ChainConfig {
        chain_id: "gaia-1".into(),
        bech32_prefix: "cosmos".into(),
        denom: ATOM.into(),
        channel: ChannelConfig::transfer("channel-1", "channel-0"),
        fee: FeePolicy::none(ATOM),
    }
}

pub fn noble_genesis() -> ComplianceGenesis {
    ComplianceGenesis {
        owner: Some(owner()),
        master_minter: Some(master_minter()),
        blacklister: Some(blacklister()),
        pauser: Some(pauser()),
        ..Default::default()
    }
}

pub fn gaia_genesis() -> ComplianceGenesis {
    ComplianceGenesis {
        owner: Some(addr("gaia-owner")),
        minter: Some(gaia_minter()),
        minter_allowance: u64::MAX,
        blacklister: Some(gaia_blacklister()),
        pauser: Some(gaia_pauser()),
        ..Default::default()
    }
}

pub struct Network {
    pub noble: Chain,
    pub gaia: Chain,
    pub relayer: Relayer,
}

impl Network {
    /// Both chains at genesis. Noble has no minter yet.
    pub fn new() -> Self {
        let start = BlockInfo::genesis(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        Self {
            noble: Chain::new(noble_config(), &noble_genesis(), start),
            gaia: Chain::new(gaia_config(), &gaia_genesis(), start),
            relayer: Relayer::new(),
        }
    }

    /// Genesis plus the minter chain of command set up through admin ops.
    pub fn with_minter() -> Self {
        let mut net = Self::new();
        net.noble
            .admin(
                &master_minter(),
                AdminOp::AssignRole {
                    role: Role::MinterController,
                    address: minter_controller(),
                },
            )
            .unwrap();
        net.noble
            .admin(
                &minter_controller(),
                AdminOp::ConfigureMinter {
                    minter: minter(),
                    allowance: MINTER_ALLOWANCE,
                },
            )
            .unwrap();
        net
    }

    /// Minter, with `user` and `user2` each holding 1,000,000,000,000 uusdc.
    pub fn funded() -> Self {
        let mut net = Self::with_minter();
        net.noble.mint(&minter(), &user(), 1_000_000_000_000).unwrap();
        net.noble.mint(&minter(), &user2(), 1_000_000_000_000).unwrap();
        net
    }

    /// `address` as a receiver string on gaia.
    pub fn on_gaia(&self, address: &Address) -> String {
        self.gaia.bech32(address).unwrap()
    }

    /// `address` as a receiver string on noble.
    pub fn on_noble(&self, address: &Address) -> String {
        self.noble.bech32(address).unwrap()
    }

    /// The uusdc voucher denomination on gaia.
    pub fn usdc_voucher(&self) -> String {
        self.gaia.voucher_denom(USDC)
    }

    /// A noble -> gaia uusdc transfer request.
    pub fn usdc_to_gaia(&self, from: Address, to: Address, amount: u64) -> TransferRequest {
        TransferRequest::new(from, self.on_gaia(&to), USDC, amount)
    }

    /// A gaia -> noble voucher transfer request.
    pub fn voucher_to_noble(&self, from: Address, to: Address, amount: u64) -> TransferRequest {
        TransferRequest::new(from, self.on_noble(&to), self.usdc_voucher(), amount)
    }

    pub fn relay_to_gaia(&mut self) -> Vec<Resolution> {
        self.relayer.relay(&mut self.noble, &mut self.gaia).unwrap()
    }

    pub fn relay_to_noble(&mut self) -> Vec<Resolution> {
        self.relayer.relay(&mut self.gaia, &mut self.noble).unwrap()
    }

    /// Noble's channel escrow account.
    pub fn noble_escrow(&self) -> Address {
        self.noble.config().channel.escrow_address()
    }

    /// Asserts per-chain conservation and, once nothing is in flight, that
    /// every uusdc voucher on gaia is backed by escrow on noble.
    pub fn assert_conserved(&self) {
        self.noble.conservation(USDC).unwrap();
        self.gaia.conservation(&self.usdc_voucher()).unwrap();

        let in_flight =
            self.noble.pending_transfers().count() + self.gaia.pending_transfers().count();
        if in_flight == 0 {
            assert_eq!(
                self.noble.balance(&self.noble_escrow(), USDC),
                self.gaia.supply(&self.usdc_voucher()),
                "voucher supply must equal escrowed uusdc"
            );
        }
    }
}
